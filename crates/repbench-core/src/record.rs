//! The input record consumed by the ingestion engine.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
  Error, Result,
  model::{INVENTORY_REPORTER, ResourceKey},
};

/// One sighting of a resource, as reported by an external system.
///
/// Deserialised from a single JSON object per input line. `common` and
/// `reporter` are opaque payloads; JSON `null` is treated as absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputRecord {
  pub resource_type:        String,
  pub reporter_type:        String,
  pub reporter_instance_id: String,
  pub local_resource_id:    String,
  #[serde(default)]
  pub api_href:             String,
  #[serde(default)]
  pub console_href:         String,
  #[serde(default)]
  pub reporter_version:     String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub common:               Option<Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub reporter:             Option<Value>,
}

impl InputRecord {
  /// Parse one JSONL line.
  pub fn from_json_line(line: &str) -> Result<Self> {
    serde_json::from_str(line).map_err(Error::MalformedLine)
  }

  pub fn key(&self) -> ResourceKey {
    ResourceKey {
      local_resource_id:    self.local_resource_id.clone(),
      reporter_type:        self.reporter_type.clone(),
      resource_type:        self.resource_type.clone(),
      reporter_instance_id: self.reporter_instance_id.clone(),
    }
  }

  /// Reject records the engine must not act on.
  pub fn validate(&self) -> Result<()> {
    for (name, value) in [
      ("local_resource_id", &self.local_resource_id),
      ("reporter_type", &self.reporter_type),
      ("resource_type", &self.resource_type),
    ] {
      if value.trim().is_empty() {
        return Err(Error::InvalidRecord(format!("{name} must not be empty")));
      }
    }

    if self.reporter_type == INVENTORY_REPORTER {
      return Err(Error::ReservedReporterType(self.reporter_type.clone()));
    }

    check_object("common", self.common.as_ref())?;
    check_object("reporter", self.reporter.as_ref())?;
    Ok(())
  }
}

fn check_object(field: &'static str, payload: Option<&Value>) -> Result<()> {
  match payload {
    None | Some(Value::Object(_)) => Ok(()),
    Some(_) => Err(Error::MalformedPayload { field }),
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn host_line() -> &'static str {
    r#"{"resource_type":"host","reporter_type":"hbi","reporter_instance_id":"abc",
        "local_resource_id":"42","api_href":"www.example.com",
        "console_href":"www.example.com","reporter_version":"1.0",
        "reporter":{"insightsId":"x"}}"#
  }

  #[test]
  fn parses_full_line() {
    let rec = InputRecord::from_json_line(host_line()).unwrap();
    assert_eq!(rec.local_resource_id, "42");
    assert_eq!(rec.reporter, Some(json!({ "insightsId": "x" })));
    assert!(rec.common.is_none());
    rec.validate().unwrap();
  }

  #[test]
  fn optional_metadata_defaults_to_empty() {
    let rec = InputRecord::from_json_line(
      r#"{"resource_type":"host","reporter_type":"hbi","reporter_instance_id":"abc","local_resource_id":"1"}"#,
    )
    .unwrap();
    assert_eq!(rec.api_href, "");
    assert_eq!(rec.reporter_version, "");
  }

  #[test]
  fn null_payload_is_absent() {
    let rec = InputRecord::from_json_line(
      r#"{"resource_type":"host","reporter_type":"hbi","reporter_instance_id":"abc","local_resource_id":"1","common":null}"#,
    )
    .unwrap();
    assert!(rec.common.is_none());
  }

  #[test]
  fn garbage_line_is_malformed() {
    let err = InputRecord::from_json_line("{not json").unwrap_err();
    assert!(matches!(err, Error::MalformedLine(_)));
  }

  #[test]
  fn non_object_payload_is_rejected() {
    let mut rec = InputRecord::from_json_line(host_line()).unwrap();
    rec.common = Some(json!([1, 2, 3]));
    let err = rec.validate().unwrap_err();
    assert!(matches!(err, Error::MalformedPayload { field: "common" }));
  }

  #[test]
  fn inventory_reporter_is_reserved() {
    let mut rec = InputRecord::from_json_line(host_line()).unwrap();
    rec.reporter_type = INVENTORY_REPORTER.into();
    assert!(matches!(rec.validate(), Err(Error::ReservedReporterType(_))));
  }

  #[test]
  fn empty_key_field_is_rejected() {
    let mut rec = InputRecord::from_json_line(host_line()).unwrap();
    rec.local_resource_id = "  ".into();
    assert!(matches!(rec.validate(), Err(Error::InvalidRecord(_))));
  }
}
