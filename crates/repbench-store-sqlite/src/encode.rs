//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, UUIDs are hyphenated lowercase strings and
//! payloads are compact JSON text. Versions and generations are plain
//! integers.

use chrono::{DateTime, Utc};
use repbench_core::model::{CommonRepresentation, ReporterRepresentation, Resource};
use rusqlite::Row;
use serde_json::Value;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc>
// ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Payloads ────────────────────────────────────────────────────────────────

pub fn encode_json(v: &Value) -> Result<String> { Ok(serde_json::to_string(v)?) }

pub fn decode_json(s: &str) -> Result<Value> { Ok(serde_json::from_str(s)?) }

// ─── Column lists ────────────────────────────────────────────────────────────

pub const RESOURCE_COLUMNS: &[&str] = &["resource_id", "resource_type", "created_at"];

pub const COMMON_COLUMNS: &[&str] = &[
  "representation_id",
  "resource_id",
  "version",
  "data",
  "resource_type",
  "reporter_type",
  "reported_by",
];

pub const REPORTER_COLUMNS: &[&str] = &[
  "representation_id",
  "resource_id",
  "local_resource_id",
  "reporter_type",
  "resource_type",
  "reporter_instance_id",
  "version",
  "generation",
  "common_version",
  "tombstone",
  "data",
  "api_href",
  "console_href",
  "reporter_version",
];

/// `a.col1, a.col2, ...` for a table alias.
pub fn select_list(alias: &str, columns: &[&str]) -> String {
  columns
    .iter()
    .map(|c| format!("{alias}.{c}"))
    .collect::<Vec<_>>()
    .join(", ")
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read from a `resources` row.
pub struct RawResource {
  pub resource_id:   String,
  pub resource_type: String,
  pub created_at:    String,
}

impl RawResource {
  /// Read [`RESOURCE_COLUMNS`] starting at column `at`.
  pub fn read(row: &Row<'_>, at: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      resource_id:   row.get(at)?,
      resource_type: row.get(at + 1)?,
      created_at:    row.get(at + 2)?,
    })
  }

  pub fn into_resource(self) -> Result<Resource> {
    Ok(Resource {
      resource_id:   decode_uuid(&self.resource_id)?,
      resource_type: self.resource_type,
      created_at:    decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read from a common representation row.
pub struct RawCommon {
  pub representation_id: String,
  pub resource_id:       String,
  pub version:           u32,
  pub data:              String,
  pub resource_type:     String,
  pub reporter_type:     String,
  pub reported_by:       String,
}

impl RawCommon {
  /// Read [`COMMON_COLUMNS`] starting at column `at`.
  pub fn read(row: &Row<'_>, at: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      representation_id: row.get(at)?,
      resource_id:       row.get(at + 1)?,
      version:           row.get(at + 2)?,
      data:              row.get(at + 3)?,
      resource_type:     row.get(at + 4)?,
      reporter_type:     row.get(at + 5)?,
      reported_by:       row.get(at + 6)?,
    })
  }

  pub fn into_common(self) -> Result<CommonRepresentation> {
    Ok(CommonRepresentation {
      representation_id: decode_uuid(&self.representation_id)?,
      resource_id:       decode_uuid(&self.resource_id)?,
      version:           self.version,
      data:              decode_json(&self.data)?,
      resource_type:     self.resource_type,
      reporter_type:     self.reporter_type,
      reported_by:       self.reported_by,
    })
  }
}

/// Raw values read from a reporter representation row.
pub struct RawReporter {
  pub representation_id:    String,
  pub resource_id:          String,
  pub local_resource_id:    String,
  pub reporter_type:        String,
  pub resource_type:        String,
  pub reporter_instance_id: String,
  pub version:              u32,
  pub generation:           u32,
  pub common_version:       Option<u32>,
  pub tombstone:            bool,
  pub data:                 String,
  pub api_href:             String,
  pub console_href:         String,
  pub reporter_version:     String,
}

impl RawReporter {
  /// Read [`REPORTER_COLUMNS`] starting at column `at`.
  pub fn read(row: &Row<'_>, at: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      representation_id:    row.get(at)?,
      resource_id:          row.get(at + 1)?,
      local_resource_id:    row.get(at + 2)?,
      reporter_type:        row.get(at + 3)?,
      resource_type:        row.get(at + 4)?,
      reporter_instance_id: row.get(at + 5)?,
      version:              row.get(at + 6)?,
      generation:           row.get(at + 7)?,
      common_version:       row.get(at + 8)?,
      tombstone:            row.get(at + 9)?,
      data:                 row.get(at + 10)?,
      api_href:             row.get(at + 11)?,
      console_href:         row.get(at + 12)?,
      reporter_version:     row.get(at + 13)?,
    })
  }

  pub fn into_reporter(self) -> Result<ReporterRepresentation> {
    Ok(ReporterRepresentation {
      representation_id:    decode_uuid(&self.representation_id)?,
      resource_id:          decode_uuid(&self.resource_id)?,
      local_resource_id:    self.local_resource_id,
      reporter_type:        self.reporter_type,
      resource_type:        self.resource_type,
      reporter_instance_id: self.reporter_instance_id,
      version:              self.version,
      generation:           self.generation,
      common_version:       self.common_version,
      tombstone:            self.tombstone,
      data:                 decode_json(&self.data)?,
      api_href:             self.api_href,
      console_href:         self.console_href,
      reporter_version:     self.reporter_version,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn select_list_prefixes_alias() {
    assert_eq!(
      select_list("r", RESOURCE_COLUMNS),
      "r.resource_id, r.resource_type, r.created_at"
    );
  }

  #[test]
  fn dt_round_trips() {
    let now = Utc::now();
    assert_eq!(decode_dt(&encode_dt(now)).unwrap(), now);
  }

  #[test]
  fn bad_uuid_is_an_error() {
    assert!(matches!(decode_uuid("nope"), Err(Error::Uuid(_))));
  }
}
