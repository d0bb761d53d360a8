//! Cross-layout equivalence check.
//!
//! Replays one input into an in-memory store per layout and reports every
//! key whose resolved current state differs from the first layout's.

use std::collections::BTreeSet;

use anyhow::Context as _;
use repbench_core::{
  layout::LayoutKind,
  model::{CurrentView, ResourceKey},
  record::InputRecord,
  store::RepresentationStore,
};
use repbench_store_sqlite::SqliteStore;
use serde_json::Value;
use strum::IntoEnumIterator as _;

use crate::driver::{BatchReport, RetryPolicy, run_batch};
use crate::input::InputLine;

/// The part of a current view the layouts must agree on.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
  pub common_version:   u32,
  pub common_data:      Value,
  pub reporter_version: u32,
  pub reporter_data:    Value,
  pub observed_common:  Option<u32>,
}

impl From<CurrentView> for Resolved {
  fn from(view: CurrentView) -> Self {
    Self {
      common_version:   view.common.version,
      common_data:      view.common.data,
      reporter_version: view.reporter.version,
      reporter_data:    view.reporter.data,
      observed_common:  view.reporter.common_version,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mismatch {
  pub key:      ResourceKey,
  pub baseline: LayoutKind,
  pub layout:   LayoutKind,
  pub expected: Option<Resolved>,
  pub found:    Option<Resolved>,
}

#[derive(Debug, Default)]
pub struct Comparison {
  /// Batch report per layout, in [`LayoutKind`] order.
  pub batches:    Vec<(LayoutKind, BatchReport)>,
  pub keys:       usize,
  pub mismatches: Vec<Mismatch>,
}

impl Comparison {
  pub fn is_consistent(&self) -> bool { self.mismatches.is_empty() }
}

pub async fn compare_layouts(lines: &[InputLine], policy: RetryPolicy) -> anyhow::Result<Comparison> {
  let keys: BTreeSet<ResourceKey> = lines
    .iter()
    .filter_map(|l| l.record.as_ref().ok().map(InputRecord::key))
    .collect();

  let mut comparison = Comparison { keys: keys.len(), ..Comparison::default() };
  let mut baseline: Option<(LayoutKind, Vec<Option<Resolved>>)> = None;

  for layout in LayoutKind::iter() {
    let store = SqliteStore::open_in_memory(layout)
      .await
      .with_context(|| format!("failed to open in-memory {layout} store"))?;

    let batch = run_batch(&store, replay(lines), policy).await;
    comparison.batches.push((layout, batch));

    let mut resolved = Vec::with_capacity(keys.len());
    for key in &keys {
      let view = store
        .current(key.clone())
        .await
        .with_context(|| format!("failed to resolve {key} in {layout}"))?;
      resolved.push(view.map(Resolved::from));
    }

    match &baseline {
      None => baseline = Some((layout, resolved)),
      Some((base_layout, expected)) => {
        for ((key, expected), found) in keys.iter().zip(expected).zip(resolved) {
          if *expected != found {
            comparison.mismatches.push(Mismatch {
              key: key.clone(),
              baseline: *base_layout,
              layout,
              expected: expected.clone(),
              found,
            });
          }
        }
      }
    }
  }

  Ok(comparison)
}

/// Clone the parsed lines for another pass; parse errors are re-surfaced as
/// their message so every layout reports the same failures.
fn replay(lines: &[InputLine]) -> Vec<InputLine> {
  lines
    .iter()
    .map(|l| InputLine {
      line:   l.line,
      record: match &l.record {
        Ok(record) => Ok(record.clone()),
        Err(err) => Err(repbench_core::Error::InvalidRecord(err.to_string())),
      },
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;
  use crate::input::parse_jsonl;

  const POLICY: RetryPolicy = RetryPolicy { max_attempts: 1, backoff: Duration::ZERO };

  #[tokio::test]
  async fn layouts_resolve_identically() {
    let text = r#"
{"resource_type":"host","reporter_type":"hbi","reporter_instance_id":"a","local_resource_id":"1","reporter":{"n":1}}
{"resource_type":"host","reporter_type":"hbi","reporter_instance_id":"a","local_resource_id":"1","common":{"workspaceId":"w"}}
{"resource_type":"host","reporter_type":"acm","reporter_instance_id":"b","local_resource_id":"1","reporter":{"m":1}}
{"resource_type":"host","reporter_type":"hbi","reporter_instance_id":"a","local_resource_id":"1","reporter":{"n":2},"common":{"workspaceId":"x"}}
not json
"#;
    let lines = parse_jsonl(text);
    let comparison = compare_layouts(&lines, POLICY).await.unwrap();

    assert!(comparison.is_consistent(), "{:?}", comparison.mismatches);
    assert_eq!(comparison.keys, 2);
    assert_eq!(comparison.batches.len(), 3);
    for (layout, batch) in &comparison.batches {
      assert_eq!(batch.created, 2, "{layout}");
      assert_eq!(batch.updated, 2, "{layout}");
      assert_eq!(batch.failed.len(), 1, "{layout}");
    }
  }

  #[tokio::test]
  async fn empty_input_is_trivially_consistent() {
    let comparison = compare_layouts(&[], POLICY).await.unwrap();
    assert!(comparison.is_consistent());
    assert_eq!(comparison.keys, 0);
  }
}
