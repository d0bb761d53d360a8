//! Batch driver: feeds input lines to a store one record at a time, retrying
//! transient conflicts.

use std::time::Duration;

use repbench_core::{
  Classify as _,
  engine::{IngestOutcome, Transition},
  record::InputRecord,
  store::RepresentationStore,
};

use crate::input::InputLine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Total tries per record, including the first.
  pub max_attempts: u32,
  /// Sleep before retry `n` is `backoff * n`.
  pub backoff:      Duration,
}

/// Ingest `record`, retrying while the error classifies as a transient
/// conflict. Returns the final outcome and the number of attempts made.
pub async fn ingest_with_retry<S: RepresentationStore>(
  store: &S,
  record: &InputRecord,
  policy: RetryPolicy,
) -> (Result<IngestOutcome, S::Error>, u32) {
  let mut attempt = 1;
  loop {
    match store.ingest(record.clone()).await {
      Err(err) if err.is_transient() && attempt < policy.max_attempts => {
        tracing::warn!(
          key = %record.key(),
          attempt,
          error = %err,
          "transient conflict, retrying"
        );
        tokio::time::sleep(policy.backoff * attempt).await;
        attempt += 1;
      }
      result => return (result, attempt),
    }
  }
}

// ─── Report ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedRecord {
  pub line:  usize,
  pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlowStep {
  pub line:     usize,
  pub label:    &'static str,
  pub duration: Duration,
}

/// What happened to a batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchReport {
  pub created: usize,
  pub updated: usize,
  pub noop:    usize,
  /// Attempts beyond the first, summed over the batch.
  pub retries: u32,
  pub failed:  Vec<FailedRecord>,
  pub slowest: Option<SlowStep>,
}

impl BatchReport {
  pub fn total(&self) -> usize { self.created + self.updated + self.noop + self.failed.len() }

  fn record_outcome(&mut self, line: usize, outcome: &IngestOutcome) {
    match outcome.transition {
      Transition::Created => self.created += 1,
      Transition::Updated { .. } if outcome.is_noop() => self.noop += 1,
      Transition::Updated { .. } => self.updated += 1,
    }

    if let Some(step) = outcome.slowest_step()
      && self.slowest.as_ref().is_none_or(|s| step.duration > s.duration)
    {
      self.slowest = Some(SlowStep { line, label: step.label, duration: step.duration });
    }
  }

  fn record_failure(&mut self, line: usize, error: String) {
    tracing::error!(line, %error, "record failed");
    self.failed.push(FailedRecord { line, error });
  }
}

/// Run every line through `store`. One record's failure never stops the
/// batch.
pub async fn run_batch<S: RepresentationStore>(
  store: &S,
  lines: Vec<InputLine>,
  policy: RetryPolicy,
) -> BatchReport {
  let mut report = BatchReport::default();

  for InputLine { line, record } in lines {
    let record = match record {
      Ok(record) => record,
      Err(err) => {
        report.record_failure(line, err.to_string());
        continue;
      }
    };

    let (result, attempts) = ingest_with_retry(store, &record, policy).await;
    report.retries += attempts - 1;
    match result {
      Ok(outcome) => report.record_outcome(line, &outcome),
      Err(err) => report.record_failure(line, err.to_string()),
    }
  }

  report
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicU32, Ordering};

  use repbench_core::{
    Classify, ErrorClass,
    layout::LayoutKind,
    model::{CommonRepresentation, CurrentView, ReporterRepresentation, Resource, ResourceKey},
  };
  use repbench_store_sqlite::SqliteStore;
  use uuid::Uuid;

  use super::*;
  use crate::input::parse_jsonl;

  #[derive(Debug, thiserror::Error)]
  enum FlakyError {
    #[error("database is locked")]
    Busy,
    #[error("disk on fire")]
    Broken,
    #[error(transparent)]
    Store(#[from] repbench_store_sqlite::Error),
  }

  impl Classify for FlakyError {
    fn class(&self) -> ErrorClass {
      match self {
        FlakyError::Busy => ErrorClass::TransientConflict,
        FlakyError::Broken => ErrorClass::Storage,
        FlakyError::Store(e) => e.class(),
      }
    }
  }

  /// Fails the first `busy_for` ingests as a lock conflict (or every ingest
  /// when `broken`), then delegates to a real in-memory store.
  struct Flaky {
    inner:    SqliteStore,
    busy_for: u32,
    broken:   bool,
    calls:    AtomicU32,
  }

  impl Flaky {
    async fn new(busy_for: u32, broken: bool) -> Self {
      Self {
        inner: SqliteStore::open_in_memory(LayoutKind::JoinTable).await.unwrap(),
        busy_for,
        broken,
        calls: AtomicU32::new(0),
      }
    }
  }

  impl RepresentationStore for Flaky {
    type Error = FlakyError;

    fn layout(&self) -> LayoutKind { self.inner.layout() }

    async fn ingest(&self, record: InputRecord) -> Result<IngestOutcome, FlakyError> {
      let call = self.calls.fetch_add(1, Ordering::SeqCst);
      if self.broken {
        return Err(FlakyError::Broken);
      }
      if call < self.busy_for {
        return Err(FlakyError::Busy);
      }
      Ok(self.inner.ingest(record).await?)
    }

    async fn current(&self, key: ResourceKey) -> Result<Option<CurrentView>, FlakyError> {
      Ok(self.inner.current(key).await?)
    }

    async fn get_resource(&self, resource_id: Uuid) -> Result<Option<Resource>, FlakyError> {
      Ok(self.inner.get_resource(resource_id).await?)
    }

    async fn resource_count(&self) -> Result<u64, FlakyError> {
      Ok(self.inner.resource_count().await?)
    }

    async fn common_history(
      &self,
      resource_id: Uuid,
    ) -> Result<Vec<CommonRepresentation>, FlakyError> {
      Ok(self.inner.common_history(resource_id).await?)
    }

    async fn reporter_history(
      &self,
      key: ResourceKey,
    ) -> Result<Vec<ReporterRepresentation>, FlakyError> {
      Ok(self.inner.reporter_history(key).await?)
    }
  }

  const POLICY: RetryPolicy = RetryPolicy { max_attempts: 3, backoff: Duration::from_millis(1) };

  fn line(local_resource_id: &str, reporter: &str) -> String {
    format!(
      r#"{{"resource_type":"host","reporter_type":"hbi","reporter_instance_id":"a","local_resource_id":"{local_resource_id}","reporter":{reporter}}}"#
    )
  }

  #[tokio::test]
  async fn transient_conflict_is_retried_until_success() {
    let store = Flaky::new(2, false).await;
    let lines = parse_jsonl(&line("1", r#"{"n":1}"#));

    let report = run_batch(&store, lines, POLICY).await;
    assert_eq!(report.created, 1);
    assert_eq!(report.retries, 2);
    assert!(report.failed.is_empty());
    assert_eq!(store.resource_count().await.unwrap(), 1);
  }

  #[tokio::test]
  async fn retries_stop_at_max_attempts() {
    let store = Flaky::new(10, false).await;
    let record = parse_jsonl(&line("1", "null")).remove(0).record.unwrap();

    let (result, attempts) = ingest_with_retry(&store, &record, POLICY).await;
    assert!(matches!(result, Err(FlakyError::Busy)));
    assert_eq!(attempts, 3);
  }

  #[tokio::test]
  async fn permanent_errors_are_not_retried() {
    let store = Flaky::new(0, true).await;
    let record = parse_jsonl(&line("1", "null")).remove(0).record.unwrap();

    let (result, attempts) = ingest_with_retry(&store, &record, POLICY).await;
    assert!(matches!(result, Err(FlakyError::Broken)));
    assert_eq!(attempts, 1);
    assert_eq!(store.calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn batch_tallies_each_transition_and_survives_failures() {
    let store = Flaky::new(0, false).await;
    let text = [
      line("1", r#"{"n":1}"#),
      "{broken".to_owned(),
      line("1", r#"{"n":2}"#),
      line("1", "null"),
      line("2", r#""not an object""#),
      line("3", "null"),
    ]
    .join("\n");

    let report = run_batch(&store, parse_jsonl(&text), POLICY).await;
    assert_eq!(report.created, 2);
    assert_eq!(report.updated, 1);
    assert_eq!(report.noop, 1);
    assert_eq!(report.failed.iter().map(|f| f.line).collect::<Vec<_>>(), vec![2, 5]);
    assert_eq!(report.total(), 6);
    assert!(report.slowest.is_some());
  }
}
