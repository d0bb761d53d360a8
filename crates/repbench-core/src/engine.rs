//! The record ingestion engine.
//!
//! [`ingest`] is the create-or-update algorithm for a single input record. It
//! runs entirely inside whatever transaction the caller opened for the
//! [`LayoutSession`]; on any error the caller is expected to roll back, so a
//! failed record never leaves partial writes behind.

use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
  Error,
  layout::LayoutSession,
  model::{
    CommonRepresentation, INVENTORY_REPORTER, ReferenceSet, ReporterRepresentation, Resource,
    ResourceKey, Slot, default_common_payload,
  },
  record::InputRecord,
};

// ─── Outcome ─────────────────────────────────────────────────────────────────

/// One layout operation issued by the engine, with its wall-clock cost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepTiming {
  pub label:    &'static str,
  pub duration: Duration,
}

/// Terminal state of one ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
  /// The key was unknown; a resource and both representation streams were
  /// started at version 1.
  Created,
  /// The key was known. Either flag may be false; both false is a no-op
  /// sighting.
  Updated {
    wrote_common:   bool,
    wrote_reporter: bool,
  },
}

#[derive(Debug, Clone)]
pub struct IngestOutcome {
  pub resource_id:      Uuid,
  pub transition:       Transition,
  /// Current common version after this record.
  pub common_version:   u32,
  /// Current reporter version after this record.
  pub reporter_version: u32,
  pub steps:            Vec<StepTiming>,
}

impl IngestOutcome {
  pub fn is_noop(&self) -> bool {
    matches!(
      self.transition,
      Transition::Updated { wrote_common: false, wrote_reporter: false }
    )
  }

  pub fn slowest_step(&self) -> Option<&StepTiming> {
    self.steps.iter().max_by_key(|s| s.duration)
  }
}

#[derive(Default)]
struct Steps(Vec<StepTiming>);

impl Steps {
  fn time<T, E>(
    &mut self,
    label: &'static str,
    op: impl FnOnce() -> Result<T, E>,
  ) -> Result<T, E> {
    let start = Instant::now();
    let result = op();
    self.0.push(StepTiming { label, duration: start.elapsed() });
    result
  }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Apply `record` through `session`.
pub fn ingest<L: LayoutSession>(
  session: &mut L,
  record: &InputRecord,
) -> Result<IngestOutcome, L::Error> {
  record.validate()?;

  let key = record.key();
  let mut steps = Steps::default();

  match steps.time("lookup_current", || session.lookup_current(&key))? {
    None => create(session, record, &key, steps),
    Some(refs) => update(session, record, &key, refs, steps),
  }
}

fn create<L: LayoutSession>(
  session: &mut L,
  record: &InputRecord,
  key: &ResourceKey,
  mut steps: Steps,
) -> Result<IngestOutcome, L::Error> {
  let resource = Resource {
    resource_id:   Uuid::new_v4(),
    resource_type: record.resource_type.clone(),
    created_at:    Utc::now(),
  };
  steps.time("create_resource", || session.create_resource(&resource))?;

  let common = new_common(record, resource.resource_id, 1, common_or_default(record));
  let common_ref = steps.time("append_common", || session.append_common(&common))?;

  let reporter_data = record.reporter.clone().unwrap_or_else(|| json!({}));
  let reporter = new_reporter(record, resource.resource_id, 1, 1, 1, reporter_data);
  let reporter_ref = steps.time("append_reporter", || session.append_reporter(&reporter))?;

  steps.time("allocate_slots", || {
    session.allocate_slots(&resource, key, common_ref, reporter_ref)
  })?;

  Ok(IngestOutcome {
    resource_id:      resource.resource_id,
    transition:       Transition::Created,
    common_version:   1,
    reporter_version: 1,
    steps:            steps.0,
  })
}

fn update<L: LayoutSession>(
  session: &mut L,
  record: &InputRecord,
  key: &ResourceKey,
  refs: ReferenceSet,
  mut steps: Steps,
) -> Result<IngestOutcome, L::Error> {
  let resource_id = refs.resource_id;

  let common_slot = refs
    .common()
    .ok_or(Error::MissingSlot { resource_id, slot: Slot::Common })?;
  let reporter_slot = refs
    .reporter(&record.reporter_type)
    .ok_or(Error::MissingSlot { resource_id, slot: Slot::Reporter })?;
  let generation = reporter_slot
    .generation
    .ok_or(Error::MissingGeneration(resource_id))?;

  let mut common_version = common_slot.version;
  let mut reporter_version = reporter_slot.version;

  if let Some(data) = &record.common {
    let next = next_version(resource_id, Slot::Common, common_version)?;
    let common = new_common(record, resource_id, next, data.clone());
    let target = steps.time("append_common", || session.append_common(&common))?;
    steps.time("repoint_common", || {
      session.repoint_reference(resource_id, Slot::Common, key, target)
    })?;
    common_version = common.version;
  }

  if let Some(data) = &record.reporter {
    let next = next_version(resource_id, Slot::Reporter, reporter_version)?;
    let reporter = new_reporter(
      record,
      resource_id,
      next,
      generation,
      common_version,
      data.clone(),
    );
    let target = steps.time("append_reporter", || session.append_reporter(&reporter))?;
    steps.time("repoint_reporter", || {
      session.repoint_reference(resource_id, Slot::Reporter, key, target)
    })?;
    reporter_version = reporter.version;
  }

  Ok(IngestOutcome {
    resource_id,
    transition: Transition::Updated {
      wrote_common:   record.common.is_some(),
      wrote_reporter: record.reporter.is_some(),
    },
    common_version,
    reporter_version,
    steps: steps.0,
  })
}

fn next_version(resource_id: Uuid, slot: Slot, current: u32) -> Result<u32, Error> {
  current
    .checked_add(1)
    .ok_or(Error::VersionOverflow { resource_id, slot, current })
}

/// Absence of common data never blocks creation.
fn common_or_default(record: &InputRecord) -> Value {
  match &record.common {
    Some(Value::Object(map)) if !map.is_empty() => Value::Object(map.clone()),
    _ => default_common_payload(),
  }
}

fn new_common(
  record: &InputRecord,
  resource_id: Uuid,
  version: u32,
  data: Value,
) -> CommonRepresentation {
  CommonRepresentation {
    representation_id: Uuid::new_v4(),
    resource_id,
    version,
    data,
    resource_type: record.resource_type.clone(),
    reporter_type: INVENTORY_REPORTER.to_owned(),
    reported_by: record.reporter_type.clone(),
  }
}

fn new_reporter(
  record: &InputRecord,
  resource_id: Uuid,
  version: u32,
  generation: u32,
  common_version: u32,
  data: Value,
) -> ReporterRepresentation {
  ReporterRepresentation {
    representation_id: Uuid::new_v4(),
    resource_id,
    local_resource_id: record.local_resource_id.clone(),
    reporter_type: record.reporter_type.clone(),
    resource_type: record.resource_type.clone(),
    reporter_instance_id: record.reporter_instance_id.clone(),
    version,
    generation,
    common_version: Some(common_version),
    tombstone: false,
    data,
    api_href: record.api_href.clone(),
    console_href: record.console_href.clone(),
    reporter_version: record.reporter_version.clone(),
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::{
    Classify as _, ErrorClass,
    model::{RepresentationRef, SlotReference},
  };

  // ─── In-memory layout ──────────────────────────────────────────────────────

  struct MemRef {
    resource_id: Uuid,
    slot:        Slot,
    key:         ResourceKey,
    version:     u32,
    generation:  u32,
  }

  #[derive(Default)]
  struct MemoryLayout {
    resources: Vec<Resource>,
    commons:   Vec<CommonRepresentation>,
    reporters: Vec<ReporterRepresentation>,
    refs:      Vec<MemRef>,
  }

  impl LayoutSession for MemoryLayout {
    type Error = Error;

    fn lookup_current(&mut self, key: &ResourceKey) -> Result<Option<ReferenceSet>, Error> {
      let Some(anchor) = self
        .refs
        .iter()
        .find(|r| r.slot == Slot::Reporter && &r.key == key)
      else {
        return Ok(None);
      };
      let resource_id = anchor.resource_id;
      let slots = self
        .refs
        .iter()
        .filter(|r| r.resource_id == resource_id)
        .map(|r| SlotReference {
          slot:          r.slot,
          reporter_type: r.key.reporter_type.clone(),
          version:       r.version,
          generation:    Some(r.generation),
          tombstone:     false,
        })
        .collect();
      Ok(Some(ReferenceSet { resource_id, slots }))
    }

    fn create_resource(&mut self, resource: &Resource) -> Result<(), Error> {
      self.resources.push(resource.clone());
      Ok(())
    }

    fn append_common(&mut self, rep: &CommonRepresentation) -> Result<RepresentationRef, Error> {
      self.commons.push(rep.clone());
      Ok(RepresentationRef { representation_id: rep.representation_id, version: rep.version })
    }

    fn append_reporter(
      &mut self,
      rep: &ReporterRepresentation,
    ) -> Result<RepresentationRef, Error> {
      self.reporters.push(rep.clone());
      Ok(RepresentationRef { representation_id: rep.representation_id, version: rep.version })
    }

    fn allocate_slots(
      &mut self,
      resource: &Resource,
      key: &ResourceKey,
      common: RepresentationRef,
      reporter: RepresentationRef,
    ) -> Result<(), Error> {
      let inventory_key = ResourceKey {
        local_resource_id:    resource.resource_id.to_string(),
        reporter_type:        INVENTORY_REPORTER.into(),
        resource_type:        resource.resource_type.clone(),
        reporter_instance_id: String::new(),
      };
      self.refs.push(MemRef {
        resource_id: resource.resource_id,
        slot:        Slot::Common,
        key:         inventory_key,
        version:     common.version,
        generation:  1,
      });
      self.refs.push(MemRef {
        resource_id: resource.resource_id,
        slot:        Slot::Reporter,
        key:         key.clone(),
        version:     reporter.version,
        generation:  1,
      });
      Ok(())
    }

    fn repoint_reference(
      &mut self,
      resource_id: Uuid,
      slot: Slot,
      _key: &ResourceKey,
      target: RepresentationRef,
    ) -> Result<(), Error> {
      let row = self
        .refs
        .iter_mut()
        .find(|r| r.resource_id == resource_id && r.slot == slot)
        .ok_or(Error::MissingSlot { resource_id, slot })?;
      row.version = target.version;
      Ok(())
    }
  }

  fn record(reporter: Option<Value>, common: Option<Value>) -> InputRecord {
    InputRecord {
      resource_type: "host".into(),
      reporter_type: "hbi".into(),
      reporter_instance_id: "abc".into(),
      local_resource_id: "42".into(),
      api_href: "www.example.com".into(),
      console_href: "www.example.com".into(),
      reporter_version: "1.0".into(),
      common,
      reporter,
    }
  }

  // ─── Create path ──────────────────────────────────────────────────────────

  #[test]
  fn first_sighting_creates_everything_at_version_one() {
    let mut mem = MemoryLayout::default();
    let out = ingest(&mut mem, &record(Some(json!({ "insightsId": "x" })), None)).unwrap();

    assert_eq!(out.transition, Transition::Created);
    assert_eq!(mem.resources.len(), 1);
    assert_eq!(mem.commons.len(), 1);
    assert_eq!(mem.commons[0].version, 1);
    assert_eq!(mem.commons[0].data, json!({ "workspaceId": "default" }));
    assert_eq!(mem.commons[0].reporter_type, INVENTORY_REPORTER);

    let rep = &mem.reporters[0];
    assert_eq!(rep.version, 1);
    assert_eq!(rep.generation, 1);
    assert_eq!(rep.common_version, Some(1));
    assert!(!rep.tombstone);
    assert_eq!(rep.data, json!({ "insightsId": "x" }));
  }

  #[test]
  fn empty_common_object_is_replaced_on_create() {
    let mut mem = MemoryLayout::default();
    ingest(&mut mem, &record(None, Some(json!({})))).unwrap();
    assert_eq!(mem.commons[0].data, default_common_payload());
    assert_eq!(mem.reporters[0].data, json!({}));
  }

  #[test]
  fn supplied_common_is_kept_on_create() {
    let mut mem = MemoryLayout::default();
    ingest(&mut mem, &record(None, Some(json!({ "workspaceId": "ws-1" })))).unwrap();
    assert_eq!(mem.commons[0].data, json!({ "workspaceId": "ws-1" }));
  }

  // ─── Update path ──────────────────────────────────────────────────────────

  #[test]
  fn second_sighting_appends_reporter_only() {
    let mut mem = MemoryLayout::default();
    let first = ingest(&mut mem, &record(Some(json!({ "insightsId": "x" })), None)).unwrap();
    let second = ingest(&mut mem, &record(Some(json!({ "insightsId": "y" })), None)).unwrap();

    assert_eq!(second.resource_id, first.resource_id);
    assert_eq!(
      second.transition,
      Transition::Updated { wrote_common: false, wrote_reporter: true }
    );
    assert_eq!(mem.resources.len(), 1);
    assert_eq!(mem.commons.len(), 1);
    assert_eq!(mem.reporters.len(), 2);

    let latest = &mem.reporters[1];
    assert_eq!(latest.version, 2);
    assert_eq!(latest.common_version, Some(1));
    assert_eq!(latest.data, json!({ "insightsId": "y" }));
  }

  #[test]
  fn reporter_observes_common_written_in_same_record() {
    let mut mem = MemoryLayout::default();
    ingest(&mut mem, &record(Some(json!({ "a": 1 })), None)).unwrap();
    let out = ingest(
      &mut mem,
      &record(Some(json!({ "a": 2 })), Some(json!({ "workspaceId": "w2" }))),
    )
    .unwrap();

    assert_eq!(out.common_version, 2);
    assert_eq!(out.reporter_version, 2);
    assert_eq!(mem.reporters[1].common_version, Some(2));
  }

  #[test]
  fn generation_is_carried_not_bumped() {
    let mut mem = MemoryLayout::default();
    for n in 0..4 {
      ingest(&mut mem, &record(Some(json!({ "n": n })), None)).unwrap();
    }
    assert!(mem.reporters.iter().all(|r| r.generation == 1));
    let versions: Vec<u32> = mem.reporters.iter().map(|r| r.version).collect();
    assert_eq!(versions, vec![1, 2, 3, 4]);
  }

  #[test]
  fn sighting_without_payloads_writes_nothing() {
    let mut mem = MemoryLayout::default();
    ingest(&mut mem, &record(Some(json!({ "a": 1 })), None)).unwrap();
    let out = ingest(&mut mem, &record(None, None)).unwrap();

    assert!(out.is_noop());
    assert_eq!(out.common_version, 1);
    assert_eq!(out.reporter_version, 1);
    assert_eq!(mem.commons.len(), 1);
    assert_eq!(mem.reporters.len(), 1);
    let labels: Vec<_> = out.steps.iter().map(|s| s.label).collect();
    assert_eq!(labels, vec!["lookup_current"]);
  }

  #[test]
  fn missing_common_slot_is_an_integrity_error() {
    let mut mem = MemoryLayout::default();
    ingest(&mut mem, &record(Some(json!({ "a": 1 })), None)).unwrap();
    mem.refs.retain(|r| r.slot != Slot::Common);

    let err = ingest(&mut mem, &record(Some(json!({ "a": 2 })), None)).unwrap_err();
    assert!(matches!(err, Error::MissingSlot { slot: Slot::Common, .. }));
    assert_eq!(mem.reporters.len(), 1);
  }

  #[test]
  fn exhausted_version_counter_is_an_integrity_error() {
    let mut mem = MemoryLayout::default();
    ingest(&mut mem, &record(Some(json!({ "a": 1 })), None)).unwrap();
    for r in mem.refs.iter_mut().filter(|r| r.slot == Slot::Reporter) {
      r.version = u32::MAX;
    }

    let err = ingest(&mut mem, &record(Some(json!({ "a": 2 })), None)).unwrap_err();
    assert!(matches!(
      err,
      Error::VersionOverflow { slot: Slot::Reporter, current: u32::MAX, .. }
    ));
    assert_eq!(err.class(), ErrorClass::Integrity);
    assert_eq!(mem.reporters.len(), 1);
  }

  #[test]
  fn invalid_record_touches_nothing() {
    let mut mem = MemoryLayout::default();
    let err = ingest(&mut mem, &record(Some(json!("scalar")), None)).unwrap_err();
    assert!(matches!(err, Error::MalformedPayload { field: "reporter" }));
    assert!(mem.resources.is_empty());
  }

  #[test]
  fn create_steps_are_recorded_in_order() {
    let mut mem = MemoryLayout::default();
    let out = ingest(&mut mem, &record(None, None)).unwrap();
    let labels: Vec<_> = out.steps.iter().map(|s| s.label).collect();
    assert_eq!(
      labels,
      vec!["lookup_current", "create_resource", "append_common", "append_reporter", "allocate_slots"]
    );
    assert!(out.slowest_step().is_some());
  }
}
