//! Layout C: a single reference per resource.
//!
//! Common and reporter writes share one `representations` stream. Every row is
//! a full snapshot of both halves, tagged with the half it introduced, and the
//! resource's only reference row points at the newest snapshot. Appending one
//! half copies the other half forward from the current head.

use repbench_core::{
  layout::LayoutSession,
  model::{
    CommonRepresentation, CurrentView, INVENTORY_REPORTER, ReferenceSet, ReporterRepresentation,
    RepresentationRef, Resource, ResourceKey, Slot, SlotReference,
  },
};
use rusqlite::{Connection, OptionalExtension as _, Row};
use uuid::Uuid;

use super::{expect_single_row, insert_resource, key_params};
use crate::{
  Error, Result,
  encode::{
    RESOURCE_COLUMNS, RawResource, decode_json, decode_uuid, encode_json, encode_uuid,
    select_list,
  },
};

const SNAPSHOT_COLUMNS: &[&str] = &[
  "representation_id",
  "resource_id",
  "written_slot",
  "local_resource_id",
  "reporter_type",
  "resource_type",
  "reporter_instance_id",
  "common_representation_id",
  "common_version",
  "common_data",
  "reported_by",
  "reporter_representation_id",
  "reporter_rep_version",
  "generation",
  "observed_common_version",
  "tombstone",
  "reporter_data",
  "api_href",
  "console_href",
  "reporter_version",
];

/// Both halves of one stream row, decoded.
#[derive(Debug, Clone)]
struct Snapshot {
  common:   CommonRepresentation,
  /// Absent only on the intermediate row written between the two appends of
  /// a creating record.
  reporter: Option<ReporterRepresentation>,
}

/// The snapshot the reference will point at once this record commits.
struct Head {
  representation_id: Uuid,
  snapshot:          Snapshot,
}

pub struct Session<'c> {
  conn: &'c Connection,
  key:  ResourceKey,
  head: Option<Head>,
}

impl<'c> Session<'c> {
  pub fn new(conn: &'c Connection, key: ResourceKey) -> Self {
    Self { conn, key, head: None }
  }

  fn push(&mut self, representation_id: Uuid, written: Slot, snapshot: Snapshot) -> Result<()> {
    insert_snapshot(self.conn, representation_id, written, &self.key, &snapshot)?;
    self.head = Some(Head { representation_id, snapshot });
    Ok(())
  }
}

impl LayoutSession for Session<'_> {
  type Error = Error;

  fn lookup_current(&mut self, key: &ResourceKey) -> Result<Option<ReferenceSet>> {
    let sql = format!(
      "SELECT {}
       FROM representation_references ref
       JOIN representations s ON s.representation_id = ref.representation_id
       WHERE s.local_resource_id = ?1 AND s.reporter_type = ?2
         AND s.resource_type = ?3 AND s.reporter_instance_id = ?4",
      select_list("s", SNAPSHOT_COLUMNS)
    );
    let raw = self
      .conn
      .prepare_cached(&sql)?
      .query_row(key_params(key), |row| RawSnapshot::read(row, 0))
      .optional()?;

    let Some(raw) = raw else {
      return Ok(None);
    };
    let representation_id = decode_uuid(&raw.representation_id)?;
    let snapshot = raw.into_snapshot()?;
    let resource_id = snapshot.common.resource_id;

    let mut slots = vec![SlotReference {
      slot:          Slot::Common,
      reporter_type: INVENTORY_REPORTER.to_owned(),
      version:       snapshot.common.version,
      generation:    None,
      tombstone:     false,
    }];
    if let Some(reporter) = &snapshot.reporter {
      slots.push(SlotReference {
        slot:          Slot::Reporter,
        reporter_type: reporter.reporter_type.clone(),
        version:       reporter.version,
        generation:    Some(reporter.generation),
        tombstone:     reporter.tombstone,
      });
    }

    self.head = Some(Head { representation_id, snapshot });
    Ok(Some(ReferenceSet { resource_id, slots }))
  }

  fn create_resource(&mut self, resource: &Resource) -> Result<()> {
    insert_resource(self.conn, resource)
  }

  fn append_common(&mut self, rep: &CommonRepresentation) -> Result<RepresentationRef> {
    let reporter = self.head.as_ref().and_then(|h| h.snapshot.reporter.clone());
    let snapshot = Snapshot { common: rep.clone(), reporter };
    self.push(rep.representation_id, Slot::Common, snapshot)?;
    Ok(RepresentationRef { representation_id: rep.representation_id, version: rep.version })
  }

  fn append_reporter(&mut self, rep: &ReporterRepresentation) -> Result<RepresentationRef> {
    let common = self
      .head
      .as_ref()
      .map(|h| h.snapshot.common.clone())
      .ok_or(repbench_core::Error::MissingSlot {
        resource_id: rep.resource_id,
        slot:        Slot::Common,
      })?;
    let snapshot = Snapshot { common, reporter: Some(rep.clone()) };
    self.push(rep.representation_id, Slot::Reporter, snapshot)?;
    Ok(RepresentationRef { representation_id: rep.representation_id, version: rep.version })
  }

  fn allocate_slots(
    &mut self,
    resource: &Resource,
    _key: &ResourceKey,
    _common: RepresentationRef,
    reporter: RepresentationRef,
  ) -> Result<()> {
    // Both appends have happened; the head already carries both halves.
    let target = self
      .head
      .as_ref()
      .map_or(reporter.representation_id, |h| h.representation_id);
    self
      .conn
      .prepare_cached(
        "INSERT INTO representation_references (resource_id, representation_id)
         VALUES (?1, ?2)",
      )?
      .execute(rusqlite::params![encode_uuid(resource.resource_id), encode_uuid(target)])?;
    Ok(())
  }

  fn repoint_reference(
    &mut self,
    resource_id: Uuid,
    slot: Slot,
    _key: &ResourceKey,
    target: RepresentationRef,
  ) -> Result<()> {
    let changed = self
      .conn
      .prepare_cached(
        "UPDATE representation_references SET representation_id = ?2 WHERE resource_id = ?1",
      )?
      .execute(rusqlite::params![
        encode_uuid(resource_id),
        encode_uuid(target.representation_id),
      ])?;
    expect_single_row(changed, resource_id, slot)
  }
}

// ─── Stream rows ─────────────────────────────────────────────────────────────

fn insert_snapshot(
  conn: &Connection,
  representation_id: Uuid,
  written: Slot,
  key: &ResourceKey,
  snapshot: &Snapshot,
) -> Result<()> {
  let common = &snapshot.common;
  let reporter = snapshot.reporter.as_ref();
  let reporter_data = reporter.map(|r| encode_json(&r.data)).transpose()?;

  conn
    .prepare_cached(
      "INSERT INTO representations (
         representation_id, resource_id, written_slot,
         local_resource_id, reporter_type, resource_type, reporter_instance_id,
         common_representation_id, common_version, common_data, reported_by,
         reporter_representation_id, reporter_rep_version, generation,
         observed_common_version, tombstone, reporter_data,
         api_href, console_href, reporter_version
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                 ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
    )?
    .execute(rusqlite::params![
      encode_uuid(representation_id),
      encode_uuid(common.resource_id),
      written.to_string(),
      key.local_resource_id,
      key.reporter_type,
      key.resource_type,
      key.reporter_instance_id,
      encode_uuid(common.representation_id),
      common.version,
      encode_json(&common.data)?,
      common.reported_by,
      reporter.map(|r| encode_uuid(r.representation_id)),
      reporter.map(|r| r.version),
      reporter.map(|r| r.generation),
      reporter.and_then(|r| r.common_version),
      reporter.is_some_and(|r| r.tombstone),
      reporter_data,
      reporter.map(|r| r.api_href.as_str()),
      reporter.map(|r| r.console_href.as_str()),
      reporter.map(|r| r.reporter_version.as_str()),
    ])?;
  Ok(())
}

struct RawSnapshot {
  representation_id:          String,
  resource_id:                String,
  local_resource_id:          String,
  reporter_type:              String,
  resource_type:              String,
  reporter_instance_id:       String,
  common_representation_id:   String,
  common_version:             u32,
  common_data:                String,
  reported_by:                String,
  reporter_representation_id: Option<String>,
  reporter_rep_version:       Option<u32>,
  generation:                 Option<u32>,
  observed_common_version:    Option<u32>,
  tombstone:                  bool,
  reporter_data:              Option<String>,
  api_href:                   Option<String>,
  console_href:               Option<String>,
  reporter_version:           Option<String>,
}

impl RawSnapshot {
  /// Read [`SNAPSHOT_COLUMNS`] starting at column `at`; `written_slot` is
  /// skipped.
  fn read(row: &Row<'_>, at: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      representation_id:          row.get(at)?,
      resource_id:                row.get(at + 1)?,
      local_resource_id:          row.get(at + 3)?,
      reporter_type:              row.get(at + 4)?,
      resource_type:              row.get(at + 5)?,
      reporter_instance_id:       row.get(at + 6)?,
      common_representation_id:   row.get(at + 7)?,
      common_version:             row.get(at + 8)?,
      common_data:                row.get(at + 9)?,
      reported_by:                row.get(at + 10)?,
      reporter_representation_id: row.get(at + 11)?,
      reporter_rep_version:       row.get(at + 12)?,
      generation:                 row.get(at + 13)?,
      observed_common_version:    row.get(at + 14)?,
      tombstone:                  row.get(at + 15)?,
      reporter_data:              row.get(at + 16)?,
      api_href:                   row.get(at + 17)?,
      console_href:               row.get(at + 18)?,
      reporter_version:           row.get(at + 19)?,
    })
  }

  fn into_snapshot(self) -> Result<Snapshot> {
    let resource_id = decode_uuid(&self.resource_id)?;

    let common = CommonRepresentation {
      representation_id: decode_uuid(&self.common_representation_id)?,
      resource_id,
      version: self.common_version,
      data: decode_json(&self.common_data)?,
      resource_type: self.resource_type.clone(),
      reporter_type: INVENTORY_REPORTER.to_owned(),
      reported_by: self.reported_by,
    };

    let reporter = match (
      self.reporter_representation_id,
      self.reporter_rep_version,
      self.generation,
      self.reporter_data,
    ) {
      (Some(id), Some(version), Some(generation), Some(data)) => Some(ReporterRepresentation {
        representation_id: decode_uuid(&id)?,
        resource_id,
        local_resource_id: self.local_resource_id,
        reporter_type: self.reporter_type,
        resource_type: self.resource_type,
        reporter_instance_id: self.reporter_instance_id,
        version,
        generation,
        common_version: self.observed_common_version,
        tombstone: self.tombstone,
        data: decode_json(&data)?,
        api_href: self.api_href.unwrap_or_default(),
        console_href: self.console_href.unwrap_or_default(),
        reporter_version: self.reporter_version.unwrap_or_default(),
      }),
      _ => None,
    };

    Ok(Snapshot { common, reporter })
  }
}

// ─── Reads ───────────────────────────────────────────────────────────────────

pub fn resolve_current(conn: &Connection, key: &ResourceKey) -> Result<Option<CurrentView>> {
  let sql = format!(
    "SELECT {res}, {snap}
     FROM representation_references ref
     JOIN representations s ON s.representation_id = ref.representation_id
     JOIN resources res ON res.resource_id = ref.resource_id
     WHERE s.local_resource_id = ?1 AND s.reporter_type = ?2
       AND s.resource_type = ?3 AND s.reporter_instance_id = ?4",
    res = select_list("res", RESOURCE_COLUMNS),
    snap = select_list("s", SNAPSHOT_COLUMNS),
  );

  let raw = conn
    .prepare_cached(&sql)?
    .query_row(key_params(key), |row| {
      Ok((RawResource::read(row, 0)?, RawSnapshot::read(row, RESOURCE_COLUMNS.len())?))
    })
    .optional()?;

  let Some((resource, snapshot)) = raw else {
    return Ok(None);
  };
  let resource = resource.into_resource()?;
  let Snapshot { common, reporter } = snapshot.into_snapshot()?;
  let reporter = reporter.ok_or(Error::DanglingReference {
    resource_id: resource.resource_id,
    slot:        Slot::Reporter,
  })?;

  Ok(Some(CurrentView { resource, common, reporter }))
}

/// The snapshots that introduced each common version, oldest first.
pub fn common_history(conn: &Connection, resource_id: Uuid) -> Result<Vec<CommonRepresentation>> {
  let sql = format!(
    "SELECT {} FROM representations s
     WHERE s.resource_id = ?1 AND s.written_slot = 'common'
     ORDER BY s.common_version",
    select_list("s", SNAPSHOT_COLUMNS)
  );
  let mut stmt = conn.prepare_cached(&sql)?;
  let raws = stmt
    .query_map(rusqlite::params![encode_uuid(resource_id)], |row| RawSnapshot::read(row, 0))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws
    .into_iter()
    .map(|raw| Ok(raw.into_snapshot()?.common))
    .collect()
}

/// The snapshots that introduced each reporter version, oldest first.
pub fn reporter_history(
  conn: &Connection,
  key: &ResourceKey,
) -> Result<Vec<ReporterRepresentation>> {
  let sql = format!(
    "SELECT {} FROM representations s
     WHERE s.local_resource_id = ?1 AND s.reporter_type = ?2
       AND s.resource_type = ?3 AND s.reporter_instance_id = ?4
       AND s.written_slot = 'reporter'
     ORDER BY s.reporter_rep_version",
    select_list("s", SNAPSHOT_COLUMNS)
  );
  let mut stmt = conn.prepare_cached(&sql)?;
  let raws = stmt
    .query_map(key_params(key), |row| RawSnapshot::read(row, 0))?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let mut reps = Vec::with_capacity(raws.len());
  for raw in raws {
    let resource_id = decode_uuid(&raw.resource_id)?;
    let reporter = raw
      .into_snapshot()?
      .reporter
      .ok_or(Error::DanglingReference { resource_id, slot: Slot::Reporter })?;
    reps.push(reporter);
  }
  Ok(reps)
}
