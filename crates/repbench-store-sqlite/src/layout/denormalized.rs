//! Layout A: denormalized reference rows.
//!
//! One `representation_references` row per (resource, reporter type). The row
//! is the version counter of record: `representation_version` and
//! `generation` live on it directly, and a representation row is found by
//! matching its key and that version.

use repbench_core::{
  layout::LayoutSession,
  model::{
    CommonRepresentation, CurrentView, INVENTORY_REPORTER, ReferenceSet, ReporterRepresentation,
    RepresentationRef, Resource, ResourceKey, Slot, SlotReference,
  },
};
use rusqlite::{Connection, OptionalExtension as _};
use uuid::Uuid;

use super::{expect_single_row, insert_common, insert_reporter, insert_resource, key_params};
use crate::{
  Error, Result,
  encode::{
    COMMON_COLUMNS, RESOURCE_COLUMNS, REPORTER_COLUMNS, RawCommon, RawReporter, RawResource,
    decode_uuid, encode_uuid, select_list,
  },
};

pub struct Session<'c> {
  conn: &'c Connection,
}

impl<'c> Session<'c> {
  pub fn new(conn: &'c Connection) -> Self { Self { conn } }
}

impl LayoutSession for Session<'_> {
  type Error = Error;

  /// Self-join on `resource_id` recovers every sibling slot in one query.
  fn lookup_current(&mut self, key: &ResourceKey) -> Result<Option<ReferenceSet>> {
    let mut stmt = self.conn.prepare_cached(
      "SELECT r2.resource_id, r2.reporter_type, r2.representation_version,
              r2.generation, r2.tombstone
       FROM representation_references r1
       JOIN representation_references r2 ON r2.resource_id = r1.resource_id
       WHERE r1.local_resource_id = ?1 AND r1.reporter_type = ?2
         AND r1.resource_type = ?3 AND r1.reporter_instance_id = ?4",
    )?;

    let rows = stmt
      .query_map(key_params(key), |row| {
        Ok((
          row.get::<_, String>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, u32>(2)?,
          row.get::<_, u32>(3)?,
          row.get::<_, bool>(4)?,
        ))
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    let resource_id = match rows.first() {
      Some((id, ..)) => decode_uuid(id)?,
      None => return Ok(None),
    };

    let slots = rows
      .into_iter()
      .map(|(_, reporter_type, version, generation, tombstone)| SlotReference {
        slot: if reporter_type == INVENTORY_REPORTER { Slot::Common } else { Slot::Reporter },
        reporter_type,
        version,
        generation: Some(generation),
        tombstone,
      })
      .collect();

    Ok(Some(ReferenceSet { resource_id, slots }))
  }

  fn create_resource(&mut self, resource: &Resource) -> Result<()> {
    insert_resource(self.conn, resource)
  }

  fn append_common(&mut self, rep: &CommonRepresentation) -> Result<RepresentationRef> {
    insert_common(self.conn, rep)
  }

  fn append_reporter(&mut self, rep: &ReporterRepresentation) -> Result<RepresentationRef> {
    insert_reporter(self.conn, rep)
  }

  fn allocate_slots(
    &mut self,
    resource: &Resource,
    key: &ResourceKey,
    common: RepresentationRef,
    reporter: RepresentationRef,
  ) -> Result<()> {
    let resource_id = encode_uuid(resource.resource_id);
    let mut stmt = self.conn.prepare_cached(
      "INSERT INTO representation_references (
         resource_id, local_resource_id, reporter_type, resource_type,
         reporter_instance_id, representation_version, generation, tombstone
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, 0)",
    )?;

    stmt.execute(rusqlite::params![
      resource_id,
      key.local_resource_id,
      key.reporter_type,
      key.resource_type,
      key.reporter_instance_id,
      reporter.version,
    ])?;

    // The inventory slot is keyed by the resource itself.
    stmt.execute(rusqlite::params![
      resource_id,
      resource_id,
      INVENTORY_REPORTER,
      resource.resource_type,
      "",
      common.version,
    ])?;
    Ok(())
  }

  fn repoint_reference(
    &mut self,
    resource_id: Uuid,
    slot: Slot,
    key: &ResourceKey,
    target: RepresentationRef,
  ) -> Result<()> {
    let id_str = encode_uuid(resource_id);
    let changed = match slot {
      Slot::Common => self
        .conn
        .prepare_cached(
          "UPDATE representation_references SET representation_version = ?3
           WHERE resource_id = ?1 AND reporter_type = ?2",
        )?
        .execute(rusqlite::params![id_str, INVENTORY_REPORTER, target.version])?,
      Slot::Reporter => self
        .conn
        .prepare_cached(
          "UPDATE representation_references SET representation_version = ?3
           WHERE resource_id = ?1 AND reporter_type = ?2
             AND local_resource_id = ?4 AND reporter_instance_id = ?5",
        )?
        .execute(rusqlite::params![
          id_str,
          key.reporter_type,
          target.version,
          key.local_resource_id,
          key.reporter_instance_id,
        ])?,
    };
    expect_single_row(changed, resource_id, slot)
  }
}

// ─── Reads ───────────────────────────────────────────────────────────────────

pub fn resolve_current(conn: &Connection, key: &ResourceKey) -> Result<Option<CurrentView>> {
  let sql = format!(
    "SELECT {res}, {cr}, {rr}
     FROM representation_references ref
     JOIN resources res ON res.resource_id = ref.resource_id
     LEFT JOIN representation_references inv
       ON inv.resource_id = ref.resource_id AND inv.reporter_type = '{INVENTORY_REPORTER}'
     LEFT JOIN common_representations cr
       ON cr.resource_id = ref.resource_id AND cr.version = inv.representation_version
     LEFT JOIN reporter_representations rr
       ON rr.local_resource_id = ref.local_resource_id
      AND rr.reporter_type = ref.reporter_type
      AND rr.resource_type = ref.resource_type
      AND rr.reporter_instance_id = ref.reporter_instance_id
      AND rr.version = ref.representation_version
     WHERE ref.local_resource_id = ?1 AND ref.reporter_type = ?2
       AND ref.resource_type = ?3 AND ref.reporter_instance_id = ?4",
    res = select_list("res", RESOURCE_COLUMNS),
    cr = select_list("cr", COMMON_COLUMNS),
    rr = select_list("rr", REPORTER_COLUMNS),
  );

  let raw = conn
    .prepare_cached(&sql)?
    .query_row(key_params(key), read_joined_row)
    .optional()?;

  raw.map(assemble_view).transpose()
}

pub(super) type JoinedRow = (RawResource, Option<RawCommon>, Option<RawReporter>);

/// Columns: resource, then common, then reporter; either representation may
/// be all-NULL when its pointer dangles.
pub(super) fn read_joined_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<JoinedRow> {
  let common_at = RESOURCE_COLUMNS.len();
  let reporter_at = common_at + COMMON_COLUMNS.len();

  let resource = RawResource::read(row, 0)?;
  let common = match row.get::<_, Option<String>>(common_at)? {
    Some(_) => Some(RawCommon::read(row, common_at)?),
    None => None,
  };
  let reporter = match row.get::<_, Option<String>>(reporter_at)? {
    Some(_) => Some(RawReporter::read(row, reporter_at)?),
    None => None,
  };
  Ok((resource, common, reporter))
}

pub(super) fn assemble_view((resource, common, reporter): JoinedRow) -> Result<CurrentView> {
  let resource = resource.into_resource()?;
  let resource_id = resource.resource_id;

  let common = common
    .ok_or(Error::DanglingReference { resource_id, slot: Slot::Common })?
    .into_common()?;
  let reporter = reporter
    .ok_or(Error::DanglingReference { resource_id, slot: Slot::Reporter })?
    .into_reporter()?;

  Ok(CurrentView { resource, common, reporter })
}
