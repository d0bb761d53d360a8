//! Layout B: normalized join table with nullable pointers.
//!
//! Each reference row holds exactly one non-null pointer, either at a reporter
//! representation or at a common representation. Partial unique indexes keep
//! at most one pointer of each kind per resource, so "current" is whatever the
//! pointer says, never whichever row is newest.

use repbench_core::{
  layout::LayoutSession,
  model::{
    CommonRepresentation, CurrentView, INVENTORY_REPORTER, ReferenceSet, ReporterRepresentation,
    RepresentationRef, Resource, ResourceKey, Slot, SlotReference,
  },
};
use rusqlite::{Connection, OptionalExtension as _};
use uuid::Uuid;

use super::{
  denormalized::{assemble_view, read_joined_row},
  expect_single_row, insert_common, insert_reporter, insert_resource, key_params,
};
use crate::{
  Error, Result,
  encode::{COMMON_COLUMNS, RESOURCE_COLUMNS, REPORTER_COLUMNS, decode_uuid, encode_uuid, select_list},
};

pub struct Session<'c> {
  conn: &'c Connection,
}

impl<'c> Session<'c> {
  pub fn new(conn: &'c Connection) -> Self { Self { conn } }
}

/// One reference row with both outer joins applied.
struct PointerRow {
  resource_id:      String,
  reporter_ptr:     Option<String>,
  common_ptr:       Option<String>,
  reporter_type:    Option<String>,
  reporter_version: Option<u32>,
  generation:       Option<u32>,
  tombstone:        Option<bool>,
  common_version:   Option<u32>,
}

impl PointerRow {
  fn into_slot(self, resource_id: Uuid) -> Result<SlotReference> {
    if self.reporter_ptr.is_some() {
      let (Some(reporter_type), Some(version)) = (self.reporter_type, self.reporter_version)
      else {
        return Err(Error::DanglingReference { resource_id, slot: Slot::Reporter });
      };
      Ok(SlotReference {
        slot: Slot::Reporter,
        reporter_type,
        version,
        generation: self.generation,
        tombstone: self.tombstone.unwrap_or(false),
      })
    } else {
      let (Some(_), Some(version)) = (self.common_ptr, self.common_version) else {
        return Err(Error::DanglingReference { resource_id, slot: Slot::Common });
      };
      Ok(SlotReference {
        slot: Slot::Common,
        reporter_type: INVENTORY_REPORTER.to_owned(),
        version,
        generation: None,
        tombstone: false,
      })
    }
  }
}

impl LayoutSession for Session<'_> {
  type Error = Error;

  /// The anchor subquery filters on the caller's reporter identity through the
  /// reporter pointer; the outer query then left-joins every slot of that
  /// resource to its pointed-at row.
  fn lookup_current(&mut self, key: &ResourceKey) -> Result<Option<ReferenceSet>> {
    let mut stmt = self.conn.prepare_cached(
      "SELECT ref.resource_id, ref.reporter_representation_id, ref.common_representation_id,
              rr.reporter_type, rr.version, rr.generation, rr.tombstone, cr.version
       FROM representation_references ref
       LEFT JOIN reporter_representations rr
         ON rr.representation_id = ref.reporter_representation_id
       LEFT JOIN common_representations cr
         ON cr.representation_id = ref.common_representation_id
       WHERE ref.resource_id IN (
         SELECT anchor.resource_id
         FROM representation_references anchor
         JOIN reporter_representations cur
           ON cur.representation_id = anchor.reporter_representation_id
         WHERE cur.local_resource_id = ?1 AND cur.reporter_type = ?2
           AND cur.resource_type = ?3 AND cur.reporter_instance_id = ?4
       )",
    )?;

    let rows = stmt
      .query_map(key_params(key), |row| {
        Ok(PointerRow {
          resource_id:      row.get(0)?,
          reporter_ptr:     row.get(1)?,
          common_ptr:       row.get(2)?,
          reporter_type:    row.get(3)?,
          reporter_version: row.get(4)?,
          generation:       row.get(5)?,
          tombstone:        row.get(6)?,
          common_version:   row.get(7)?,
        })
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    let resource_id = match rows.first() {
      Some(row) => decode_uuid(&row.resource_id)?,
      None => return Ok(None),
    };

    let slots = rows
      .into_iter()
      .map(|row| row.into_slot(resource_id))
      .collect::<Result<Vec<_>>>()?;

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
    _key: &ResourceKey,
    common: RepresentationRef,
    reporter: RepresentationRef,
  ) -> Result<()> {
    let resource_id = encode_uuid(resource.resource_id);
    let mut stmt = self.conn.prepare_cached(
      "INSERT INTO representation_references (
         resource_id, reporter_representation_id, common_representation_id
       ) VALUES (?1, ?2, ?3)",
    )?;
    stmt.execute(rusqlite::params![
      resource_id,
      Some(encode_uuid(reporter.representation_id)),
      None::<String>,
    ])?;
    stmt.execute(rusqlite::params![
      resource_id,
      None::<String>,
      Some(encode_uuid(common.representation_id)),
    ])?;
    Ok(())
  }

  fn repoint_reference(
    &mut self,
    resource_id: Uuid,
    slot: Slot,
    _key: &ResourceKey,
    target: RepresentationRef,
  ) -> Result<()> {
    let sql = match slot {
      Slot::Common => {
        "UPDATE representation_references SET common_representation_id = ?2
         WHERE resource_id = ?1 AND common_representation_id IS NOT NULL"
      }
      Slot::Reporter => {
        "UPDATE representation_references SET reporter_representation_id = ?2
         WHERE resource_id = ?1 AND reporter_representation_id IS NOT NULL"
      }
    };
    let changed = self.conn.prepare_cached(sql)?.execute(rusqlite::params![
      encode_uuid(resource_id),
      encode_uuid(target.representation_id),
    ])?;
    expect_single_row(changed, resource_id, slot)
  }
}

// ─── Reads ───────────────────────────────────────────────────────────────────

pub fn resolve_current(conn: &Connection, key: &ResourceKey) -> Result<Option<CurrentView>> {
  let sql = format!(
    "SELECT {res}, {cr}, {rr}
     FROM representation_references anchor
     JOIN reporter_representations rr
       ON rr.representation_id = anchor.reporter_representation_id
     JOIN resources res ON res.resource_id = anchor.resource_id
     LEFT JOIN representation_references cref
       ON cref.resource_id = anchor.resource_id AND cref.common_representation_id IS NOT NULL
     LEFT JOIN common_representations cr
       ON cr.representation_id = cref.common_representation_id
     WHERE rr.local_resource_id = ?1 AND rr.reporter_type = ?2
       AND rr.resource_type = ?3 AND rr.reporter_instance_id = ?4",
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
