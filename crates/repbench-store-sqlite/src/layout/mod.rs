//! The three physical layouts and the statements they share.
//!
//! Each submodule provides a `Session` implementing
//! [`LayoutSession`](repbench_core::layout::LayoutSession) plus the read
//! queries that resolve "current" through its own reference shape. This module
//! dispatches on [`LayoutKind`] so the store never names a layout directly.

mod denormalized;
mod join_table;
mod single_reference;

use repbench_core::{
  engine::{self, IngestOutcome},
  layout::LayoutKind,
  model::{
    CommonRepresentation, CurrentView, ReporterRepresentation, RepresentationRef, Resource,
    ResourceKey, Slot,
  },
  record::InputRecord,
};
use rusqlite::Connection;
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    COMMON_COLUMNS, RawCommon, RawReporter, REPORTER_COLUMNS, encode_dt, encode_json, encode_uuid,
    select_list,
  },
};

// ─── Dispatch ────────────────────────────────────────────────────────────────

/// Run the ingestion engine for `record` against the layout's session.
pub fn ingest(conn: &Connection, kind: LayoutKind, record: &InputRecord) -> Result<IngestOutcome> {
  match kind {
    LayoutKind::Denormalized => engine::ingest(&mut denormalized::Session::new(conn), record),
    LayoutKind::JoinTable => engine::ingest(&mut join_table::Session::new(conn), record),
    LayoutKind::SingleReference => {
      engine::ingest(&mut single_reference::Session::new(conn, record.key()), record)
    }
  }
}

pub fn resolve_current(
  conn: &Connection,
  kind: LayoutKind,
  key: &ResourceKey,
) -> Result<Option<CurrentView>> {
  match kind {
    LayoutKind::Denormalized => denormalized::resolve_current(conn, key),
    LayoutKind::JoinTable => join_table::resolve_current(conn, key),
    LayoutKind::SingleReference => single_reference::resolve_current(conn, key),
  }
}

pub fn common_history(
  conn: &Connection,
  kind: LayoutKind,
  resource_id: Uuid,
) -> Result<Vec<CommonRepresentation>> {
  match kind {
    LayoutKind::Denormalized | LayoutKind::JoinTable => two_table_common_history(conn, resource_id),
    LayoutKind::SingleReference => single_reference::common_history(conn, resource_id),
  }
}

pub fn reporter_history(
  conn: &Connection,
  kind: LayoutKind,
  key: &ResourceKey,
) -> Result<Vec<ReporterRepresentation>> {
  match kind {
    LayoutKind::Denormalized | LayoutKind::JoinTable => two_table_reporter_history(conn, key),
    LayoutKind::SingleReference => single_reference::reporter_history(conn, key),
  }
}

// ─── Shared writes ───────────────────────────────────────────────────────────

pub(crate) fn insert_resource(conn: &Connection, resource: &Resource) -> Result<()> {
  conn
    .prepare_cached(
      "INSERT INTO resources (resource_id, resource_type, created_at) VALUES (?1, ?2, ?3)",
    )?
    .execute(rusqlite::params![
      encode_uuid(resource.resource_id),
      resource.resource_type,
      encode_dt(resource.created_at),
    ])?;
  Ok(())
}

/// Append to `common_representations` (layouts A and B).
pub(crate) fn insert_common(
  conn: &Connection,
  rep: &CommonRepresentation,
) -> Result<RepresentationRef> {
  conn
    .prepare_cached(
      "INSERT INTO common_representations (
         representation_id, resource_id, version, data,
         resource_type, reporter_type, reported_by
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?
    .execute(rusqlite::params![
      encode_uuid(rep.representation_id),
      encode_uuid(rep.resource_id),
      rep.version,
      encode_json(&rep.data)?,
      rep.resource_type,
      rep.reporter_type,
      rep.reported_by,
    ])?;
  Ok(RepresentationRef { representation_id: rep.representation_id, version: rep.version })
}

/// Append to `reporter_representations` (layouts A and B).
pub(crate) fn insert_reporter(
  conn: &Connection,
  rep: &ReporterRepresentation,
) -> Result<RepresentationRef> {
  conn
    .prepare_cached(
      "INSERT INTO reporter_representations (
         representation_id, resource_id, local_resource_id, reporter_type,
         resource_type, reporter_instance_id, version, generation,
         common_version, tombstone, data, api_href, console_href, reporter_version
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
    )?
    .execute(rusqlite::params![
      encode_uuid(rep.representation_id),
      encode_uuid(rep.resource_id),
      rep.local_resource_id,
      rep.reporter_type,
      rep.resource_type,
      rep.reporter_instance_id,
      rep.version,
      rep.generation,
      rep.common_version,
      rep.tombstone,
      encode_json(&rep.data)?,
      rep.api_href,
      rep.console_href,
      rep.reporter_version,
    ])?;
  Ok(RepresentationRef { representation_id: rep.representation_id, version: rep.version })
}

/// An in-place reference update must hit exactly one row.
pub(crate) fn expect_single_row(changed: usize, resource_id: Uuid, slot: Slot) -> Result<()> {
  if changed == 1 {
    Ok(())
  } else {
    Err(Error::Core(repbench_core::Error::MissingSlot { resource_id, slot }))
  }
}

// ─── Shared reads ────────────────────────────────────────────────────────────

fn two_table_common_history(
  conn: &Connection,
  resource_id: Uuid,
) -> Result<Vec<CommonRepresentation>> {
  let sql = format!(
    "SELECT {} FROM common_representations c WHERE c.resource_id = ?1 ORDER BY c.version",
    select_list("c", COMMON_COLUMNS)
  );
  let mut stmt = conn.prepare_cached(&sql)?;
  let raws = stmt
    .query_map(rusqlite::params![encode_uuid(resource_id)], |row| RawCommon::read(row, 0))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawCommon::into_common).collect()
}

fn two_table_reporter_history(
  conn: &Connection,
  key: &ResourceKey,
) -> Result<Vec<ReporterRepresentation>> {
  let sql = format!(
    "SELECT {} FROM reporter_representations r
     WHERE r.local_resource_id = ?1 AND r.reporter_type = ?2
       AND r.resource_type = ?3 AND r.reporter_instance_id = ?4
     ORDER BY r.version",
    select_list("r", REPORTER_COLUMNS)
  );
  let mut stmt = conn.prepare_cached(&sql)?;
  let raws = stmt
    .query_map(key_params(key), |row| RawReporter::read(row, 0))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawReporter::into_reporter).collect()
}

/// `?1..?4` bound to the lookup key, in column order.
pub(crate) fn key_params(key: &ResourceKey) -> [&str; 4] {
  [
    key.local_resource_id.as_str(),
    key.reporter_type.as_str(),
    key.resource_type.as_str(),
    key.reporter_instance_id.as_str(),
  ]
}
