//! The seam between the ingestion engine and a physical storage layout.
//!
//! Every layout stores the same logical model but shapes its reference layer
//! differently. The engine in [`crate::engine`] only ever talks to a
//! [`LayoutSession`], so the create-or-update algorithm is written once and
//! runs unmodified against all of them.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use uuid::Uuid;

use crate::model::{
  CommonRepresentation, ReferenceSet, ReporterRepresentation, RepresentationRef, Resource,
  ResourceKey, Slot,
};

/// The physical layouts under comparison.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum LayoutKind {
  /// Reference rows carry version and generation inline, one row per
  /// (resource, reporter type).
  #[default]
  Denormalized,
  /// Reference rows hold nullable pointers to either a common or a reporter
  /// representation id.
  JoinTable,
  /// One reference row per resource pointing at a single representation
  /// stream.
  SingleReference,
}

/// Operations a layout exposes to the engine, scoped to one open transaction.
///
/// Implementations must not commit or roll back; the caller owns the
/// transaction boundary.
pub trait LayoutSession {
  /// Must absorb core errors so the engine can report validation and
  /// integrity failures through the layout's own error type.
  type Error: From<crate::Error>;

  /// All reference slots of the resource known under `key`, or `None` when
  /// the key has never been seen.
  fn lookup_current(&mut self, key: &ResourceKey) -> Result<Option<ReferenceSet>, Self::Error>;

  /// Insert the identity row for a brand-new resource.
  fn create_resource(&mut self, resource: &Resource) -> Result<(), Self::Error>;

  /// Append an immutable common representation row.
  fn append_common(
    &mut self,
    rep: &CommonRepresentation,
  ) -> Result<RepresentationRef, Self::Error>;

  /// Append an immutable reporter representation row.
  fn append_reporter(
    &mut self,
    rep: &ReporterRepresentation,
  ) -> Result<RepresentationRef, Self::Error>;

  /// Create the common and reporter reference slots of a new resource.
  fn allocate_slots(
    &mut self,
    resource: &Resource,
    key: &ResourceKey,
    common: RepresentationRef,
    reporter: RepresentationRef,
  ) -> Result<(), Self::Error>;

  /// Point one existing slot at `target`, in place. Exactly one reference row
  /// must match.
  fn repoint_reference(
    &mut self,
    resource_id: Uuid,
    slot: Slot,
    key: &ResourceKey,
    target: RepresentationRef,
  ) -> Result<(), Self::Error>;
}
