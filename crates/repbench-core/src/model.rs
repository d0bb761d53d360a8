//! The representation data model.
//!
//! A [`Resource`] is a bare identity anchor. Everything known about it lives in
//! two append-only streams of immutable representations: the reporter-agnostic
//! [`CommonRepresentation`] and the reporter-specific
//! [`ReporterRepresentation`]. The reference layer only ever says which row of
//! each stream is current.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Synthetic reporter type under which the common representation is filed.
pub const INVENTORY_REPORTER: &str = "inventory";

/// Common payload substituted when a creating record carries none.
pub fn default_common_payload() -> Value { json!({ "workspaceId": "default" }) }

// ─── Identity ────────────────────────────────────────────────────────────────

/// Identity anchor for a real-world entity. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
  pub resource_id:   Uuid,
  pub resource_type: String,
  pub created_at:    DateTime<Utc>,
}

/// The lookup key under which a reporter knows a resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
  pub local_resource_id:    String,
  pub reporter_type:        String,
  pub resource_type:        String,
  pub reporter_instance_id: String,
}

impl std::fmt::Display for ResourceKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "{}/{}/{}@{}",
      self.reporter_type, self.resource_type, self.local_resource_id, self.reporter_instance_id
    )
  }
}

// ─── Representations ─────────────────────────────────────────────────────────

/// Reporter-agnostic projection of a resource. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonRepresentation {
  pub representation_id: Uuid,
  pub resource_id:       Uuid,
  /// Starts at 1 and grows by exactly one per write.
  pub version:           u32,
  pub data:              Value,
  pub resource_type:     String,
  /// Always [`INVENTORY_REPORTER`].
  pub reporter_type:     String,
  /// Reporter type of the record that contributed this version.
  pub reported_by:       String,
}

/// Reporter-specific projection of a resource. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReporterRepresentation {
  pub representation_id:    Uuid,
  pub resource_id:          Uuid,
  pub local_resource_id:    String,
  pub reporter_type:        String,
  pub resource_type:        String,
  pub reporter_instance_id: String,
  pub version:              u32,
  pub generation:           u32,
  /// Common version observed when this row was written.
  pub common_version:       Option<u32>,
  /// Reserved for deletes; never set by ingestion.
  pub tombstone:            bool,
  pub data:                 Value,
  pub api_href:             String,
  pub console_href:         String,
  /// The reporter's own semantic version string.
  pub reporter_version:     String,
}

// ─── Reference layer ─────────────────────────────────────────────────────────

/// Which stream a reference slot tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Slot {
  Common,
  Reporter,
}

/// One "current pointer" as read back from the reference layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotReference {
  pub slot:          Slot,
  /// [`INVENTORY_REPORTER`] for the common slot.
  pub reporter_type: String,
  pub version:       u32,
  /// Layouts that keep no generation for a slot report `None`.
  pub generation:    Option<u32>,
  pub tombstone:     bool,
}

/// Every reference slot belonging to one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSet {
  pub resource_id: Uuid,
  pub slots:       Vec<SlotReference>,
}

impl ReferenceSet {
  pub fn common(&self) -> Option<&SlotReference> {
    self.slots.iter().find(|s| s.slot == Slot::Common)
  }

  pub fn reporter(&self, reporter_type: &str) -> Option<&SlotReference> {
    self
      .slots
      .iter()
      .find(|s| s.slot == Slot::Reporter && s.reporter_type == reporter_type)
  }
}

/// The physical row a slot is pointed at. Layout A keys on `version`; the
/// normalized layouts key on `representation_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepresentationRef {
  pub representation_id: Uuid,
  pub version:           u32,
}

// ─── Read model ──────────────────────────────────────────────────────────────

/// The resolved current state for one resource key. Never stored, always
/// derived through the reference layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentView {
  pub resource: Resource,
  pub common:   CommonRepresentation,
  pub reporter: ReporterRepresentation,
}
