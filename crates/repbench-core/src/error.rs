//! Error types for `repbench-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::model::Slot;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid record: {0}")]
  InvalidRecord(String),

  #[error("reporter type {0:?} is reserved for the common representation")]
  ReservedReporterType(String),

  /// A payload was supplied but is not a JSON object.
  #[error("malformed {field} payload: expected a JSON object")]
  MalformedPayload { field: &'static str },

  #[error("malformed input line: {0}")]
  MalformedLine(#[source] serde_json::Error),

  /// The reference layer returned rows for a resource but one of its slots
  /// is absent.
  #[error("resource {resource_id} has no {slot} reference slot")]
  MissingSlot { resource_id: Uuid, slot: Slot },

  #[error("reporter slot of resource {0} carries no generation")]
  MissingGeneration(Uuid),

  /// Incrementing a stored version would overflow its counter.
  #[error("{slot} version of resource {resource_id} cannot advance past {current}")]
  VersionOverflow { resource_id: Uuid, slot: Slot, current: u32 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// ─── Classification ──────────────────────────────────────────────────────────

/// Coarse failure taxonomy shared by every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
  /// Lost a race with a concurrent writer; retrying the record may succeed.
  TransientConflict,
  /// The record itself is unusable; retrying cannot help.
  MalformedInput,
  /// Connectivity or constraint failure in the storage engine.
  Storage,
  /// Stored state contradicts the layout's invariants.
  Integrity,
}

/// Errors that can be placed in the [`ErrorClass`] taxonomy.
pub trait Classify {
  fn class(&self) -> ErrorClass;

  fn is_transient(&self) -> bool {
    self.class() == ErrorClass::TransientConflict
  }
}

impl Classify for Error {
  fn class(&self) -> ErrorClass {
    match self {
      Error::InvalidRecord(_)
      | Error::ReservedReporterType(_)
      | Error::MalformedPayload { .. }
      | Error::MalformedLine(_) => ErrorClass::MalformedInput,
      Error::MissingSlot { .. }
      | Error::MissingGeneration(_)
      | Error::VersionOverflow { .. } => ErrorClass::Integrity,
    }
  }
}
