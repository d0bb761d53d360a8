//! Error type for `repbench-store-sqlite`.

use repbench_core::{Classify, ErrorClass, layout::LayoutKind, model::Slot};
use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] repbench_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown layout recorded in store: {0:?}")]
  UnknownLayout(String),

  /// The database file was initialised for a different layout.
  #[error("store was created for layout {found}, not {expected}")]
  LayoutMismatch {
    expected: LayoutKind,
    found:    LayoutKind,
  },

  /// A reference row points at a representation that does not exist.
  #[error("{slot} reference of resource {resource_id} points at no representation")]
  DanglingReference {
    resource_id: uuid::Uuid,
    slot:        Slot,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Classify for Error {
  fn class(&self) -> ErrorClass {
    match self {
      Error::Core(e) => e.class(),
      Error::Sqlite(e) => classify_sqlite(e),
      Error::Database(tokio_rusqlite::Error::Rusqlite(e)) => classify_sqlite(e),
      Error::Database(_) | Error::LayoutMismatch { .. } | Error::UnknownLayout(_) => {
        ErrorClass::Storage
      }
      Error::Json(_) | Error::Uuid(_) | Error::DateParse(_) | Error::DanglingReference { .. } => {
        ErrorClass::Integrity
      }
    }
  }
}

/// `BUSY` and `LOCKED` mean another connection holds the write lock.
fn classify_sqlite(err: &rusqlite::Error) -> ErrorClass {
  match err {
    rusqlite::Error::SqliteFailure(e, _)
      if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
    {
      ErrorClass::TransientConflict
    }
    _ => ErrorClass::Storage,
  }
}
