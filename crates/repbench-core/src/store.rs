//! The `RepresentationStore` trait.
//!
//! Implemented by storage backends (e.g. `repbench-store-sqlite`). Drivers
//! depend on this abstraction so the same batch can be replayed against any
//! layout.

use std::future::Future;

use uuid::Uuid;

use crate::{
  Classify,
  engine::IngestOutcome,
  layout::LayoutKind,
  model::{CommonRepresentation, CurrentView, ReporterRepresentation, Resource, ResourceKey},
  record::InputRecord,
};

/// A durable store of versioned representations behind one physical layout.
///
/// Every `ingest` call is one atomic, serializable unit of work: it either
/// commits all of its writes or none of them.
///
/// All methods return `Send` futures so stores can be shared across tasks.
pub trait RepresentationStore: Send + Sync {
  type Error: std::error::Error + Classify + Send + Sync + 'static;

  /// The physical layout this store writes.
  fn layout(&self) -> LayoutKind;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Run the create-or-update transaction for one record.
  fn ingest(
    &self,
    record: InputRecord,
  ) -> impl Future<Output = Result<IngestOutcome, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// Resolve the current common and reporter representations for `key`
  /// through the reference layer. `None` if the key is unknown.
  fn current(
    &self,
    key: ResourceKey,
  ) -> impl Future<Output = Result<Option<CurrentView>, Self::Error>> + Send + '_;

  fn get_resource(
    &self,
    resource_id: Uuid,
  ) -> impl Future<Output = Result<Option<Resource>, Self::Error>> + Send + '_;

  fn resource_count(&self) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Every common representation ever written for a resource, oldest first.
  fn common_history(
    &self,
    resource_id: Uuid,
  ) -> impl Future<Output = Result<Vec<CommonRepresentation>, Self::Error>> + Send + '_;

  /// Every reporter representation ever written under `key`, oldest first.
  fn reporter_history(
    &self,
    key: ResourceKey,
  ) -> impl Future<Output = Result<Vec<ReporterRepresentation>, Self::Error>> + Send + '_;
}
