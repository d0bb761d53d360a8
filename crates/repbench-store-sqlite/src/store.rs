//! [`SqliteStore`]: the SQLite implementation of [`RepresentationStore`].

use std::{path::Path, str::FromStr, time::Duration};

use repbench_core::{
  engine::IngestOutcome,
  layout::LayoutKind,
  model::{CommonRepresentation, CurrentView, ReporterRepresentation, Resource, ResourceKey},
  record::InputRecord,
  store::RepresentationStore,
};
use rusqlite::{Connection, OptionalExtension as _, TransactionBehavior};
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{RESOURCE_COLUMNS, RawResource, encode_uuid, select_list},
  layout,
  schema::{META, PRAGMAS, schema_for},
};

// ─── Options ─────────────────────────────────────────────────────────────────

/// How to open a [`SqliteStore`].
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
  pub layout:       LayoutKind,
  /// How long a writer waits for another connection's lock before the
  /// attempt fails as a transient conflict.
  pub busy_timeout: Duration,
}

impl StoreOptions {
  pub fn new(layout: LayoutKind) -> Self { Self { layout, ..Self::default() } }
}

impl Default for StoreOptions {
  fn default() -> Self {
    Self { layout: LayoutKind::default(), busy_timeout: Duration::from_secs(5) }
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A representation store backed by a single SQLite file, writing one layout.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn:   tokio_rusqlite::Connection,
  layout: LayoutKind,
}

impl SqliteStore {
  /// Open (or create) a store at `path` for `layout`.
  pub async fn open(path: impl AsRef<Path>, layout: LayoutKind) -> Result<Self> {
    Self::open_with(path, StoreOptions::new(layout)).await
  }

  pub async fn open_with(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn, layout: options.layout };
    store.init_schema(options.busy_timeout).await?;
    Ok(store)
  }

  /// Open an in-memory store, mostly for tests.
  pub async fn open_in_memory(layout: LayoutKind) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn, layout };
    store.init_schema(StoreOptions::default().busy_timeout).await?;
    Ok(store)
  }

  async fn init_schema(&self, busy_timeout: Duration) -> Result<()> {
    let wanted = self.layout.to_string();

    let recorded: String = self
      .conn
      .call(move |conn| {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(PRAGMAS)?;
        conn.execute_batch(META)?;
        conn.execute(
          "INSERT OR IGNORE INTO store_meta (id, layout) VALUES (1, ?1)",
          rusqlite::params![wanted],
        )?;
        Ok(conn.query_row("SELECT layout FROM store_meta WHERE id = 1", [], |r| r.get(0))?)
      })
      .await?;

    let found = LayoutKind::from_str(&recorded).map_err(|_| Error::UnknownLayout(recorded))?;
    if found != self.layout {
      return Err(Error::LayoutMismatch { expected: self.layout, found });
    }

    let batches = schema_for(self.layout);
    self
      .conn
      .call(move |conn| {
        for ddl in batches {
          conn.execute_batch(ddl)?;
        }
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run `work` as one serializable unit of work.
  ///
  /// `BEGIN IMMEDIATE` takes the write lock up front, so concurrent writers on
  /// the same file serialize at the transaction boundary.
  async fn write<T, F>(&self, work: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
  {
    self
      .conn
      .call(move |conn| Ok(in_transaction(conn, TransactionBehavior::Immediate, work)))
      .await?
  }

  /// Run `work` inside a read transaction so multi-table reads see one
  /// snapshot.
  async fn read<T, F>(&self, work: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
  {
    self
      .conn
      .call(move |conn| Ok(in_transaction(conn, TransactionBehavior::Deferred, work)))
      .await?
  }
}

/// Dropping the transaction on error rolls everything back.
fn in_transaction<T>(
  conn: &mut Connection,
  behavior: TransactionBehavior,
  work: impl FnOnce(&Connection) -> Result<T>,
) -> Result<T> {
  let tx = conn.transaction_with_behavior(behavior)?;
  let value = work(&tx)?;
  tx.commit()?;
  Ok(value)
}

// ─── RepresentationStore impl ────────────────────────────────────────────────

impl RepresentationStore for SqliteStore {
  type Error = Error;

  fn layout(&self) -> LayoutKind { self.layout }

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn ingest(&self, record: InputRecord) -> Result<IngestOutcome> {
    let kind = self.layout;
    let key = record.key();

    let outcome = self
      .write(move |conn| layout::ingest(conn, kind, &record))
      .await?;

    tracing::debug!(
      layout = %kind,
      key = %key,
      resource_id = %outcome.resource_id,
      transition = ?outcome.transition,
      common_version = outcome.common_version,
      reporter_version = outcome.reporter_version,
      steps = outcome.steps.len(),
      "record committed"
    );
    Ok(outcome)
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn current(&self, key: ResourceKey) -> Result<Option<CurrentView>> {
    let kind = self.layout;
    self
      .read(move |conn| layout::resolve_current(conn, kind, &key))
      .await
  }

  async fn get_resource(&self, resource_id: Uuid) -> Result<Option<Resource>> {
    let id_str = encode_uuid(resource_id);

    let raw: Option<RawResource> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM resources r WHERE r.resource_id = ?1",
          select_list("r", RESOURCE_COLUMNS)
        );
        Ok(
          conn
            .query_row(&sql, rusqlite::params![id_str], |row| RawResource::read(row, 0))
            .optional()?,
        )
      })
      .await?;

    raw.map(RawResource::into_resource).transpose()
  }

  async fn resource_count(&self) -> Result<u64> {
    let count: i64 = self
      .conn
      .call(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM resources", [], |r| r.get(0))?))
      .await?;
    Ok(count.max(0) as u64)
  }

  async fn common_history(&self, resource_id: Uuid) -> Result<Vec<CommonRepresentation>> {
    let kind = self.layout;
    self
      .read(move |conn| layout::common_history(conn, kind, resource_id))
      .await
  }

  async fn reporter_history(&self, key: ResourceKey) -> Result<Vec<ReporterRepresentation>> {
    let kind = self.layout;
    self
      .read(move |conn| layout::reporter_history(conn, kind, &key))
      .await
  }
}
