//! SQLite backend for the representation benchmark.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. One store writes exactly one of the
//! three physical layouts; see [`repbench_core::layout::LayoutKind`].

mod encode;
mod layout;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{SqliteStore, StoreOptions};
