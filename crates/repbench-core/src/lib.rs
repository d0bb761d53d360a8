//! Core types and trait definitions for the representation benchmark.
//!
//! This crate is deliberately free of database dependencies. It owns the data
//! model, the input record, the [`layout::LayoutSession`] seam that each
//! physical layout implements, and the single ingestion engine that drives it.

pub mod engine;
pub mod error;
pub mod layout;
pub mod model;
pub mod record;
pub mod store;

pub use error::{Classify, Error, ErrorClass, Result};
