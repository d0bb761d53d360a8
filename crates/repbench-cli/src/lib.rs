//! Library half of the `repbench` binary: configuration, JSONL loading, the
//! retrying batch driver and the cross-layout comparison.

pub mod compare;
pub mod config;
pub mod driver;
pub mod input;
