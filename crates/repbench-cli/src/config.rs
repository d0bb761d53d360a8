//! Run configuration, layered from an optional TOML file and `REPBENCH_*`
//! environment variables.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use anyhow::Context as _;
use repbench_core::layout::LayoutKind;
use repbench_store_sqlite::StoreOptions;
use serde::Deserialize;

use crate::driver::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
  pub store_path:       PathBuf,
  pub layout:           LayoutKind,
  pub busy_timeout_ms:  u64,
  pub max_attempts:     u32,
  pub retry_backoff_ms: u64,
}

impl Default for BenchConfig {
  fn default() -> Self {
    Self {
      store_path:       PathBuf::from("repbench.sqlite3"),
      layout:           LayoutKind::default(),
      busy_timeout_ms:  5000,
      max_attempts:     3,
      retry_backoff_ms: 50,
    }
  }
}

impl BenchConfig {
  /// Load from `path` (missing file is fine) with the environment on top.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("REPBENCH").try_parsing(true))
      .build()
      .with_context(|| format!("failed to read config file {path:?}"))?;

    settings
      .try_deserialize()
      .context("failed to deserialise BenchConfig")
  }

  pub fn store_options(&self) -> StoreOptions {
    StoreOptions {
      layout:       self.layout,
      busy_timeout: Duration::from_millis(self.busy_timeout_ms),
    }
  }

  pub fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy {
      max_attempts: self.max_attempts.max(1),
      backoff:      Duration::from_millis(self.retry_backoff_ms),
    }
  }

  /// The store path with a leading `~` expanded.
  pub fn resolved_store_path(&self) -> PathBuf { expand_tilde(&self.store_path) }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
