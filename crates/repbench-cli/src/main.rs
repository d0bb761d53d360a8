//! `repbench` binary.
//!
//! Reads `repbench.toml` (or the path given with `--config`), then either
//! ingests a JSONL file into one layout's store or replays it through every
//! layout and checks they agree.

use std::path::PathBuf;

use anyhow::{Context as _, bail};
use clap::{Parser, Subcommand};
use repbench_cli::{
  compare::compare_layouts,
  config::BenchConfig,
  driver::{BatchReport, run_batch},
  input::read_jsonl,
};
use repbench_core::layout::LayoutKind;
use repbench_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Representation layout benchmark")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "repbench.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Ingest a JSONL file into a store.
  Ingest {
    /// One JSON record per line.
    #[arg(short, long)]
    input:  PathBuf,
    /// Overrides `layout` from the config.
    #[arg(short, long)]
    layout: Option<LayoutKind>,
    /// Overrides `store_path` from the config.
    #[arg(short, long)]
    store:  Option<PathBuf>,
  },
  /// Replay a JSONL file through every layout and report disagreements.
  Compare {
    #[arg(short, long)]
    input: PathBuf,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let mut cfg = BenchConfig::load(&cli.config)?;

  match cli.command {
    Command::Ingest { input, layout, store } => {
      if let Some(layout) = layout {
        cfg.layout = layout;
      }
      if let Some(store) = store {
        cfg.store_path = store;
      }
      ingest(&cfg, input).await
    }
    Command::Compare { input } => compare(&cfg, input).await,
  }
}

async fn ingest(cfg: &BenchConfig, input: PathBuf) -> anyhow::Result<()> {
  let store_path = cfg.resolved_store_path();
  let store = SqliteStore::open_with(&store_path, cfg.store_options())
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let lines = read_jsonl(&input).await?;
  tracing::info!(layout = %cfg.layout, records = lines.len(), "ingesting {input:?}");

  let report = run_batch(&store, lines, cfg.retry_policy()).await;
  log_report(cfg.layout, &report);

  if !report.failed.is_empty() {
    bail!("{} of {} records failed", report.failed.len(), report.total());
  }
  Ok(())
}

async fn compare(cfg: &BenchConfig, input: PathBuf) -> anyhow::Result<()> {
  let lines = read_jsonl(&input).await?;
  let comparison = compare_layouts(&lines, cfg.retry_policy()).await?;

  for (layout, report) in &comparison.batches {
    log_report(*layout, report);
  }
  for m in &comparison.mismatches {
    tracing::warn!(
      key = %m.key,
      baseline = %m.baseline,
      layout = %m.layout,
      expected = ?m.expected,
      found = ?m.found,
      "layouts disagree"
    );
  }

  if !comparison.is_consistent() {
    bail!(
      "{} of {} keys resolved differently across layouts",
      comparison.mismatches.len(),
      comparison.keys
    );
  }
  tracing::info!(keys = comparison.keys, "all layouts agree");
  Ok(())
}

fn log_report(layout: LayoutKind, report: &BatchReport) {
  let slowest = report
    .slowest
    .as_ref()
    .map(|s| format!("{} on line {} ({:?})", s.label, s.line, s.duration))
    .unwrap_or_else(|| "-".to_owned());

  tracing::info!(
    %layout,
    created = report.created,
    updated = report.updated,
    noop = report.noop,
    failed = report.failed.len(),
    retries = report.retries,
    %slowest,
    "batch finished"
  );
}
