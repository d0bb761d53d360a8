//! JSONL input loading.

use std::path::Path;

use anyhow::Context as _;
use repbench_core::record::InputRecord;

/// One non-blank input line, parsed or not.
#[derive(Debug)]
pub struct InputLine {
  /// 1-based line number in the source file.
  pub line:   usize,
  pub record: repbench_core::Result<InputRecord>,
}

/// Parse every non-blank line. A bad line only poisons its own entry.
pub fn parse_jsonl(text: &str) -> Vec<InputLine> {
  text
    .lines()
    .enumerate()
    .filter(|(_, raw)| !raw.trim().is_empty())
    .map(|(i, raw)| InputLine { line: i + 1, record: InputRecord::from_json_line(raw) })
    .collect()
}

pub async fn read_jsonl(path: &Path) -> anyhow::Result<Vec<InputLine>> {
  let text = tokio::fs::read_to_string(path)
    .await
    .with_context(|| format!("failed to read input {path:?}"))?;
  Ok(parse_jsonl(&text))
}
