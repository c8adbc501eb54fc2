//! CLI output formatting utilities.
//!
//! Colored status lines, JSON output and error chain rendering.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
}

/// Abbreviate a commit id for display.
pub fn truncate_commit(commit: &str) -> &str {
  let len = commit.len().min(12);
  commit.get(..len).unwrap_or(commit)
}

pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  let millis = duration.subsec_millis();

  if secs >= 60 {
    let mins = secs / 60;
    let remaining_secs = secs % 60;
    format!("{}m {}s", mins, remaining_secs)
  } else if secs > 0 {
    format!("{}.{:02}s", secs, millis / 10)
  } else {
    format!("{}ms", millis)
  }
}

/// One line for the whole error chain.
///
/// Causes whose text the previous message already ends with are skipped, so
/// errors that inline their source are not repeated.
pub fn error_chain(err: &anyhow::Error) -> String {
  let mut parts: Vec<String> = Vec::new();
  for cause in err.chain() {
    let text = cause.to_string();
    if parts.last().is_some_and(|prev| prev.ends_with(&text)) {
      continue;
    }
    parts.push(text);
  }
  parts.join(": ")
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_item(label: &str, detail: &str) {
  println!(
    "  {} {} {}",
    symbols::ARROW.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    label,
    detail.if_supports_color(Stream::Stdout, |s| s.dimmed())
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}
