//! Terminal output for build results.
//!
//! Status lines go to stdout on success and stderr for warnings and failures;
//! colors are applied only when the target stream supports them.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};
use stagehand_lib::build::ErrorClass;

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
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
}

/// Leading characters of a digest, enough to tell packages apart at a glance.
pub fn truncate_hash(hash: &str) -> &str {
  hash.get(..12).unwrap_or(hash)
}

pub fn format_bytes(bytes: u64) -> String {
  const UNITS: [&str; 3] = ["KB", "MB", "GB"];

  if bytes < 1024 {
    return format!("{bytes} B");
  }
  let mut value = bytes as f64 / 1024.0;
  let mut unit = 0;
  while value >= 1024.0 && unit < UNITS.len() - 1 {
    value /= 1024.0;
    unit += 1;
  }
  format!("{value:.1} {}", UNITS[unit])
}

pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  match secs {
    0 => format!("{}ms", duration.subsec_millis()),
    1..60 => format!("{:.2}s", duration.as_secs_f64()),
    _ => format!("{}m {}s", secs / 60, secs % 60),
  }
}

pub fn print_success(message: &str) {
  println!("{} {message}", symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()));
}

pub fn print_info(message: &str) {
  println!("{} {message}", symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()));
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

/// An indented `label: value` line on stdout.
pub fn print_stat(label: &str, value: &str) {
  println!("  {}: {value}", label.if_supports_color(Stream::Stdout, |s| s.dimmed()));
}

/// An indented `label: value` line on stderr.
pub fn eprint_stat(label: &str, value: &str) {
  eprintln!("  {}: {value}", label.if_supports_color(Stream::Stderr, |s| s.dimmed()));
}

/// Failure class, colored by whether retrying could help.
pub fn eprint_class(class: ErrorClass) {
  let text = class.to_string();
  let value = match class {
    ErrorClass::Io => text.if_supports_color(Stream::Stderr, |s| s.yellow()).to_string(),
    _ => text.if_supports_color(Stream::Stderr, |s| s.red()).to_string(),
  };
  eprint_stat("Class", &value);
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{json}");
  Ok(())
}
