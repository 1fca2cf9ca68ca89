//! Implementation of the `stagehand info` command.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use serde::Serialize;
use stagehand_lib::platform::{host_arch, paths};

use crate::output::{OutputFormat, print_json, print_stat};

#[derive(Serialize)]
struct InfoOutput {
  version: &'static str,
  host_arch: Option<String>,
  debian_arch: Option<String>,
  cache_dir: PathBuf,
}

fn collect() -> InfoOutput {
  let arch = host_arch();
  InfoOutput {
    version: env!("CARGO_PKG_VERSION"),
    host_arch: arch.map(|a| a.as_str().to_string()),
    debian_arch: arch.map(|a| a.debian_name().to_string()),
    cache_dir: paths::artifact_cache_dir(),
  }
}

pub fn cmd_info(format: OutputFormat) -> Result<ExitCode> {
  let info = collect();

  if format.is_json() {
    print_json(&info)?;
    return Ok(ExitCode::SUCCESS);
  }

  println!("stagehand {}", info.version);
  match (&info.host_arch, &info.debian_arch) {
    (Some(arch), Some(debian)) => print_stat("Host arch", &format!("{arch} ({debian})")),
    _ => print_stat("Host arch", "unsupported"),
  }
  print_stat("Artifact cache", &info.cache_dir.display().to_string());
  Ok(ExitCode::SUCCESS)
}
