//! Implementation of the `stagehand plan` command.
//!
//! Resolves the dependency graph and selects a source for each component
//! without downloading or building anything.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use stagehand_lib::build::ProjectBuilder;
use stagehand_lib::platform::Arch;

use super::{load_manifest, target_arch};
use crate::output::{OutputFormat, print_info, print_json, symbols};

pub fn cmd_plan(manifest: &Path, arch: Option<Arch>, format: OutputFormat) -> Result<ExitCode> {
  let manifest = load_manifest(manifest)?;
  let arch = target_arch(arch)?;

  let plan = ProjectBuilder::plan(&manifest.project, &manifest.registry, arch).context("Failed to plan build")?;

  if format.is_json() {
    print_json(&plan)?;
    return Ok(ExitCode::SUCCESS);
  }

  print_info(&format!("Plan for {} ({})", plan.project, plan.arch));
  for (i, wave) in plan.waves.iter().enumerate() {
    println!("  Wave {}: {}", i + 1, wave.join(", "));
  }
  println!();
  for component in &plan.components {
    println!(
      "  {} {} {} {}",
      component.name,
      component.version,
      symbols::ARROW,
      component.source
    );
  }
  Ok(ExitCode::SUCCESS)
}
