mod build;
mod info;
mod plan;

use std::path::Path;

use anyhow::{Context, Result};
use stagehand_lib::manifest::Manifest;
use stagehand_lib::platform::{Arch, host_arch};

pub use build::{BuildArgs, cmd_build};
pub use info::cmd_info;
pub use plan::cmd_plan;

/// Load a manifest, resolving relative sources against its directory.
fn load_manifest(path: &Path) -> Result<Manifest> {
  let path = dunce::canonicalize(path).with_context(|| format!("Manifest not found: {}", path.display()))?;
  Manifest::from_path(&path).with_context(|| format!("Failed to load manifest: {}", path.display()))
}

fn target_arch(arch: Option<Arch>) -> Result<Arch> {
  arch
    .or_else(host_arch)
    .context("Unsupported host architecture; pass --arch explicitly")
}
