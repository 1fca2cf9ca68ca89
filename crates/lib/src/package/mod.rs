//! The packaging seam.
//!
//! The engine hands a finished package root and its metadata to a
//! [`Packager`], which turns it into one installable artifact. The encoder
//! is pluggable; [`TarPackager`] is the reference implementation.

mod tarball;

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::component::ComponentSpec;
use crate::platform::Arch;
use crate::project::{CompressionType, PackageOptions, ProjectSpec};

pub use tarball::TarPackager;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PackagerError {
  /// The packager cannot encode the requested compression.
  #[error("{packager} packager does not support {compression} compression")]
  UnsupportedCompression {
    packager: String,
    compression: CompressionType,
  },

  #[error("io error at {path}: {message}")]
  Io { path: String, message: String },

  #[error("failed to write package metadata: {0}")]
  Metadata(String),
}

impl PackagerError {
  pub(crate) fn io(path: &Path, err: std::io::Error) -> Self {
    PackagerError::Io {
      path: path.display().to_string(),
      message: err.to_string(),
    }
  }
}

/// License and version of one component shipped in the package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentMetadata {
  pub name: String,
  pub version: String,
  pub license: Option<String>,
  pub license_file: Option<String>,
}

/// Everything a packager needs besides the tree itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageMetadata {
  pub name: String,
  pub version: String,
  pub iteration: u32,
  pub friendly_name: Option<String>,
  pub maintainer: String,
  pub license: Option<String>,
  pub homepage: Option<String>,
  pub arch: Arch,
  pub install_dir: PathBuf,
  pub runtime_requirements: Vec<String>,
  pub package_options: PackageOptions,
  /// Components in build order.
  pub components: Vec<ComponentMetadata>,
  /// Fingerprint of the package root.
  pub tree_digest: Option<String>,
}

impl PackageMetadata {
  pub fn new(project: &ProjectSpec, arch: Arch, components: &[ComponentSpec]) -> Self {
    Self {
      name: project.name.clone(),
      version: project.version.clone(),
      iteration: project.build_iteration,
      friendly_name: project.friendly_name.clone(),
      maintainer: project.maintainer.clone(),
      license: project.license.clone(),
      homepage: project.homepage.clone(),
      arch,
      install_dir: project.install_dir.clone(),
      runtime_requirements: project.runtime_requirements.clone(),
      package_options: project.package_options,
      components: components
        .iter()
        .map(|c| ComponentMetadata {
          name: c.name.clone(),
          version: c.version.clone(),
          license: c.license.clone(),
          license_file: c.license_file.clone(),
        })
        .collect(),
      tree_digest: None,
    }
  }

  /// `<name>-<version>-<iteration>.<arch>`, the stem of artifact file names.
  pub fn artifact_stem(&self) -> String {
    format!(
      "{}-{}-{}.{}",
      self.name,
      self.version,
      self.iteration,
      self.arch.debian_name()
    )
  }
}

/// Encodes a finished package root into an installable artifact.
///
/// Called once per successful build, from a blocking thread.
pub trait Packager: Send + Sync {
  /// Short name used in logs and errors.
  fn name(&self) -> &str;

  /// Produce the artifact for the tree at `root` and return its path.
  fn package(&self, root: &Path, metadata: &PackageMetadata) -> Result<PathBuf, PackagerError>;
}
