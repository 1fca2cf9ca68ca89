//! Top-level project declaration: which components make up one package.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::component::is_path_safe_name;
use crate::consts::DEFAULT_INSTALL_PREFIX;

/// Compression the packager is asked to apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
  Xz,
  #[default]
  Gzip,
  None,
}

impl fmt::Display for CompressionType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      CompressionType::Xz => "xz",
      CompressionType::Gzip => "gzip",
      CompressionType::None => "none",
    })
  }
}

/// Options passed through to the packager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageOptions {
  pub compression_type: CompressionType,
  pub compression_level: u32,
}

impl Default for PackageOptions {
  fn default() -> Self {
    Self {
      compression_type: CompressionType::Gzip,
      compression_level: 6,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProjectSpecError {
  #[error("project name must not be empty")]
  EmptyName,

  /// Name and version form the artifact file name.
  #[error("project {field} '{value}' must not be '.', '..' or contain a path separator")]
  UnsafeName { field: &'static str, value: String },

  #[error("install_dir must be absolute: {0}")]
  RelativeInstallDir(String),

  #[error("compression_level must be between 1 and 9, got {0}")]
  CompressionLevel(u32),

  #[error("project requests no components")]
  NoComponents,

  #[error("component '{0}' requested more than once")]
  DuplicateComponent(String),
}

/// A named set of components plus the metadata of the package they form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSpec {
  pub name: String,
  pub version: String,
  pub friendly_name: Option<String>,
  pub maintainer: String,
  pub license: Option<String>,
  pub homepage: Option<String>,
  pub build_iteration: u32,
  /// Absolute path the finished tree is installed to on the target system.
  pub install_dir: PathBuf,
  /// Requested components, in declaration order.
  pub component_names: Vec<String>,
  pub package_options: PackageOptions,
  /// Runtime dependencies recorded in the package, not built here.
  pub runtime_requirements: Vec<String>,
}

impl ProjectSpec {
  pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
    let name = name.into();
    let install_dir = Path::new(DEFAULT_INSTALL_PREFIX).join(&name);
    Self {
      name,
      version: version.into(),
      friendly_name: None,
      maintainer: String::new(),
      license: None,
      homepage: None,
      build_iteration: 1,
      install_dir,
      component_names: Vec::new(),
      package_options: PackageOptions::default(),
      runtime_requirements: Vec::new(),
    }
  }

  pub fn with_component(mut self, name: impl Into<String>) -> Self {
    self.component_names.push(name.into());
    self
  }

  pub fn with_install_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.install_dir = dir.into();
    self
  }

  /// Check invariants that do not depend on the component registry.
  pub fn validate(&self) -> Result<(), ProjectSpecError> {
    if self.name.trim().is_empty() {
      return Err(ProjectSpecError::EmptyName);
    }
    for (field, value) in [("name", &self.name), ("version", &self.version)] {
      if !is_path_safe_name(value) {
        return Err(ProjectSpecError::UnsafeName {
          field,
          value: value.clone(),
        });
      }
    }
    if !self.install_dir.is_absolute() {
      return Err(ProjectSpecError::RelativeInstallDir(
        self.install_dir.display().to_string(),
      ));
    }
    if !(1..=9).contains(&self.package_options.compression_level) {
      return Err(ProjectSpecError::CompressionLevel(self.package_options.compression_level));
    }
    if self.component_names.is_empty() {
      return Err(ProjectSpecError::NoComponents);
    }
    for (i, name) in self.component_names.iter().enumerate() {
      if self.component_names[..i].contains(name) {
        return Err(ProjectSpecError::DuplicateComponent(name.clone()));
      }
    }
    Ok(())
  }

  /// The install dir as a path relative to the package root.
  pub fn install_dir_relative(&self) -> PathBuf {
    self.install_dir.components().filter(|c| matches!(c, std::path::Component::Normal(_))).collect()
  }
}
