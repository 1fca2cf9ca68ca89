//! Raw TOML shapes of a project manifest.
//!
//! These mirror the file format one-to-one. [`super::Manifest`] turns them
//! into [`ProjectSpec`](crate::project::ProjectSpec) and
//! [`ComponentSpec`](crate::component::ComponentSpec) values.

use std::path::PathBuf;

use serde::Deserialize;

use crate::action::BuildAction;
use crate::component::{ArchPredicate, Checksum};
use crate::project::PackageOptions;

/// A whole manifest file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ManifestDocument {
  pub project: ProjectTable,
  #[serde(default, rename = "component")]
  pub components: Vec<ComponentTable>,
}

/// The `[project]` table.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ProjectTable {
  pub name: String,
  pub version: String,
  pub friendly_name: Option<String>,
  #[serde(default)]
  pub maintainer: String,
  pub license: Option<String>,
  pub homepage: Option<String>,
  pub build_iteration: Option<u32>,
  pub install_dir: Option<PathBuf>,
  #[serde(default)]
  pub components: Vec<String>,
  #[serde(default)]
  pub runtime_requirements: Vec<String>,
  #[serde(default)]
  pub package: PackageOptions,
}

/// One `[[component]]` entry.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ComponentTable {
  pub name: String,
  pub version: String,
  pub license: Option<String>,
  pub license_file: Option<String>,
  pub relative_path: Option<String>,
  #[serde(default)]
  pub depends_on: Vec<String>,
  #[serde(default, rename = "source")]
  pub sources: Vec<SourceTable>,
  #[serde(default, rename = "action")]
  pub actions: Vec<BuildAction>,
}

/// One `[[component.source]]` entry.
///
/// Exactly one of `url` and `path` is set. Remote sources take a checksum
/// either as a `checksum = { algorithm, digest }` table or through one of the
/// `sha256`, `sha512` and `md5` shorthands.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SourceTable {
  #[serde(default)]
  pub arch: ArchPredicate,
  pub url: Option<String>,
  pub path: Option<PathBuf>,
  pub checksum: Option<Checksum>,
  pub sha256: Option<String>,
  pub sha512: Option<String>,
  pub md5: Option<String>,
}
