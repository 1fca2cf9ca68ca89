//! TOML project manifests.
//!
//! A manifest declares one `[project]` and any number of `[[component]]`
//! entries:
//!
//! ```toml
//! [project]
//! name = "gemfast"
//! version = "1.0.0"
//! components = ["gemfast"]
//!
//! [[component]]
//! name = "caddy"
//! version = "2.6.2"
//!
//! [[component.source]]
//! arch = { one_of = ["amd64"] }
//! url = "https://example.com/caddy_2.6.2_linux_amd64.tar.gz"
//! sha256 = "..."
//!
//! [[component.action]]
//! type = "make_directory"
//! path = "embedded/bin"
//! ```
//!
//! Relative source paths resolve against the manifest's directory. A
//! component defined twice keeps its last definition.

mod types;

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::component::{Checksum, ComponentRegistry, ComponentSpec, SourceLocation, SourceVariant};
use crate::project::ProjectSpec;
use crate::util::hash::HashAlgorithm;

use types::{ComponentTable, ManifestDocument, SourceTable};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestError {
  #[error("failed to read manifest {path}: {message}")]
  Read { path: String, message: String },

  #[error("invalid manifest {path}: {message}")]
  Parse { path: String, message: String },

  #[error("component '{component}' source #{index}: {message}")]
  InvalidSource {
    component: String,
    index: usize,
    message: String,
  },

  #[error("component '{component}' is local_source but source #{index} is not a local path")]
  LocalSourceNotPath { component: String, index: usize },
}

/// A loaded manifest: the project plus every component it defines.
#[derive(Debug, Clone)]
pub struct Manifest {
  pub project: ProjectSpec,
  pub registry: ComponentRegistry,
}

impl Manifest {
  /// Load a manifest file.
  pub fn from_path(path: &Path) -> Result<Self, ManifestError> {
    let content = std::fs::read_to_string(path).map_err(|e| ManifestError::Read {
      path: path.display().to_string(),
      message: e.to_string(),
    })?;
    let base = path.parent().unwrap_or(Path::new("."));
    Self::parse(&content, base, &path.display().to_string())
  }

  /// Parse manifest text, resolving relative source paths against `base`.
  pub fn from_str_with_base(content: &str, base: &Path) -> Result<Self, ManifestError> {
    Self::parse(content, base, "<string>")
  }

  fn parse(content: &str, base: &Path, origin: &str) -> Result<Self, ManifestError> {
    let doc: ManifestDocument = toml::from_str(content).map_err(|e| ManifestError::Parse {
      path: origin.to_string(),
      message: e.to_string(),
    })?;

    let table = doc.project;
    let mut project = ProjectSpec::new(table.name, table.version);
    project.friendly_name = table.friendly_name;
    project.maintainer = table.maintainer;
    project.license = table.license;
    project.homepage = table.homepage;
    if let Some(iteration) = table.build_iteration {
      project.build_iteration = iteration;
    }
    if let Some(dir) = table.install_dir {
      project.install_dir = dir;
    }
    project.component_names = table.components;
    project.runtime_requirements = table.runtime_requirements;
    project.package_options = table.package;

    let mut registry = ComponentRegistry::new();
    for component in doc.components {
      registry.insert(component_spec(component, base)?);
    }

    debug!(
      manifest = origin,
      project = %project.name,
      components = registry.len(),
      "loaded manifest"
    );
    Ok(Self { project, registry })
  }
}

fn component_spec(table: ComponentTable, base: &Path) -> Result<ComponentSpec, ManifestError> {
  let mut spec = ComponentSpec::new(table.name, table.version);
  spec.license = table.license;
  spec.license_file = table.license_file;
  spec.relative_path = table.relative_path;
  for dep in table.depends_on {
    spec.add_dependency(dep);
  }
  spec.actions = table.actions;

  for (index, source) in table.sources.into_iter().enumerate() {
    let variant = source_variant(&spec.name, index, source, base)?;
    if spec.is_local_source() && !variant.location.is_local() {
      return Err(ManifestError::LocalSourceNotPath {
        component: spec.name,
        index,
      });
    }
    spec.sources.push(variant);
  }

  Ok(spec)
}

fn source_variant(
  component: &str,
  index: usize,
  table: SourceTable,
  base: &Path,
) -> Result<SourceVariant, ManifestError> {
  let invalid = |message: &str| ManifestError::InvalidSource {
    component: component.to_string(),
    index,
    message: message.to_string(),
  };

  let mut checksums: Vec<Checksum> = table.checksum.into_iter().collect();
  for (algorithm, digest) in [
    (HashAlgorithm::Sha256, table.sha256),
    (HashAlgorithm::Sha512, table.sha512),
    (HashAlgorithm::Md5, table.md5),
  ] {
    if let Some(digest) = digest {
      checksums.push(Checksum::new(algorithm, digest));
    }
  }
  if checksums.len() > 1 {
    return Err(invalid("more than one checksum given"));
  }
  let checksum = checksums.pop().map(|c| Checksum::new(c.algorithm, c.digest));

  let location = match (table.url, table.path) {
    (Some(url), None) => SourceLocation::Url(url),
    (None, Some(path)) => {
      if checksum.is_some() {
        return Err(invalid("local path sources take no checksum"));
      }
      SourceLocation::Path(resolve_path(base, path))
    }
    (Some(_), Some(_)) => return Err(invalid("both url and path given")),
    (None, None) => return Err(invalid("one of url or path is required")),
  };

  Ok(SourceVariant {
    arch: table.arch,
    location,
    checksum,
  })
}

fn resolve_path(base: &Path, path: PathBuf) -> PathBuf {
  if path.is_absolute() { path } else { base.join(path) }
}
