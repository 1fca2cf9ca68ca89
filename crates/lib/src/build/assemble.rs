//! Assembly of built components into the package root.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::execute::{ActionError, ComponentOutput, ComponentWorkspace};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssembleError {
  /// Two components declared the same destination through `CopyFile` or `CreateSymlink`.
  #[error("components '{first}' and '{second}' both declare {path}")]
  DestinationCollision {
    path: String,
    first: String,
    second: String,
  },

  #[error("failed to merge component '{component}': {error}")]
  Merge { component: String, error: ActionError },

  #[error("failed to fingerprint package root: {0}")]
  Digest(String),

  #[error("io error at {path}: {message}")]
  Io { path: String, message: String },
}

/// Fail if two components declared the same staging-relative path.
///
/// `outputs` must be in build order; the reported pair is the earliest
/// declarer and the first later component to repeat it.
pub fn check_collisions<'a>(
  outputs: impl IntoIterator<Item = (&'a str, &'a ComponentOutput)>,
) -> Result<(), AssembleError> {
  let mut owners: HashMap<&Path, &str> = HashMap::new();

  for (component, output) in outputs {
    for path in &output.declared_paths {
      if let Some(first) = owners.get(path.as_path()) {
        if *first != component {
          return Err(AssembleError::DestinationCollision {
            path: path.display().to_string(),
            first: first.to_string(),
            second: component.to_string(),
          });
        }
        continue;
      }
      owners.insert(path.as_path(), component);
    }
  }

  Ok(())
}

/// Merge staging roots, in build order, into `install_root`.
///
/// Undeclared overlaps (a command or template writing the same file as an
/// earlier component) are resolved in favour of the later component.
pub fn merge_components(workspaces: &[ComponentWorkspace], install_root: &Path) -> Result<usize, AssembleError> {
  let mut files = 0;

  for workspace in workspaces {
    let summary = workspace
      .layout()
      .merge_into(install_root)
      .map_err(|error| AssembleError::Merge {
        component: workspace.name.clone(),
        error,
      })?;

    for path in &summary.replaced {
      warn!(component = %workspace.name, path = ?path, "overwrote file from an earlier component");
    }
    debug!(component = %workspace.name, files = summary.files, "merged staging root");
    files += summary.files;
  }

  Ok(files)
}

/// Create an empty package root with the install directory inside it.
pub fn prepare_package_root(package_root: &Path, install_relative: &Path) -> Result<PathBuf, AssembleError> {
  let io = |path: &Path, e: std::io::Error| AssembleError::Io {
    path: path.display().to_string(),
    message: e.to_string(),
  };

  if package_root.exists() {
    std::fs::remove_dir_all(package_root).map_err(|e| io(package_root, e))?;
  }
  let install_root = package_root.join(install_relative);
  std::fs::create_dir_all(&install_root).map_err(|e| io(&install_root, e))?;
  Ok(install_root)
}
