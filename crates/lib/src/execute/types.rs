//! Types for build step execution.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::placeholder::PlaceholderError;

/// Failure of a single build action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
  /// A copy or template source does not exist.
  #[error("source not found: {path}")]
  MissingSource { path: String },

  /// The filesystem refused an operation.
  #[error("permission denied: {path}: {message}")]
  PermissionDenied { path: String, message: String },

  /// A shell command exited unsuccessfully. `exit_code` is `None` when killed by a signal.
  #[error("command failed with exit code {exit_code:?}: {command}")]
  CommandFailed {
    command: String,
    exit_code: Option<i32>,
    stderr: String,
  },

  /// A template could not be rendered.
  #[error("failed to render template {template}: {message}")]
  TemplateRenderError { template: String, message: String },

  /// A destination path resolves outside the staging root.
  #[error("path {path} escapes staging root {root}")]
  PathEscape { path: String, root: String },

  /// A placeholder in an action argument could not be resolved.
  #[error("placeholder error: {0}")]
  Placeholder(#[from] PlaceholderError),

  /// An inline callback returned an error or panicked.
  #[error("callback '{label}' failed: {message}")]
  CallbackFailed { label: String, message: String },

  /// Any other I/O failure.
  #[error("io error at {path}: {message}")]
  Io { path: String, message: String },
}

impl ActionError {
  /// Classify an I/O error raised while operating on `path`.
  pub fn io(path: &Path, err: std::io::Error) -> Self {
    let path = path.display().to_string();
    match err.kind() {
      std::io::ErrorKind::PermissionDenied => ActionError::PermissionDenied {
        path,
        message: err.to_string(),
      },
      _ => ActionError::Io {
        path,
        message: err.to_string(),
      },
    }
  }
}

/// A failed action together with its position in the component's list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("action #{index} ({kind}) failed: {error}")]
pub struct ActionFailure {
  pub index: usize,
  pub kind: &'static str,
  #[source]
  pub error: ActionError,
}

/// Timing of one completed action.
#[derive(Debug, Clone)]
pub struct ActionRecord {
  pub index: usize,
  pub kind: &'static str,
  pub duration: Duration,
}

/// What a component's build produced.
#[derive(Debug, Clone, Default)]
pub struct ComponentOutput {
  /// Staging-relative paths written by `CopyFile` and `CreateSymlink`.
  pub declared_paths: Vec<PathBuf>,

  pub actions: Vec<ActionRecord>,
}

impl ComponentOutput {
  pub(crate) fn declare(&mut self, path: PathBuf) {
    if !self.declared_paths.contains(&path) {
      self.declared_paths.push(path);
    }
  }
}
