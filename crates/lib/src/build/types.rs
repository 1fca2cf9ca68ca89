//! Types for project builds: configuration, state, errors and the report.

use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

use serde::Serialize;
use thiserror::Error;

use super::assemble::AssembleError;
use crate::dag::ResolveError;
use crate::execute::ActionFailure;
use crate::fetch::{FetchError, RetryConfig};
use crate::package::PackagerError;
use crate::platform::{Arch, paths};
use crate::project::ProjectSpecError;
use crate::select::SelectError;

/// Configuration for one project build.
#[derive(Debug, Clone)]
pub struct BuildConfig {
  /// Target architecture used to select source variants.
  pub arch: Arch,
  /// Maximum number of concurrent fetch or build tasks.
  pub parallelism: usize,
  /// Root for staging roots, prepared sources and the package root.
  pub work_dir: PathBuf,
  pub cache_dir: PathBuf,
  /// Keep staging roots and prepared sources after the run.
  pub keep_work_dir: bool,
  pub retry: RetryConfig,
}

impl BuildConfig {
  /// Defaults for the host: its architecture, all cores, the user cache directory.
  pub fn new(arch: Arch, work_dir: impl Into<PathBuf>) -> Self {
    Self {
      arch,
      parallelism: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
      work_dir: work_dir.into(),
      cache_dir: paths::artifact_cache_dir(),
      keep_work_dir: false,
      retry: RetryConfig::default(),
    }
  }
}

/// Where a project build is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectState {
  Resolving,
  Fetching,
  Building,
  Assembling,
  Done,
  Failed,
}

impl fmt::Display for ProjectState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      ProjectState::Resolving => "resolving",
      ProjectState::Fetching => "fetching",
      ProjectState::Building => "building",
      ProjectState::Assembling => "assembling",
      ProjectState::Done => "done",
      ProjectState::Failed => "failed",
    })
  }
}

/// Coarse category of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
  /// The inputs are wrong: cycles, unknown names, bad variants, bad options.
  Configuration,
  /// A downloaded artifact did not match its checksum.
  Integrity,
  /// A build step or the assembly of its output failed.
  Execution,
  /// Network or filesystem failure.
  Io,
}

impl fmt::Display for ErrorClass {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      ErrorClass::Configuration => "configuration",
      ErrorClass::Integrity => "integrity",
      ErrorClass::Execution => "execution",
      ErrorClass::Io => "io",
    })
  }
}

/// The underlying cause of a failed build.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
  #[error(transparent)]
  Project(#[from] ProjectSpecError),

  #[error(transparent)]
  Resolve(#[from] ResolveError),

  #[error(transparent)]
  Select(#[from] SelectError),

  #[error(transparent)]
  Fetch(#[from] FetchError),

  #[error(transparent)]
  Action(#[from] ActionFailure),

  #[error(transparent)]
  Assemble(#[from] AssembleError),

  #[error(transparent)]
  Package(#[from] PackagerError),

  #[error("build cancelled")]
  Cancelled,

  /// A worker task died without reporting a result.
  #[error("internal error: {0}")]
  Internal(String),
}

/// First error of a failed build, with where it happened.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ProjectError {
  pub component: Option<String>,
  pub phase: ProjectState,
  #[source]
  pub kind: ErrorKind,
}

impl ProjectError {
  pub fn new(phase: ProjectState, component: Option<&str>, kind: impl Into<ErrorKind>) -> Self {
    Self {
      component: component.map(str::to_string),
      phase,
      kind: kind.into(),
    }
  }

  pub fn class(&self) -> ErrorClass {
    use crate::execute::ActionError;

    match &self.kind {
      ErrorKind::Project(_) | ErrorKind::Resolve(_) | ErrorKind::Select(_) => ErrorClass::Configuration,
      ErrorKind::Fetch(e) => match e {
        FetchError::ChecksumMismatch { .. } => ErrorClass::Integrity,
        FetchError::MissingChecksum { .. }
        | FetchError::InvalidChecksum { .. }
        | FetchError::InvalidUrl { .. }
        | FetchError::MissingLocalSource { .. }
        | FetchError::RelativePathNotFound { .. } => ErrorClass::Configuration,
        _ => ErrorClass::Io,
      },
      ErrorKind::Action(failure) => match failure.error {
        ActionError::Io { .. } => ErrorClass::Io,
        _ => ErrorClass::Execution,
      },
      ErrorKind::Assemble(AssembleError::DestinationCollision { .. }) => ErrorClass::Execution,
      ErrorKind::Assemble(_) => ErrorClass::Io,
      ErrorKind::Package(PackagerError::UnsupportedCompression { .. }) => ErrorClass::Configuration,
      ErrorKind::Package(_) => ErrorClass::Io,
      ErrorKind::Cancelled | ErrorKind::Internal(_) => ErrorClass::Execution,
    }
  }
}

impl fmt::Display for ProjectError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.component {
      Some(component) => write!(f, "{} failed for component '{component}': {}", self.phase, self.kind),
      None => write!(f, "{} failed: {}", self.phase, self.kind),
    }
  }
}

/// A state the build entered, and when.
#[derive(Debug, Clone, Serialize)]
pub struct StateTransition {
  pub state: ProjectState,
  pub at: SystemTime,
}

/// What happened to one component.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentRecord {
  pub name: String,
  pub version: String,
  /// The selected source location.
  pub source: String,
  pub project_dir: PathBuf,
  pub started_at: SystemTime,
  pub finished_at: SystemTime,
  pub actions: usize,
  pub declared_paths: usize,
}

/// Outcome of a project build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
  pub project: String,
  pub version: String,
  pub arch: Arch,
  pub state: ProjectState,
  pub transitions: Vec<StateTransition>,
  /// Components in resolved build order.
  pub build_order: Vec<String>,
  /// Built components, in completion order.
  pub components: Vec<ComponentRecord>,
  pub package_root: Option<PathBuf>,
  pub tree_digest: Option<String>,
  pub artifact: Option<PathBuf>,
  #[serde(skip)]
  pub error: Option<ProjectError>,
}

impl BuildReport {
  pub(crate) fn new(project: &str, version: &str, arch: Arch) -> Self {
    Self {
      project: project.to_string(),
      version: version.to_string(),
      arch,
      state: ProjectState::Resolving,
      transitions: Vec::new(),
      build_order: Vec::new(),
      components: Vec::new(),
      package_root: None,
      tree_digest: None,
      artifact: None,
      error: None,
    }
  }

  pub(crate) fn enter(&mut self, state: ProjectState) {
    self.state = state;
    self.transitions.push(StateTransition {
      state,
      at: SystemTime::now(),
    });
  }

  pub fn is_success(&self) -> bool {
    self.state == ProjectState::Done
  }

  /// States entered, in order.
  pub fn states(&self) -> Vec<ProjectState> {
    self.transitions.iter().map(|t| t.state).collect()
  }

  pub fn component(&self, name: &str) -> Option<&ComponentRecord> {
    self.components.iter().find(|c| c.name == name)
  }

  /// The failure, if the build failed.
  pub fn error(&self) -> Option<&ProjectError> {
    self.error.as_ref()
  }
}
