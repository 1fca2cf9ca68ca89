use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

/// Signature of an inline callback.
pub type CallbackFn = dyn Fn(&ActionContext) -> std::io::Result<()> + Send + Sync;

/// Everything a callback may need to know about the component being built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionContext {
  pub component: String,
  pub version: String,
  pub staging_dir: PathBuf,
  pub project_dir: PathBuf,
  pub install_dir: PathBuf,
}

/// Opaque side-effecting function run as a build step.
///
/// Two callbacks compare equal only if they share the same function.
#[derive(Clone)]
pub struct Callback {
  label: String,
  func: Arc<CallbackFn>,
}

impl Callback {
  pub fn new(
    label: impl Into<String>,
    func: impl Fn(&ActionContext) -> std::io::Result<()> + Send + Sync + 'static,
  ) -> Self {
    Self {
      label: label.into(),
      func: Arc::new(func),
    }
  }

  pub fn label(&self) -> &str {
    &self.label
  }

  pub fn call(&self, ctx: &ActionContext) -> std::io::Result<()> {
    (self.func)(ctx)
  }
}

impl fmt::Debug for Callback {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Callback").field("label", &self.label).finish_non_exhaustive()
  }
}

impl PartialEq for Callback {
  fn eq(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.func, &other.func)
  }
}

/// One primitive, ordered build step.
///
/// Destination paths (`path`, `dest`, `link`) resolve against the component's
/// staging root and may not leave it. Source paths (`source`) resolve against
/// the component's project directory when relative.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BuildAction {
  /// Create a directory and its parents.
  MakeDirectory { path: String },

  /// Copy a file, or a directory recursively. Copying into an existing
  /// directory keeps the source's file name.
  CopyFile { source: String, dest: String },

  /// Create a symlink at `link` pointing to `target`. The target need not exist.
  CreateSymlink { target: String, link: String },

  /// Substitute `variables` into the template at `source` and write `dest`.
  RenderTemplate {
    source: String,
    dest: String,
    #[serde(default)]
    mode: Option<u32>,
    #[serde(default)]
    variables: BTreeMap<String, String>,
  },

  /// Run a shell command in the project directory.
  RunCommand {
    command: String,
    #[serde(default)]
    env: BTreeMap<String, String>,
  },

  /// Run an inline callback. Not expressible in a manifest.
  #[serde(skip)]
  RunCallback(Callback),

  /// Create an empty file, or leave an existing one alone.
  Touch { path: String },
}

impl BuildAction {
  /// Short name of the action kind, used in logs and errors.
  pub fn kind(&self) -> &'static str {
    match self {
      BuildAction::MakeDirectory { .. } => "make_directory",
      BuildAction::CopyFile { .. } => "copy_file",
      BuildAction::CreateSymlink { .. } => "create_symlink",
      BuildAction::RenderTemplate { .. } => "render_template",
      BuildAction::RunCommand { .. } => "run_command",
      BuildAction::RunCallback(_) => "run_callback",
      BuildAction::Touch { .. } => "touch",
    }
  }
}

impl fmt::Display for BuildAction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BuildAction::MakeDirectory { path } => write!(f, "mkdir {path}"),
      BuildAction::CopyFile { source, dest } => write!(f, "copy {source} -> {dest}"),
      BuildAction::CreateSymlink { target, link } => write!(f, "link {link} -> {target}"),
      BuildAction::RenderTemplate { source, dest, .. } => write!(f, "render {source} -> {dest}"),
      BuildAction::RunCommand { command, .. } => write!(f, "command `{command}`"),
      BuildAction::RunCallback(callback) => write!(f, "callback {}", callback.label()),
      BuildAction::Touch { path } => write!(f, "touch {path}"),
    }
  }
}
