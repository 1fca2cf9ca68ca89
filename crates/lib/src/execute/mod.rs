//! Build step execution.
//!
//! Runs one component's action list, in order, inside its staging root.
//! Every string argument is placeholder-substituted first, against the
//! component's builtin values (`install_dir`, `project_dir`, `staging_dir`,
//! `name`, `version`). The first failing action aborts the component; what
//! earlier actions wrote stays in the staging root.

pub mod cmd;
pub mod env;
pub mod types;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::action::{ActionContext, BuildAction};
use crate::layout::LayoutAssembler;
use crate::placeholder::{self, PlaceholderError};

pub use env::BuildEnvironment;
pub use types::{ActionError, ActionFailure, ActionRecord, ComponentOutput};

/// Directories and identity of one component being built.
#[derive(Debug, Clone)]
pub struct ComponentWorkspace {
  pub name: String,
  pub version: String,
  pub project_dir: PathBuf,
  pub install_dir: PathBuf,
  layout: LayoutAssembler,
}

impl ComponentWorkspace {
  /// Create a fresh staging root for the component.
  pub fn create(
    name: impl Into<String>,
    version: impl Into<String>,
    staging_dir: &Path,
    project_dir: &Path,
    install_dir: &Path,
  ) -> Result<Self, ActionError> {
    Ok(Self {
      name: name.into(),
      version: version.into(),
      project_dir: project_dir.to_path_buf(),
      install_dir: install_dir.to_path_buf(),
      layout: LayoutAssembler::create(staging_dir, project_dir, install_dir)?,
    })
  }

  pub fn staging_dir(&self) -> &Path {
    self.layout.root()
  }

  pub fn layout(&self) -> &LayoutAssembler {
    &self.layout
  }

  /// Values available to `$${...}` placeholders in action arguments.
  pub fn placeholders(&self) -> BTreeMap<String, String> {
    BTreeMap::from([
      ("install_dir".to_string(), self.install_dir.display().to_string()),
      ("project_dir".to_string(), self.project_dir.display().to_string()),
      ("staging_dir".to_string(), self.staging_dir().display().to_string()),
      ("name".to_string(), self.name.clone()),
      ("version".to_string(), self.version.clone()),
    ])
  }

  /// Variables layered over the standard environment for shell commands.
  pub fn env_vars(&self) -> BTreeMap<String, String> {
    BTreeMap::from([
      ("STAGING_DIR".to_string(), self.staging_dir().display().to_string()),
      ("PROJECT_DIR".to_string(), self.project_dir.display().to_string()),
      ("INSTALL_DIR".to_string(), self.install_dir.display().to_string()),
      ("COMPONENT_NAME".to_string(), self.name.clone()),
      ("COMPONENT_VERSION".to_string(), self.version.clone()),
    ])
  }

  pub fn context(&self) -> ActionContext {
    ActionContext {
      component: self.name.clone(),
      version: self.version.clone(),
      staging_dir: self.staging_dir().to_path_buf(),
      project_dir: self.project_dir.clone(),
      install_dir: self.install_dir.clone(),
    }
  }
}

/// Executes action lists against component workspaces.
///
/// Cheap to clone; the standard environment is shared.
#[derive(Debug, Clone)]
pub struct BuildStepExecutor {
  env: Arc<BuildEnvironment>,
}

impl BuildStepExecutor {
  pub fn new(env: Arc<BuildEnvironment>) -> Self {
    Self { env }
  }

  /// Run `actions` in order.
  ///
  /// # Errors
  ///
  /// The first failing action, with its index and kind. Later actions do not run.
  pub async fn run(
    &self,
    actions: &[BuildAction],
    workspace: &ComponentWorkspace,
  ) -> Result<ComponentOutput, ActionFailure> {
    info!(component = %workspace.name, actions = actions.len(), "running build actions");

    let placeholders = workspace.placeholders();
    let mut output = ComponentOutput::default();

    for (index, action) in actions.iter().enumerate() {
      let kind = action.kind();
      debug!(component = %workspace.name, index, kind, action = %action, "executing action");

      let start = Instant::now();
      self
        .run_action(action, workspace, &placeholders, &mut output)
        .await
        .map_err(|error| ActionFailure { index, kind, error })?;

      output.actions.push(ActionRecord {
        index,
        kind,
        duration: start.elapsed(),
      });
    }

    info!(
      component = %workspace.name,
      declared = output.declared_paths.len(),
      "build actions complete"
    );
    Ok(output)
  }

  async fn run_action(
    &self,
    action: &BuildAction,
    workspace: &ComponentWorkspace,
    placeholders: &BTreeMap<String, String>,
    output: &mut ComponentOutput,
  ) -> Result<(), ActionError> {
    let sub = |value: &str| placeholder::substitute(value, placeholders);
    let layout = workspace.layout.clone();

    match action {
      BuildAction::MakeDirectory { path } => {
        let path = sub(path)?;
        blocking(move || layout.make_dir(&path).map(drop)).await
      }

      BuildAction::CopyFile { source, dest } => {
        let (source, dest) = (sub(source)?, sub(dest)?);
        let written = blocking(move || layout.copy_file(&source, &dest)).await?;
        for path in written {
          output.declare(path);
        }
        Ok(())
      }

      BuildAction::CreateSymlink { target, link } => {
        let (target, link) = (sub(target)?, sub(link)?);
        let created = blocking(move || {
          let path = layout.symlink(&target, &link)?;
          Ok(layout.relative(&path))
        })
        .await?;
        output.declare(created);
        Ok(())
      }

      BuildAction::RenderTemplate {
        source,
        dest,
        mode,
        variables,
      } => {
        let (source, dest, mode) = (sub(source)?, sub(dest)?, *mode);
        let variables = substitute_values(variables, placeholders)?;
        blocking(move || layout.render_template(&source, &dest, mode, &variables).map(drop)).await
      }

      BuildAction::RunCommand { command, env } => {
        let command = sub(command)?;
        let action_env = substitute_values(env, placeholders)?;
        let env = self.env.merged(&workspace.env_vars(), &action_env);
        cmd::execute_command(&command, &env, &workspace.project_dir).await.map(drop)
      }

      BuildAction::RunCallback(callback) => {
        let label = callback.label().to_string();
        let callback = callback.clone();
        let ctx = workspace.context();

        match tokio::task::spawn_blocking(move || callback.call(&ctx)).await {
          Ok(Ok(())) => Ok(()),
          Ok(Err(e)) => Err(ActionError::CallbackFailed {
            label,
            message: e.to_string(),
          }),
          Err(e) => Err(ActionError::CallbackFailed {
            label,
            message: if e.is_panic() {
              "callback panicked".to_string()
            } else {
              e.to_string()
            },
          }),
        }
      }

      BuildAction::Touch { path } => {
        let path = sub(path)?;
        blocking(move || layout.touch(&path).map(drop)).await
      }
    }
  }
}

fn substitute_values(
  values: &BTreeMap<String, String>,
  placeholders: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>, PlaceholderError> {
  values
    .iter()
    .map(|(k, v)| Ok((k.clone(), placeholder::substitute(v, placeholders)?)))
    .collect()
}

/// Run a filesystem primitive on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, ActionError>
where
  T: Send + 'static,
  F: FnOnce() -> Result<T, ActionError> + Send + 'static,
{
  tokio::task::spawn_blocking(f).await.map_err(|e| ActionError::Io {
    path: String::new(),
    message: format!("filesystem task failed: {e}"),
  })?
}
