//! Project builds.
//!
//! [`ProjectBuilder`] drives a project through
//! `Resolving -> Fetching -> Building -> Assembling -> Done | Failed`:
//!
//! 1. Resolve the requested components and select one source variant each
//! 2. Fetch and prepare every source concurrently
//! 3. Build components in dependency waves
//! 4. Merge staging roots into the package root and hand it to the [`Packager`]
//!
//! Fetch and build tasks share one worker pool sized by
//! [`BuildConfig::parallelism`]. The first failure stops scheduling; tasks
//! already running finish before the build reports `Failed`.

pub mod assemble;
mod types;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::component::{ComponentRegistry, ComponentSpec, SourceVariant};
use crate::consts::PACKAGE_ROOT_DIR;
use crate::dag::{DependencyResolver, ResolvedGraph};
use crate::execute::{BuildEnvironment, BuildStepExecutor, ComponentOutput, ComponentWorkspace};
use crate::fetch::{self, SourceFetcher};
use crate::package::{PackageMetadata, Packager};
use crate::platform::Arch;
use crate::project::ProjectSpec;
use crate::select::ArchitectureSelector;
use crate::util::hash::hash_directory;

pub use assemble::AssembleError;
pub use types::*;

/// One component of a [`BuildPlan`].
#[derive(Debug, Clone, Serialize)]
pub struct PlannedComponent {
  pub name: String,
  pub version: String,
  /// The selected source location.
  pub source: String,
  pub depends_on: Vec<String>,
}

/// Build order and source selection for a project, computed without any I/O.
#[derive(Debug, Clone, Serialize)]
pub struct BuildPlan {
  pub project: String,
  pub arch: Arch,
  /// Components in build order.
  pub components: Vec<PlannedComponent>,
  /// Component names grouped into parallel build waves.
  pub waves: Vec<Vec<String>>,
}

/// Result of a spawned fetch or build task: its position in build order and outcome.
type TaskResult<T> = (usize, Result<T, ProjectError>);

/// Drives project builds.
pub struct ProjectBuilder {
  config: BuildConfig,
  packager: Arc<dyn Packager>,
  cancel: Arc<AtomicBool>,
}

impl ProjectBuilder {
  pub fn new(config: BuildConfig, packager: Arc<dyn Packager>) -> Self {
    Self {
      config,
      packager,
      cancel: Arc::new(AtomicBool::new(false)),
    }
  }

  pub fn config(&self) -> &BuildConfig {
    &self.config
  }

  /// Flag that, once set, stops tasks that have not yet started.
  pub fn cancel_handle(&self) -> Arc<AtomicBool> {
    self.cancel.clone()
  }

  /// Resolve and select sources for `project` without fetching or building anything.
  pub fn plan(project: &ProjectSpec, registry: &ComponentRegistry, arch: Arch) -> Result<BuildPlan, ProjectError> {
    let (graph, variants) = resolve(project, registry, arch)?;
    let names = graph.names();

    let components = graph
      .components()
      .iter()
      .zip(&variants)
      .map(|(component, variant)| PlannedComponent {
        name: component.name.clone(),
        version: component.version.clone(),
        source: variant.location.to_string(),
        depends_on: component.depends_on.clone(),
      })
      .collect();
    let waves = graph
      .waves()
      .into_iter()
      .map(|wave| wave.into_iter().map(|i| names[i].to_string()).collect())
      .collect();

    Ok(BuildPlan {
      project: project.name.clone(),
      arch,
      components,
      waves,
    })
  }

  /// Build `project` from the components in `registry`.
  ///
  /// Never returns early with an error: the outcome, including the first
  /// failure, is in the report.
  pub async fn build(&self, project: &ProjectSpec, registry: &ComponentRegistry) -> BuildReport {
    let mut report = BuildReport::new(&project.name, &project.version, self.config.arch);
    info!(
      project = %project.name,
      version = %project.version,
      arch = %self.config.arch,
      work_dir = ?self.config.work_dir,
      "starting project build"
    );

    match self.run(project, registry, &mut report).await {
      Ok(()) => {
        transition(&mut report, ProjectState::Done);
        info!(
          project = %project.name,
          components = report.components.len(),
          artifact = ?report.artifact,
          "project build complete"
        );
      }
      Err(e) => {
        error!(
          project = %project.name,
          phase = %e.phase,
          component = e.component.as_deref().unwrap_or("-"),
          error = %e.kind,
          "project build failed"
        );
        report.error = Some(e);
        transition(&mut report, ProjectState::Failed);
      }
    }

    self.cleanup();
    report
  }

  async fn run(
    &self,
    project: &ProjectSpec,
    registry: &ComponentRegistry,
    report: &mut BuildReport,
  ) -> Result<(), ProjectError> {
    transition(report, ProjectState::Resolving);
    let (graph, variants) = resolve(project, registry, self.config.arch)?;
    report.build_order = graph.names().iter().map(|n| n.to_string()).collect();

    let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
    // Set on the first failure so queued tasks stand down.
    let abort = Arc::new(AtomicBool::new(false));

    transition(report, ProjectState::Fetching);
    let project_dirs = self.fetch_all(&graph, &variants, &semaphore, &abort).await?;

    transition(report, ProjectState::Building);
    let built = self
      .build_all(project, &graph, &variants, &project_dirs, &semaphore, &abort, report)
      .await?;

    transition(report, ProjectState::Assembling);
    self.assemble(project, &graph, built, report).await
  }

  async fn fetch_all(
    &self,
    graph: &ResolvedGraph,
    variants: &[SourceVariant],
    semaphore: &Arc<Semaphore>,
    abort: &Arc<AtomicBool>,
  ) -> Result<Vec<PathBuf>, ProjectError> {
    let phase = ProjectState::Fetching;
    let src_root = self.config.work_dir.join("src");
    std::fs::create_dir_all(&src_root)
      .map_err(|e| ProjectError::new(phase, None, fetch::FetchError::io(&src_root, e)))?;

    let fetcher = Arc::new(
      SourceFetcher::new(&self.config.cache_dir, self.config.retry.clone())
        .map_err(|e| ProjectError::new(phase, None, e))?,
    );

    let mut join_set = JoinSet::new();
    for (index, (component, variant)) in graph.components().iter().zip(variants).enumerate() {
      let name = component.name.clone();
      let relative_path = component.relative_path.clone();
      let variant = variant.clone();
      let source_dir = src_root.join(&name);
      let fetcher = fetcher.clone();
      let semaphore = semaphore.clone();
      let stop = self.stop_flags(abort);

      join_set.spawn(async move {
        let result: Result<PathBuf, ProjectError> = async {
          let _permit = acquire(&semaphore, &stop, phase, &name).await?;

          info!(component = %name, source = %variant.location, "fetching source");
          let artifact = fetcher
            .resolve(&variant)
            .await
            .map_err(|e| ProjectError::new(phase, Some(name.as_str()), e))?;

          let prepared = tokio::task::spawn_blocking(move || {
            fetch::prepare_source(&artifact, &source_dir, relative_path.as_deref())
          })
          .await
          .map_err(|e| ProjectError::new(phase, Some(name.as_str()), ErrorKind::Internal(e.to_string())))?
          .map_err(|e| ProjectError::new(phase, Some(name.as_str()), e))?;

          debug!(component = %name, project_dir = ?prepared, "source ready");
          Ok(prepared)
        }
        .await;
        (index, result)
      });
    }

    let mut results = drain(join_set, abort, phase).await?;
    results.sort_by_key(|(index, _)| *index);
    Ok(results.into_iter().map(|(_, dir)| dir).collect())
  }

  #[allow(clippy::too_many_arguments)]
  async fn build_all(
    &self,
    project: &ProjectSpec,
    graph: &ResolvedGraph,
    variants: &[SourceVariant],
    project_dirs: &[PathBuf],
    semaphore: &Arc<Semaphore>,
    abort: &Arc<AtomicBool>,
    report: &mut BuildReport,
  ) -> Result<Vec<(ComponentWorkspace, ComponentOutput)>, ProjectError> {
    let phase = ProjectState::Building;
    let staging_root = self.config.work_dir.join("staging");
    let executor = BuildStepExecutor::new(Arc::new(BuildEnvironment::standard(&project.install_dir)));

    let waves = graph.waves();
    info!(wave_count = waves.len(), "computed build waves");

    let mut built: Vec<Option<(ComponentWorkspace, ComponentOutput)>> = vec![None; graph.components().len()];

    for (wave_idx, wave) in waves.into_iter().enumerate() {
      debug!(wave = wave_idx, components = wave.len(), "building wave");

      let mut join_set = JoinSet::new();
      for index in wave {
        let component: ComponentSpec = graph.components()[index].clone();
        let source = variants[index].location.to_string();
        let project_dir = project_dirs[index].clone();
        let staging_dir = staging_root.join(&component.name);
        let install_dir = project.install_dir.clone();
        let executor = executor.clone();
        let semaphore = semaphore.clone();
        let stop = self.stop_flags(abort);

        join_set.spawn(async move {
          let result: Result<_, ProjectError> = async {
            let name = component.name.as_str();
            let _permit = acquire(&semaphore, &stop, phase, name).await?;

            let started_at = SystemTime::now();
            info!(component = %name, version = %component.version, "building component");

            let workspace =
              ComponentWorkspace::create(name, &component.version, &staging_dir, &project_dir, &install_dir)
                .map_err(|e| ProjectError::new(phase, Some(name), ErrorKind::Action(setup_failure(e))))?;
            let output = executor
              .run(&component.actions, &workspace)
              .await
              .map_err(|e| ProjectError::new(phase, Some(name), e))?;

            let record = ComponentRecord {
              name: component.name.clone(),
              version: component.version.clone(),
              source,
              project_dir,
              started_at,
              finished_at: SystemTime::now(),
              actions: output.actions.len(),
              declared_paths: output.declared_paths.len(),
            };
            info!(component = %name, "component built");
            Ok((workspace, output, record))
          }
          .await;
          (index, result)
        });
      }

      for (index, (workspace, output, record)) in drain(join_set, abort, phase).await? {
        report.components.push(record);
        built[index] = Some((workspace, output));
      }
    }

    built
      .into_iter()
      .enumerate()
      .map(|(index, slot)| {
        slot.ok_or_else(|| {
          let name = graph.components()[index].name.as_str();
          ProjectError::new(phase, Some(name), ErrorKind::Internal("component produced no output".into()))
        })
      })
      .collect()
  }

  async fn assemble(
    &self,
    project: &ProjectSpec,
    graph: &ResolvedGraph,
    built: Vec<(ComponentWorkspace, ComponentOutput)>,
    report: &mut BuildReport,
  ) -> Result<(), ProjectError> {
    let phase = ProjectState::Assembling;

    assemble::check_collisions(built.iter().map(|(ws, output)| (ws.name.as_str(), output))).map_err(|e| {
      let component = match &e {
        AssembleError::DestinationCollision { second, .. } => Some(second.clone()),
        _ => None,
      };
      ProjectError {
        component,
        phase,
        kind: e.into(),
      }
    })?;

    let package_root = self.config.work_dir.join(PACKAGE_ROOT_DIR);
    let install_relative = project.install_dir_relative();
    let workspaces: Vec<ComponentWorkspace> = built.into_iter().map(|(ws, _)| ws).collect();

    let merge_root = package_root.clone();
    let (files, digest) = tokio::task::spawn_blocking(move || {
      let install_root = assemble::prepare_package_root(&merge_root, &install_relative)?;
      let files = assemble::merge_components(&workspaces, &install_root)?;
      let digest = hash_directory(&merge_root, &[]).map_err(|e| AssembleError::Digest(e.to_string()))?;
      Ok::<_, AssembleError>((files, digest))
    })
    .await
    .map_err(|e| ProjectError::new(phase, None, ErrorKind::Internal(e.to_string())))?
    .map_err(|e| {
      let component = match &e {
        AssembleError::Merge { component, .. } => Some(component.clone()),
        _ => None,
      };
      ProjectError {
        component,
        phase,
        kind: e.into(),
      }
    })?;

    info!(files, digest = %digest, package_root = ?package_root, "assembled package root");
    report.package_root = Some(package_root.clone());
    report.tree_digest = Some(digest.0.clone());

    let mut metadata = PackageMetadata::new(project, self.config.arch, graph.components());
    metadata.tree_digest = Some(digest.0);

    let packager = self.packager.clone();
    info!(packager = packager.name(), "packaging");
    let artifact = tokio::task::spawn_blocking(move || packager.package(&package_root, &metadata))
      .await
      .map_err(|e| ProjectError::new(phase, None, ErrorKind::Internal(e.to_string())))?
      .map_err(|e| ProjectError::new(phase, None, e))?;

    report.artifact = Some(artifact);
    Ok(())
  }

  fn stop_flags(&self, abort: &Arc<AtomicBool>) -> StopFlags {
    StopFlags {
      cancel: self.cancel.clone(),
      abort: abort.clone(),
    }
  }

  /// Remove staging roots and prepared sources unless asked to keep them.
  fn cleanup(&self) {
    if self.config.keep_work_dir {
      debug!(work_dir = ?self.config.work_dir, "keeping work directory");
      return;
    }
    for dir in ["staging", "src"] {
      let path = self.config.work_dir.join(dir);
      if path.exists()
        && let Err(e) = std::fs::remove_dir_all(&path)
      {
        warn!(path = ?path, error = %e, "failed to clean up work directory");
      }
    }
  }
}

fn transition(report: &mut BuildReport, state: ProjectState) {
  info!(project = %report.project, state = %state, "project state changed");
  report.enter(state);
}

/// Resolve build order, then select a source variant for every component.
fn resolve(
  project: &ProjectSpec,
  registry: &ComponentRegistry,
  arch: Arch,
) -> Result<(ResolvedGraph, Vec<SourceVariant>), ProjectError> {
  let phase = ProjectState::Resolving;
  project.validate().map_err(|e| ProjectError::new(phase, None, e))?;

  let graph = DependencyResolver::new(registry)
    .resolve(&project.component_names)
    .map_err(|e| ProjectError::new(phase, None, e))?;

  let variants = ArchitectureSelector::new(arch)
    .select_all(graph.components())
    .map_err(|e| ProjectError::new(phase, Some(e.component()), e.clone()))?
    .into_iter()
    .cloned()
    .collect();

  info!(project = %project.name, order = ?graph.names(), "resolved build order");
  Ok((graph, variants))
}

/// The two reasons a queued task should not start.
struct StopFlags {
  cancel: Arc<AtomicBool>,
  abort: Arc<AtomicBool>,
}

impl StopFlags {
  fn stopped(&self) -> bool {
    self.cancel.load(Ordering::SeqCst) || self.abort.load(Ordering::SeqCst)
  }
}

/// Take a worker permit, unless the build has been stopped meanwhile.
async fn acquire(
  semaphore: &Arc<Semaphore>,
  stop: &StopFlags,
  phase: ProjectState,
  component: &str,
) -> Result<OwnedSemaphorePermit, ProjectError> {
  let permit = semaphore
    .clone()
    .acquire_owned()
    .await
    .map_err(|e| ProjectError::new(phase, Some(component), ErrorKind::Internal(e.to_string())))?;
  if stop.stopped() {
    debug!(component, "not starting, build stopped");
    return Err(ProjectError::new(phase, Some(component), ErrorKind::Cancelled));
  }
  Ok(permit)
}

/// Wait for every task, raising the abort flag on the first failure.
///
/// Returns the successes, or the failure of the earliest component in build
/// order. That is not necessarily the first failure in time: when several
/// tasks of one wave fail, the lowest index wins so the report is stable.
/// Tasks that stood down because of another failure are not reported.
async fn drain<T: Send + 'static>(
  mut join_set: JoinSet<TaskResult<T>>,
  abort: &AtomicBool,
  phase: ProjectState,
) -> Result<Vec<(usize, T)>, ProjectError> {
  let mut ok = Vec::new();
  let mut failures: Vec<(usize, ProjectError)> = Vec::new();

  while let Some(joined) = join_set.join_next().await {
    match joined {
      Ok((index, Ok(value))) => ok.push((index, value)),
      Ok((index, Err(e))) => {
        if !matches!(e.kind, ErrorKind::Cancelled) {
          error!(phase = %phase, component = e.component.as_deref().unwrap_or("-"), error = %e.kind, "task failed");
        }
        abort.store(true, Ordering::SeqCst);
        failures.push((index, e));
      }
      Err(e) => {
        error!(phase = %phase, error = %e, "task panicked");
        abort.store(true, Ordering::SeqCst);
        failures.push((usize::MAX, ProjectError::new(phase, None, ErrorKind::Internal(e.to_string()))));
      }
    }
  }

  match failures
    .into_iter()
    .min_by_key(|(index, e)| (matches!(e.kind, ErrorKind::Cancelled), *index))
  {
    Some((_, e)) => Err(e),
    None => Ok(ok),
  }
}

/// A staging root that could not be created is reported as a failure before the first action.
fn setup_failure(error: crate::execute::ActionError) -> crate::execute::ActionFailure {
  crate::execute::ActionFailure {
    index: 0,
    kind: "setup",
    error,
  }
}
