//! Shared helpers for library integration tests.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use stagehand_lib::build::{BuildConfig, BuildReport, ProjectBuilder};
use stagehand_lib::component::ComponentRegistry;
use stagehand_lib::fetch::RetryConfig;
use stagehand_lib::package::{PackageMetadata, Packager, PackagerError};
use stagehand_lib::platform::Arch;
use stagehand_lib::project::ProjectSpec;
use tempfile::TempDir;

/// Packager that records its calls and writes nothing.
#[derive(Default)]
pub struct RecordingPackager {
  calls: Mutex<Vec<(PathBuf, PackageMetadata)>>,
}

impl RecordingPackager {
  pub fn calls(&self) -> Vec<(PathBuf, PackageMetadata)> {
    self.calls.lock().unwrap().clone()
  }
}

impl Packager for RecordingPackager {
  fn name(&self) -> &str {
    "recording"
  }

  fn package(&self, root: &Path, metadata: &PackageMetadata) -> Result<PathBuf, PackagerError> {
    self.calls.lock().unwrap().push((root.to_path_buf(), metadata.clone()));
    Ok(root.with_file_name(format!("{}.recorded", metadata.artifact_stem())))
  }
}

/// Isolated work, cache and source directories for one test.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  pub fn new() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  pub fn path(&self, relative: &str) -> PathBuf {
    self.temp.path().join(relative)
  }

  /// Write a file relative to the temp directory, creating parents.
  pub fn write_file(&self, relative: &str, content: &str) -> PathBuf {
    let path = self.path(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, content).unwrap();
    path
  }

  pub fn config(&self, work: &str) -> BuildConfig {
    let mut config = BuildConfig::new(Arch::X86_64, self.path(work));
    config.cache_dir = self.path("cache");
    config.retry = RetryConfig::none();
    config.parallelism = 4;
    config
  }

  pub async fn build(
    &self,
    config: BuildConfig,
    packager: Arc<dyn Packager>,
    project: &ProjectSpec,
    registry: &ComponentRegistry,
  ) -> BuildReport {
    ProjectBuilder::new(config, packager).build(project, registry).await
  }
}
