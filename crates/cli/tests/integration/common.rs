//! Shared test helpers for CLI integration tests.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Get path to a fixture file.
pub fn fixture_path(name: &str) -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    .join("tests")
    .join("fixtures")
    .join(name)
}

/// Read fixture content.
pub fn fixture_content(name: &str) -> String {
  std::fs::read_to_string(fixture_path(name)).unwrap_or_else(|e| panic!("Failed to load fixture {}: {}", name, e))
}

/// Isolated test environment.
///
/// Each test gets its own temporary directory holding the manifest, its
/// sources, the artifact cache and the output directory.
pub struct TestEnv {
  pub temp: TempDir,
  pub manifest_path: PathBuf,
}

impl TestEnv {
  /// Create from a fixture file, copied to `stagehand.toml` in the temp directory.
  pub fn from_fixture(name: &str) -> Self {
    let temp = TempDir::new().unwrap();
    let manifest_path = temp.path().join("stagehand.toml");
    std::fs::write(&manifest_path, fixture_content(name)).unwrap();
    Self { temp, manifest_path }
  }

  /// Write a file relative to the temp directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  pub fn path(&self, relative_path: &str) -> PathBuf {
    self.temp.path().join(relative_path)
  }

  pub fn output_path(&self) -> PathBuf {
    self.path("dist")
  }

  pub fn work_path(&self) -> PathBuf {
    self.path("work")
  }

  /// Files in the output directory, sorted by name.
  pub fn artifacts(&self) -> Vec<String> {
    let mut names: Vec<String> = match std::fs::read_dir(self.output_path()) {
      Ok(entries) => entries
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect(),
      Err(_) => Vec::new(),
    };
    names.sort();
    names
  }

  /// A `stagehand` command with the cache and log level isolated to this environment.
  pub fn cmd(&self) -> Command {
    let mut cmd = cargo_bin_cmd!("stagehand");
    cmd
      .current_dir(self.temp.path())
      .env("STAGEHAND_CACHE_DIR", self.path("cache"))
      .env_remove("RUST_LOG");
    cmd
  }

  /// `stagehand build` for this environment's manifest with an explicit arch,
  /// work dir and output dir.
  pub fn build_cmd(&self, arch: &str) -> Command {
    let mut cmd = self.cmd();
    cmd
      .arg("build")
      .arg(&self.manifest_path)
      .args(["--arch", arch])
      .arg("--work-dir")
      .arg(self.work_path())
      .arg("--output")
      .arg(self.output_path())
      .args(["--retries", "0"]);
    cmd
  }
}

/// Lay out the sources `hello.toml` refers to.
pub fn write_hello_sources(env: &TestEnv) {
  env.write_file("vendor/libgreet/libgreet.so", "ELF-ish");
  env.write_file("src/hello", "#!/bin/sh\necho hello\n");
  env.write_file("src/hello.conf.tpl", "greeting = \"$${greeting}\"\n");
}

pub fn read(path: &Path) -> String {
  std::fs::read_to_string(path).unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e))
}
