//! Implementation of the `stagehand build` command.
//!
//! Loads a manifest, builds every component into its own staging root,
//! assembles them and writes the package into the output directory.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;
use stagehand_lib::build::{BuildConfig, BuildReport, ErrorClass, ProjectBuilder, ProjectState};
use stagehand_lib::fetch::RetryConfig;
use stagehand_lib::package::TarPackager;
use stagehand_lib::platform::Arch;
use tracing::{info, warn};

use super::{load_manifest, target_arch};
use crate::output::{
  OutputFormat, eprint_class, eprint_stat, format_bytes, format_duration, print_error, print_json, print_stat,
  print_success, print_warning, truncate_hash,
};

pub struct BuildArgs {
  pub manifest: PathBuf,
  pub arch: Option<Arch>,
  pub work_dir: Option<PathBuf>,
  pub cache_dir: Option<PathBuf>,
  pub output: PathBuf,
  pub jobs: Option<usize>,
  pub keep_work_dir: bool,
  pub retries: u32,
  pub retry_delay: Duration,
  pub output_format: OutputFormat,
}

#[derive(Serialize)]
struct FailureOutput {
  class: ErrorClass,
  phase: ProjectState,
  component: Option<String>,
  message: String,
}

#[derive(Serialize)]
struct BuildOutput<'a> {
  #[serde(flatten)]
  report: &'a BuildReport,
  error: Option<FailureOutput>,
}

pub fn cmd_build(args: BuildArgs) -> Result<ExitCode> {
  let manifest = load_manifest(&args.manifest)?;
  let arch = target_arch(args.arch)?;

  // A temporary work dir is removed when `_temp` drops, unless kept.
  let (work_dir, _temp) = match args.work_dir {
    Some(dir) => (dir, None),
    None => {
      let temp = tempfile::Builder::new()
        .prefix("stagehand-")
        .tempdir()
        .context("Failed to create work directory")?;
      if args.keep_work_dir {
        (temp.keep(), None)
      } else {
        (temp.path().to_path_buf(), Some(temp))
      }
    }
  };

  let mut config = BuildConfig::new(arch, &work_dir);
  if let Some(cache_dir) = args.cache_dir {
    config.cache_dir = cache_dir;
  }
  if let Some(jobs) = args.jobs {
    config.parallelism = jobs.max(1);
  }
  config.keep_work_dir = args.keep_work_dir;
  config.retry = RetryConfig {
    max_retries: args.retries,
    initial_delay: args.retry_delay,
    ..RetryConfig::default()
  };

  info!(
    project = %manifest.project.name,
    arch = %arch,
    work_dir = ?work_dir,
    parallelism = config.parallelism,
    "starting build"
  );

  let builder = ProjectBuilder::new(config, Arc::new(TarPackager::new(&args.output)));
  let cancel = builder.cancel_handle();

  let started = Instant::now();
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let report = rt.block_on(async {
    let watcher = tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        warn!("interrupt received");
        print_warning("Interrupted; waiting for running tasks to finish");
        cancel.store(true, Ordering::SeqCst);
      }
    });
    let report = builder.build(&manifest.project, &manifest.registry).await;
    watcher.abort();
    report
  });
  let elapsed = started.elapsed();

  if args.output_format.is_json() {
    let error = report.error().map(|e| FailureOutput {
      class: e.class(),
      phase: e.phase,
      component: e.component.clone(),
      message: e.kind.to_string(),
    });
    print_json(&BuildOutput { report: &report, error })?;
  } else {
    print_report(&report, elapsed, args.keep_work_dir.then_some(&work_dir));
  }

  Ok(if report.is_success() {
    ExitCode::SUCCESS
  } else {
    ExitCode::FAILURE
  })
}

fn print_report(report: &BuildReport, elapsed: Duration, kept_work_dir: Option<&PathBuf>) {
  if let Some(err) = report.error() {
    print_error(&format!("Build failed: {} {}", report.project, report.version));
    eprint_class(err.class());
    eprint_stat("Phase", &err.phase.to_string());
    if let Some(component) = &err.component {
      eprint_stat("Component", component);
    }
    eprint_stat("Error", &err.kind.to_string());
    if let Some(dir) = kept_work_dir {
      eprint_stat("Work dir", &dir.display().to_string());
    }
    return;
  }

  print_success(&format!(
    "Built {} {} for {}",
    report.project,
    report.version,
    report.arch.debian_name()
  ));
  print_stat("Components", &report.build_order.join(", "));
  if let Some(digest) = &report.tree_digest {
    print_stat("Tree digest", truncate_hash(digest));
  }
  if let Some(artifact) = &report.artifact {
    print_stat("Package", &artifact.display().to_string());
    if let Ok(meta) = fs::metadata(artifact) {
      print_stat("Size", &format_bytes(meta.len()));
    }
  }
  if let Some(dir) = kept_work_dir {
    print_stat("Work dir", &dir.display().to_string());
  }
  print_stat("Duration", &format_duration(elapsed));
}
