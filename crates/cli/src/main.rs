mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand};
use stagehand_lib::platform::Arch;
use tracing_subscriber::EnvFilter;

use crate::cmd::BuildArgs;
use crate::output::{OutputFormat, print_error};

/// stagehand - assemble multi-component software into one package
#[derive(Parser)]
#[command(name = "stagehand")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Increase log verbosity (-v info, -vv debug). RUST_LOG takes precedence.
  #[arg(short, long, action = ArgAction::Count, global = true)]
  verbose: u8,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build a project manifest into a package
  Build {
    /// Path to the project manifest
    #[arg(default_value = "stagehand.toml")]
    manifest: PathBuf,

    /// Target architecture (default: host)
    #[arg(long)]
    arch: Option<Arch>,

    /// Work directory for sources, staging roots and the package root (default: a temporary directory)
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Artifact cache directory (default: $STAGEHAND_CACHE_DIR, then the user cache directory)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Directory the package is written to
    #[arg(short, long, default_value = "dist")]
    output: PathBuf,

    /// Maximum concurrent fetch and build tasks (default: available cores)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Keep staging roots and prepared sources after the build
    #[arg(long)]
    keep_work_dir: bool,

    /// Retries for failed downloads
    #[arg(long, default_value_t = 3)]
    retries: u32,

    /// Delay before the first download retry, e.g. "500ms" or "2s"
    #[arg(long, value_parser = humantime::parse_duration, default_value = "500ms")]
    retry_delay: Duration,

    #[arg(long, value_enum, default_value_t)]
    output_format: OutputFormat,
  },

  /// Show build order and selected sources without fetching or building
  Plan {
    /// Path to the project manifest
    #[arg(default_value = "stagehand.toml")]
    manifest: PathBuf,

    /// Target architecture (default: host)
    #[arg(long)]
    arch: Option<Arch>,

    #[arg(long, value_enum, default_value_t)]
    output_format: OutputFormat,
  },

  /// Show host platform and default directories
  Info {
    #[arg(long, value_enum, default_value_t)]
    output_format: OutputFormat,
  },
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let result = match cli.command {
    Commands::Build {
      manifest,
      arch,
      work_dir,
      cache_dir,
      output,
      jobs,
      keep_work_dir,
      retries,
      retry_delay,
      output_format,
    } => cmd::cmd_build(BuildArgs {
      manifest,
      arch,
      work_dir,
      cache_dir,
      output,
      jobs,
      keep_work_dir,
      retries,
      retry_delay,
      output_format,
    }),
    Commands::Plan {
      manifest,
      arch,
      output_format,
    } => cmd::cmd_plan(&manifest, arch, output_format),
    Commands::Info { output_format } => cmd::cmd_info(output_format),
  };

  match result {
    Ok(code) => code,
    Err(e) => {
      print_error(&format!("{e:#}"));
      ExitCode::FAILURE
    }
  }
}

fn init_tracing(verbose: u8) {
  let default = match verbose {
    0 => "warn",
    1 => "info",
    _ => "debug",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}
