//! Command-line interface for fwbundle.
//!
//! # Commands
//!
//! - `build` - Bundle the application, generate native sources and compile the firmware
//! - `list` - Discover native extensions and print them
//! - `clean` - Remove build outputs (`--deep` removes the whole build directory)
//!
//! # Global Options
//!
//! - `--verbose` - Enable debug output
//! - `--quiet` - Suppress all output except errors
//! - `--no-progress` - Disable the progress spinner
//! - `--project-dir` - Run as if started in this directory
//!
//! # Examples
//!
//! ```bash
//! fwbundle build --target K64F
//! fwbundle --verbose build --target NRF52_DK --toolchain GCC_ARM -j 2
//! fwbundle list --format json
//! fwbundle clean --deep
//! ```

mod build;
mod clean;
mod list;

pub use build::BuildCommand;
pub use clean::CleanCommand;
pub use list::{ListCommand, OutputFormat};

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::constants::NO_PROGRESS_ENV;

/// Runtime settings derived from the global flags.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Log filter directive; `None` defers to `RUST_LOG`, then `info`.
    pub log_level: Option<String>,
    /// Disable progress spinners.
    pub no_progress: bool,
    /// Project directory all relative paths are resolved against.
    pub project_dir: PathBuf,
}

impl CliConfig {
    /// Whether spinners should be drawn.
    pub fn show_progress(&self) -> bool {
        !self.no_progress && std::env::var_os(NO_PROGRESS_ENV).is_none()
    }

    /// Installs the global tracing subscriber. Later calls are no-ops.
    pub fn init_logging(&self) {
        let filter = match &self.log_level {
            Some(level) => EnvFilter::new(level),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    }
}

/// Firmware build orchestrator for script-driven embedded applications.
#[derive(Parser)]
#[command(
    name = "fwbundle",
    about = "Bundle a script application with its native extensions into firmware",
    version,
    long_about = "fwbundle discovers native extension packages, bundles the application script, \
                  generates the native glue sources and drives the native toolchain."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output for debugging.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable the progress spinner.
    #[arg(long, global = true)]
    no_progress: bool,

    /// Project directory (defaults to the current directory).
    #[arg(short = 'C', long, global = true, value_name = "DIR")]
    project_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the firmware image
    Build(BuildCommand),
    /// List discovered native extensions
    List(ListCommand),
    /// Remove build outputs
    Clean(CleanCommand),
}

impl Cli {
    /// Resolves the global flags into a [`CliConfig`].
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("debug".to_string())
        } else if self.quiet {
            Some("error".to_string())
        } else {
            None
        };

        CliConfig {
            log_level,
            no_progress: self.no_progress,
            project_dir: self.project_dir.clone().unwrap_or_else(|| PathBuf::from(".")),
        }
    }

    /// Initializes logging and runs the selected command.
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        config.init_logging();
        self.execute_with_config(config).await
    }

    /// Runs the selected command with explicit settings.
    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        match self.command {
            Commands::Build(cmd) => cmd.execute(&config).await,
            Commands::List(cmd) => cmd.execute(&config).await,
            Commands::Clean(cmd) => cmd.execute(&config),
        }
    }
}
