//! `fwbundle build`

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

use super::CliConfig;
use crate::config::{BuildConfig, ConfigOverrides, DiscoveryMode};
use crate::pipeline;

/// Build the firmware image.
///
/// Values given here override those in `fwbundle.toml`.
#[derive(Args, Debug, Default)]
pub struct BuildCommand {
    /// Hardware target board (e.g. K64F)
    #[arg(short, long)]
    target: Option<String>,

    /// Native toolchain [default: GCC_ARM]
    #[arg(long)]
    toolchain: Option<String>,

    /// Entry script (defaults to `main` in package.json)
    #[arg(short, long)]
    entry: Option<PathBuf>,

    /// Build output directory [default: build]
    #[arg(long)]
    build_dir: Option<PathBuf>,

    /// How to discover native extensions
    #[arg(long, value_enum)]
    discovery: Option<DiscoveryMode>,

    /// Maximum number of build steps run at once
    #[arg(short = 'j', long)]
    max_parallel: Option<usize>,

    /// Directory with template overrides
    #[arg(long)]
    template_dir: Option<PathBuf>,

    /// Skip pin table generation
    #[arg(long)]
    no_pins: bool,

    /// Print the build steps in order without running them
    #[arg(long)]
    dry_run: bool,
}

impl BuildCommand {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            target: self.target.clone(),
            toolchain: self.toolchain.clone(),
            entry: self.entry.clone(),
            build_dir: self.build_dir.clone(),
            discovery: self.discovery,
            max_parallel: self.max_parallel,
            template_dir: self.template_dir.clone(),
            no_pins: self.no_pins,
        }
    }

    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let config = BuildConfig::load(&cli.project_dir, &self.overrides())?;

        if self.dry_run {
            for (step, id) in pipeline::plan(Arc::new(config))?.iter().enumerate() {
                println!("{:>2}. {}", step + 1, id);
            }
            return Ok(());
        }

        let bundle = config.bundle_path();
        let target = config.target.clone();
        let report = pipeline::build(config, cli.show_progress()).await?;

        println!(
            "{} Built {} for {} ({} steps in {:.1}s)",
            "✓".green(),
            bundle.display(),
            target.cyan(),
            report.outcomes.len(),
            report.elapsed.as_secs_f64()
        );
        Ok(())
    }
}
