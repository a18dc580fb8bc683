//! `fwbundle clean`

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use super::CliConfig;
use crate::config::ProjectConfig;
use crate::constants::DEFAULT_BUILD_DIR;
use crate::pipeline::{CleanScope, clean};

/// Remove build outputs.
#[derive(Args, Debug, Default)]
pub struct CleanCommand {
    /// Remove the whole build directory
    #[arg(long)]
    deep: bool,

    /// Build output directory [default: build]
    #[arg(long)]
    build_dir: Option<PathBuf>,
}

impl CleanCommand {
    pub fn execute(self, cli: &CliConfig) -> Result<()> {
        let build_dir = match self.build_dir {
            Some(dir) => cli.project_dir.join(dir),
            None => {
                let file = ProjectConfig::load(&cli.project_dir)?;
                cli.project_dir.join(file.build_dir.as_deref().unwrap_or(DEFAULT_BUILD_DIR))
            }
        };

        let scope = if self.deep { CleanScope::Deep } else { CleanScope::Outputs };
        let removed = clean(&build_dir, scope)?;
        if removed.is_empty() {
            println!("Nothing to clean");
        } else {
            for dir in removed {
                println!("Removed {}", dir.display());
            }
        }
        Ok(())
    }
}
