//! `fwbundle list`

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::CliConfig;
use crate::config::{ConfigOverrides, DiscoveryMode, DiscoverySettings, ProjectConfig};
use crate::discovery;
use crate::manifest::ExtensionSet;

/// Output format for `list`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Discover native extensions and print them.
#[derive(Args, Debug, Default)]
pub struct ListCommand {
    /// How to discover native extensions
    #[arg(long, value_enum)]
    discovery: Option<DiscoveryMode>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
}

impl ListCommand {
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let file = ProjectConfig::load(&cli.project_dir)?;
        let overrides = ConfigOverrides {
            discovery: self.discovery,
            ..ConfigOverrides::default()
        };
        let settings = DiscoverySettings::resolve(&cli.project_dir, &file, &overrides)?;
        let extensions = discovery::discover(&settings).await?;

        print!("{}", render(&extensions, self.format)?);
        Ok(())
    }
}

fn render(extensions: &ExtensionSet, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(format!("{}\n", serde_json::to_string_pretty(extensions)?)),
        OutputFormat::Text => {
            if extensions.is_empty() {
                return Ok("No native extensions found.\n".to_string());
            }
            let mut out = String::new();
            for extension in extensions {
                out.push_str(&format!("{} ({})\n", extension.name.cyan(), extension.owner));
                for dir in &extension.source_dirs {
                    out.push_str(&format!("    {dir}\n"));
                }
            }
            Ok(out)
        }
    }
}
