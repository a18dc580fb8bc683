//! The optional `fwbundle.toml` project file and `package.json` metadata.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::DiscoveryMode;
use super::tools::ToolOverrides;
use crate::constants::{CONFIG_FILENAME, PACKAGE_JSON};
use crate::core::FwError;

/// Contents of `fwbundle.toml`. Every key is optional.
///
/// ```toml
/// target = "K64F"
/// toolchain = "GCC_ARM"
/// entry = "main.js"
/// discovery = "package-tree"
/// no_parse = ["bleno"]
/// prepare_runtime = false
///
/// [tools.bundler]
/// program = "browserify"
/// args = ["{entry}", "-o", "{output}"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
    pub target: Option<String>,
    pub toolchain: Option<String>,
    pub entry: Option<String>,
    pub build_dir: Option<String>,
    pub discovery: Option<DiscoveryMode>,
    pub scan_root: Option<String>,
    pub manifest_pattern: Option<String>,
    pub pins: Option<bool>,
    pub max_parallel: Option<usize>,
    pub template_dir: Option<String>,
    pub no_parse: Vec<String>,
    pub native_extras: Option<String>,
    pub prepare_runtime: Option<bool>,
    pub runtime_dir: Option<String>,
    pub tools: ToolOverrides,
}

impl ProjectConfig {
    /// Loads `fwbundle.toml` from `project_dir`, or defaults when there is none.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let path = project_dir.join(CONFIG_FILENAME);
        if !path.exists() {
            tracing::debug!(target: "config", "No {} in {}, using defaults", CONFIG_FILENAME, project_dir.display());
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Loads a project file from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .map_err(FwError::from)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }
}

/// The fields of `package.json` the build cares about.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub main: Option<String>,
}

impl PackageMetadata {
    /// Reads `package.json` from `project_dir`; a missing file yields empty metadata.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let path = project_dir.join(PACKAGE_JSON);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let metadata: Self = serde_json::from_str(&content)
            .map_err(FwError::from)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_default() {
        let temp = tempdir().unwrap();
        assert_eq!(ProjectConfig::load(temp.path()).unwrap(), ProjectConfig::default());
    }

    #[test]
    fn test_parse_project_config() {
        let temp = tempdir().unwrap();
        std::fs::write(
            temp.path().join(CONFIG_FILENAME),
            r#"
                target = "K64F"
                discovery = "filesystem"
                pins = false
                no_parse = ["bleno"]

                [tools.compiler]
                program = "mbed"
                args = ["compile", "-m", "{target}"]
            "#,
        )
        .unwrap();

        let config = ProjectConfig::load(temp.path()).unwrap();
        assert_eq!(config.target.as_deref(), Some("K64F"));
        assert_eq!(config.discovery, Some(DiscoveryMode::Filesystem));
        assert_eq!(config.pins, Some(false));
        assert_eq!(config.no_parse, vec!["bleno".to_string()]);
        assert_eq!(config.tools.compiler.map(|t| t.program), Some("mbed".to_string()));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join(CONFIG_FILENAME), "targte = \"K64F\"\n").unwrap();
        let err = ProjectConfig::load(temp.path()).unwrap_err();
        assert!(format!("{err:#}").contains("targte"));
    }

    #[test]
    fn test_package_metadata() {
        let temp = tempdir().unwrap();
        assert!(PackageMetadata::load(temp.path()).unwrap().name.is_none());

        std::fs::write(
            temp.path().join(PACKAGE_JSON),
            r#"{"name": "blinky", "main": "index.js", "version": "1.0.0"}"#,
        )
        .unwrap();
        let metadata = PackageMetadata::load(temp.path()).unwrap();
        assert_eq!(metadata.name.as_deref(), Some("blinky"));
        assert_eq!(metadata.main.as_deref(), Some("index.js"));
    }
}
