//! Build configuration.
//!
//! A build is described by an immutable [`BuildConfig`] resolved once, before any work
//! starts, from three layers (highest priority first):
//!
//! 1. Command-line flags ([`ConfigOverrides`])
//! 2. The project file `fwbundle.toml` ([`ProjectConfig`])
//! 3. Defaults, plus `package.json` for the bundle name and default entry script
//!
//! Everything a build step needs, including target, entry script and directories, is
//! carried explicitly by the resolved configuration. Nothing is looked up from ambient
//! global state later.
//!
//! # Discovery
//!
//! Discovery is configured separately ([`DiscoverySettings`]) because `fwbundle list`
//! discovers extensions without needing a target or an entry script.

mod file;
pub mod tools;

pub use file::{PackageMetadata, ProjectConfig};
pub use tools::{Placeholders, ToolOverrides, ToolSpec, ToolsConfig};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::{
    BUILD_LOG_FILENAME, BUNDLE_SUFFIX, DEFAULT_BUILD_DIR, DEFAULT_TOOLCHAIN, EXTENSIONS_FILENAME,
    JS_DATA_DIR, JS_OUT_DIR, MANIFEST_FILENAME, NATIVE_EXTRAS_DIR, NODE_MODULES_DIR,
    PINS_FILENAME, RUNTIME_DIR, RUNTIME_REVISION, SOURCE_OUT_DIR,
};
use crate::core::FwError;
use crate::utils::normalize_path_for_storage;

/// How native extension manifests are located.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoveryMode {
    /// Walk the installed package tree reported by the package manager.
    #[default]
    PackageTree,
    /// Recursively scan a directory for manifest files.
    Filesystem,
}

impl std::fmt::Display for DiscoveryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PackageTree => f.write_str("package-tree"),
            Self::Filesystem => f.write_str("filesystem"),
        }
    }
}

/// Values given on the command line. `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub target: Option<String>,
    pub toolchain: Option<String>,
    pub entry: Option<PathBuf>,
    pub build_dir: Option<PathBuf>,
    pub discovery: Option<DiscoveryMode>,
    pub max_parallel: Option<usize>,
    pub template_dir: Option<PathBuf>,
    pub no_pins: bool,
}

/// Where and how to discover extensions.
#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    /// Absolute project directory.
    pub project_dir: PathBuf,
    pub mode: DiscoveryMode,
    /// Root of the filesystem scan.
    pub scan_root: PathBuf,
    /// File name (or glob) identifying a manifest.
    pub manifest_pattern: String,
    /// Prints the installed package tree.
    pub package_manager: ToolSpec,
}

impl DiscoverySettings {
    /// Resolves discovery settings from the project file and command line.
    pub fn resolve(
        project_dir: &Path,
        file: &ProjectConfig,
        overrides: &ConfigOverrides,
    ) -> Result<Self> {
        let project_dir = absolute_project_dir(project_dir)?;
        let scan_root = match &file.scan_root {
            Some(raw) => expand_path(raw, &project_dir)?,
            None => project_dir.join(NODE_MODULES_DIR),
        };
        let tools = ToolsConfig::with_overrides(&file.tools);

        Ok(Self {
            mode: overrides.discovery.or(file.discovery).unwrap_or_default(),
            scan_root,
            manifest_pattern: file
                .manifest_pattern
                .clone()
                .unwrap_or_else(|| MANIFEST_FILENAME.to_string()),
            package_manager: tools.package_manager,
            project_dir,
        })
    }
}

/// Fully resolved, validated configuration of one firmware build.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Absolute project directory.
    pub project_dir: PathBuf,
    /// Absolute build output directory.
    pub build_dir: PathBuf,
    /// Hardware target board.
    pub target: String,
    pub toolchain: String,
    /// Absolute entry script.
    pub entry: PathBuf,
    /// Name used for the bundle file.
    pub package_name: String,
    /// Whether to generate the pin table.
    pub pins: bool,
    pub max_parallel: usize,
    /// Directory with template overrides.
    pub template_dir: Option<PathBuf>,
    /// Installed modules the bundler must not parse. Absent modules are already dropped.
    pub no_parse: Vec<PathBuf>,
    /// Extra native sources compiled with the extensions, when the directory exists.
    pub native_extras: Option<PathBuf>,
    /// Whether to fetch the script runtime and its board libraries before converting.
    pub prepare_runtime: bool,
    /// Script runtime checkout.
    pub runtime_dir: PathBuf,
    pub discovery: DiscoverySettings,
    pub tools: ToolsConfig,
}

impl BuildConfig {
    /// Loads `fwbundle.toml` and `package.json` from `project_dir` and resolves them
    /// with `overrides`.
    pub fn load(project_dir: &Path, overrides: &ConfigOverrides) -> Result<Self> {
        let project_dir = absolute_project_dir(project_dir)?;
        let file = ProjectConfig::load(&project_dir)?;
        let package = PackageMetadata::load(&project_dir)?;
        Self::resolve(&project_dir, &file, &package, overrides)
    }

    /// Merges the configuration layers and validates the result.
    ///
    /// # Errors
    ///
    /// - [`FwError::UsageError`] when no target is configured, or when there is neither
    ///   an entry script nor a `main` in `package.json`
    /// - [`FwError::ConfigError`] when `max_parallel` is zero or a path cannot be expanded
    pub fn resolve(
        project_dir: &Path,
        file: &ProjectConfig,
        package: &PackageMetadata,
        overrides: &ConfigOverrides,
    ) -> Result<Self> {
        let project_dir = absolute_project_dir(project_dir)?;

        let target = overrides
            .target
            .clone()
            .or_else(|| file.target.clone())
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| FwError::UsageError {
                message: "no hardware target given".to_string(),
            })?;

        let entry = match (&overrides.entry, &file.entry, &package.main) {
            (Some(entry), _, _) => project_dir.join(entry),
            (None, Some(entry), _) => expand_path(entry, &project_dir)?,
            (None, None, Some(main)) => project_dir.join(main),
            (None, None, None) => {
                return Err(FwError::UsageError {
                    message: "no entry script given and package.json has no \"main\""
                        .to_string(),
                }
                .into());
            }
        };

        let max_parallel = overrides
            .max_parallel
            .or(file.max_parallel)
            .unwrap_or_else(crate::constants::default_max_parallel);
        if max_parallel == 0 {
            return Err(FwError::ConfigError {
                message: "max_parallel must be at least 1".to_string(),
            }
            .into());
        }

        let build_dir = match (&overrides.build_dir, &file.build_dir) {
            (Some(dir), _) => project_dir.join(dir),
            (None, Some(dir)) => expand_path(dir, &project_dir)?,
            (None, None) => project_dir.join(DEFAULT_BUILD_DIR),
        };

        let template_dir = match (&overrides.template_dir, &file.template_dir) {
            (Some(dir), _) => Some(project_dir.join(dir)),
            (None, Some(dir)) => Some(expand_path(dir, &project_dir)?),
            (None, None) => None,
        };

        let no_parse = file
            .no_parse
            .iter()
            .map(|name| project_dir.join(NODE_MODULES_DIR).join(name))
            .filter(|path| {
                let exists = path.exists();
                if !exists {
                    tracing::debug!(target: "config", "Ignoring no_parse module {}: not installed", path.display());
                }
                exists
            })
            .collect();

        let native_extras = match &file.native_extras {
            Some(dir) => expand_path(dir, &project_dir)?,
            None => project_dir.join(NATIVE_EXTRAS_DIR),
        };
        let native_extras = native_extras.is_dir().then_some(native_extras);

        let runtime_dir = match &file.runtime_dir {
            Some(dir) => expand_path(dir, &project_dir)?,
            None => build_dir.join(RUNTIME_DIR),
        };

        let package_name = package
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .or_else(|| project_dir.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "firmware".to_string());

        let discovery = DiscoverySettings::resolve(&project_dir, file, overrides)?;

        Ok(Self {
            build_dir,
            target,
            toolchain: overrides
                .toolchain
                .clone()
                .or_else(|| file.toolchain.clone())
                .unwrap_or_else(|| DEFAULT_TOOLCHAIN.to_string()),
            entry,
            package_name,
            pins: !overrides.no_pins && file.pins.unwrap_or(true),
            max_parallel,
            template_dir,
            no_parse,
            native_extras,
            prepare_runtime: file.prepare_runtime.unwrap_or(true),
            runtime_dir,
            discovery,
            tools: ToolsConfig::with_overrides(&file.tools),
            project_dir,
        })
    }

    /// Script-side tool output directory (`<build>/out`).
    pub fn js_dir(&self) -> PathBuf {
        self.build_dir.join(JS_OUT_DIR)
    }

    /// Generated native sources (`<build>/source`).
    pub fn source_dir(&self) -> PathBuf {
        self.build_dir.join(SOURCE_OUT_DIR)
    }

    /// Converter output (`<build>/js`).
    pub fn js_data_dir(&self) -> PathBuf {
        self.build_dir.join(JS_DATA_DIR)
    }

    pub fn bundle_path(&self) -> PathBuf {
        self.build_dir.join(format!("{}{}", self.package_name, BUNDLE_SUFFIX))
    }

    pub fn pins_path(&self) -> PathBuf {
        self.js_dir().join(PINS_FILENAME)
    }

    pub fn extensions_path(&self) -> PathBuf {
        self.build_dir.join(EXTENSIONS_FILENAME)
    }

    pub fn build_log_path(&self) -> PathBuf {
        self.build_dir.join(BUILD_LOG_FILENAME)
    }

    /// Placeholder values for tool argument templates.
    ///
    /// `sources` and `extras` are only known after discovery, so callers add them.
    pub fn placeholders(&self) -> Placeholders {
        Placeholders::new()
            .scalar("project_dir", normalize_path_for_storage(&self.project_dir))
            .scalar("build_dir", normalize_path_for_storage(&self.build_dir))
            .scalar("js_dir", normalize_path_for_storage(self.js_dir()))
            .scalar("js_data_dir", normalize_path_for_storage(self.js_data_dir()))
            .scalar("source_dir", normalize_path_for_storage(self.source_dir()))
            .scalar("entry", normalize_path_for_storage(&self.entry))
            .scalar("output", normalize_path_for_storage(self.bundle_path()))
            .scalar("target", self.target.clone())
            .scalar("toolchain", self.toolchain.clone())
            .scalar("runtime_dir", normalize_path_for_storage(&self.runtime_dir))
            .scalar("runtime_revision", RUNTIME_REVISION)
            .list("no_parse", self.no_parse.iter().map(normalize_path_for_storage).collect())
    }
}

fn absolute_project_dir(project_dir: &Path) -> Result<PathBuf> {
    std::path::absolute(project_dir).map_err(|e| {
        FwError::ConfigError {
            message: format!("invalid project directory {}: {e}", project_dir.display()),
        }
        .into()
    })
}

/// Expands `~` and `$VAR` in a configured path and makes it absolute against `base`.
fn expand_path(raw: &str, base: &Path) -> Result<PathBuf> {
    let expanded = shellexpand::full(raw).map_err(|e| FwError::ConfigError {
        message: format!("cannot expand path '{raw}': {e}"),
    })?;
    Ok(crate::utils::fs::absolutize(base, Path::new(expanded.as_ref())))
}
