//! Test utilities for fwbundle
//!
//! Helpers shared by unit tests and the integration suite: one-time logging setup and
//! [`ProjectFixture`], a throwaway project directory with a `package.json`, an entry
//! script and any number of installed packages.
//!
//! # Example
//!
//! ```rust,no_run
//! use fwbundle_cli::test_utils::ProjectFixture;
//!
//! let project = ProjectFixture::new().unwrap();
//! project.add_extension("ble", "ble", &["native"]).unwrap();
//! project.add_package("left-pad").unwrap();
//! assert!(project.path().join("node_modules/ble/fwbundle.json").exists());
//! ```

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Once;
use tempfile::TempDir;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::constants::{CONFIG_FILENAME, MANIFEST_FILENAME, NODE_MODULES_DIR, PACKAGE_JSON};

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` when given, otherwise `RUST_LOG`. With neither, logging stays off.
///
/// ```bash
/// RUST_LOG=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .try_init();
    });
}

/// A temporary project directory.
///
/// Created with `package.json` (`name = "app"`, `main = "main.js"`) and a one-line
/// `main.js`. The directory is removed when the fixture is dropped.
pub struct ProjectFixture {
    temp_dir: TempDir,
}

impl ProjectFixture {
    pub fn new() -> Result<Self> {
        let fixture = Self {
            temp_dir: TempDir::new()?,
        };
        fixture.write_file(PACKAGE_JSON, r#"{"name": "app", "main": "main.js"}"#)?;
        fixture.write_file("main.js", "console.log('hello');\n")?;
        Ok(fixture)
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `content` to `rel`, creating parent directories.
    pub fn write_file(&self, rel: &str, content: &str) -> Result<PathBuf> {
        let path = self.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }

    pub fn read_file(&self, rel: &str) -> Result<String> {
        Ok(std::fs::read_to_string(self.path().join(rel))?)
    }

    /// Writes `fwbundle.toml`.
    pub fn write_config(&self, toml: &str) -> Result<PathBuf> {
        self.write_file(CONFIG_FILENAME, toml)
    }

    /// Installs a plain package under `node_modules/<package>`.
    pub fn add_package(&self, package: &str) -> Result<PathBuf> {
        let dir = self.path().join(NODE_MODULES_DIR).join(package);
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join(PACKAGE_JSON), format!(r#"{{"name": "{package}"}}"#))?;
        Ok(dir)
    }

    /// Installs a package carrying a native-extension manifest named `name` with the
    /// given source directories, each containing one C file.
    pub fn add_extension(&self, package: &str, name: &str, sources: &[&str]) -> Result<PathBuf> {
        let dir = self.add_package(package)?;
        for source in sources {
            let source_dir = dir.join(source);
            std::fs::create_dir_all(&source_dir)?;
            std::fs::write(source_dir.join(format!("{name}.c")), "void f(void) {}\n")?;
        }
        let manifest = serde_json::json!({
            "name": name,
            "source": sources,
            "setup": format!("{name}_setup"),
        });
        std::fs::write(dir.join(MANIFEST_FILENAME), serde_json::to_string_pretty(&manifest)?)?;
        Ok(dir)
    }

    /// Writes `tree.json`, a package-manager style dependency tree listing the given
    /// installed packages in order. Pair with [`FAKE_PACKAGE_MANAGER`].
    pub fn write_package_tree(&self, packages: &[&str]) -> Result<PathBuf> {
        // serde_json::Map sorts its keys, so the dependency object is written by hand
        let mut entries = Vec::with_capacity(packages.len());
        for package in packages {
            let path = self.path().join(NODE_MODULES_DIR).join(package);
            let node = serde_json::json!({ "name": package, "path": path });
            entries.push(format!("{}: {}", serde_json::to_string(package)?, node));
        }
        let tree = format!(
            "{{\"name\": \"app\", \"path\": {}, \"dependencies\": {{{}}}}}",
            serde_json::to_string(self.path())?,
            entries.join(", ")
        );
        self.write_file("tree.json", &tree)
    }
}

/// `[tools]` entries that stand in for the real toolchain using `sh`.
///
/// - bundler copies the entry script to the bundle path
/// - pin generator writes a two-pin `pins.js`
/// - converter copies the bundle into the data directory
/// - compiler echoes its arguments (captured in `build.log`)
pub const FAKE_TOOLS: &str = r#"
[tools.bundler]
program = "sh"
args = ["-c", 'cp "$1" "$2"', "bundler", "{entry}", "{output}"]

[tools.pin_generator]
program = "sh"
args = ["-c", "echo 'var LED1 = 50;' > pins.js && echo 'var BUTTON1 = 0x2a;' >> pins.js"]

[tools.converter]
program = "sh"
args = ["-c", 'cp "$1" "$2/js_sources.c"', "converter", "{output}", "{js_data_dir}"]

[tools.compiler]
program = "sh"
args = ["-c", 'echo "$@"', "compiler", "BOARD={target}", "EXTRAS={extras}", "--src={sources}"]

[tools.runtime_fetch]
program = "sh"
args = ["-c", 'mkdir -p "$1/targets/tools"', "fetch-runtime", "{runtime_dir}"]

[tools.runtime_libs]
program = "sh"
args = ["-c", 'touch "$1/libs.ready"', "get-libs", "{runtime_dir}"]
"#;

/// `[tools.package_manager]` entry printing the tree from
/// [`ProjectFixture::write_package_tree`].
pub const FAKE_PACKAGE_MANAGER: &str = r#"
[tools.package_manager]
program = "cat"
args = ["tree.json"]
"#;
