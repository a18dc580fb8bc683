//! Global constants used throughout the fwbundle codebase.
//!
//! File names that form the contract between build steps live here so the producer and
//! the consumer of an artifact can never disagree on its name.

/// Filename identifying a directory as a native extension.
pub const MANIFEST_FILENAME: &str = "fwbundle.json";

/// Optional project configuration file.
pub const CONFIG_FILENAME: &str = "fwbundle.toml";

/// Package metadata file used for the bundle name and default entry script.
pub const PACKAGE_JSON: &str = "package.json";

/// Directory holding installed packages, relative to the project.
pub const NODE_MODULES_DIR: &str = "node_modules";

/// Default build output directory, relative to the project.
pub const DEFAULT_BUILD_DIR: &str = "build";

/// Subdirectory of the build directory for script-side tool output (pins).
pub const JS_OUT_DIR: &str = "out";

/// Subdirectory of the build directory receiving generated native sources.
pub const SOURCE_OUT_DIR: &str = "source";

/// Subdirectory of the build directory receiving the converter's data segments.
pub const JS_DATA_DIR: &str = "js";

/// Pin artifact written by the pin generator (and ignored by the converter).
pub const PINS_FILENAME: &str = "pins.js";

/// Persisted extension list shared by the discover, codegen and compile steps.
pub const EXTENSIONS_FILENAME: &str = "extensions.json";

/// Captured compiler output.
pub const BUILD_LOG_FILENAME: &str = "build.log";

/// Optional project directory compiled in addition to discovered extensions.
pub const NATIVE_EXTRAS_DIR: &str = "native_extras";

/// Suffix of the bundled script produced by the bundler.
pub const BUNDLE_SUFFIX: &str = ".bundle.min.js";

/// Script runtime checkout, relative to the build directory.
pub const RUNTIME_DIR: &str = "jerryscript";

/// Runtime revision checked out by the default fetch command.
pub const RUNTIME_REVISION: &str = "8ebbfda996cf1dc27b64f84ec9122c19c6fb90f1";

/// Default native toolchain identifier.
pub const DEFAULT_TOOLCHAIN: &str = "GCC_ARM";

/// Environment variable disabling progress spinners.
pub const NO_PROGRESS_ENV: &str = "FWBUNDLE_NO_PROGRESS";

/// Default CPU core count when detection fails.
///
/// Used as a fallback when `std::thread::available_parallelism()` returns an error.
pub const FALLBACK_CORE_COUNT: usize = 4;

/// Default number of scheduler workers: one per core.
pub fn default_max_parallel() -> usize {
    std::thread::available_parallelism().map(std::num::NonZero::get).unwrap_or(FALLBACK_CORE_COUNT)
}
