//! fwbundle - firmware bundler for script-driven embedded applications
//!
//! An application written in a high-level scripting language runs on a microcontroller
//! inside an embedded interpreter. Its installed packages may carry *native extensions*:
//! C/C++ code that has to be compiled into the same firmware image. fwbundle finds those
//! extensions, bundles the application script, generates the native glue sources and
//! drives the native toolchain, running independent steps in parallel.
//!
//! # Architecture Overview
//!
//! A build is a directed acyclic graph of tasks:
//!
//! ```text
//! make-build-dir ─┬─ fetch-runtime ─ get-libs ─┐
//!                 ├─ bundle ───────────────────┴─ cppify ──┐
//!                 ├─ generate-pins ─┐                      │
//!                 ├─ discover ──────┴─ codegen ────────────┼─ compile
//!                 └─ build-files ──────────────────────────┘
//! ```
//!
//! Tasks hand data to each other through files in the build directory
//! (`extensions.json`, `out/pins.js`), so every task is a plain async closure.
//!
//! # Core Modules
//!
//! - [`discovery`] - Locate native-extension manifests (package tree walk or filesystem scan)
//! - [`manifest`] - Parse manifests into descriptors and aggregate them
//! - [`pins`] - Parse the generated pin table
//! - [`templating`] - Render the native glue sources with Tera
//! - [`graph`] - Task graph construction, validation and the parallel scheduler
//! - [`pipeline`] - The concrete firmware build graph
//!
//! ## Supporting Modules
//! - [`cli`] - Command-line interface
//! - [`config`] - `fwbundle.toml`, `package.json` and external tool settings
//! - [`core`] - Error types and user-facing error formatting
//! - [`process`] - External tool invocation
//! - [`utils`] - File system helpers and progress display
//!
//! # Project File (fwbundle.toml)
//!
//! ```toml
//! target = "K64F"
//! toolchain = "GCC_ARM"
//! discovery = "package-tree"   # or "filesystem"
//! max_parallel = 4
//!
//! [tools.compiler]
//! program = "make"
//! args = ["BOARD={target}", "TOOLCHAIN={toolchain}", "EXTRAS={extras}"]
//! ```
//!
//! # Command-Line Usage
//!
//! ```bash
//! fwbundle build --target K64F
//! fwbundle build --target K64F --dry-run
//! fwbundle list --discovery filesystem
//! fwbundle clean --deep
//! ```

pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod discovery;
pub mod graph;
pub mod manifest;
pub mod pins;
pub mod pipeline;
pub mod process;
pub mod templating;
pub mod utils;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
