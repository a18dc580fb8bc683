//! Integration test suite for fwbundle
//!
//! End-to-end tests that drive the `fwbundle` binary and the public pipeline API against
//! temporary projects.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **cli**: Argument handling, error reporting, `list` and `clean`
//! - **build**: Full builds with stand-in tools, failure propagation, dry runs
//! - **discovery**: Package tree and filesystem discovery through the public API
//!
//! Builds shell out to `sh`, so those tests only run on Unix.

// Shared test utilities (from parent tests/ directory)
#[path = "../common/mod.rs"]
mod common;

mod build;
mod cli;
mod discovery;
