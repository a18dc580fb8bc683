//! Common helpers for the fwbundle integration tests.

// Not every helper is used by every test file
#![allow(dead_code)]

use assert_cmd::Command;
use std::path::Path;

pub use fwbundle_cli::test_utils::{FAKE_TOOLS, ProjectFixture};

/// The `fwbundle` binary, run against `project` without spinners or colors.
pub fn fwbundle(project: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_fwbundle"));
    cmd.arg("-C")
        .arg(project)
        .env("FWBUNDLE_NO_PROGRESS", "1")
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG");
    cmd
}

/// A project with two extensions (`ble`, `sensors`) and one plain package, configured
/// with the `sh` stand-in tools and filesystem discovery.
pub fn fake_project(extra_config: &str) -> ProjectFixture {
    let project = ProjectFixture::new().unwrap();
    project.add_extension("ble", "ble", &["native"]).unwrap();
    project.add_extension("sensors", "sensors", &["src", "vendor"]).unwrap();
    project.add_package("left-pad").unwrap();
    project
        .write_config(&format!(
            "target = \"K64F\"\ndiscovery = \"filesystem\"\n{extra_config}\n{FAKE_TOOLS}"
        ))
        .unwrap();
    project
}
