use predicates::prelude::*;

use crate::common::{ProjectFixture, fake_project, fwbundle};

#[test]
fn test_build_without_target_fails_with_usage_error() {
    let project = ProjectFixture::new().unwrap();

    fwbundle(project.path())
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no hardware target given"))
        .stderr(predicate::str::contains("--target"));
}

#[test]
fn test_unknown_config_key_is_reported() {
    let project = ProjectFixture::new().unwrap();
    project.write_config("target = \"K64F\"\ntoolchian = \"GCC_ARM\"\n").unwrap();

    fwbundle(project.path())
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("toolchian"));
}

#[test]
fn test_zero_parallelism_rejected() {
    let project = fake_project("");

    fwbundle(project.path())
        .args(["build", "-j", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_parallel must be at least 1"));
}

#[test]
fn test_list_text() {
    let project = fake_project("");

    fwbundle(project.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("ble ("))
        .stdout(predicate::str::contains("sensors ("))
        .stdout(predicate::str::contains("left-pad").not());
}

#[test]
fn test_list_json_in_discovery_order() {
    let project = fake_project("");

    let output = fwbundle(project.path())
        .args(["list", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let list: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let names: Vec<&str> =
        list.as_array().unwrap().iter().map(|e| e["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["ble", "sensors"]);
    assert_eq!(list[1]["source_dirs"].as_array().unwrap().len(), 2);
    assert_eq!(list[0]["config"]["setup"], "ble_setup");
}

#[test]
fn test_list_with_no_extensions() {
    let project = ProjectFixture::new().unwrap();
    project.add_package("left-pad").unwrap();

    fwbundle(project.path())
        .args(["list", "--discovery", "filesystem"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No native extensions found."));
}

#[test]
fn test_list_reports_duplicate_extension_names() {
    let project = ProjectFixture::new().unwrap();
    project.add_extension("ble", "radio", &["native"]).unwrap();
    project.add_extension("ble-legacy", "radio", &["native"]).unwrap();

    fwbundle(project.path())
        .args(["list", "--discovery", "filesystem"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Duplicate native extension 'radio'"));
}

#[test]
fn test_clean_outputs_then_deep() {
    let project = ProjectFixture::new().unwrap();
    project.write_file("build/out/pins.js", "var LED1 = 1;\n").unwrap();
    project.write_file("build/source/main.cpp", "int main() {}\n").unwrap();

    fwbundle(project.path())
        .arg("clean")
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed"));
    assert!(!project.path().join("build/out").exists());
    assert!(project.path().join("build/source/main.cpp").exists());

    fwbundle(project.path()).args(["clean", "--deep"]).assert().success();
    assert!(!project.path().join("build").exists());

    fwbundle(project.path())
        .arg("clean")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to clean"));
}

#[test]
fn test_dry_run_prints_plan() {
    let project = fake_project("");

    let output = fwbundle(project.path())
        .args(["build", "--dry-run"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let steps: Vec<&str> =
        stdout.lines().filter_map(|l| l.split(". ").nth(1)).map(str::trim).collect();
    assert_eq!(steps.len(), 10);
    assert_eq!(steps[0], "make-build-dir");
    assert_eq!(steps[9], "compile");

    let position = |id: &str| steps.iter().position(|s| *s == id).unwrap();
    assert!(position("bundle") < position("cppify"));
    assert!(position("generate-pins") < position("codegen"));
    assert!(position("discover") < position("codegen"));
    assert!(position("get-libs") < position("cppify"));
    assert!(position("build-files") < position("compile"));
    assert!(!project.path().join("build").exists());
}

#[test]
fn test_dry_run_rejects_unknown_placeholder() {
    let project = ProjectFixture::new().unwrap();
    project
        .write_config(
            "target = \"K64F\"\n[tools.compiler]\nprogram = \"make\"\nargs = [\"BOARD={board}\"]\n",
        )
        .unwrap();

    fwbundle(project.path())
        .args(["build", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("tools.compiler"));
}
