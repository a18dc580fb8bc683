//! Full builds with `sh` standing in for every external tool.
#![cfg(unix)]

use predicates::prelude::*;
use std::sync::Arc;

use fwbundle_cli::config::{BuildConfig, ConfigOverrides};
use fwbundle_cli::core::FwError;
use fwbundle_cli::graph::{Scheduler, TaskState};
use fwbundle_cli::pipeline;
use fwbundle_cli::test_utils::{FAKE_TOOLS, ProjectFixture};

use crate::common::{fake_project, fwbundle};

fn load(project: &ProjectFixture, overrides: &ConfigOverrides) -> BuildConfig {
    BuildConfig::load(project.path(), overrides).unwrap()
}

#[tokio::test]
async fn test_full_build_produces_every_artifact() {
    fwbundle_cli::test_utils::init_test_logging(None);
    let project = fake_project("");

    let report = pipeline::build(load(&project, &ConfigOverrides::default()), false).await.unwrap();
    assert!(report.succeeded());
    assert_eq!(report.outcomes.len(), 10);
    assert!(report.outcomes.iter().all(|o| o.state == TaskState::Succeeded));
    assert!(project.path().join("build/jerryscript/libs.ready").exists());

    let makefile = project.read_file("build/Makefile").unwrap();
    assert!(makefile.contains("BOARD ?= K64F"));
    assert!(makefile.contains(&format!("RUNTIME_DIR := {}/build/jerryscript", project.path().display())));
    assert_eq!(project.read_file("build/.mbedignore").unwrap(), "out/*\n");

    assert_eq!(
        project.read_file("build/app.bundle.min.js").unwrap(),
        project.read_file("main.js").unwrap()
    );
    assert!(project.path().join("build/js/js_sources.c").exists());
    assert!(project.path().join("build/extensions.json").exists());

    let header = project.read_file("build/source/native_libraries.h").unwrap();
    assert!(header.contains("#define NATIVE_LIBRARY_COUNT 2"));
    assert!(header.contains("void ble_setup(void);"));
    assert!(header.contains("void sensors_setup(void);"));
    assert!(header.contains("#define FWBUNDLE_PIN_LED1 50"));
    assert!(header.contains("#define FWBUNDLE_PIN_BUTTON1 0x2a"));
    assert!(header.find("ble_setup").unwrap() < header.find("sensors_setup").unwrap());

    let main = project.read_file("build/source/main.cpp").unwrap();
    assert!(main.contains("ble_setup();"));

    let log = project.read_file("build/build.log").unwrap();
    assert!(log.contains("BOARD=K64F"));
    let ble_native = format!("{}/node_modules/ble/native", project.path().display());
    assert!(log.contains(&format!("--src={ble_native}")));
    assert_eq!(log.matches("--src=").count(), 3);
    assert!(log.contains(&format!("EXTRAS={ble_native}:")));
}

#[tokio::test]
async fn test_rebuild_leaves_generated_sources_untouched() {
    let project = fake_project("");
    pipeline::build(load(&project, &ConfigOverrides::default()), false).await.unwrap();
    let header = project.path().join("build/source/native_libraries.h");
    let first = std::fs::metadata(&header).unwrap().modified().unwrap();

    pipeline::build(load(&project, &ConfigOverrides::default()), false).await.unwrap();
    assert_eq!(std::fs::metadata(&header).unwrap().modified().unwrap(), first);
}

#[tokio::test]
async fn test_build_without_pins() {
    let project = fake_project("");
    let overrides = ConfigOverrides {
        no_pins: true,
        ..ConfigOverrides::default()
    };

    let config = load(&project, &overrides);
    let plan = pipeline::plan(Arc::new(config.clone())).unwrap();
    assert!(!plan.iter().any(|id| id == pipeline::GENERATE_PINS));

    let report = pipeline::build(config, false).await.unwrap();
    assert_eq!(report.outcomes.len(), 9);
    assert!(!project.path().join("build/out/pins.js").exists());

    let header = project.read_file("build/source/native_libraries.h").unwrap();
    assert!(!header.contains("FWBUNDLE_PIN_"));
}

#[tokio::test]
async fn test_existing_runtime_checkout_is_not_fetched_again() {
    let project = ProjectFixture::new().unwrap();
    project.add_extension("ble", "ble", &["native"]).unwrap();
    project.write_file("build/jerryscript/README.md", "checked out\n").unwrap();
    let tools = FAKE_TOOLS.replace(r#"'mkdir -p "$1/targets/tools"'"#, r#"'exit 9'"#);
    project
        .write_config(&format!("target = \"K64F\"\ndiscovery = \"filesystem\"\n{tools}"))
        .unwrap();

    let report = pipeline::build(load(&project, &ConfigOverrides::default()), false).await.unwrap();
    assert_eq!(report.state(pipeline::FETCH_RUNTIME), Some(TaskState::Succeeded));
    assert_eq!(report.state(pipeline::GET_LIBS), Some(TaskState::Succeeded));
    assert!(project.path().join("build/jerryscript/libs.ready").exists());
}

#[tokio::test]
async fn test_runtime_fetch_failure_blocks_conversion() {
    let project = ProjectFixture::new().unwrap();
    project.add_extension("ble", "ble", &["native"]).unwrap();
    let tools = FAKE_TOOLS.replace(r#"'mkdir -p "$1/targets/tools"'"#, r#"'exit 9'"#);
    project
        .write_config(&format!("target = \"K64F\"\ndiscovery = \"filesystem\"\n{tools}"))
        .unwrap();

    let config = Arc::new(load(&project, &ConfigOverrides::default()));
    let report = Scheduler::new(2).run(pipeline::build_graph(config).unwrap()).await;

    assert_eq!(report.first_failure.as_deref(), Some(pipeline::FETCH_RUNTIME));
    assert_eq!(report.state(pipeline::GET_LIBS), Some(TaskState::Pending));
    assert_eq!(report.state(pipeline::CPPIFY), Some(TaskState::Pending));
    assert_eq!(report.state(pipeline::COMPILE), Some(TaskState::Pending));
    assert_eq!(report.state(pipeline::BUNDLE), Some(TaskState::Succeeded));
    assert!(project.path().join("build/Makefile").exists());
}

#[tokio::test]
async fn test_build_without_runtime_preparation() {
    let project = fake_project("prepare_runtime = false");

    let config = load(&project, &ConfigOverrides::default());
    let plan = pipeline::plan(Arc::new(config.clone())).unwrap();
    assert!(!plan.iter().any(|id| id == pipeline::FETCH_RUNTIME || id == pipeline::GET_LIBS));

    let report = pipeline::build(config, false).await.unwrap();
    assert_eq!(report.outcomes.len(), 8);
    assert!(!project.path().join("build/jerryscript").exists());
}

#[tokio::test]
async fn test_native_extras_compiled() {
    let project = fake_project("");
    project.write_file("native_extras/board.c", "void board(void) {}\n").unwrap();

    pipeline::build(load(&project, &ConfigOverrides::default()), false).await.unwrap();

    let log = project.read_file("build/build.log").unwrap();
    assert!(log.contains(&format!("--src={}/native_extras", project.path().display())));
    assert_eq!(log.matches("--src=").count(), 4);
}

#[tokio::test]
async fn test_bundler_failure_blocks_only_dependents() {
    let project = ProjectFixture::new().unwrap();
    project.add_extension("ble", "ble", &["native"]).unwrap();
    let tools = FAKE_TOOLS.replace(r#"'cp "$1" "$2"', "bundler""#, r#"'exit 3', "bundler""#);
    project
        .write_config(&format!("target = \"K64F\"\ndiscovery = \"filesystem\"\n{tools}"))
        .unwrap();

    let config = Arc::new(load(&project, &ConfigOverrides::default()));
    let graph = pipeline::build_graph(config).unwrap();
    let report = Scheduler::new(2).run(graph).await;

    assert!(!report.succeeded());
    assert_eq!(report.first_failure.as_deref(), Some(pipeline::BUNDLE));
    assert_eq!(report.state(pipeline::BUNDLE), Some(TaskState::Failed));
    assert_eq!(report.state(pipeline::CPPIFY), Some(TaskState::Pending));
    assert_eq!(report.state(pipeline::COMPILE), Some(TaskState::Pending));
    assert_eq!(report.state(pipeline::DISCOVER), Some(TaskState::Succeeded));
    assert_eq!(report.state(pipeline::CODEGEN), Some(TaskState::Succeeded));
    assert_eq!(report.blocked(), vec![pipeline::CPPIFY, pipeline::COMPILE]);

    assert!(!project.path().join("build/js").exists());
    assert!(!project.path().join("build/build.log").exists());
    assert!(project.path().join("build/source/native_libraries.h").exists());

    let err = report.into_result().unwrap_err();
    match err.downcast_ref::<FwError>() {
        Some(FwError::TaskFailed { task, reason }) => {
            assert_eq!(task, pipeline::BUNDLE);
            assert!(reason.contains("exit code 3"), "{reason}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_entry_script_fails_bundle() {
    let project = fake_project("entry = \"src/app.js\"");

    let err = pipeline::build(load(&project, &ConfigOverrides::default()), false)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Task 'bundle' failed"), "{err}");
    assert!(format!("{err:#}").contains("src/app.js"));
}

#[test]
fn test_cli_build_reports_success() {
    let project = fake_project("max_parallel = 2");

    fwbundle(project.path())
        .args(["build", "--toolchain", "ARM"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Built"))
        .stdout(predicate::str::contains("K64F"));

    assert!(project.read_file("build/build.log").unwrap().contains("BOARD=K64F"));
}

#[test]
fn test_cli_compiler_failure_names_task() {
    let project = ProjectFixture::new().unwrap();
    let tools = FAKE_TOOLS.replace(r#"'echo "$@"'"#, r#"'echo "undefined reference" >&2; exit 2'"#);
    project
        .write_config(&format!("target = \"K64F\"\ndiscovery = \"filesystem\"\n{tools}"))
        .unwrap();

    fwbundle(project.path())
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Task 'compile' failed"))
        .stderr(predicate::str::contains("exit code 2"));

    assert!(project.read_file("build/build.log").unwrap().contains("undefined reference"));
}
