use fwbundle_cli::config::{ConfigOverrides, DiscoveryMode, DiscoverySettings, ProjectConfig};
use fwbundle_cli::discovery;
use fwbundle_cli::test_utils::{FAKE_PACKAGE_MANAGER, ProjectFixture};

fn settings(project: &ProjectFixture, mode: DiscoveryMode) -> DiscoverySettings {
    let file = ProjectConfig::load(project.path()).unwrap();
    let overrides = ConfigOverrides {
        discovery: Some(mode),
        ..ConfigOverrides::default()
    };
    DiscoverySettings::resolve(project.path(), &file, &overrides).unwrap()
}

/// `ble` vendors its own copy of `ble-hci`, which is also a native extension.
fn vendored_project() -> ProjectFixture {
    let project = ProjectFixture::new().unwrap();
    project.add_extension("ble", "ble", &["native"]).unwrap();
    project.add_extension("ble/node_modules/ble-hci", "ble-hci", &["src"]).unwrap();
    project.add_package("left-pad").unwrap();
    project.add_extension("left-pad/node_modules/gpio", "gpio", &["src"]).unwrap();
    project.write_config(FAKE_PACKAGE_MANAGER).unwrap();

    let modules = project.path().join("node_modules");
    let tree = serde_json::json!({
        "name": "app",
        "dependencies": {
            "ble": {
                "path": modules.join("ble"),
                "dependencies": {
                    "ble-hci": { "path": modules.join("ble/node_modules/ble-hci") }
                }
            },
            "left-pad": {
                "path": modules.join("left-pad"),
                "dependencies": {
                    "gpio": { "path": modules.join("left-pad/node_modules/gpio") }
                }
            },
            "optional-thing": { "missing": true }
        }
    });
    project.write_file("tree.json", &tree.to_string()).unwrap();
    project
}

#[cfg(unix)]
#[tokio::test]
async fn test_package_tree_stops_at_first_manifest() {
    let project = vendored_project();

    let extensions = discovery::discover(&settings(&project, DiscoveryMode::PackageTree)).await.unwrap();
    assert_eq!(extensions.names(), vec!["ble", "gpio"]);
}

#[tokio::test]
async fn test_filesystem_scan_reports_nested_manifests() {
    let project = vendored_project();

    let extensions = discovery::discover(&settings(&project, DiscoveryMode::Filesystem)).await.unwrap();
    assert_eq!(extensions.names(), vec!["ble", "ble-hci", "gpio"]);
}

#[cfg(unix)]
#[tokio::test]
async fn test_flat_package_tree_matches_fixture_order() {
    let project = ProjectFixture::new().unwrap();
    project.add_extension("zeta", "zeta", &["native"]).unwrap();
    project.add_extension("alpha", "alpha", &["native"]).unwrap();
    project.write_package_tree(&["zeta", "alpha"]).unwrap();
    project.write_config(FAKE_PACKAGE_MANAGER).unwrap();

    let extensions = discovery::discover(&settings(&project, DiscoveryMode::PackageTree)).await.unwrap();
    assert_eq!(extensions.names(), vec!["zeta", "alpha"]);
}

#[tokio::test]
async fn test_malformed_manifest_stops_discovery() {
    let project = ProjectFixture::new().unwrap();
    project.add_extension("ble", "ble", &["native"]).unwrap();
    project.write_file("node_modules/broken/fwbundle.json", r#"{"name": "broken"}"#).unwrap();

    let err = discovery::discover(&settings(&project, DiscoveryMode::Filesystem)).await.unwrap_err();
    assert!(err.to_string().contains("missing required field \"source\""), "{err}");
}

#[cfg(unix)]
#[tokio::test]
async fn test_missing_package_manager_is_reported() {
    let project = ProjectFixture::new().unwrap();
    project
        .write_config("[tools.package_manager]\nprogram = \"fwbundle-no-such-package-manager\"\n")
        .unwrap();

    let err = discovery::discover(&settings(&project, DiscoveryMode::PackageTree)).await.unwrap_err();
    assert!(format!("{err:#}").contains("fwbundle-no-such-package-manager"), "{err:#}");
}
