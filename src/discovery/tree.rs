//! Package-tree discovery.
//!
//! The package manager reports the installed dependency tree (`npm ls --json --long`).
//! Each node carries its install path, a `missing` flag and its own dependencies:
//!
//! ```json
//! {
//!   "name": "blinky",
//!   "path": "/work/blinky",
//!   "dependencies": {
//!     "ble": { "path": "/work/blinky/node_modules/ble", "dependencies": { ... } },
//!     "left-pad": { "missing": true }
//!   }
//! }
//! ```
//!
//! The walk visits dependencies in the order the package manager printed them. A package
//! that ships a manifest is reported and its subtree is not searched further: such a
//! package is expected to vendor the native code of its own dependencies.

use anyhow::{Context, Result};
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use super::{ManifestLocation, ManifestLocator};
use crate::core::FwError;
use crate::process::ToolCommand;

/// One package in the installed dependency tree.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageNode {
    /// Package name as reported by the package manager.
    #[serde(default)]
    pub name: Option<String>,

    /// Install directory. Absent for packages that are not installed.
    #[serde(default, alias = "installPath")]
    pub path: Option<PathBuf>,

    /// Declared but not installed.
    #[serde(default)]
    pub missing: bool,

    /// Direct dependencies, in reported order.
    #[serde(default)]
    pub dependencies: Dependencies,
}

/// Ordered `name -> node` mapping.
#[derive(Debug, Clone, Default)]
pub struct Dependencies(pub Vec<(String, PackageNode)>);

impl<'de> Deserialize<'de> for Dependencies {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = Dependencies;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of package names to package nodes")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, node)) = map.next_entry::<String, PackageNode>()? {
                    entries.push((name, node));
                }
                Ok(Dependencies(entries))
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

impl PackageNode {
    /// Creates an installed node at `path`.
    pub fn installed(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: Some(name.into()),
            path: Some(path.into()),
            missing: false,
            dependencies: Dependencies::default(),
        }
    }

    /// Creates a node flagged as missing.
    pub fn missing(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            path: None,
            missing: true,
            dependencies: Dependencies::default(),
        }
    }

    /// Adds a dependency, keeping insertion order.
    #[must_use]
    pub fn with_dependency(mut self, name: impl Into<String>, node: PackageNode) -> Self {
        self.dependencies.0.push((name.into(), node));
        self
    }
}

/// The root of an installed dependency tree.
#[derive(Debug, Clone, Default)]
pub struct PackageTree {
    pub root: PackageNode,
}

impl PackageTree {
    pub fn new(root: PackageNode) -> Self {
        Self {
            root,
        }
    }

    /// Parses the JSON printed by the package manager.
    pub fn from_json(json: &str) -> Result<Self, FwError> {
        let root: PackageNode = serde_json::from_str(json).map_err(|e| FwError::PackageTreeError {
            reason: format!("unparseable package manager output: {e}"),
        })?;
        Ok(Self::new(root))
    }

    /// Asks the package manager for the tree of the project in `project_dir`.
    ///
    /// The package manager exits non-zero when it finds missing or extraneous packages
    /// but still prints a usable tree, so the exit status is ignored as long as stdout
    /// parses.
    pub async fn load(project_dir: &Path, command: ToolCommand) -> Result<Self> {
        let output = command
            .current_dir(project_dir)
            .with_context("package-tree")
            .execute_unchecked()
            .await
            .context("Failed to run the package manager")?;

        if !output.success {
            tracing::debug!(
                target: "discovery",
                "Package manager exited with {}; using reported tree anyway",
                output.status
            );
        }

        if output.stdout.trim().is_empty() {
            return Err(FwError::PackageTreeError {
                reason: format!("package manager printed no tree ({})", output.stderr.trim()),
            }
            .into());
        }

        let mut tree = Self::from_json(&output.stdout)?;
        if tree.root.path.is_none() {
            tree.root.path = Some(project_dir.to_path_buf());
        }
        Ok(tree)
    }
}

/// Locates manifests by walking a [`PackageTree`].
pub struct TreeLocator {
    tree: PackageTree,
    manifest_name: String,
}

impl TreeLocator {
    pub fn new(tree: PackageTree, manifest_name: impl Into<String>) -> Self {
        Self {
            tree,
            manifest_name: manifest_name.into(),
        }
    }
}

impl ManifestLocator for TreeLocator {
    fn locate(&self) -> Result<Vec<ManifestLocation>> {
        let ancestors: Vec<PathBuf> =
            self.tree.root.path.iter().map(|p| normalize_for_compare(p)).collect();
        let mut visited: HashSet<PathBuf> = ancestors.iter().cloned().collect();
        let found = walk_dependencies(
            &self.tree.root.dependencies,
            &self.manifest_name,
            &ancestors,
            &mut visited,
        )?;
        tracing::debug!(target: "discovery", "Package tree walk found {} manifest(s)", found.len());
        Ok(found)
    }
}

/// Walks `dependencies` in order and returns the manifests found below them.
///
/// `ancestors` holds the install paths on the way down from the root; meeting one of them
/// again means the tree references itself. `visited` spans the whole walk, so a package
/// listed under several parents (hoisted or deduplicated) is only looked at once.
fn walk_dependencies(
    dependencies: &Dependencies,
    manifest_name: &str,
    ancestors: &[PathBuf],
    visited: &mut HashSet<PathBuf>,
) -> Result<Vec<ManifestLocation>> {
    let mut found = Vec::new();

    for (name, node) in &dependencies.0 {
        if node.missing {
            tracing::debug!(target: "discovery", "Skipping missing package '{}'", name);
            continue;
        }
        let Some(install_path) = &node.path else {
            tracing::debug!(target: "discovery", "Skipping package '{}' without install path", name);
            continue;
        };

        let install_path = std::path::absolute(install_path)
            .with_context(|| format!("Cannot make {} absolute", install_path.display()))?;
        let key = normalize_for_compare(&install_path);

        if ancestors.contains(&key) {
            let chain = ancestors
                .iter()
                .chain(std::iter::once(&key))
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(FwError::CyclicDependencyTree {
                chain,
            }
            .into());
        }

        if !visited.insert(key.clone()) {
            tracing::debug!(target: "discovery", "Package '{}' at {} already visited", name, install_path.display());
            continue;
        }

        let manifest_path = install_path.join(manifest_name);
        if manifest_path.is_file() {
            tracing::debug!(target: "discovery", "Found manifest for '{}' at {}", name, manifest_path.display());
            found.push(ManifestLocation {
                manifest_path,
                owner_path: install_path,
            });
            continue;
        }

        let mut chain = ancestors.to_vec();
        chain.push(key);
        found.extend(walk_dependencies(&node.dependencies, manifest_name, &chain, visited)?);
    }

    Ok(found)
}

fn normalize_for_compare(path: &Path) -> PathBuf {
    PathBuf::from(crate::utils::normalize_path_for_storage(path).trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MANIFEST_FILENAME;
    use tempfile::TempDir;

    fn package_dir(root: &Path, rel: &str, with_manifest: bool) -> PathBuf {
        let dir = root.join(rel);
        std::fs::create_dir_all(&dir).unwrap();
        if with_manifest {
            std::fs::write(dir.join(MANIFEST_FILENAME), r#"{"name":"x","source":["src"]}"#)
                .unwrap();
        }
        dir
    }

    #[test]
    fn test_no_manifest_anywhere() {
        let temp = TempDir::new().unwrap();
        let a = package_dir(temp.path(), "node_modules/a", false);
        let b = package_dir(temp.path(), "node_modules/a/node_modules/b", false);
        let tree = PackageTree::new(
            PackageNode::installed("app", temp.path())
                .with_dependency("a", PackageNode::installed("a", &a).with_dependency("b", PackageNode::installed("b", &b))),
        );

        let found = TreeLocator::new(tree, MANIFEST_FILENAME).locate().unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_manifest_short_circuits_subtree() {
        let temp = TempDir::new().unwrap();
        let p = package_dir(temp.path(), "node_modules/p", true);
        let q = package_dir(temp.path(), "node_modules/p/node_modules/q", true);
        let s = package_dir(temp.path(), "node_modules/s", true);
        let tree = PackageTree::new(
            PackageNode::installed("app", temp.path())
                .with_dependency("p", PackageNode::installed("p", &p).with_dependency("q", PackageNode::installed("q", &q)))
                .with_dependency("s", PackageNode::installed("s", &s)),
        );

        let found = TreeLocator::new(tree, MANIFEST_FILENAME).locate().unwrap();
        let owners: Vec<_> = found.iter().map(|l| l.owner_path.clone()).collect();
        assert_eq!(owners, vec![p, s]);
    }

    #[test]
    fn test_recurses_through_plain_packages() {
        let temp = TempDir::new().unwrap();
        let a = package_dir(temp.path(), "node_modules/a", false);
        let b = package_dir(temp.path(), "node_modules/a/node_modules/b", true);
        let tree = PackageTree::new(
            PackageNode::installed("app", temp.path()).with_dependency(
                "a",
                PackageNode::installed("a", &a).with_dependency("b", PackageNode::installed("b", &b)),
            ),
        );

        let found = TreeLocator::new(tree, MANIFEST_FILENAME).locate().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].owner_path, b);
        assert_eq!(found[0].manifest_path, b.join(MANIFEST_FILENAME));
    }

    #[test]
    fn test_missing_packages_skipped() {
        let temp = TempDir::new().unwrap();
        let a = package_dir(temp.path(), "node_modules/a", true);
        let tree = PackageTree::new(
            PackageNode::installed("app", temp.path())
                .with_dependency("gone", PackageNode::missing("gone"))
                .with_dependency("a", PackageNode::installed("a", &a)),
        );

        let found = TreeLocator::new(tree, MANIFEST_FILENAME).locate().unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_missing_flag_wins_over_existing_path() {
        let temp = TempDir::new().unwrap();
        let a = package_dir(temp.path(), "node_modules/a", true);
        let mut node = PackageNode::installed("a", &a);
        node.missing = true;
        let tree =
            PackageTree::new(PackageNode::installed("app", temp.path()).with_dependency("a", node));

        assert!(TreeLocator::new(tree, MANIFEST_FILENAME).locate().unwrap().is_empty());
    }

    #[test]
    fn test_cyclic_tree_detected() {
        let temp = TempDir::new().unwrap();
        let a = package_dir(temp.path(), "node_modules/a", false);
        // a depends on something installed at its own location (linked package)
        let tree = PackageTree::new(PackageNode::installed("app", temp.path()).with_dependency(
            "a",
            PackageNode::installed("a", &a).with_dependency("a-again", PackageNode::installed("a", &a)),
        ));

        let err = TreeLocator::new(tree, MANIFEST_FILENAME).locate().unwrap_err();
        assert!(matches!(err.downcast_ref::<FwError>(), Some(FwError::CyclicDependencyTree { .. })));
    }

    #[test]
    fn test_shared_package_located_once() {
        let temp = TempDir::new().unwrap();
        let a = package_dir(temp.path(), "node_modules/a", false);
        let ble = package_dir(temp.path(), "node_modules/ble", true);
        // app -> { a -> ble, ble } with both entries pointing at the hoisted install
        let tree = PackageTree::new(
            PackageNode::installed("app", temp.path())
                .with_dependency("a", PackageNode::installed("a", &a).with_dependency("ble", PackageNode::installed("ble", &ble)))
                .with_dependency("ble", PackageNode::installed("ble", &ble)),
        );

        let found = TreeLocator::new(tree, MANIFEST_FILENAME).locate().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].owner_path, ble);

        let set = crate::discovery::discover_extensions(&TreeLocator::new(
            PackageTree::new(
                PackageNode::installed("app", temp.path())
                    .with_dependency("ble", PackageNode::installed("ble", &ble))
                    .with_dependency("a", PackageNode::installed("a", &a).with_dependency("ble", PackageNode::installed("ble", &ble))),
            ),
            MANIFEST_FILENAME,
        ))
        .unwrap();
        assert_eq!(set.names(), vec!["x"]);
    }

    #[test]
    fn test_shared_plain_package_walked_once() {
        let temp = TempDir::new().unwrap();
        let util = package_dir(temp.path(), "node_modules/util", false);
        let gpio = package_dir(temp.path(), "node_modules/util/node_modules/gpio", true);
        let shared = || PackageNode::installed("util", &util).with_dependency("gpio", PackageNode::installed("gpio", &gpio));
        let tree = PackageTree::new(
            PackageNode::installed("app", temp.path())
                .with_dependency("util", shared())
                .with_dependency("other", PackageNode::missing("other"))
                .with_dependency("util-again", shared()),
        );

        let found = TreeLocator::new(tree, MANIFEST_FILENAME).locate().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].owner_path, gpio);
    }

    #[test]
    fn test_from_json_preserves_order() {
        let json = r#"{
            "name": "app",
            "path": "/work/app",
            "dependencies": {
                "zeta": { "path": "/work/app/node_modules/zeta" },
                "alpha": { "missing": true },
                "mid": { "installPath": "/work/app/node_modules/mid", "dependencies": {} }
            }
        }"#;
        let tree = PackageTree::from_json(json).unwrap();
        let names: Vec<_> = tree.root.dependencies.0.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
        assert!(tree.root.dependencies.0[1].1.missing);
        assert_eq!(tree.root.dependencies.0[2].1.path, Some(PathBuf::from("/work/app/node_modules/mid")));
    }

    #[test]
    fn test_from_json_garbage() {
        assert!(matches!(PackageTree::from_json("npm ERR!"), Err(FwError::PackageTreeError { .. })));
    }
}
