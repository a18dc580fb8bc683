//! Discovery of native extensions.
//!
//! Discovery runs in three stages:
//!
//! 1. **Locate** manifests with a [`ManifestLocator`]: either by walking the installed
//!    package tree ([`TreeLocator`]) or by scanning a directory ([`ScanLocator`]).
//! 2. **Resolve** each manifest into an [`ExtensionDescriptor`](crate::manifest::ExtensionDescriptor).
//! 3. **Aggregate** the descriptors into an [`ExtensionSet`], rejecting duplicate names.
//!
//! The first malformed manifest aborts discovery; a partial extension list is never
//! handed to code generation.

mod scan;
mod tree;

pub use scan::ScanLocator;
pub use tree::{Dependencies, PackageNode, PackageTree, TreeLocator};

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;

use crate::config::{DiscoveryMode, DiscoverySettings, Placeholders};
use crate::manifest::{ExtensionSet, resolve_manifest};

/// A manifest file and the package directory that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestLocation {
    pub manifest_path: PathBuf,
    pub owner_path: PathBuf,
}

/// Finds manifest files, in a stable order.
pub trait ManifestLocator: Send + Sync {
    fn locate(&self) -> Result<Vec<ManifestLocation>>;
}

/// Locates, resolves and aggregates every extension reachable through `locator`.
pub fn discover_extensions(locator: &dyn ManifestLocator) -> Result<ExtensionSet> {
    let locations = locator.locate()?;

    let mut descriptors = Vec::with_capacity(locations.len());
    for location in &locations {
        descriptors.push(resolve_manifest(location)?);
    }

    let extensions = ExtensionSet::from_descriptors(descriptors)?;
    log_found(&extensions);
    Ok(extensions)
}

/// Builds the locator selected by `settings`.
///
/// Package-tree mode runs the package manager once to obtain the tree.
pub async fn locator_for(settings: &DiscoverySettings) -> Result<Box<dyn ManifestLocator>> {
    match settings.mode {
        DiscoveryMode::PackageTree => {
            let command = settings
                .package_manager
                .command(&Placeholders::new(), "package-tree")
                .context("Invalid package manager command")?;
            let tree = PackageTree::load(&settings.project_dir, command).await?;
            Ok(Box::new(TreeLocator::new(tree, settings.manifest_pattern.clone())))
        }
        DiscoveryMode::Filesystem => {
            Ok(Box::new(ScanLocator::new(&settings.scan_root, &settings.manifest_pattern)?))
        }
    }
}

/// Runs discovery as configured.
pub async fn discover(settings: &DiscoverySettings) -> Result<ExtensionSet> {
    tracing::debug!(target: "discovery", "Discovering extensions ({} mode)", settings.mode);
    let locator = locator_for(settings).await?;
    discover_extensions(locator.as_ref())
}

fn log_found(extensions: &ExtensionSet) {
    if extensions.is_empty() {
        tracing::info!(target: "discovery", "Found no native packages.");
    } else {
        tracing::info!(
            target: "discovery",
            "Found native packages: {}",
            extensions.names().join(", ").cyan()
        );
    }
}
