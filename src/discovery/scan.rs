//! Filesystem-scan discovery.
//!
//! Used for standalone source trees that have no package manager. Every file below the
//! root whose name matches the manifest pattern is reported, including manifests nested
//! below another manifest: a plain directory tree makes no promise that a native package
//! vendors what lives beneath it.

use anyhow::{Context, Result};
use std::path::PathBuf;
use walkdir::WalkDir;

use super::{ManifestLocation, ManifestLocator};
use crate::core::FwError;

/// Locates manifests by recursively scanning a directory.
pub struct ScanLocator {
    root: PathBuf,
    pattern: glob::Pattern,
}

impl ScanLocator {
    /// Creates a scanner for `root` matching file names against the glob `pattern`.
    pub fn new(root: impl Into<PathBuf>, pattern: &str) -> Result<Self> {
        let pattern = glob::Pattern::new(pattern).map_err(|e| FwError::ConfigError {
            message: format!("invalid manifest pattern '{pattern}': {e}"),
        })?;
        Ok(Self {
            root: root.into(),
            pattern,
        })
    }
}

impl ManifestLocator for ScanLocator {
    fn locate(&self) -> Result<Vec<ManifestLocation>> {
        let root = std::path::absolute(&self.root)
            .with_context(|| format!("Cannot make {} absolute", self.root.display()))?;

        if !root.is_dir() {
            tracing::debug!(target: "discovery", "Scan root {} does not exist", root.display());
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        // Sorted traversal keeps the order stable across runs and hosts
        for entry in WalkDir::new(&root).follow_links(true).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    if let Some(ancestor) = err.loop_ancestor() {
                        let path = err.path().map(|p| p.display().to_string()).unwrap_or_default();
                        return Err(FwError::CyclicDependencyTree {
                            chain: format!("{path} -> {}", ancestor.display()),
                        }
                        .into());
                    }
                    return Err(err).with_context(|| format!("Failed to scan {}", root.display()));
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let matches = entry.file_name().to_str().is_some_and(|name| self.pattern.matches(name));
            if !matches {
                continue;
            }

            let manifest_path = entry.path().to_path_buf();
            let owner_path = manifest_path.parent().map(PathBuf::from).unwrap_or_else(|| root.clone());
            tracing::debug!(target: "discovery", "Found manifest {}", manifest_path.display());
            found.push(ManifestLocation {
                manifest_path,
                owner_path,
            });
        }

        tracing::debug!(target: "discovery", "Filesystem scan found {} manifest(s)", found.len());
        Ok(found)
    }
}
