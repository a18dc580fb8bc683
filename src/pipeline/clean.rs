//! Removal of build outputs.

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::constants::JS_OUT_DIR;
use crate::utils::remove_dir_all;

/// How much of the build directory to remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanScope {
    /// Script-side tool output (`<build>/out`) only.
    Outputs,
    /// The whole build directory.
    Deep,
}

/// Removes build outputs under `build_dir`. Returns the directories actually removed.
pub fn clean(build_dir: &Path, scope: CleanScope) -> Result<Vec<PathBuf>> {
    let target = match scope {
        CleanScope::Outputs => build_dir.join(JS_OUT_DIR),
        CleanScope::Deep => build_dir.to_path_buf(),
    };

    let mut removed = Vec::new();
    if remove_dir_all(&target)? {
        tracing::info!(target: "pipeline", "Removed {}", target.display());
        removed.push(target);
    } else {
        tracing::debug!(target: "pipeline", "Nothing to clean at {}", target.display());
    }
    Ok(removed)
}
