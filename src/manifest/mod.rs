//! Native-extension manifests and the descriptors resolved from them.
//!
//! A package declares itself a native extension by shipping a `fwbundle.json` manifest
//! in its root:
//!
//! ```json
//! {
//!   "name": "ble",
//!   "source": ["native", "vendor/nrf"],
//!   "setup": "ble_setup"
//! }
//! ```
//!
//! `name` and `source` are required. Every other field is opaque to fwbundle and is
//! carried through as [`ExtensionDescriptor::raw_config`] for the templates.
//!
//! Resolution ([`resolve_manifest`]) turns a located manifest into an
//! [`ExtensionDescriptor`] whose source directories are absolute and use `/` on every
//! host. Aggregation ([`ExtensionSet`]) merges descriptors and rejects duplicate names.

mod aggregate;

pub use aggregate::ExtensionSet;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

use crate::core::FwError;
use crate::discovery::ManifestLocation;
use crate::utils::{join_normalized, normalize_path_for_storage};

/// A native extension ready to be compiled into the firmware.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionDescriptor {
    /// Extension name from the manifest; unique within an [`ExtensionSet`].
    pub name: String,

    /// Absolute source directories, `/`-separated, in manifest order.
    pub source_dirs: Vec<String>,

    /// The full parsed manifest.
    #[serde(rename = "config")]
    pub raw_config: Map<String, Value>,

    /// Directory owning the manifest, `/`-separated.
    pub owner: String,
}

/// Loads the manifest at `location` and resolves it into an [`ExtensionDescriptor`].
///
/// # Errors
///
/// - [`FwError::ManifestReadError`] if the file cannot be read
/// - [`FwError::InvalidManifest`] if it is not a JSON object with a non-empty `name`
///   string and a non-empty `source` array of strings, or if the optional `setup` and
///   `header` are not strings (`setup` must also be non-empty)
pub fn resolve_manifest(location: &ManifestLocation) -> Result<ExtensionDescriptor, FwError> {
    let content = std::fs::read_to_string(&location.manifest_path).map_err(|e| {
        FwError::ManifestReadError {
            path: location.manifest_path.display().to_string(),
            reason: e.to_string(),
        }
    })?;

    parse_manifest(&content, &location.manifest_path, &location.owner_path)
}

/// Parses manifest `content` and resolves its sources against `owner_path`.
pub fn parse_manifest(
    content: &str,
    manifest_path: &Path,
    owner_path: &Path,
) -> Result<ExtensionDescriptor, FwError> {
    let invalid = |reason: String| FwError::InvalidManifest {
        path: manifest_path.display().to_string(),
        reason,
    };

    let value: Value =
        serde_json::from_str(content).map_err(|e| invalid(format!("not valid JSON: {e}")))?;
    let Value::Object(raw_config) = value else {
        return Err(invalid("expected a JSON object".to_string()));
    };

    let name = match raw_config.get("name") {
        Some(Value::String(name)) if !name.trim().is_empty() => name.clone(),
        Some(Value::String(_)) => return Err(invalid("\"name\" is empty".to_string())),
        Some(_) => return Err(invalid("\"name\" must be a string".to_string())),
        None => return Err(invalid("missing required field \"name\"".to_string())),
    };

    let sources = match raw_config.get("source") {
        Some(Value::Array(entries)) if !entries.is_empty() => entries,
        Some(Value::Array(_)) => return Err(invalid("\"source\" is empty".to_string())),
        Some(_) => return Err(invalid("\"source\" must be an array of paths".to_string())),
        None => return Err(invalid("missing required field \"source\"".to_string())),
    };

    match raw_config.get("setup") {
        Some(Value::String(setup)) if setup.trim().is_empty() => {
            return Err(invalid("\"setup\" is empty".to_string()));
        }
        Some(Value::String(_)) | None => {}
        Some(_) => return Err(invalid("\"setup\" must be a string".to_string())),
    }
    if raw_config.get("header").is_some_and(|header| !header.is_string()) {
        return Err(invalid("\"header\" must be a string".to_string()));
    }

    let owner = normalize_path_for_storage(owner_path);
    let mut source_dirs = Vec::with_capacity(sources.len());
    for entry in sources {
        match entry {
            Value::String(dir) if !dir.trim().is_empty() => {
                if Path::new(dir).is_absolute() || dir.starts_with('/') || dir.starts_with('\\') {
                    return Err(invalid(format!("source entry '{dir}' must be relative")));
                }
                source_dirs.push(join_normalized(&owner, dir));
            }
            other => {
                return Err(invalid(format!("source entry {other} is not a non-empty string")));
            }
        }
    }

    tracing::debug!(target: "discovery", "Resolved extension '{}' with {} source dir(s)", name, source_dirs.len());

    Ok(ExtensionDescriptor {
        name,
        source_dirs,
        raw_config,
        owner,
    })
}
