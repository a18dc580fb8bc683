//! Aggregation of resolved extensions into the list handed to code generation.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use super::ExtensionDescriptor;
use crate::core::FwError;

/// Ordered set of native extensions keyed by name.
///
/// Order is discovery order. Two extensions with the same name are a dependency conflict
/// and are rejected rather than one silently replacing the other.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtensionSet {
    extensions: Vec<ExtensionDescriptor>,
}

impl ExtensionSet {
    /// Builds the set, failing with [`FwError::DuplicateExtension`] on the first name
    /// seen twice.
    pub fn from_descriptors<I>(descriptors: I) -> Result<Self, FwError>
    where
        I: IntoIterator<Item = ExtensionDescriptor>,
    {
        let mut seen: HashMap<String, String> = HashMap::new();
        let mut extensions = Vec::new();

        for descriptor in descriptors {
            if let Some(first) = seen.get(&descriptor.name) {
                return Err(FwError::DuplicateExtension {
                    name: descriptor.name.clone(),
                    first: first.clone(),
                    second: descriptor.owner.clone(),
                });
            }
            seen.insert(descriptor.name.clone(), descriptor.owner.clone());
            extensions.push(descriptor);
        }

        Ok(Self {
            extensions,
        })
    }

    /// Extensions in discovery order.
    pub fn as_slice(&self) -> &[ExtensionDescriptor] {
        &self.extensions
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExtensionDescriptor> {
        self.extensions.iter()
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// Extension names in discovery order.
    pub fn names(&self) -> Vec<&str> {
        self.extensions.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&ExtensionDescriptor> {
        self.extensions.iter().find(|e| e.name == name)
    }

    /// Every source directory of every extension, flattened in order.
    pub fn source_dirs(&self) -> Vec<String> {
        self.extensions.iter().flat_map(|e| e.source_dirs.iter().cloned()).collect()
    }

    /// Persists the set as JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize extensions")?;
        crate::utils::write_if_changed(path, &format!("{json}\n"))
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Loads a set written by [`ExtensionSet::save`], re-checking name uniqueness.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let extensions: Vec<ExtensionDescriptor> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Self::from_descriptors(extensions)?)
    }
}

impl<'a> IntoIterator for &'a ExtensionSet {
    type Item = &'a ExtensionDescriptor;
    type IntoIter = std::slice::Iter<'a, ExtensionDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.extensions.iter()
    }
}
