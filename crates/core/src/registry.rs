//! Read-only access to the Univention Configuration Registry (UCR).
//!
//! UCR keeps its variables in several layer files below
//! `/etc/univention`. A lookup walks the layers from highest to lowest
//! priority and returns the first hit, so a forced value beats a value
//! distributed via LDAP, which beats a locally set one, which beats a
//! package default.

use std::collections::HashMap;
use std::path::Path;

use crate::error::CoreError;

/// Directory holding the layer files on a UCS system.
pub const DEFAULT_UCR_DIR: &str = "/etc/univention";

/// Layer files in lookup order (highest priority first).
pub const LAYER_FILES: [&str; 5] = [
    "base-forced.conf",
    "base-schedule.conf",
    "base-ldap.conf",
    "base.conf",
    "base-defaults.conf",
];

/// Layered key-value view of the registry.
#[derive(Debug, Clone, Default)]
pub struct ConfigRegistry {
    /// Highest priority first.
    layers: Vec<HashMap<String, String>>,
}

impl ConfigRegistry {
    /// Load all layer files from `dir`. Missing files are skipped.
    pub fn load(dir: &Path) -> Result<Self, CoreError> {
        let mut layers = Vec::with_capacity(LAYER_FILES.len());
        for file in LAYER_FILES {
            let path = dir.join(file);
            match std::fs::read_to_string(&path) {
                Ok(text) => {
                    let layer = parse_layer(&text);
                    tracing::debug!(path = %path.display(), keys = layer.len(), "Loaded UCR layer");
                    layers.push(layer);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::trace!(path = %path.display(), "UCR layer absent");
                }
                Err(e) => return Err(CoreError::Io(e)),
            }
        }
        Ok(Self { layers })
    }

    /// Build a single-layer registry from key-value pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let layer = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            layers: vec![layer],
        }
    }

    /// Look up `key`, returning the value of the highest-priority layer
    /// that defines it.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.layers
            .iter()
            .find_map(|layer| layer.get(key))
            .map(String::as_str)
    }
}

/// Parse one layer file: `key: value` per line, `#` comments ignored.
///
/// A line without the `": "` separator but ending in `:` defines the key
/// with an empty value.
pub fn parse_layer(text: &str) -> HashMap<String, String> {
    let mut layer = HashMap::new();
    for line in text.lines() {
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }
        let parsed = line
            .split_once(": ")
            .or_else(|| line.strip_suffix(':').map(|k| (k, "")));
        if let Some((key, value)) = parsed {
            layer.insert(key.to_string(), value.to_string());
        }
    }
    layer
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
