//! Bridge options and their TOML configuration file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::changegroup::Layout;
use crate::error::{BridgeError, Result};

/// Options shared by a bridge session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeOptions {
    /// Layout assumed for changegroup streams when none is given.
    pub layout: Layout,
    /// Total number of texts kept by the resolver cache; 0 disables it.
    pub cache_capacity: usize,
    /// Number of independently locked cache shards.
    pub cache_shards: usize,
    /// Whether resolved texts are checked against their node digest.
    pub verify_digests: bool,
    /// Location of the bridge metadata document.
    pub metadata_path: Option<PathBuf>,
    /// Whether a missing metadata document is created on open.
    pub create_metadata_if_missing: bool,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            layout: Layout::V2,
            cache_capacity: 4096,
            cache_shards: 8,
            verify_digests: true,
            metadata_path: None,
            create_metadata_if_missing: true,
        }
    }
}

impl BridgeOptions {
    /// Sets the changegroup layout.
    pub fn layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    /// Sets the text cache capacity; 0 disables it.
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Sets the number of cache shards.
    pub fn cache_shards(mut self, shards: usize) -> Self {
        self.cache_shards = shards;
        self
    }

    /// Turns digest verification on or off.
    pub fn verify_digests(mut self, verify: bool) -> Self {
        self.verify_digests = verify;
        self
    }

    /// Sets where bridge metadata is stored.
    pub fn metadata_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.metadata_path = Some(path.into());
        self
    }

    /// Whether opening a session creates absent metadata.
    pub fn create_metadata_if_missing(mut self, create: bool) -> Self {
        self.create_metadata_if_missing = create;
        self
    }
}

/// `<config dir>/hgbridge/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("hgbridge").join("config.toml"))
}

/// Loads options from `explicit`, or from the default location.
///
/// An explicit path must exist. A missing default file yields defaults.
pub fn load_options(explicit: Option<PathBuf>) -> Result<BridgeOptions> {
    match explicit {
        Some(path) => read_file(&path),
        None => match default_config_path() {
            Some(path) if path.exists() => read_file(&path),
            _ => Ok(BridgeOptions::default()),
        },
    }
}

fn read_file(path: &Path) -> Result<BridgeOptions> {
    let contents = fs::read_to_string(path).map_err(|err| {
        BridgeError::Config(format!("cannot read {}: {err}", path.display()))
    })?;
    let options = toml::from_str(&contents)
        .map_err(|err| BridgeError::Config(format!("{}: {err}", path.display())))?;
    debug!(path = %path.display(), "config.loaded");
    Ok(options)
}
