//! Persisted bridge metadata and the version gate guarding it.
//!
//! The document is JSON with a `version` ordinal, the graft `correspondences`
//! and the confirmed `grafts`. Its version is probed and checked before any
//! other part of the document is decoded, so metadata written by an
//! incompatible release is never interpreted.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::{BridgeError, Result};
use crate::graft::GraftTable;
use crate::types::{GitOid, NodeId};

/// Format version written by this build.
pub const METADATA_VERSION: u32 = 3;

/// Oldest format that [`MetadataStore::upgrade`] can still rewrite. Anything
/// older has to go through an intermediate release first.
pub const OLDEST_UPGRADABLE: u32 = 2;

/// Release line able to upgrade metadata older than [`OLDEST_UPGRADABLE`].
pub const LEGACY_RELEASE_LINE: &str = "0.5";

/// Command that rewrites metadata at the current format.
pub const UPGRADE_COMMAND: &str = "hgbridge upgrade";

/// Format ordinal stored with the metadata.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataVersion(pub u32);

impl MetadataVersion {
    /// The format this build writes.
    pub const CURRENT: MetadataVersion = MetadataVersion(METADATA_VERSION);

    /// The raw ordinal.
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for MetadataVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the gate decided about a stored version.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    /// Written by this format; proceed.
    Current,
    /// Older but upgradable in place.
    NeedsUpgrade,
    /// Too old for a direct upgrade.
    UnsupportedLegacy,
    /// Written by a newer release.
    TooNew,
}

/// Classifies a stored version. Legacy takes precedence over the generic
/// upgrade case.
pub fn gate_state(version: MetadataVersion) -> GateState {
    let v = version.get();
    if v > METADATA_VERSION {
        GateState::TooNew
    } else if v < OLDEST_UPGRADABLE {
        GateState::UnsupportedLegacy
    } else if v < METADATA_VERSION {
        GateState::NeedsUpgrade
    } else {
        GateState::Current
    }
}

/// Fails unless `version` is the current format.
pub fn check_version(version: MetadataVersion) -> Result<()> {
    let state = gate_state(version);
    debug!(version = version.get(), ?state, "metadata.gate");
    match state {
        GateState::Current => Ok(()),
        GateState::NeedsUpgrade => Err(BridgeError::UpgradeRequired {
            found: version.get(),
            current: METADATA_VERSION,
        }),
        GateState::UnsupportedLegacy => Err(BridgeError::UnsupportedLegacy {
            found: version.get(),
        }),
        GateState::TooNew => Err(BridgeError::MetadataTooNew {
            found: version.get(),
            current: METADATA_VERSION,
        }),
    }
}

/// The metadata document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeMetadata {
    /// Format ordinal.
    pub version: MetadataVersion,
    /// Candidate destination objects per source node.
    #[serde(default)]
    pub correspondences: GraftTable,
    /// Established grafts.
    #[serde(default)]
    pub grafts: BTreeMap<NodeId, GitOid>,
}

impl Default for BridgeMetadata {
    fn default() -> Self {
        Self {
            version: MetadataVersion::CURRENT,
            correspondences: GraftTable::default(),
            grafts: BTreeMap::new(),
        }
    }
}

/// Only the version; unknown fields are skipped, not decoded.
#[derive(Deserialize)]
struct VersionProbe {
    // documents from before versioning carry no field at all
    #[serde(default)]
    version: MetadataVersion,
}

/// Format 2 had no confirmed grafts.
#[derive(Deserialize)]
struct MetadataV2 {
    #[serde(default)]
    correspondences: GraftTable,
}

/// Result of [`MetadataStore::upgrade`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UpgradeOutcome {
    /// Nothing to do.
    AlreadyCurrent,
    /// Rewritten from the given format.
    Upgraded {
        /// Format found on disk.
        from: MetadataVersion,
    },
}

/// Metadata document on disk.
#[derive(Clone, Debug)]
pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    /// Store for the document at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the document is present on disk.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn read_raw(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn decode<T: DeserializeOwned>(&self, raw: &[u8]) -> Result<T> {
        serde_json::from_slice(raw).map_err(|err| self.serialization_failed(err))
    }

    fn serialization_failed(&self, err: serde_json::Error) -> BridgeError {
        error!(path = %self.path.display(), %err, "metadata.serialization_failed");
        BridgeError::Serialization(format!("{}: {err}", self.path.display()))
    }

    /// Stored format version, or `None` when there is no document.
    pub fn probe_version(&self) -> Result<Option<MetadataVersion>> {
        let Some(raw) = self.read_raw()? else {
            return Ok(None);
        };
        let probe: VersionProbe = self.decode(&raw)?;
        Ok(Some(probe.version))
    }

    /// Gate state of the stored document, or `None` when there is none.
    pub fn gate(&self) -> Result<Option<GateState>> {
        Ok(self.probe_version()?.map(gate_state))
    }

    /// Loads the document after the version gate accepted it.
    pub fn load(&self) -> Result<Option<BridgeMetadata>> {
        let Some(raw) = self.read_raw()? else {
            return Ok(None);
        };
        let probe: VersionProbe = self.decode(&raw)?;
        check_version(probe.version)?;
        let metadata = self.decode(&raw)?;
        debug!(path = %self.path.display(), "metadata.loaded");
        Ok(Some(metadata))
    }

    /// Writes the document through a temporary file in the same directory.
    pub fn save(&self, metadata: &BridgeMetadata) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, metadata)
            .map_err(|err| self.serialization_failed(err))?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|err| BridgeError::Io(err.error))?;
        debug!(path = %self.path.display(), version = metadata.version.get(), "metadata.saved");
        Ok(())
    }

    /// Rewrites upgradable metadata at the current format.
    ///
    /// Legacy and too-new documents are refused like any other load.
    pub fn upgrade(&self) -> Result<UpgradeOutcome> {
        let raw = self.read_raw()?.ok_or_else(|| {
            BridgeError::InvalidArgument(format!("no metadata at {}", self.path.display()))
        })?;
        let probe: VersionProbe = self.decode(&raw)?;
        let from = probe.version;
        match gate_state(from) {
            GateState::Current => Ok(UpgradeOutcome::AlreadyCurrent),
            GateState::NeedsUpgrade => {
                let old: MetadataV2 = self.decode(&raw)?;
                let metadata = BridgeMetadata {
                    version: MetadataVersion::CURRENT,
                    correspondences: old.correspondences,
                    grafts: BTreeMap::new(),
                };
                self.save(&metadata)?;
                info!(path = %self.path.display(), from = from.get(), to = METADATA_VERSION, "metadata.upgraded");
                Ok(UpgradeOutcome::Upgraded { from })
            }
            GateState::UnsupportedLegacy | GateState::TooNew => {
                check_version(from).map(|()| UpgradeOutcome::AlreadyCurrent)
            }
        }
    }
}
