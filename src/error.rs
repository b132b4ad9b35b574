//! Error taxonomy shared by every bridge operation.

use std::fmt;
use std::io;

use thiserror::Error;

use crate::metadata::{LEGACY_RELEASE_LINE, UPGRADE_COMMAND};
use crate::types::{GitOid, NodeId};

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Whether retrying the failed operation may succeed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Transience {
    /// Retry will never help without changing inputs or stored state.
    Permanent,
    /// Only the caller knows (for example whether restarting the helper is safe).
    Unknown,
}

/// What made a resolved revision untrustworthy.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum CorruptionKind {
    /// The digest recomputed over the materialized text differs from the declared node.
    DigestMismatch {
        /// Digest computed from the parents and reconstructed text.
        computed: NodeId,
    },
    /// The delta-base chain reaches the node again.
    DeltaCycle,
}

impl fmt::Display for CorruptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorruptionKind::DigestMismatch { computed } => {
                write!(f, "digest mismatch (computed {computed})")
            }
            CorruptionKind::DeltaCycle => f.write_str("delta base chain loops back on itself"),
        }
    }
}

/// Abort taxonomy exposed to callers.
///
/// Callers match on the variant to pick remediation text; every variant except
/// [`BridgeError::NothingToGraft`] stops the current operation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BridgeError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// A record or patch failed offset/width constraints.
    #[error("malformed record: {detail}")]
    MalformedRecord {
        /// What was wrong with the record.
        detail: String,
    },
    /// A fixed-width field was written with a value of the wrong length.
    #[error("field `{field}` expects {expected} bytes, got {actual}")]
    FieldWidth {
        /// Field name.
        field: &'static str,
        /// Width the field requires.
        expected: usize,
        /// Width that was supplied.
        actual: usize,
    },
    /// A textual identifier could not be decoded.
    #[error("invalid identifier: {0}")]
    InvalidId(String),
    /// A resolved revision failed integrity checks.
    #[error("corrupted revision {node}: {kind}")]
    Corruption {
        /// Offending node.
        node: NodeId,
        /// Nature of the corruption.
        kind: CorruptionKind,
    },
    /// A revision referenced by a delta chain is not known to the session.
    #[error("unknown revision {0}")]
    UnknownRevision(NodeId),
    /// No destination revision corresponds to the source node.
    #[error("nothing to graft for {0}")]
    NothingToGraft(NodeId),
    /// More than one destination revision corresponds to the source node.
    #[error("cannot graft {node}: {} candidates ({})", .candidates.len(), join_oids(.candidates))]
    AmbiguousGraft {
        /// Source node.
        node: NodeId,
        /// Every candidate found; none is chosen.
        candidates: Vec<GitOid>,
    },
    /// Metadata was written by an older, upgradable format version.
    #[error(
        "bridge metadata needs upgrade (format {found}, current is {current}).\nPlease run `{cmd}`.",
        cmd = UPGRADE_COMMAND
    )]
    UpgradeRequired {
        /// Stored format version.
        found: u32,
        /// Format version this build writes.
        current: u32,
    },
    /// Metadata predates the oldest format that can still be upgraded directly.
    #[error(
        "metadata from releases older than {line}.0 is not supported (format {found}).\nPlease run `{cmd}` with version {line}.x first.",
        line = LEGACY_RELEASE_LINE,
        cmd = UPGRADE_COMMAND
    )]
    UnsupportedLegacy {
        /// Stored format version.
        found: u32,
    },
    /// Metadata was written by a newer release.
    #[error("metadata format {found} is newer than supported format {current}; please upgrade hgbridge")]
    MetadataTooNew {
        /// Stored format version.
        found: u32,
        /// Format version this build writes.
        current: u32,
    },
    /// A query was issued against a helper channel that has closed.
    #[error("helper channel is closed")]
    HelperClosed,
    /// The helper answered something that does not follow the protocol.
    #[error("helper protocol error: {0}")]
    HelperProtocol(String),
    /// Metadata document could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Configuration file could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),
    /// Caller supplied an invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

fn join_oids(oids: &[GitOid]) -> String {
    oids.iter()
        .map(GitOid::to_hex)
        .collect::<Vec<_>>()
        .join(", ")
}

impl BridgeError {
    pub(crate) fn malformed(detail: impl Into<String>) -> Self {
        BridgeError::MalformedRecord {
            detail: detail.into(),
        }
    }

    pub(crate) fn truncated(what: &str, needed: usize, have: usize) -> Self {
        Self::malformed(format!("{what} needs {needed} bytes, buffer has {have}"))
    }

    /// Whether this condition aborts the current operation.
    ///
    /// Only [`BridgeError::NothingToGraft`] is an expected branch of control flow.
    pub fn is_abort(&self) -> bool {
        !matches!(self, BridgeError::NothingToGraft(_))
    }

    /// Whether retrying may help. Nothing in this crate is retried transparently.
    pub fn transience(&self) -> Transience {
        match self {
            BridgeError::Io(_) | BridgeError::HelperClosed => Transience::Unknown,
            _ => Transience::Permanent,
        }
    }

    /// Node identity attached to the error, if any.
    pub fn node(&self) -> Option<&NodeId> {
        match self {
            BridgeError::Corruption { node, .. }
            | BridgeError::UnknownRevision(node)
            | BridgeError::NothingToGraft(node)
            | BridgeError::AmbiguousGraft { node, .. } => Some(node),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for BridgeError {
    fn from(err: toml::de::Error) -> Self {
        BridgeError::Config(err.to_string())
    }
}
