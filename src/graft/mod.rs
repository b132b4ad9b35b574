//! Correspondence between source revisions and existing destination objects.
//!
//! Grafting attaches a source revision to a destination object that already
//! exists. A graft is only established when exactly one candidate matches;
//! zero candidates is an expected outcome, several is an abort.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{BridgeError, Result};
use crate::primitives::channel::{Helper, HelperRequest, Transport};
use crate::types::{GitOid, NodeId};

/// Outcome of looking up graft candidates for a node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GraftMatch {
    /// No destination object corresponds.
    None,
    /// Exactly one does.
    Unique(GitOid),
    /// Several do; all of them, sorted.
    Ambiguous(Vec<GitOid>),
}

impl GraftMatch {
    /// Classifies a candidate list, ignoring duplicates.
    pub fn from_candidates(mut candidates: Vec<GitOid>) -> Self {
        candidates.sort_unstable();
        candidates.dedup();
        match candidates.len() {
            0 => GraftMatch::None,
            1 => GraftMatch::Unique(candidates[0]),
            _ => GraftMatch::Ambiguous(candidates),
        }
    }
}

/// Source of graft candidates.
pub trait GraftCandidates {
    /// Destination objects that could correspond to `node`.
    fn candidates(&self, node: &NodeId) -> Result<Vec<GitOid>>;
}

impl<C: GraftCandidates + ?Sized> GraftCandidates for &C {
    fn candidates(&self, node: &NodeId) -> Result<Vec<GitOid>> {
        (**self).candidates(node)
    }
}

/// In-memory correspondence relation, built incrementally.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraftTable {
    entries: BTreeMap<NodeId, BTreeSet<GitOid>>,
}

impl GraftTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a candidate; returns `false` if it was already known.
    pub fn add(&mut self, node: NodeId, oid: GitOid) -> bool {
        self.entries.entry(node).or_default().insert(oid)
    }

    /// Removes a candidate; returns `false` if it was not present.
    pub fn remove(&mut self, node: &NodeId, oid: &GitOid) -> bool {
        let Some(set) = self.entries.get_mut(node) else {
            return false;
        };
        let removed = set.remove(oid);
        if set.is_empty() {
            self.entries.remove(node);
        }
        removed
    }

    /// Number of nodes with at least one candidate.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no node has a candidate.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Candidates per node, in node order.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &BTreeSet<GitOid>)> {
        self.entries.iter()
    }
}

impl GraftCandidates for GraftTable {
    fn candidates(&self, node: &NodeId) -> Result<Vec<GitOid>> {
        Ok(self
            .entries
            .get(node)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }
}

/// Helper command answering graft candidate lookups.
pub const GRAFT_CANDIDATES_COMMAND: &str = "graft-candidates";

/// Asks the helper for candidates: one hex object id per response line.
pub struct HelperGraftCandidates<T> {
    helper: Helper<T>,
}

impl<T: Transport> HelperGraftCandidates<T> {
    /// Candidate source backed by `helper`.
    pub fn new(helper: Helper<T>) -> Self {
        Self { helper }
    }

    /// The underlying helper handle.
    pub fn helper(&self) -> &Helper<T> {
        &self.helper
    }
}

impl<T: Transport> GraftCandidates for HelperGraftCandidates<T> {
    fn candidates(&self, node: &NodeId) -> Result<Vec<GitOid>> {
        let request = HelperRequest::new(GRAFT_CANDIDATES_COMMAND).arg(node.to_hex());
        let response = self.helper.query(&request)?;
        response
            .lines()
            .map(|line| {
                GitOid::from_hex(line).map_err(|err| {
                    BridgeError::HelperProtocol(format!("bad graft candidate: {err}"))
                })
            })
            .collect()
    }
}

/// Classifies candidates and records established grafts.
pub struct GraftResolver<C> {
    source: C,
    grafted: BTreeMap<NodeId, GitOid>,
}

impl<C: GraftCandidates> GraftResolver<C> {
    /// Resolver with no grafts established yet.
    pub fn new(source: C) -> Self {
        Self::with_grafts(source, BTreeMap::new())
    }

    /// Starts from previously established grafts.
    pub fn with_grafts(source: C, grafted: BTreeMap<NodeId, GitOid>) -> Self {
        Self { source, grafted }
    }

    /// The candidate source.
    pub fn source(&self) -> &C {
        &self.source
    }

    /// Mutable access to the candidate source.
    pub fn source_mut(&mut self) -> &mut C {
        &mut self.source
    }

    /// Looks up and classifies the candidates for `node`.
    pub fn classify(&self, node: &NodeId) -> Result<GraftMatch> {
        Ok(GraftMatch::from_candidates(self.source.candidates(node)?))
    }

    /// The single destination object for `node`.
    ///
    /// Fails with [`BridgeError::NothingToGraft`] when there is none, which
    /// callers usually treat as "import normally", and with
    /// [`BridgeError::AmbiguousGraft`] when several exist.
    pub fn find_graft(&self, node: &NodeId) -> Result<GitOid> {
        match self.classify(node)? {
            GraftMatch::Unique(oid) => Ok(oid),
            GraftMatch::None => {
                debug!(node = %node, "graft.none");
                Err(BridgeError::NothingToGraft(*node))
            }
            GraftMatch::Ambiguous(candidates) => {
                warn!(node = %node, candidates = candidates.len(), "graft.ambiguous");
                Err(BridgeError::AmbiguousGraft {
                    node: *node,
                    candidates,
                })
            }
        }
    }

    /// Finds and records the graft for `node`. Already grafted nodes keep
    /// their recorded object.
    pub fn establish(&mut self, node: &NodeId) -> Result<GitOid> {
        if let Some(oid) = self.grafted.get(node) {
            return Ok(*oid);
        }
        let oid = self.find_graft(node)?;
        info!(node = %node, oid = %oid, "graft.established");
        self.grafted.insert(*node, oid);
        Ok(oid)
    }

    /// Object already grafted onto `node`, if any.
    pub fn grafted(&self, node: &NodeId) -> Option<GitOid> {
        self.grafted.get(node).copied()
    }

    /// Every established graft.
    pub fn grafts(&self) -> &BTreeMap<NodeId, GitOid> {
        &self.grafted
    }

    /// Splits into the candidate source and the established grafts.
    pub fn into_parts(self) -> (C, BTreeMap<NodeId, GitOid>) {
        (self.source, self.grafted)
    }
}
