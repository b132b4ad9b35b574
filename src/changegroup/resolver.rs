//! Delta-chain resolution into verified full texts.

use std::sync::Arc;

use bytes::Bytes;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace, warn};

use super::cache::TextCache;
use super::metrics::{default_metrics, ResolverMetrics};
use super::patch;
use super::record::Revision;
use crate::config::BridgeOptions;
use crate::error::{BridgeError, CorruptionKind, Result};
use crate::types::checksum::node_digest;
use crate::types::NodeId;

/// Lookup of decoded revisions by node.
pub trait RevisionSource: Send + Sync {
    /// The revision declared as `node`, if known.
    fn revision(&self, node: &NodeId) -> Option<Arc<Revision>>;
}

impl<S: RevisionSource + ?Sized> RevisionSource for Arc<S> {
    fn revision(&self, node: &NodeId) -> Option<Arc<Revision>> {
        (**self).revision(node)
    }
}

/// In-memory revision index filled from changegroups.
#[derive(Default, Debug, Clone)]
pub struct RevisionStore {
    revisions: FxHashMap<NodeId, Arc<Revision>>,
}

impl RevisionStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a revision, replacing any earlier one with the same node.
    pub fn insert(&mut self, revision: Revision) -> Option<Arc<Revision>> {
        self.revisions.insert(revision.node, Arc::new(revision))
    }

    /// Revision stored for `node`.
    pub fn get(&self, node: &NodeId) -> Option<&Arc<Revision>> {
        self.revisions.get(node)
    }

    /// Whether `node` is stored.
    pub fn contains(&self, node: &NodeId) -> bool {
        self.revisions.contains_key(node)
    }

    /// Number of stored revisions.
    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    /// Stored nodes, in no particular order.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.revisions.keys()
    }

    /// Drops every stored revision.
    pub fn clear(&mut self) {
        self.revisions.clear();
    }
}

impl Extend<Revision> for RevisionStore {
    fn extend<I: IntoIterator<Item = Revision>>(&mut self, iter: I) {
        for revision in iter {
            self.insert(revision);
        }
    }
}

impl FromIterator<Revision> for RevisionStore {
    fn from_iter<I: IntoIterator<Item = Revision>>(iter: I) -> Self {
        let mut store = Self::new();
        store.extend(iter);
        store
    }
}

impl RevisionSource for RevisionStore {
    fn revision(&self, node: &NodeId) -> Option<Arc<Revision>> {
        self.revisions.get(node).cloned()
    }
}

/// Materializes full revision texts from delta chains.
///
/// Resolution walks delta-base links from the requested node until it reaches
/// a cached text or a full-text record, then applies the patches from the base
/// towards the tip. Every text produced along the way is cached and, unless
/// disabled, checked against its node digest.
pub struct ChainResolver {
    cache: TextCache,
    verify: bool,
    metrics: Arc<dyn ResolverMetrics>,
}

impl ChainResolver {
    /// Resolver sized and configured from `options`.
    pub fn new(options: &BridgeOptions) -> Self {
        Self {
            cache: TextCache::new(options.cache_shards, options.cache_capacity),
            verify: options.verify_digests,
            metrics: default_metrics(),
        }
    }

    /// Reports cache and chain activity to `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<dyn ResolverMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Whether resolved texts are checked against their node.
    pub fn verifies_digests(&self) -> bool {
        self.verify
    }

    /// Full text of `node`.
    ///
    /// The NULL node resolves to the empty text.
    pub fn resolve<S>(&self, source: &S, node: &NodeId) -> Result<Bytes>
    where
        S: RevisionSource + ?Sized,
    {
        if node.is_null() {
            return Ok(Bytes::new());
        }

        let mut chain: Vec<Arc<Revision>> = Vec::new();
        let mut seen: FxHashSet<NodeId> = FxHashSet::default();
        let mut text = Bytes::new();
        let mut cursor = *node;
        loop {
            if let Some(cached) = self.cache.get(&cursor) {
                self.metrics.cache_hit();
                text = cached;
                break;
            }
            self.metrics.cache_miss();
            if !seen.insert(cursor) {
                warn!(node = %node, repeated = %cursor, "resolver.delta_cycle");
                return Err(BridgeError::Corruption {
                    node: cursor,
                    kind: CorruptionKind::DeltaCycle,
                });
            }
            let revision = source
                .revision(&cursor)
                .ok_or(BridgeError::UnknownRevision(cursor))?;
            let base = revision.delta_base;
            chain.push(revision);
            if base.is_null() {
                break;
            }
            cursor = base;
        }
        debug!(node = %node, depth = chain.len(), "resolver.chain_walked");
        self.metrics.chain_walked(chain.len());

        for revision in chain.iter().rev() {
            let base = text;
            let (next, hit) = self
                .cache
                .get_or_try_insert_with(&revision.node, || self.materialize(revision, &base))?;
            if hit {
                self.metrics.cache_hit();
            }
            text = next;
        }
        Ok(text)
    }

    fn materialize(&self, revision: &Revision, base: &[u8]) -> Result<Bytes> {
        let text = patch::apply(base, &revision.patch)?;
        self.metrics.patch_applied();
        trace!(node = %revision.node, len = text.len(), "resolver.patch_applied");
        if self.verify {
            self.metrics.digest_verified();
            let computed = node_digest(&revision.parent1, &revision.parent2, &text);
            if computed != revision.node {
                warn!(node = %revision.node, computed = %computed, "resolver.digest_mismatch");
                return Err(BridgeError::Corruption {
                    node: revision.node,
                    kind: CorruptionKind::DigestMismatch { computed },
                });
            }
        }
        Ok(Bytes::from(text))
    }

    /// Cached text for `node`, without resolving anything.
    pub fn cached(&self, node: &NodeId) -> Option<Bytes> {
        self.cache.get(node)
    }

    /// Drops every cached text.
    pub fn clear(&self) {
        self.cache.clear();
    }
}
