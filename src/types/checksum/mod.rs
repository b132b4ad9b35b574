#![forbid(unsafe_code)]
//! Node digests.

use sha1::{Digest, Sha1};

use super::NodeId;

/// Incremental digest producing a node identity.
pub trait Checksum {
    /// Restarts from an empty input.
    fn reset(&mut self);
    /// Feeds more input.
    fn update(&mut self, bytes: &[u8]);
    /// Digest of everything fed since the last reset.
    fn finalize(&self) -> NodeId;
}

/// SHA-1 backed [`Checksum`].
pub struct Sha1Node {
    inner: Sha1,
}

impl Default for Sha1Node {
    fn default() -> Self {
        Self { inner: Sha1::new() }
    }
}

impl Checksum for Sha1Node {
    fn reset(&mut self) {
        Digest::reset(&mut self.inner);
    }

    fn update(&mut self, bytes: &[u8]) {
        Digest::update(&mut self.inner, bytes);
    }

    fn finalize(&self) -> NodeId {
        NodeId::from_raw(self.inner.clone().finalize().into())
    }
}

/// Node identity of a revision: `sha1(min(p1, p2) || max(p1, p2) || text)`.
pub fn node_digest(parent1: &NodeId, parent2: &NodeId, text: &[u8]) -> NodeId {
    let (lo, hi) = NodeId::sorted_pair(*parent1, *parent2);
    let mut hasher = Sha1Node::default();
    hasher.update(lo.as_bytes());
    hasher.update(hi.as_bytes());
    hasher.update(text);
    hasher.finalize()
}
