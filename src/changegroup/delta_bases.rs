//! Out-of-band delta bases for cg01 records.

use rustc_hash::FxHashMap;

use crate::types::NodeId;

/// Out-of-band delta bases for cg01 records, keyed by node.
///
/// Only the cg01 layout consults this table. Absent entries read as NULL, i.e.
/// full text.
#[derive(Clone, Debug, Default)]
pub struct DeltaBases {
    map: FxHashMap<NodeId, NodeId>,
}

impl DeltaBases {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Base recorded for `node`, or NULL.
    pub fn get(&self, node: &NodeId) -> NodeId {
        self.map.get(node).copied().unwrap_or(NodeId::NULL)
    }

    /// Records `base` for `node`, returning the previous entry.
    pub fn insert(&mut self, node: NodeId, base: NodeId) -> Option<NodeId> {
        self.map.insert(node, base)
    }

    /// Forgets the base of `node`, returning it.
    pub fn remove(&mut self, node: &NodeId) -> Option<NodeId> {
        self.map.remove(node)
    }

    /// Forgets every base.
    pub fn clear(&mut self) {
        self.map.clear();
    }

    /// Number of nodes with a recorded base.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// True when no base is recorded.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
