//! Sharded LRU cache of resolved full texts.

use std::num::NonZeroUsize;
use std::sync::Arc;

use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;

use crate::error::Result;
use crate::types::NodeId;

type Slot = Arc<Mutex<Option<Bytes>>>;

/// Sharded LRU cache of materialized revision texts.
///
/// Each node owns a slot with its own lock, so a text is computed at most once
/// even when several resolutions race for it. A capacity of zero disables
/// caching entirely.
pub struct TextCache {
    shards: Vec<Mutex<LruCache<NodeId, Slot>>>,
}

impl TextCache {
    /// Cache holding up to `capacity` texts spread over `shards` locks.
    pub fn new(shards: usize, capacity: usize) -> Self {
        let Some(capacity) = NonZeroUsize::new(capacity) else {
            return Self { shards: Vec::new() };
        };
        let shard_count = shards.clamp(1, capacity.get());
        let per_shard_cap = NonZeroUsize::new(capacity.get() / shard_count).unwrap_or(NonZeroUsize::MIN);
        let mut shard_vec = Vec::with_capacity(shard_count);
        for _ in 0..shard_count {
            shard_vec.push(Mutex::new(LruCache::new(per_shard_cap)));
        }
        Self { shards: shard_vec }
    }

    /// False when built with capacity 0.
    pub fn is_enabled(&self) -> bool {
        !self.shards.is_empty()
    }

    fn shard_for(&self, node: &NodeId) -> Option<&Mutex<LruCache<NodeId, Slot>>> {
        if self.shards.is_empty() {
            return None;
        }
        let mut head = [0u8; 8];
        head.copy_from_slice(&node.as_bytes()[..8]);
        let idx = (u64::from_le_bytes(head) % self.shards.len() as u64) as usize;
        self.shards.get(idx)
    }

    /// Cached text for `node`, if it has been materialized.
    pub fn get(&self, node: &NodeId) -> Option<Bytes> {
        let slot = self.shard_for(node)?.lock().get(node).cloned()?;
        let text = slot.lock().clone();
        text
    }

    /// Returns the cached text or computes it with `init`.
    ///
    /// The boolean is `true` when the text came from the cache. `init` runs at
    /// most once per node across threads unless it fails, in which case the
    /// next caller retries.
    pub fn get_or_try_insert_with<F>(&self, node: &NodeId, init: F) -> Result<(Bytes, bool)>
    where
        F: FnOnce() -> Result<Bytes>,
    {
        let Some(shard) = self.shard_for(node) else {
            return init().map(|text| (text, false));
        };
        let slot = shard
            .lock()
            .get_or_insert(*node, || Arc::new(Mutex::new(None)))
            .clone();
        let mut guard = slot.lock();
        if let Some(text) = guard.as_ref() {
            return Ok((text.clone(), true));
        }
        match init() {
            Ok(text) => {
                *guard = Some(text.clone());
                Ok((text, false))
            }
            Err(err) => {
                drop(guard);
                let mut shard = shard.lock();
                if shard.peek(node).is_some_and(|s| Arc::ptr_eq(s, &slot)) {
                    shard.pop(node);
                }
                Err(err)
            }
        }
    }

    /// Number of slots held, including ones still being populated.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every cached text.
    pub fn clear(&self) {
        for shard in &self.shards {
            shard.lock().clear();
        }
    }
}
