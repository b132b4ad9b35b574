//! Resolver instrumentation hooks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Hooks observing chain resolution.
pub trait ResolverMetrics: Send + Sync {
    /// A walked node's text was already cached.
    fn cache_hit(&self);

    /// A walked node had to be materialized.
    fn cache_miss(&self);

    /// A patch was applied to produce a text.
    fn patch_applied(&self);

    /// A materialized text was checked against its node digest.
    fn digest_verified(&self);

    /// A chain walk finished.
    ///
    /// # Parameters
    /// * `depth` - Number of records that needed materializing.
    fn chain_walked(&self, depth: usize);
}

/// Discards everything.
#[derive(Default)]
pub struct NoopMetrics;

impl ResolverMetrics for NoopMetrics {
    fn cache_hit(&self) {}
    fn cache_miss(&self) {}
    fn patch_applied(&self) {}
    fn digest_verified(&self) {}
    fn chain_walked(&self, _depth: usize) {}
}

/// Atomic counters, safe to share between resolving threads.
#[derive(Default, Debug)]
pub struct CounterMetrics {
    /// Lookups served from the text cache.
    pub cache_hits: AtomicU64,

    /// Lookups that missed the text cache.
    pub cache_misses: AtomicU64,

    /// Patches applied.
    pub patches_applied: AtomicU64,

    /// Digest checks performed.
    pub digests_verified: AtomicU64,

    /// Chain walks completed.
    pub chains_walked: AtomicU64,

    /// Longest chain materialized by a single walk.
    pub max_depth: AtomicU64,
}

impl CounterMetrics {
    /// Reads a counter.
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

impl ResolverMetrics for CounterMetrics {
    fn cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    fn cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    fn patch_applied(&self) {
        self.patches_applied.fetch_add(1, Ordering::Relaxed);
    }

    fn digest_verified(&self) {
        self.digests_verified.fetch_add(1, Ordering::Relaxed);
    }

    fn chain_walked(&self, depth: usize) {
        self.chains_walked.fetch_add(1, Ordering::Relaxed);
        self.max_depth.fetch_max(depth as u64, Ordering::Relaxed);
    }
}

/// The metrics used when none are supplied: [`NoopMetrics`].
pub fn default_metrics() -> Arc<dyn ResolverMetrics> {
    Arc::new(NoopMetrics)
}
