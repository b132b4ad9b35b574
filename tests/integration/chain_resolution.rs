#![allow(missing_docs)]

mod support;

use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use hgbridge::changegroup::patch::diff;
use hgbridge::changegroup::{ChainResolver, CounterMetrics, RevisionSource, RevisionStore};
use hgbridge::error::CorruptionKind;
use hgbridge::{BridgeError, BridgeOptions, NodeId, Revision};
use support::{init_tracing, Chain};

fn store_of(chain: &Chain) -> RevisionStore {
    chain.revisions.iter().cloned().collect()
}

#[test]
fn three_record_chain_verifies_every_link() {
    init_tracing();
    let chain = Chain::build(&[b"base\n", b"base\nmiddle\n", b"tip\nbase\nmiddle\n"]);
    let store = store_of(&chain);
    let metrics = Arc::new(CounterMetrics::default());
    let resolver = ChainResolver::new(&BridgeOptions::default()).with_metrics(metrics.clone());

    let text = resolver.resolve(&store, &chain.tip()).unwrap();
    assert_eq!(text, &b"tip\nbase\nmiddle\n"[..]);
    assert_eq!(CounterMetrics::get(&metrics.digests_verified), 3);
    assert_eq!(CounterMetrics::get(&metrics.max_depth), 3);
    for (revision, expected) in chain.revisions.iter().zip(&chain.texts) {
        assert_eq!(resolver.cached(&revision.node).unwrap(), &expected[..]);
    }
}

#[test]
fn resolution_resumes_from_cached_intermediates() {
    let chain = Chain::build(&[b"a\n", b"a\nb\n", b"a\nb\nc\n", b"a\nb\nc\nd\n"]);
    let store = store_of(&chain);
    let metrics = Arc::new(CounterMetrics::default());
    let resolver = ChainResolver::new(&BridgeOptions::default()).with_metrics(metrics.clone());

    resolver.resolve(&store, &chain.revisions[1].node).unwrap();
    assert_eq!(CounterMetrics::get(&metrics.patches_applied), 2);
    resolver.resolve(&store, &chain.tip()).unwrap();
    assert_eq!(CounterMetrics::get(&metrics.patches_applied), 4);
    assert_eq!(CounterMetrics::get(&metrics.cache_hits), 1);
}

#[test]
fn corrupted_middle_link_is_reported_with_both_digests() {
    let chain = Chain::build(&[b"one\n", b"one\ntwo\n", b"one\ntwo\nthree\n"]);
    let mut revisions = chain.revisions.clone();
    let middle = revisions[1].node;
    revisions[1].patch = Bytes::from(diff(b"one\n", b"one\nTWO\n").unwrap());
    let store: RevisionStore = revisions.into_iter().collect();
    let resolver = ChainResolver::new(&BridgeOptions::default());

    match resolver.resolve(&store, &chain.tip()).unwrap_err() {
        BridgeError::Corruption {
            node,
            kind: CorruptionKind::DigestMismatch { computed },
        } => {
            assert_eq!(node, middle);
            assert_ne!(computed, middle);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(resolver.cached(&chain.revisions[0].node).is_some());
    assert!(resolver.cached(&middle).is_none());
}

#[test]
fn direct_and_indirect_cycles_are_corruption() {
    let chain = Chain::build(&[b"p\n", b"p\nq\n", b"p\nq\nr\n"]);

    let mut direct = chain.revisions.clone();
    direct[0].delta_base = direct[0].node;
    let direct_node = direct[0].node;
    let store: RevisionStore = direct.into_iter().collect();
    let err = ChainResolver::new(&BridgeOptions::default())
        .resolve(&store, &chain.tip())
        .unwrap_err();
    assert!(matches!(
        err,
        BridgeError::Corruption { node, kind: CorruptionKind::DeltaCycle } if node == direct_node
    ));

    let mut indirect = chain.revisions.clone();
    indirect[0].delta_base = indirect[2].node;
    let store: RevisionStore = indirect.into_iter().collect();
    let err = ChainResolver::new(&BridgeOptions::default())
        .resolve(&store, &chain.tip())
        .unwrap_err();
    assert!(matches!(
        err,
        BridgeError::Corruption { kind: CorruptionKind::DeltaCycle, .. }
    ));
    assert!(err.is_abort());
}

#[test]
fn missing_base_is_unknown_revision() {
    let chain = Chain::build(&[b"x\n", b"x\ny\n"]);
    let store: RevisionStore = chain.revisions[1..].iter().cloned().collect();
    let err = ChainResolver::new(&BridgeOptions::default())
        .resolve(&store, &chain.tip())
        .unwrap_err();
    assert!(matches!(err, BridgeError::UnknownRevision(n) if n == chain.revisions[0].node));
    assert_eq!(err.node(), Some(&chain.revisions[0].node));
}

#[test]
fn concurrent_resolutions_apply_each_patch_once() {
    let texts: Vec<Vec<u8>> = (0..16)
        .map(|i| (0..=i).map(|j| format!("line {j}\n")).collect::<String>().into_bytes())
        .collect();
    let refs: Vec<&[u8]> = texts.iter().map(Vec::as_slice).collect();
    let chain = Chain::build(&refs);
    let store = Arc::new(store_of(&chain));
    let metrics = Arc::new(CounterMetrics::default());
    let resolver = Arc::new(
        ChainResolver::new(&BridgeOptions::default()).with_metrics(metrics.clone()),
    );
    let tip = chain.tip();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            let resolver = Arc::clone(&resolver);
            thread::spawn(move || resolver.resolve(&*store, &tip).unwrap())
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), &texts[15][..]);
    }
    assert_eq!(CounterMetrics::get(&metrics.patches_applied), 16);
    assert_eq!(CounterMetrics::get(&metrics.digests_verified), 16);
}

#[test]
fn disabled_cache_still_resolves() {
    let chain = Chain::build(&[b"1\n", b"1\n2\n"]);
    let store = store_of(&chain);
    let resolver = ChainResolver::new(&BridgeOptions::default().cache_capacity(0));
    assert_eq!(resolver.resolve(&store, &chain.tip()).unwrap(), &b"1\n2\n"[..]);
    assert!(resolver.cached(&chain.tip()).is_none());
    assert_eq!(resolver.resolve(&EmptySource, &NodeId::NULL).unwrap(), Bytes::new());
}

struct EmptySource;

impl RevisionSource for EmptySource {
    fn revision(&self, _node: &NodeId) -> Option<Arc<Revision>> {
        None
    }
}
