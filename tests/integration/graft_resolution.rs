#![allow(missing_docs)]

mod support;

use std::io::Cursor;

use hgbridge::graft::{GraftMatch, GraftResolver, GraftTable, HelperGraftCandidates};
use hgbridge::primitives::channel::{Helper, StreamTransport};
use hgbridge::{BridgeError, BridgeOptions, GitOid, NodeId, Session};
use support::init_tracing;

fn node(byte: u8) -> NodeId {
    NodeId::from_raw([byte; 20])
}

fn oid(byte: u8) -> GitOid {
    GitOid::from_raw([byte; 20])
}

fn framed(body: &str) -> String {
    format!("{}\n{body}", body.len())
}

#[test]
fn zero_one_and_two_candidates() {
    init_tracing();
    let mut table = GraftTable::new();
    table.add(node(1), oid(11));
    table.add(node(2), oid(21));
    table.add(node(2), oid(22));
    let resolver = GraftResolver::new(&table);

    let err = resolver.find_graft(&node(0)).unwrap_err();
    assert!(matches!(err, BridgeError::NothingToGraft(n) if n == node(0)));
    assert!(!err.is_abort());

    assert_eq!(resolver.find_graft(&node(1)).unwrap(), oid(11));

    match resolver.find_graft(&node(2)).unwrap_err() {
        BridgeError::AmbiguousGraft { node: n, candidates } => {
            assert_eq!(n, node(2));
            assert_eq!(candidates, vec![oid(21), oid(22)]);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn helper_supplies_candidates() {
    let answers = [
        framed(""),
        framed(&format!("{}\n", oid(5).to_hex())),
        framed(&format!("{}\n{}\n", oid(6).to_hex(), oid(7).to_hex())),
    ]
    .concat();
    let helper = Helper::new(StreamTransport::new(Cursor::new(answers.into_bytes()), Vec::new()));
    let resolver = GraftResolver::new(HelperGraftCandidates::new(helper.clone()));

    assert_eq!(resolver.classify(&node(1)).unwrap(), GraftMatch::None);
    assert_eq!(resolver.classify(&node(2)).unwrap(), GraftMatch::Unique(oid(5)));
    assert_eq!(
        resolver.classify(&node(3)).unwrap(),
        GraftMatch::Ambiguous(vec![oid(6), oid(7)])
    );
    assert_eq!(helper.queries_sent(), 3);

    // the script is exhausted: the helper is gone for good
    assert!(matches!(resolver.classify(&node(4)), Err(BridgeError::HelperClosed)));
    assert!(matches!(resolver.find_graft(&node(1)), Err(BridgeError::HelperClosed)));
    assert_eq!(helper.queries_sent(), 4);
}

#[test]
fn garbage_candidates_are_protocol_errors() {
    let answers = framed("not-a-hex-id\n");
    let helper = Helper::new(StreamTransport::new(Cursor::new(answers.into_bytes()), Vec::new()));
    let resolver = GraftResolver::new(HelperGraftCandidates::new(helper));
    assert!(matches!(
        resolver.classify(&node(1)),
        Err(BridgeError::HelperProtocol(_))
    ));
}

#[test]
fn session_grafts_through_the_helper() {
    let answers = framed(&format!("{}\n", oid(9).to_hex()));
    let helper = Helper::new(StreamTransport::new(Cursor::new(answers.into_bytes()), Vec::new()));
    let mut session = Session::in_memory(BridgeOptions::default()).unwrap();

    let grafted = session
        .establish_graft_with(HelperGraftCandidates::new(helper.clone()), &node(3))
        .unwrap();
    assert_eq!(grafted, oid(9));
    assert_eq!(session.grafted(&node(3)), Some(oid(9)));
    // established grafts are answered without asking again
    assert_eq!(
        session
            .establish_graft_with(HelperGraftCandidates::new(helper.clone()), &node(3))
            .unwrap(),
        oid(9)
    );
    assert_eq!(helper.queries_sent(), 1);
}
