#![allow(missing_docs)]

mod support;

use std::fs;

use hgbridge::metadata::{
    BridgeMetadata, GateState, MetadataStore, MetadataVersion, UpgradeOutcome, METADATA_VERSION,
    UPGRADE_COMMAND,
};
use hgbridge::{BridgeError, BridgeOptions, GitOid, NodeId, Session};
use support::init_tracing;
use tempfile::TempDir;

fn store_with(contents: &str) -> (TempDir, MetadataStore) {
    let dir = TempDir::new().expect("tempdir");
    let store = MetadataStore::new(dir.path().join("bridge.json"));
    fs::write(store.path(), contents).expect("write metadata");
    (dir, store)
}

#[test]
fn legacy_metadata_names_the_intermediate_release() {
    init_tracing();
    let (_dir, store) = store_with(r#"{"version": 1, "tags": ["whatever"]}"#);
    assert_eq!(store.gate().unwrap(), Some(GateState::UnsupportedLegacy));
    let err = store.load().unwrap_err();
    assert!(matches!(err, BridgeError::UnsupportedLegacy { found: 1 }));
    let msg = err.to_string();
    assert!(msg.contains("0.5.x"), "{msg}");
    assert!(msg.contains(UPGRADE_COMMAND), "{msg}");

    assert!(matches!(
        store.upgrade(),
        Err(BridgeError::UnsupportedLegacy { .. })
    ));
}

#[test]
fn session_open_runs_the_gate_first() {
    let (dir, store) = store_with(r#"{"version": 2, "correspondences": {}}"#);
    let options = BridgeOptions::default().metadata_path(store.path());
    let err = match Session::open(options) {
        Ok(_) => panic!("outdated metadata must not open"),
        Err(err) => err,
    };
    assert!(matches!(
        err,
        BridgeError::UpgradeRequired { found: 2, current: METADATA_VERSION }
    ));
    assert!(!err.to_string().contains("0.5.x"));
    drop(dir);
}

#[test]
fn newer_metadata_is_refused() {
    let (_dir, store) = store_with(&format!(r#"{{"version": {}}}"#, METADATA_VERSION + 1));
    assert!(matches!(
        store.load(),
        Err(BridgeError::MetadataTooNew { .. })
    ));
}

#[test]
fn upgrade_keeps_correspondences() {
    let node = NodeId::from_raw([0x11; 20]);
    let oid = GitOid::from_raw([0x22; 20]);
    let (_dir, store) = store_with(&format!(
        r#"{{"version": 2, "correspondences": {{"{}": ["{}"]}}}}"#,
        node.to_hex(),
        oid.to_hex()
    ));

    assert_eq!(
        store.upgrade().unwrap(),
        UpgradeOutcome::Upgraded {
            from: MetadataVersion(2)
        }
    );
    assert_eq!(store.upgrade().unwrap(), UpgradeOutcome::AlreadyCurrent);

    let options = BridgeOptions::default().metadata_path(store.path());
    let mut session = Session::open(options).unwrap();
    assert_eq!(session.establish_graft(&node).unwrap(), oid);
}

#[test]
fn save_then_load_is_lossless() {
    let dir = TempDir::new().unwrap();
    let store = MetadataStore::new(dir.path().join("nested").join("bridge.json"));
    let mut metadata = BridgeMetadata::default();
    metadata
        .correspondences
        .add(NodeId::from_raw([1; 20]), GitOid::from_raw([2; 20]));
    metadata
        .grafts
        .insert(NodeId::from_raw([1; 20]), GitOid::from_raw([2; 20]));
    store.save(&metadata).unwrap();
    assert_eq!(store.load().unwrap(), Some(metadata));

    let leftovers: Vec<_> = fs::read_dir(dir.path().join("nested"))
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(leftovers.len(), 1, "temporary files are renamed away: {leftovers:?}");
}

#[test]
fn malformed_documents_are_serialization_errors() {
    let (_dir, store) = store_with("{ not json");
    assert!(matches!(store.load(), Err(BridgeError::Serialization(_))));
}
