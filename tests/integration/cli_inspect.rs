#![allow(missing_docs)]

mod support;

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use hgbridge::changegroup::{Changegroup, ChunkWriter, FileGroup, Layout};
use hgbridge::metadata::METADATA_VERSION;
use serde_json::Value;
use support::{manifest_record, Chain};
use tempfile::TempDir;

struct Fixture {
    dir: TempDir,
    chain: Chain,
    cg_path: PathBuf,
    config: PathBuf,
}

fn fixture(layout: Layout) -> Fixture {
    let dir = TempDir::new().expect("tempdir");
    let chain = Chain::build(&[b"first\n", b"first\nsecond\n", b"third\nfirst\nsecond\n"]);
    let mut cg = Changegroup::new(layout);
    cg.changesets = chain.chunks(layout, &mut cg.bases);
    cg.manifests = vec![manifest_record(layout, &mut cg.bases, b"manifest\n")];
    cg.files.push(FileGroup {
        path: b"README".to_vec(),
        revisions: Chain::build(&[b"readme\n"]).chunks(layout, &mut cg.bases),
    });
    let mut bytes = Vec::new();
    ChunkWriter::new(&mut bytes, layout)
        .write_changegroup(&cg)
        .expect("encode changegroup");
    let cg_path = dir.path().join("bundle.cg");
    fs::write(&cg_path, bytes).expect("write changegroup");
    let config = dir.path().join("config.toml");
    fs::write(&config, "").expect("write config");
    Fixture {
        dir,
        chain,
        cg_path,
        config,
    }
}

fn inspect(config: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("cg-inspect");
    cmd.env("HGBRIDGE_CONFIG", config);
    cmd
}

#[test]
fn records_lists_every_section_as_json() {
    let fx = fixture(Layout::V1);
    let output = inspect(&fx.config)
        .args(["--format", "json", "--layout", "01", "records"])
        .arg(&fx.cg_path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: Value = serde_json::from_slice(&output).expect("valid json");
    assert_eq!(json["layout"], "01");
    let records = json["records"].as_array().expect("records array");
    assert_eq!(records.len(), 5);
    assert_eq!(records[0]["section"], "changeset");
    assert_eq!(records[3]["section"], "manifest");
    assert_eq!(records[4]["section"], "file:README");
    assert_eq!(
        records[2]["delta_base"],
        fx.chain.revisions[1].node.to_hex().as_str()
    );
}

#[test]
fn resolve_prints_the_full_text() {
    let fx = fixture(Layout::V2);
    let output = inspect(&fx.config)
        .arg("resolve")
        .arg(&fx.cg_path)
        .arg(fx.chain.tip().to_hex().to_uppercase())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(output, b"third\nfirst\nsecond\n");
}

#[test]
fn resolve_of_unknown_node_fails() {
    let fx = fixture(Layout::V2);
    let output = inspect(&fx.config)
        .arg("resolve")
        .arg(&fx.cg_path)
        .arg("ab".repeat(20))
        .assert()
        .failure()
        .code(1)
        .get_output()
        .stderr
        .clone();
    assert!(String::from_utf8_lossy(&output).contains("unknown revision"));
}

#[test]
fn check_and_upgrade_metadata() {
    let fx = fixture(Layout::V2);
    let meta = fx.dir.path().join("bridge.json");
    fs::write(&meta, r#"{"version": 2, "correspondences": {}}"#).unwrap();

    let output = inspect(&fx.config)
        .args(["--format", "json", "check-metadata"])
        .arg(&meta)
        .assert()
        .code(2)
        .get_output()
        .stdout
        .clone();
    let json: Value = serde_json::from_slice(&output).expect("valid json");
    assert_eq!(json["state"], "needs_upgrade");

    inspect(&fx.config)
        .arg("upgrade-metadata")
        .arg(&meta)
        .assert()
        .success();

    let output = inspect(&fx.config)
        .args(["--format", "json", "check-metadata"])
        .arg(&meta)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: Value = serde_json::from_slice(&output).expect("valid json");
    assert_eq!(json["state"], "current");
    assert_eq!(json["version"], METADATA_VERSION);
}

#[test]
fn legacy_metadata_cannot_be_upgraded_here() {
    let fx = fixture(Layout::V2);
    let meta = fx.dir.path().join("bridge.json");
    fs::write(&meta, r#"{"version": 0}"#).unwrap();
    let stderr = inspect(&fx.config)
        .arg("upgrade-metadata")
        .arg(&meta)
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    assert!(String::from_utf8_lossy(&stderr).contains("0.5.x"));
}
