#![allow(missing_docs)]

mod support;

use std::io::Cursor;

use hgbridge::changegroup::{
    ChunkReader, ChunkWriter, DeltaBases, FileGroup, Layout, Parents, RawRevChunk,
};
use hgbridge::{BridgeError, BridgeOptions, Session};
use support::{init_tracing, manifest_record, Chain};

fn changegroup_bytes(layout: Layout, chain: &Chain, file_chain: &Chain) -> Vec<u8> {
    let mut bases = DeltaBases::default();
    let changesets = chain.chunks(layout, &mut bases);
    let manifests = vec![manifest_record(layout, &mut bases, b"file.txt\0abc\n")];
    let files = vec![FileGroup {
        path: b"src/file.txt".to_vec(),
        revisions: file_chain.chunks(layout, &mut bases),
    }];

    let mut out = Vec::new();
    let mut writer = ChunkWriter::new(&mut out, layout);
    writer.write_group(&changesets, &bases).unwrap();
    writer.write_group(&manifests, &bases).unwrap();
    for file in &files {
        writer.write_chunk(&file.path).unwrap();
        writer.write_group(&file.revisions, &bases).unwrap();
    }
    writer.close_group().unwrap();
    out
}

#[test]
fn both_layouts_read_back_and_resolve() {
    init_tracing();
    let chain = Chain::build(&[b"tree 1\n", b"tree 1\nparent 0\n", b"tree 2\nparent 0\n"]);
    let file_chain = Chain::build(&[b"a\nb\nc\n", b"a\nB\nc\n"]);

    for layout in [Layout::V1, Layout::V2] {
        let bytes = changegroup_bytes(layout, &chain, &file_chain);
        let mut session = Session::in_memory(BridgeOptions::default().layout(layout)).unwrap();
        let cg = session.read_changegroup(Cursor::new(bytes)).unwrap();

        assert_eq!(cg.changesets.len(), 3, "{layout}");
        assert_eq!(cg.manifests.len(), 1);
        assert_eq!(cg.files.len(), 1);
        assert_eq!(cg.files[0].path_lossy(), "src/file.txt");
        assert_eq!(session.revisions().len(), 6);

        for (revision, text) in chain.revisions.iter().zip(&chain.texts) {
            assert_eq!(session.resolve(&revision.node).unwrap(), &text[..]);
        }
        assert_eq!(session.resolve(&file_chain.tip()).unwrap(), &b"a\nB\nc\n"[..]);
    }
}

#[test]
fn v1_side_table_matches_inline_v2_bases() {
    let chain = Chain::build(&[b"1\n", b"1\n2\n", b"1\n2\n3\n"]);
    let file_chain = Chain::build(&[b"x\n"]);
    let v1 = ChunkReader::new(
        Cursor::new(changegroup_bytes(Layout::V1, &chain, &file_chain)),
        Layout::V1,
    )
    .read_changegroup()
    .unwrap();
    let v2 = ChunkReader::new(
        Cursor::new(changegroup_bytes(Layout::V2, &chain, &file_chain)),
        Layout::V2,
    )
    .read_changegroup()
    .unwrap();

    assert!(v2.bases.is_empty());
    assert_eq!(v1.revisions().unwrap(), v2.revisions().unwrap());
    for (a, b) in v1.changesets.iter().zip(&v2.changesets) {
        assert_eq!(a.len() + 20, b.len());
        assert_eq!(a.parents().unwrap(), b.parents().unwrap());
        assert_eq!(a.patch().unwrap(), b.patch().unwrap());
    }
}

#[test]
fn truncated_stream_is_malformed() {
    let chain = Chain::build(&[b"only\n"]);
    let mut bytes = changegroup_bytes(Layout::V2, &chain, &Chain::build(&[b"f\n"]));
    bytes.truncate(bytes.len() - 6);
    let err = ChunkReader::new(Cursor::new(bytes), Layout::V2)
        .read_changegroup()
        .unwrap_err();
    assert!(matches!(err, BridgeError::MalformedRecord { .. }), "{err}");
}

#[test]
fn reading_with_the_wrong_layout_fails_header_validation() {
    let mut short = RawRevChunk::new(Layout::V1);
    short.set_node(&hgbridge::NodeId::from_raw([1; 20]));
    short.set_changeset(&hgbridge::NodeId::NULL);
    let mut out = Vec::new();
    let mut writer = ChunkWriter::new(&mut out, Layout::V1);
    writer.write_chunk(short.as_bytes()).unwrap();
    writer.close_group().unwrap();

    let err = ChunkReader::new(Cursor::new(out), Layout::V2)
        .read_group(&mut DeltaBases::default())
        .unwrap_err();
    assert!(matches!(err, BridgeError::MalformedRecord { .. }));
}
