#![allow(dead_code)]

use std::sync::Once;

use bytes::Bytes;
use hgbridge::changegroup::patch::{diff, Patch};
use hgbridge::changegroup::{DeltaBases, Layout, Parents, RawRevChunk, Revision};
use hgbridge::types::checksum::node_digest;
use hgbridge::NodeId;

pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .with_ansi(false)
            .try_init();
    });
}

/// Linear history where every text deltas against the one before it.
pub struct Chain {
    pub texts: Vec<Vec<u8>>,
    pub revisions: Vec<Revision>,
}

impl Chain {
    pub fn build(texts: &[&[u8]]) -> Self {
        let mut revisions: Vec<Revision> = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            let revision = match revisions.last() {
                None => Revision {
                    node: node_digest(&NodeId::NULL, &NodeId::NULL, text),
                    parent1: NodeId::NULL,
                    parent2: NodeId::NULL,
                    delta_base: NodeId::NULL,
                    changeset: changeset_for(i),
                    patch: Bytes::from(Patch::full_text(text).encode().unwrap()),
                },
                Some(prev) => Revision {
                    node: node_digest(&prev.node, &NodeId::NULL, text),
                    parent1: prev.node,
                    parent2: NodeId::NULL,
                    delta_base: prev.node,
                    changeset: changeset_for(i),
                    patch: Bytes::from(diff(texts[i - 1], text).unwrap()),
                },
            };
            revisions.push(revision);
        }
        Self {
            texts: texts.iter().map(|t| t.to_vec()).collect(),
            revisions,
        }
    }

    pub fn tip(&self) -> NodeId {
        self.revisions.last().map(|r| r.node).unwrap_or(NodeId::NULL)
    }

    pub fn chunks(&self, layout: Layout, bases: &mut DeltaBases) -> Vec<RawRevChunk> {
        self.revisions
            .iter()
            .map(|r| r.to_chunk(layout, bases).unwrap())
            .collect()
    }
}

pub fn changeset_for(i: usize) -> NodeId {
    let mut raw = [0xc5; 20];
    raw[19] = i as u8;
    NodeId::from_raw(raw)
}

pub fn manifest_record(layout: Layout, bases: &mut DeltaBases, text: &[u8]) -> RawRevChunk {
    let mut record = RawRevChunk::new(layout);
    record.set_node(&node_digest(&NodeId::NULL, &NodeId::NULL, text));
    record.set_parents(&[]).unwrap();
    record.set_changeset(&changeset_for(0));
    record.set_delta_node(bases, &NodeId::NULL).unwrap();
    record.set_patch(&Patch::full_text(text).encode().unwrap());
    record
}
