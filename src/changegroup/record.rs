//! Fixed-layout delta records.
//!
//! A record is a header of 20-byte identifiers followed by a patch. cg01 and
//! cg02 differ only in whether the delta base is part of the header.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::delta_bases::DeltaBases;
use super::parents::Parents;
use crate::error::{BridgeError, Result};
use crate::primitives::bytes::buf::ensure_len;
use crate::types::{NodeId, OID_HEX_LEN, OID_LEN};

/// Byte offsets of the fixed header fields, per layout.
pub mod offsets {
    use core::ops::Range;

    /// cg01: the delta base travels out of band.
    pub mod v1 {
        use super::Range;

        /// Revision node.
        pub const NODE: Range<usize> = 0..20;
        /// First parent.
        pub const PARENT1: Range<usize> = 20..40;
        /// Second parent.
        pub const PARENT2: Range<usize> = 40..60;
        /// Owning changeset.
        pub const CHANGESET: Range<usize> = 60..80;
        /// Start of the patch, which runs to the end of the record.
        pub const PATCH: usize = 80;
    }

    /// cg02: the delta base is inline.
    pub mod v2 {
        use super::Range;

        /// Revision node.
        pub const NODE: Range<usize> = 0..20;
        /// First parent.
        pub const PARENT1: Range<usize> = 20..40;
        /// Second parent.
        pub const PARENT2: Range<usize> = 40..60;
        /// Node the patch applies to.
        pub const DELTA_BASE: Range<usize> = 60..80;
        /// Owning changeset.
        pub const CHANGESET: Range<usize> = 80..100;
        /// Start of the patch.
        pub const PATCH: usize = 100;
    }
}

/// On-wire layout of a delta record.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Default, Serialize, Deserialize)]
pub enum Layout {
    /// cg01.
    #[serde(rename = "01")]
    V1,
    /// cg02.
    #[default]
    #[serde(rename = "02")]
    V2,
}

impl Layout {
    /// Size of the fixed header, i.e. the offset of the patch.
    pub const fn header_len(self) -> usize {
        match self {
            Layout::V1 => offsets::v1::PATCH,
            Layout::V2 => offsets::v2::PATCH,
        }
    }

    /// Changegroup version string.
    pub const fn version(self) -> &'static str {
        match self {
            Layout::V1 => "01",
            Layout::V2 => "02",
        }
    }

    /// Parses a changegroup version string (`"01"`, `"2"`, ...).
    pub fn from_version(version: &str) -> Result<Self> {
        match version.trim_start_matches('0') {
            "1" => Ok(Layout::V1),
            "2" => Ok(Layout::V2),
            _ => Err(BridgeError::InvalidArgument(format!(
                "unsupported changegroup version {version:?}"
            ))),
        }
    }

    /// Whether the delta base is stored inline.
    pub const fn inline_delta_base(self) -> bool {
        matches!(self, Layout::V2)
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cg{}", self.version())
    }
}

/// Fixed-width header fields.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Field {
    /// Revision identity.
    Node,
    /// First parent.
    Parent1,
    /// Second parent.
    Parent2,
    /// Inline delta base (cg02 only).
    DeltaBase,
    /// Linked changeset.
    Changeset,
}

impl Field {
    /// Every field, in wire order.
    pub const ALL: [Field; 5] = [
        Field::Node,
        Field::Parent1,
        Field::Parent2,
        Field::DeltaBase,
        Field::Changeset,
    ];

    /// Field name as used in diagnostics.
    pub const fn name(self) -> &'static str {
        match self {
            Field::Node => "node",
            Field::Parent1 => "parent1",
            Field::Parent2 => "parent2",
            Field::DeltaBase => "delta_base",
            Field::Changeset => "changeset",
        }
    }

    /// Byte range of the field, or `None` when the layout has no such field.
    pub fn range(self, layout: Layout) -> Option<Range<usize>> {
        use offsets::{v1, v2};
        match (layout, self) {
            (Layout::V1, Field::Node) => Some(v1::NODE),
            (Layout::V1, Field::Parent1) => Some(v1::PARENT1),
            (Layout::V1, Field::Parent2) => Some(v1::PARENT2),
            (Layout::V1, Field::DeltaBase) => None,
            (Layout::V1, Field::Changeset) => Some(v1::CHANGESET),
            (Layout::V2, Field::Node) => Some(v2::NODE),
            (Layout::V2, Field::Parent1) => Some(v2::PARENT1),
            (Layout::V2, Field::Parent2) => Some(v2::PARENT2),
            (Layout::V2, Field::DeltaBase) => Some(v2::DELTA_BASE),
            (Layout::V2, Field::Changeset) => Some(v2::CHANGESET),
        }
    }
}

/// A single delta record over a raw, growable byte buffer.
///
/// Reads are bounds-checked and never grow the buffer. Writes zero-extend the
/// buffer up to the end of the field being written and leave every other byte
/// alone.
#[derive(Clone, PartialEq, Eq)]
pub struct RawRevChunk {
    layout: Layout,
    buf: Vec<u8>,
}

impl RawRevChunk {
    /// An empty record; fields are filled in by writes.
    pub fn new(layout: Layout) -> Self {
        Self {
            layout,
            buf: Vec::new(),
        }
    }

    /// Wraps `buf` without validating it.
    pub fn from_bytes(layout: Layout, buf: Vec<u8>) -> Self {
        Self { layout, buf }
    }

    /// Wraps `buf`, rejecting buffers too short to hold the fixed header.
    pub fn parse(layout: Layout, buf: Vec<u8>) -> Result<Self> {
        if buf.len() < layout.header_len() {
            return Err(BridgeError::truncated(
                &format!("{layout} record header"),
                layout.header_len(),
                buf.len(),
            ));
        }
        Ok(Self { layout, buf })
    }

    /// Layout the record is encoded in.
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Raw record bytes, header and patch.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Gives back the raw bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Record length in bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True for a zero-length buffer.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn field_range(&self, field: Field) -> Result<Range<usize>> {
        field.range(self.layout).ok_or_else(|| {
            BridgeError::InvalidArgument(format!(
                "{} records carry no inline {} field",
                self.layout,
                field.name()
            ))
        })
    }

    /// Raw bytes of a fixed-width field.
    pub fn field_bytes(&self, field: Field) -> Result<&[u8]> {
        let range = self.field_range(field)?;
        let end = range.end;
        self.buf
            .get(range)
            .ok_or_else(|| BridgeError::truncated(field.name(), end, self.buf.len()))
    }

    /// Decodes a fixed-width field as an identifier.
    pub fn field(&self, field: Field) -> Result<NodeId> {
        NodeId::from_slice(self.field_bytes(field)?)
    }

    /// Hex rendering of a fixed-width field.
    pub fn field_hex(&self, field: Field) -> Result<String> {
        Ok(hex::encode(self.field_bytes(field)?))
    }

    /// Writes raw bytes into a fixed-width field.
    pub fn set_field(&mut self, field: Field, value: &[u8]) -> Result<()> {
        let range = self.field_range(field)?;
        if value.len() != range.len() {
            return Err(BridgeError::FieldWidth {
                field: field.name(),
                expected: range.len(),
                actual: value.len(),
            });
        }
        ensure_len(&mut self.buf, range.end);
        self.buf[range].copy_from_slice(value);
        Ok(())
    }

    /// Writes a hex-encoded value into a fixed-width field.
    pub fn set_field_hex(&mut self, field: Field, value: &str) -> Result<()> {
        if value.len() != OID_HEX_LEN {
            return Err(BridgeError::FieldWidth {
                field: field.name(),
                expected: OID_HEX_LEN,
                actual: value.len(),
            });
        }
        let id = NodeId::from_hex(value)?;
        self.set_field(field, id.as_bytes())
    }

    fn write_id(&mut self, field: Field, id: &NodeId) {
        // node/parents/changeset exist in every layout and ids are always OID_LEN wide
        if let Some(range) = field.range(self.layout) {
            debug_assert_eq!(range.len(), OID_LEN);
            ensure_len(&mut self.buf, range.end);
            self.buf[range].copy_from_slice(id.as_bytes());
        }
    }

    /// Node this record describes.
    pub fn node(&self) -> Result<NodeId> {
        self.field(Field::Node)
    }

    /// Overwrites the node field.
    pub fn set_node(&mut self, node: &NodeId) {
        self.write_id(Field::Node, node);
    }

    /// Changeset that introduced this revision.
    pub fn changeset(&self) -> Result<NodeId> {
        self.field(Field::Changeset)
    }

    /// Overwrites the changeset field.
    pub fn set_changeset(&mut self, changeset: &NodeId) {
        self.write_id(Field::Changeset, changeset);
    }

    /// Delta base of this record; NULL means full text.
    ///
    /// cg01 records look the base up in `bases` by node.
    pub fn delta_node(&self, bases: &DeltaBases) -> Result<NodeId> {
        match self.layout {
            Layout::V1 => Ok(bases.get(&self.node()?)),
            Layout::V2 => self.field(Field::DeltaBase),
        }
    }

    /// Sets the delta base, inline or in `bases` depending on the layout.
    pub fn set_delta_node(&mut self, bases: &mut DeltaBases, base: &NodeId) -> Result<()> {
        match self.layout {
            Layout::V1 => {
                bases.insert(self.node()?, *base);
                Ok(())
            }
            Layout::V2 => self.set_field(Field::DeltaBase, base.as_bytes()),
        }
    }

    /// Patch bytes, from the end of the header to the end of the buffer.
    pub fn patch(&self) -> Result<&[u8]> {
        let start = self.layout.header_len();
        self.buf
            .get(start..)
            .ok_or_else(|| BridgeError::truncated("patch", start, self.buf.len()))
    }

    /// Replaces the patch, zero-filling a short header first.
    pub fn set_patch(&mut self, patch: &[u8]) {
        let start = self.layout.header_len();
        ensure_len(&mut self.buf, start);
        self.buf.truncate(start);
        self.buf.extend_from_slice(patch);
    }

    /// Snapshot of every field, for the resolver.
    pub fn decode(&self, bases: &DeltaBases) -> Result<Revision> {
        if self.buf.len() < self.layout.header_len() {
            return Err(BridgeError::truncated(
                &format!("{} record header", self.layout),
                self.layout.header_len(),
                self.buf.len(),
            ));
        }
        Ok(Revision {
            node: self.node()?,
            parent1: self.field(Field::Parent1)?,
            parent2: self.field(Field::Parent2)?,
            delta_base: self.delta_node(bases)?,
            changeset: self.changeset()?,
            patch: Bytes::copy_from_slice(self.patch()?),
        })
    }
}

impl Parents for RawRevChunk {
    fn parent1(&self) -> Result<NodeId> {
        self.field(Field::Parent1)
    }

    fn parent2(&self) -> Result<NodeId> {
        self.field(Field::Parent2)
    }

    fn set_parent1(&mut self, parent: &NodeId) {
        self.write_id(Field::Parent1, parent);
    }

    fn set_parent2(&mut self, parent: &NodeId) {
        self.write_id(Field::Parent2, parent);
    }
}

impl fmt::Debug for RawRevChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("RawRevChunk");
        s.field("layout", &self.layout);
        match self.node() {
            Ok(node) => s.field("node", &node),
            Err(_) => s.field("node", &"<truncated>"),
        };
        s.field("len", &self.buf.len()).finish()
    }
}

/// Immutable decoded delta record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Revision {
    /// Node identity, checked against the resolved text.
    pub node: NodeId,
    /// First parent slot, possibly NULL.
    pub parent1: NodeId,
    /// Second parent slot, possibly NULL.
    pub parent2: NodeId,
    /// NULL for full-text records.
    pub delta_base: NodeId,
    /// Owning changeset.
    pub changeset: NodeId,
    /// Patch against `delta_base`.
    pub patch: Bytes,
}

impl Revision {
    /// Whether this record terminates a delta chain.
    pub fn is_full_text(&self) -> bool {
        self.delta_base.is_null()
    }

    /// Encodes the revision back into a record of the given layout.
    pub fn to_chunk(&self, layout: Layout, bases: &mut DeltaBases) -> Result<RawRevChunk> {
        let mut chunk = RawRevChunk::new(layout);
        chunk.set_node(&self.node);
        chunk.set_parent1(&self.parent1);
        chunk.set_parent2(&self.parent2);
        chunk.set_changeset(&self.changeset);
        chunk.set_delta_node(bases, &self.delta_base)?;
        chunk.set_patch(&self.patch);
        Ok(chunk)
    }

    /// Moves the revision behind an `Arc`.
    pub fn into_shared(self) -> Arc<Revision> {
        Arc::new(self)
    }
}

impl Parents for Revision {
    fn parent1(&self) -> Result<NodeId> {
        Ok(self.parent1)
    }

    fn parent2(&self) -> Result<NodeId> {
        Ok(self.parent2)
    }

    fn set_parent1(&mut self, parent: &NodeId) {
        self.parent1 = *parent;
    }

    fn set_parent2(&mut self, parent: &NodeId) {
        self.parent2 = *parent;
    }
}
