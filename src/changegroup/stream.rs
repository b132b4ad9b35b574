//! Changegroup stream framing.
//!
//! Every chunk is a big-endian u32 length that counts itself, followed by the
//! payload. A zero length ends the current group. A changegroup carries a
//! changeset group, a manifest group, then one section per file (a chunk with
//! the path followed by that file's revision group), ended by an empty chunk.

use std::io::{self, Read, Write};

use tracing::{debug, trace};

use super::delta_bases::DeltaBases;
use super::parents::Parents;
use super::record::{Layout, RawRevChunk, Revision};
use crate::error::{BridgeError, Result};
use crate::primitives::bytes::be;
use crate::types::NodeId;

/// Width of the chunk length prefix.
pub const CHUNK_LEN_PREFIX: usize = 4;

/// Largest chunk accepted when reading.
pub const MAX_CHUNK_LEN: usize = 1 << 30;

/// Revisions of one file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileGroup {
    /// Repository path, as raw bytes.
    pub path: Vec<u8>,
    /// Revision records in stream order.
    pub revisions: Vec<RawRevChunk>,
}

impl FileGroup {
    /// Path rendered for display.
    pub fn path_lossy(&self) -> String {
        String::from_utf8_lossy(&self.path).into_owned()
    }
}

/// A fully read changegroup.
#[derive(Clone, Debug)]
pub struct Changegroup {
    /// Layout of every record in the stream.
    pub layout: Layout,
    /// Changeset group.
    pub changesets: Vec<RawRevChunk>,
    /// Manifest group.
    pub manifests: Vec<RawRevChunk>,
    /// One group per touched file, in stream order.
    pub files: Vec<FileGroup>,
    /// Delta bases inferred for cg01 records; empty for cg02.
    pub bases: DeltaBases,
}

impl Changegroup {
    /// Empty changegroup.
    pub fn new(layout: Layout) -> Self {
        Self {
            layout,
            changesets: Vec::new(),
            manifests: Vec::new(),
            files: Vec::new(),
            bases: DeltaBases::default(),
        }
    }

    /// Every record, changesets first, then manifests, then files in order.
    pub fn records(&self) -> impl Iterator<Item = &RawRevChunk> {
        self.changesets
            .iter()
            .chain(&self.manifests)
            .chain(self.files.iter().flat_map(|f| f.revisions.iter()))
    }

    /// Decodes every record.
    pub fn revisions(&self) -> Result<Vec<Revision>> {
        self.records().map(|r| r.decode(&self.bases)).collect()
    }

    /// Records across all groups.
    pub fn record_count(&self) -> usize {
        self.records().count()
    }
}

/// Reads chunks and groups from a byte stream.
pub struct ChunkReader<R> {
    inner: R,
    layout: Layout,
    chunks_read: u64,
}

impl<R: Read> ChunkReader<R> {
    /// Reader decoding records in `layout`.
    pub fn new(inner: R, layout: Layout) -> Self {
        Self {
            inner,
            layout,
            chunks_read: 0,
        }
    }

    /// Layout records are decoded with.
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Non-empty chunks consumed so far.
    pub fn chunks_read(&self) -> u64 {
        self.chunks_read
    }

    /// Gives back the wrapped stream.
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn fill(&mut self, buf: &mut [u8], what: &str) -> Result<()> {
        self.inner.read_exact(buf).map_err(|err| {
            if err.kind() == io::ErrorKind::UnexpectedEof {
                BridgeError::malformed(format!("stream ended inside {what}"))
            } else {
                BridgeError::Io(err)
            }
        })
    }

    /// Next chunk payload, or `None` at the end of a group.
    pub fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        let mut prefix = [0u8; CHUNK_LEN_PREFIX];
        self.fill(&mut prefix, "chunk length")?;
        let len = be::get_u32(&prefix, 0)? as usize;
        if len == 0 {
            trace!("changegroup.group_end");
            return Ok(None);
        }
        if len < CHUNK_LEN_PREFIX {
            return Err(BridgeError::malformed(format!(
                "chunk length {len} is shorter than its own prefix"
            )));
        }
        if len > MAX_CHUNK_LEN {
            return Err(BridgeError::malformed(format!(
                "chunk length {len} exceeds {MAX_CHUNK_LEN}"
            )));
        }
        let want = len - CHUNK_LEN_PREFIX;
        // allocation tracks bytes actually read, not the declared length
        let mut payload = Vec::with_capacity(want.min(64 * 1024));
        let got = (&mut self.inner).take(want as u64).read_to_end(&mut payload)?;
        if got < want {
            return Err(BridgeError::malformed(format!(
                "stream ended inside chunk payload ({got} of {want} bytes)"
            )));
        }
        self.chunks_read += 1;
        Ok(Some(payload))
    }

    /// Reads one revision group.
    ///
    /// For cg01 the delta base of each record is inferred into `bases`: the
    /// first record deltas against its first parent, every later record
    /// against the record before it.
    pub fn read_group(&mut self, bases: &mut DeltaBases) -> Result<Vec<RawRevChunk>> {
        let mut records = Vec::new();
        let mut previous: Option<NodeId> = None;
        while let Some(payload) = self.next_chunk()? {
            let record = RawRevChunk::parse(self.layout, payload)?;
            if self.layout == Layout::V1 {
                let base = match previous {
                    Some(node) => node,
                    None => record.parent1()?,
                };
                bases.insert(record.node()?, base);
            }
            previous = Some(record.node()?);
            records.push(record);
        }
        debug!(layout = %self.layout, records = records.len(), "changegroup.group_read");
        Ok(records)
    }

    /// Reads a complete changegroup.
    pub fn read_changegroup(&mut self) -> Result<Changegroup> {
        let mut cg = Changegroup::new(self.layout);
        cg.changesets = self.read_group(&mut cg.bases)?;
        cg.manifests = self.read_group(&mut cg.bases)?;
        while let Some(path) = self.next_chunk()? {
            let revisions = self.read_group(&mut cg.bases)?;
            cg.files.push(FileGroup { path, revisions });
        }
        debug!(
            layout = %self.layout,
            changesets = cg.changesets.len(),
            manifests = cg.manifests.len(),
            files = cg.files.len(),
            "changegroup.read"
        );
        Ok(cg)
    }
}

/// Writes chunks and groups to a byte sink.
pub struct ChunkWriter<W> {
    inner: W,
    layout: Layout,
}

impl<W: Write> ChunkWriter<W> {
    /// Writer encoding records in `layout`.
    pub fn new(inner: W, layout: Layout) -> Self {
        Self { inner, layout }
    }

    /// Gives back the wrapped stream.
    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Writes one length-prefixed chunk.
    pub fn write_chunk(&mut self, payload: &[u8]) -> Result<()> {
        let len = be::to_u32(payload.len() + CHUNK_LEN_PREFIX, "chunk length")?;
        self.inner.write_all(&len.to_be_bytes())?;
        self.inner.write_all(payload)?;
        Ok(())
    }

    /// Writes the empty chunk closing a group.
    pub fn close_group(&mut self) -> Result<()> {
        self.inner.write_all(&0u32.to_be_bytes())?;
        Ok(())
    }

    /// Writes a revision group and its terminator.
    ///
    /// cg01 cannot carry arbitrary delta bases, so every record's base in
    /// `bases` must match what a reader will infer.
    pub fn write_group(&mut self, records: &[RawRevChunk], bases: &DeltaBases) -> Result<()> {
        let mut previous: Option<NodeId> = None;
        for record in records {
            if record.layout() != self.layout {
                return Err(BridgeError::InvalidArgument(format!(
                    "cannot write a {} record into a {} stream",
                    record.layout(),
                    self.layout
                )));
            }
            if self.layout == Layout::V1 {
                let implied = match previous {
                    Some(node) => node,
                    None => record.parent1()?,
                };
                let declared = record.delta_node(bases)?;
                if declared != implied {
                    return Err(BridgeError::InvalidArgument(format!(
                        "cg01 record {} deltas against {declared}, stream order implies {implied}",
                        record.node()?
                    )));
                }
            }
            previous = Some(record.node()?);
            self.write_chunk(record.as_bytes())?;
        }
        self.close_group()
    }

    /// Writes a complete changegroup.
    pub fn write_changegroup(&mut self, cg: &Changegroup) -> Result<()> {
        self.write_group(&cg.changesets, &cg.bases)?;
        self.write_group(&cg.manifests, &cg.bases)?;
        for file in &cg.files {
            self.write_chunk(&file.path)?;
            self.write_group(&file.revisions, &cg.bases)?;
        }
        self.close_group()?;
        self.inner.flush()?;
        Ok(())
    }
}
