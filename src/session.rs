//! A bridge session: metadata, decoded revisions, resolver and grafts.

use std::io::Read;
use std::mem;

use bytes::Bytes;
use tracing::{debug, info};

use crate::changegroup::{
    ChainResolver, Changegroup, ChunkReader, DeltaBases, RawRevChunk, RevisionStore,
};
use crate::config::BridgeOptions;
use crate::error::{BridgeError, Result};
use crate::graft::{GraftCandidates, GraftMatch, GraftResolver};
use crate::metadata::{BridgeMetadata, MetadataStore};
use crate::types::{GitOid, NodeId};

/// Owns everything one import or export run needs.
///
/// Opening a session runs the metadata version gate before anything else.
pub struct Session {
    options: BridgeOptions,
    metadata_store: Option<MetadataStore>,
    metadata: BridgeMetadata,
    bases: DeltaBases,
    revisions: RevisionStore,
    resolver: ChainResolver,
}

impl Session {
    /// Opens a session, loading metadata from `options.metadata_path`.
    ///
    /// Absent metadata is created when `create_metadata_if_missing` is set.
    /// Metadata refused by the version gate fails the open.
    pub fn open(options: BridgeOptions) -> Result<Self> {
        let metadata_store = options.metadata_path.clone().map(MetadataStore::new);
        let metadata = match &metadata_store {
            Some(store) => match store.load()? {
                Some(metadata) => metadata,
                None if options.create_metadata_if_missing => {
                    let metadata = BridgeMetadata::default();
                    store.save(&metadata)?;
                    info!(path = %store.path().display(), "session.metadata_created");
                    metadata
                }
                None => {
                    return Err(BridgeError::InvalidArgument(format!(
                        "no bridge metadata at {}",
                        store.path().display()
                    )))
                }
            },
            None => BridgeMetadata::default(),
        };
        let resolver = ChainResolver::new(&options);
        debug!(
            layout = %options.layout,
            correspondences = metadata.correspondences.len(),
            grafts = metadata.grafts.len(),
            "session.opened"
        );
        Ok(Self {
            options,
            metadata_store,
            metadata,
            bases: DeltaBases::default(),
            revisions: RevisionStore::default(),
            resolver,
        })
    }

    /// A session without persisted metadata.
    pub fn in_memory(options: BridgeOptions) -> Result<Self> {
        let mut options = options;
        options.metadata_path = None;
        Self::open(options)
    }

    /// Options the session was opened with.
    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }

    /// Metadata as loaded or last modified.
    pub fn metadata(&self) -> &BridgeMetadata {
        &self.metadata
    }

    /// Revisions ingested so far.
    pub fn revisions(&self) -> &RevisionStore {
        &self.revisions
    }

    /// Resolver shared by every [`Session::resolve`] call.
    pub fn resolver(&self) -> &ChainResolver {
        &self.resolver
    }

    /// Side table consulted for cg01 records passed to [`Session::ingest`].
    pub fn delta_bases(&self) -> &DeltaBases {
        &self.bases
    }

    /// Mutable access to the cg01 side table.
    pub fn delta_bases_mut(&mut self) -> &mut DeltaBases {
        &mut self.bases
    }

    /// Decodes one record and makes it available to the resolver.
    pub fn ingest(&mut self, record: &RawRevChunk) -> Result<NodeId> {
        let revision = record.decode(&self.bases)?;
        let node = revision.node;
        self.revisions.insert(revision);
        Ok(node)
    }

    /// Decodes every record of a changegroup.
    pub fn ingest_changegroup(&mut self, cg: &Changegroup) -> Result<usize> {
        let revisions = cg.revisions()?;
        let count = revisions.len();
        self.revisions.extend(revisions);
        debug!(records = count, "session.changegroup_ingested");
        Ok(count)
    }

    /// Reads a changegroup in the configured layout and ingests it.
    pub fn read_changegroup<R: Read>(&mut self, input: R) -> Result<Changegroup> {
        let cg = ChunkReader::new(input, self.options.layout).read_changegroup()?;
        self.ingest_changegroup(&cg)?;
        Ok(cg)
    }

    /// Verified full text of `node`.
    pub fn resolve(&self, node: &NodeId) -> Result<Bytes> {
        self.resolver.resolve(&self.revisions, node)
    }

    /// Records `oid` as a graft candidate for `node`.
    pub fn add_correspondence(&mut self, node: NodeId, oid: GitOid) -> bool {
        self.metadata.correspondences.add(node, oid)
    }

    /// Classifies the recorded correspondences of `node`.
    pub fn classify_graft(&self, node: &NodeId) -> Result<GraftMatch> {
        GraftResolver::new(&self.metadata.correspondences).classify(node)
    }

    /// The single recorded correspondence of `node`.
    pub fn find_graft(&self, node: &NodeId) -> Result<GitOid> {
        GraftResolver::new(&self.metadata.correspondences).find_graft(node)
    }

    /// Establishes a graft from the recorded correspondences.
    pub fn establish_graft(&mut self, node: &NodeId) -> Result<GitOid> {
        let grafts = mem::take(&mut self.metadata.grafts);
        let mut resolver = GraftResolver::with_grafts(&self.metadata.correspondences, grafts);
        let result = resolver.establish(node);
        self.metadata.grafts = resolver.into_parts().1;
        result
    }

    /// Establishes a graft from another candidate source, such as the helper.
    pub fn establish_graft_with<C: GraftCandidates>(
        &mut self,
        source: C,
        node: &NodeId,
    ) -> Result<GitOid> {
        let grafts = mem::take(&mut self.metadata.grafts);
        let mut resolver = GraftResolver::with_grafts(source, grafts);
        let result = resolver.establish(node);
        self.metadata.grafts = resolver.into_parts().1;
        result
    }

    /// Object grafted onto `node`, if any.
    pub fn grafted(&self, node: &NodeId) -> Option<GitOid> {
        self.metadata.grafts.get(node).copied()
    }

    /// Persists metadata; a no-op for in-memory sessions.
    pub fn save_metadata(&self) -> Result<()> {
        match &self.metadata_store {
            Some(store) => store.save(&self.metadata),
            None => Ok(()),
        }
    }

    /// Forgets decoded revisions, delta bases and cached texts.
    pub fn reset(&mut self) {
        self.revisions.clear();
        self.bases.clear();
        self.resolver.clear();
    }
}
