//! Changegroup records, patches and delta-chain resolution.
//!
//! The modules here layer on one another:
//!
//! - [`record`] views a single delta record in either wire layout.
//! - [`parents`] normalizes the two parent slots of a record.
//! - [`delta_bases`] holds the out-of-band delta bases cg01 needs.
//! - [`patch`] applies and computes binary delta patches.
//! - [`stream`] frames records into groups and groups into changegroups.
//! - [`resolver`] turns delta chains into verified full texts, backed by the
//!   sharded [`cache`] and observed through [`metrics`].

pub mod cache;
pub mod delta_bases;
pub mod metrics;
pub mod parents;
pub mod patch;
pub mod record;
pub mod resolver;
pub mod stream;

pub use cache::TextCache;
pub use delta_bases::DeltaBases;
pub use metrics::{default_metrics, CounterMetrics, NoopMetrics, ResolverMetrics};
pub use parents::{ParentList, Parents};
pub use patch::{Patch, PatchOp};
pub use record::{Field, Layout, RawRevChunk, Revision};
pub use resolver::{ChainResolver, RevisionSource, RevisionStore};
pub use stream::{Changegroup, ChunkReader, ChunkWriter, FileGroup};
