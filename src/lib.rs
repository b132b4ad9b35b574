//! Changegroup codec, delta-chain resolution and graft bookkeeping for
//! bridging a content-addressed, delta-compressed history into another one.

#![warn(missing_docs)]

pub mod changegroup;
pub mod config;
pub mod error;
pub mod graft;
pub mod metadata;
pub mod primitives;
pub mod session;
pub mod types;

pub use changegroup::{ChainResolver, Layout, RawRevChunk, Revision};
pub use config::BridgeOptions;
pub use error::{BridgeError, Result};
pub use session::Session;
pub use types::{GitOid, NodeId};
