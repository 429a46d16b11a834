//! The strata terrain chunk cache.
//!
//! # Chunk Trees
//!
//! Terrain is stored as a quadtree of [`ChunkNode`](crate::ChunkNode)s. Level 0 is a single root chunk covering the whole
//! terrain at the coarsest detail, and every level below it quadruples the number of chunks. Each node may hold two kinds of
//! payload: [`Geometry`](crate::Geometry) and imagery (an [`ImageryHandle`](crate::ImageryHandle)). The node table is created
//! once from the source's tree depth and is never resized; only payloads come and go.
//!
//! ## Residency
//!
//! A payload may only become resident on a node whose parent already holds the same kind of payload. This guarantees that
//! any resident chunk can always fall back to a coarser ancestor. Loads that finish after their parent was evicted are thrown
//! away instead of being installed.
//!
//! # Streaming
//!
//! The [`TerrainCache`](crate::TerrainCache) accepts load requests from any number of consumers and services them on one
//! background loader thread. Requests are coalesced per `(node, kind)`, sorted by priority once per frame, and handed to the
//! loader through small fixed-capacity slot arrays guarded by a mutex. The loader never touches the node table; completed
//! loads are installed by the consuming thread during [`TerrainCache::sync`](crate::TerrainCache::sync).
//!
//! The same steps can run inline on the consuming thread ("synchronous mode"), and
//! [`TerrainCache::precache`](crate::TerrainCache::precache) drains every outstanding request before returning.

mod cache;
mod chunk_file;
mod config;
mod coordinates;
mod error;
mod handoff;
mod payload;
mod recycle;
mod request;
mod source;
mod stats;
mod tree;
mod worker;

pub use cache::*;
pub use chunk_file::*;
pub use config::*;
pub use coordinates::*;
pub use error::*;
pub use handoff::{SlotArray, SlotOccupancy};
pub use payload::*;
pub use recycle::*;
pub use request::*;
pub use source::*;
pub use stats::*;
pub use tree::*;

pub use strata_core as core;
pub use strata_core::glam;
