use crate::coordinates::NodeKey;

use std::io;
use thiserror::Error;

pub type CacheResult<T> = Result<T, CacheError>;

/// Failures surfaced to the owner of a [`TerrainCache`](crate::TerrainCache).
///
/// Steady-state conditions like discarded or dropped loads are not errors; they are logged and counted in
/// [`CacheStats`](crate::CacheStats).
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("not a chunk file (found tag {found:?})")]
    BadTag { found: [u8; 4] },

    #[error("chunk file version {found} is not supported (expected {expected})")]
    VersionMismatch { found: u16, expected: u16 },

    #[error("malformed chunk file: {0}")]
    MalformedHeader(String),

    #[error("chunk {key} has no {kind} data")]
    MissingPayload { key: NodeKey, kind: &'static str },

    #[error("chunk {key} is outside of a tree with depth {depth}")]
    NodeOutOfRange { key: NodeKey, depth: u8 },

    #[error("corrupt chunk payload: {0}")]
    Decompress(String),

    #[error("{missing} leaf chunks failed to preload")]
    IncompletePreload { missing: usize },
}
