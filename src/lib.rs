//! Strata streams quadtree terrain chunks from disk into a bounded working set.
//!
//! The cache itself lives in [`strata_cache`]; this crate adds file-based configuration and the `strata-preload` tool.

mod config;

pub use config::Config;

pub use strata_cache;
pub use strata_cache::core;

use strata_cache::CacheError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read config: {0}")]
    Config(#[from] ron::Error),

    #[error(transparent)]
    Cache(#[from] CacheError),
}
