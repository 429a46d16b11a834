use strata_cache::{CacheConfig, CacheResult, ProceduralSource, TerrainCache};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct Config {
    /// Chunk file to stream from. Terrain is generated procedurally when this is not set.
    pub chunk_file: Option<PathBuf>,
    pub procedural: ProceduralSource,
    pub cache: CacheConfig,
}

impl Config {
    pub fn read_file(path: impl AsRef<Path>) -> Result<Self, ron::Error> {
        let reader = std::fs::File::open(path)?;

        ron::de::from_reader(reader)
    }

    pub fn open_cache(&self) -> CacheResult<TerrainCache> {
        match &self.chunk_file {
            Some(path) => TerrainCache::open(path, self.cache),
            None => TerrainCache::new(Arc::new(self.procedural), self.cache),
        }
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod test {
    use super::*;
    use strata_cache::{ChunkFileWriter, ChunkSource, LoadKind};

    #[test]
    fn partial_config_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strata.ron");
        std::fs::write(
            &path,
            "(procedural: (tree_depth: 3), cache: (slot_capacity: 4, synchronous: true))",
        )
        .unwrap();

        let config = Config::read_file(&path).unwrap();
        assert_eq!(config.chunk_file, None);
        assert_eq!(config.procedural.tree_depth, 3);
        assert_eq!(
            config.procedural.patch_resolution,
            ProceduralSource::default().patch_resolution
        );
        assert_eq!(config.cache.slot_capacity, 4);
        assert!(config.cache.synchronous);
        assert_eq!(config.cache.idle_backoff_ms, CacheConfig::default().idle_backoff_ms);

        let cache = config.open_cache().unwrap();
        assert_eq!(cache.tree().depth(), 3);
        assert!(cache.is_synchronous());
    }

    #[test]
    fn opens_the_configured_chunk_file() {
        let dir = tempfile::tempdir().unwrap();
        let chunk_path = dir.path().join("terrain.strata");
        let source = ProceduralSource {
            patch_resolution: 2,
            texture_resolution: 2,
            ..ProceduralSource::new(2)
        };
        ChunkFileWriter::from_source(&source)
            .unwrap()
            .write(&chunk_path)
            .unwrap();

        let config = Config {
            chunk_file: Some(chunk_path),
            cache: CacheConfig::synchronous(),
            ..Default::default()
        };
        let mut cache = config.open_cache().unwrap();
        assert_eq!(cache.source().tree_depth(), 2);

        cache.load_server_info().unwrap();
        assert_eq!(cache.tree().num_resident(LoadKind::Geometry), 4);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::read_file(dir.path().join("nope.ron")).is_err());
    }
}
