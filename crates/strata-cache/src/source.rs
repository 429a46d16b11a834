use crate::coordinates::{level_side, Level, NodeKey};
use crate::error::{CacheError, CacheResult};
use crate::payload::{Geometry, ImageData, LoadedPayload, BYTES_PER_TEXEL};
use crate::request::LoadKind;

use serde::{Deserialize, Serialize};

/// Where chunk payloads come from.
///
/// Loads are blocking and are called from the loader thread (or inline during a synchronous `sync`), never while the cache
/// holds its hand-off lock.
pub trait ChunkSource: Send + Sync {
    /// Number of levels in the chunk tree, including the root.
    fn tree_depth(&self) -> Level;

    /// Number of levels that carry imagery. Deeper chunks borrow their ancestors' imagery.
    fn imagery_depth(&self) -> Level {
        self.tree_depth()
    }

    fn load_geometry(&self, key: &NodeKey) -> CacheResult<Geometry>;

    fn load_imagery(&self, key: &NodeKey) -> CacheResult<ImageData>;

    fn load(&self, key: &NodeKey, kind: LoadKind) -> CacheResult<LoadedPayload> {
        match kind {
            LoadKind::Geometry => self.load_geometry(key).map(LoadedPayload::Geometry),
            LoadKind::Imagery => self.load_imagery(key).map(LoadedPayload::Imagery),
        }
    }
}

/// A rolling heightfield generated on demand. Useful when there is no chunk file to stream from.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct ProceduralSource {
    pub tree_depth: Level,
    pub imagery_depth: Level,
    /// Quads along one edge of every chunk's mesh.
    pub patch_resolution: u16,
    /// Texels along one edge of every chunk's image.
    pub texture_resolution: u16,
    /// Width of the whole terrain in world units.
    pub extent: f32,
    pub amplitude: f32,
}

impl Default for ProceduralSource {
    fn default() -> Self {
        Self {
            tree_depth: 5,
            imagery_depth: 4,
            patch_resolution: 16,
            texture_resolution: 16,
            extent: 4096.0,
            amplitude: 200.0,
        }
    }
}

// (patch_resolution + 1)^2 vertices must be addressable by u16 indices.
const MAX_PATCH_RESOLUTION: u16 = 255;

impl ProceduralSource {
    pub fn new(tree_depth: Level) -> Self {
        Self {
            tree_depth,
            imagery_depth: tree_depth,
            ..Default::default()
        }
    }

    pub fn height_at(&self, x: f32, z: f32) -> f32 {
        let u = x / self.extent * std::f32::consts::TAU;
        let v = z / self.extent * std::f32::consts::TAU;
        self.amplitude * (0.5 * (3.0 * u).sin() * (2.0 * v).cos() + 0.25 * (7.0 * u + 5.0 * v).sin())
    }

    fn chunk_origin_and_size(&self, key: &NodeKey) -> ([f32; 2], f32) {
        let size = self.extent / level_side(key.level) as f32;
        (
            [
                key.coordinates.x as f32 * size,
                key.coordinates.y as f32 * size,
            ],
            size,
        )
    }

    fn check_key(&self, key: &NodeKey, depth: Level) -> CacheResult<()> {
        if key.is_within(depth) {
            Ok(())
        } else {
            Err(CacheError::NodeOutOfRange { key: *key, depth })
        }
    }
}

impl ChunkSource for ProceduralSource {
    fn tree_depth(&self) -> Level {
        self.tree_depth
    }

    fn imagery_depth(&self) -> Level {
        self.imagery_depth.min(self.tree_depth)
    }

    fn load_geometry(&self, key: &NodeKey) -> CacheResult<Geometry> {
        self.check_key(key, self.tree_depth)?;

        let resolution = self.patch_resolution.clamp(1, MAX_PATCH_RESOLUTION);
        let ([x0, z0], size) = self.chunk_origin_and_size(key);
        let step = size / resolution as f32;
        let row = resolution as usize + 1;

        let mut vertices = Vec::with_capacity(row * row);
        for j in 0..=resolution {
            for i in 0..=resolution {
                let x = x0 + i as f32 * step;
                let z = z0 + j as f32 * step;
                vertices.push([x, self.height_at(x, z), z]);
            }
        }

        let mut indices = Vec::with_capacity(6 * resolution as usize * resolution as usize);
        for j in 0..resolution {
            for i in 0..resolution {
                let corner = j * (resolution + 1) + i;
                let below = corner + resolution + 1;
                indices.extend_from_slice(&[corner, below, corner + 1, corner + 1, below, below + 1]);
            }
        }

        Ok(Geometry::new(vertices, indices))
    }

    fn load_imagery(&self, key: &NodeKey) -> CacheResult<ImageData> {
        if key.level >= self.imagery_depth() {
            return Err(CacheError::MissingPayload {
                key: *key,
                kind: LoadKind::Imagery.name(),
            });
        }
        self.check_key(key, self.tree_depth)?;

        let resolution = self.texture_resolution.max(1);
        let ([x0, z0], size) = self.chunk_origin_and_size(key);
        let step = size / resolution as f32;

        let mut texels =
            Vec::with_capacity(resolution as usize * resolution as usize * BYTES_PER_TEXEL);
        for j in 0..resolution {
            for i in 0..resolution {
                let h = self.height_at(x0 + (i as f32 + 0.5) * step, z0 + (j as f32 + 0.5) * step);
                let t = ((h / self.amplitude.max(f32::EPSILON)) * 0.5 + 0.5).clamp(0.0, 1.0);
                let shade = (t * 255.0) as u8;
                texels.extend_from_slice(&[shade / 2, 64 + shade / 2, shade / 3, 255]);
            }
        }

        Ok(ImageData::new(resolution, resolution, texels))
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
    use crate::glam::UVec2;

    #[test]
    fn neighboring_patches_share_edges() {
        let source = ProceduralSource {
            patch_resolution: 4,
            ..ProceduralSource::new(3)
        };
        let left = source.load_geometry(&NodeKey::new(2, UVec2::new(0, 1))).unwrap();
        let right = source.load_geometry(&NodeKey::new(2, UVec2::new(1, 1))).unwrap();

        assert_eq!(left.vertices.len(), 25);
        assert_eq!(left.triangle_count(), 32);
        assert!(left.indices.iter().all(|&i| (i as usize) < left.vertices.len()));

        // Last column of the left patch is the first column of the right patch.
        for row in 0..5 {
            assert_eq!(left.vertices[row * 5 + 4], right.vertices[row * 5]);
        }
    }

    #[test]
    fn imagery_stops_at_imagery_depth() {
        let source = ProceduralSource {
            imagery_depth: 2,
            texture_resolution: 8,
            ..ProceduralSource::new(4)
        };
        let image = source.load_imagery(&NodeKey::new(1, UVec2::ZERO)).unwrap();
        assert_eq!((image.width, image.height), (8, 8));
        assert_eq!(image.texels.len(), 8 * 8 * BYTES_PER_TEXEL);

        assert!(matches!(
            source.load_imagery(&NodeKey::new(2, UVec2::ZERO)),
            Err(CacheError::MissingPayload { .. })
        ));
        assert!(matches!(
            source.load_geometry(&NodeKey::new(4, UVec2::ZERO)),
            Err(CacheError::NodeOutOfRange { .. })
        ));
    }
}
