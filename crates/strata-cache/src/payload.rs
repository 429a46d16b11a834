use crate::core::geometry::Aabb;
use crate::error::{CacheError, CacheResult};
use crate::glam::Vec3A;
use crate::request::LoadKind;

use std::mem;

/// Triangle mesh for one chunk.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Geometry {
    pub vertices: Vec<[f32; 3]>,
    pub indices: Vec<u16>,
    /// Filled in by [`Geometry::prepare`] if the source did not provide it.
    pub bounds: Option<Aabb>,
}

const GEOMETRY_PREFIX_LEN: usize = 2 * mem::size_of::<u32>();

impl Geometry {
    pub fn new(vertices: Vec<[f32; 3]>, indices: Vec<u16>) -> Self {
        Self {
            vertices,
            indices,
            bounds: None,
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Called once before the geometry becomes resident.
    pub fn prepare(&mut self) {
        if self.bounds.is_none() {
            self.bounds = Aabb::from_points(self.vertices.iter().map(|&v| Vec3A::from(v)));
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(
            GEOMETRY_PREFIX_LEN
                + self.vertices.len() * mem::size_of::<[f32; 3]>()
                + self.indices.len() * mem::size_of::<u16>(),
        );
        bytes.extend_from_slice(&(self.vertices.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.indices.len() as u32).to_le_bytes());
        bytes.extend_from_slice(bytemuck::cast_slice(&self.vertices));
        bytes.extend_from_slice(bytemuck::cast_slice(&self.indices));
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> CacheResult<Self> {
        let (num_vertices, rest) = read_u32(bytes)?;
        let (num_indices, rest) = read_u32(rest)?;

        let vertex_bytes = num_vertices as usize * mem::size_of::<[f32; 3]>();
        let index_bytes = num_indices as usize * mem::size_of::<u16>();
        if rest.len() != vertex_bytes + index_bytes {
            return Err(CacheError::Decompress(format!(
                "geometry expected {} bytes of vertices and indices, found {}",
                vertex_bytes + index_bytes,
                rest.len()
            )));
        }
        let (vertex_bytes, index_bytes) = rest.split_at(vertex_bytes);

        let vertices = vertex_bytes
            .chunks_exact(mem::size_of::<[f32; 3]>())
            .map(bytemuck::pod_read_unaligned)
            .collect();
        let indices = index_bytes
            .chunks_exact(mem::size_of::<u16>())
            .map(bytemuck::pod_read_unaligned)
            .collect();

        Ok(Self::new(vertices, indices))
    }
}

/// Decoded RGBA8 texels for one chunk.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImageData {
    pub width: u16,
    pub height: u16,
    pub texels: Vec<u8>,
}

pub const BYTES_PER_TEXEL: usize = 4;

impl ImageData {
    pub fn new(width: u16, height: u16, texels: Vec<u8>) -> Self {
        debug_assert_eq!(
            texels.len(),
            width as usize * height as usize * BYTES_PER_TEXEL
        );
        Self {
            width,
            height,
            texels,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(4 + self.texels.len());
        bytes.extend_from_slice(&self.width.to_le_bytes());
        bytes.extend_from_slice(&self.height.to_le_bytes());
        bytes.extend_from_slice(&self.texels);
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> CacheResult<Self> {
        if bytes.len() < 4 {
            return Err(CacheError::Decompress("truncated image header".into()));
        }
        let width = u16::from_le_bytes([bytes[0], bytes[1]]);
        let height = u16::from_le_bytes([bytes[2], bytes[3]]);
        let texels = &bytes[4..];
        let expected = width as usize * height as usize * BYTES_PER_TEXEL;
        if texels.len() != expected {
            return Err(CacheError::Decompress(format!(
                "{}x{} image expected {} texel bytes, found {}",
                width,
                height,
                expected,
                texels.len()
            )));
        }
        Ok(Self::new(width, height, texels.to_vec()))
    }
}

/// Resident imagery for one chunk.
///
/// Handles outlive the chunk they were installed on: evicted handles go back to the cache's recycle pool and are refreshed
/// in place by later installs. Every refresh bumps the generation so consumers can notice that the texels changed.
#[derive(Debug)]
pub struct ImageryHandle {
    texels: Vec<u8>,
    width: u16,
    height: u16,
    generation: u32,
}

impl ImageryHandle {
    pub fn new(image: ImageData) -> Self {
        Self {
            texels: image.texels,
            width: image.width,
            height: image.height,
            generation: 0,
        }
    }

    /// Overwrites this handle's texels with `image`, reusing the existing storage.
    pub fn refresh(&mut self, image: &ImageData) {
        self.texels.clear();
        self.texels.extend_from_slice(&image.texels);
        self.width = image.width;
        self.height = image.height;
        self.generation = self.generation.wrapping_add(1);
    }

    pub fn texels(&self) -> &[u8] {
        &self.texels
    }

    pub fn dimensions(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn capacity(&self) -> usize {
        self.texels.capacity()
    }
}

/// The result of a completed load, carried by a [`LoadRequest`](crate::LoadRequest) from the loader back to `sync`.
#[derive(Debug)]
pub enum LoadedPayload {
    Geometry(Geometry),
    Imagery(ImageData),
}

impl LoadedPayload {
    pub fn kind(&self) -> LoadKind {
        match self {
            LoadedPayload::Geometry(_) => LoadKind::Geometry,
            LoadedPayload::Imagery(_) => LoadKind::Imagery,
        }
    }
}

fn read_u32(bytes: &[u8]) -> CacheResult<(u32, &[u8])> {
    if bytes.len() < 4 {
        return Err(CacheError::Decompress("truncated geometry header".into()));
    }
    let (head, rest) = bytes.split_at(4);
    Ok((u32::from_le_bytes([head[0], head[1], head[2], head[3]]), rest))
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
