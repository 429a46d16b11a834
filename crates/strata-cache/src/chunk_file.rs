//! On-disk storage for a whole chunk tree.
//!
//! ```text
//! [ChunkFileHeader][TocEntry; node_count][lz4 frames...]
//! ```
//!
//! The table of contents is indexed like the node table (level-major, row-major). A zero length means the node has no payload
//! of that kind. All integers are stored in native byte order.

use crate::coordinates::{level_side, node_index, nodes_in_tree, Level, NodeKey, MAX_TREE_DEPTH};
use crate::error::{CacheError, CacheResult};
use crate::glam::UVec2;
use crate::payload::{Geometry, ImageData};
use crate::request::LoadKind;
use crate::source::ChunkSource;

use bytemuck::{bytes_of, Pod, Zeroable};
use lz4_flex::frame::{FrameDecoder, FrameEncoder};
use parking_lot::Mutex;
use static_assertions::const_assert_eq;
use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::mem;
use std::path::{Path, PathBuf};

pub const CHUNK_FILE_TAG: [u8; 4] = *b"STRA";
pub const CHUNK_FILE_VERSION: u16 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct ChunkFileHeader {
    pub tag: [u8; 4],
    pub version: u16,
    pub tree_depth: u8,
    pub imagery_depth: u8,
    pub vertical_scale: f32,
    pub base_chunk_size: f32,
    pub error_lod_max: f32,
    pub node_count: u32,
}

const_assert_eq!(mem::size_of::<ChunkFileHeader>(), 24);

impl ChunkFileHeader {
    pub fn new(tree_depth: Level, imagery_depth: Level) -> Self {
        Self {
            tag: CHUNK_FILE_TAG,
            version: CHUNK_FILE_VERSION,
            tree_depth,
            imagery_depth,
            vertical_scale: 1.0,
            base_chunk_size: 256.0,
            error_lod_max: 1.0,
            node_count: nodes_in_tree(tree_depth) as u32,
        }
    }

    fn validate(&self) -> CacheResult<()> {
        if self.tag != CHUNK_FILE_TAG {
            return Err(CacheError::BadTag { found: self.tag });
        }
        if self.version != CHUNK_FILE_VERSION {
            return Err(CacheError::VersionMismatch {
                found: self.version,
                expected: CHUNK_FILE_VERSION,
            });
        }
        validate_depths(self.tree_depth, self.imagery_depth)?;
        let expected = nodes_in_tree(self.tree_depth);
        if self.node_count as usize != expected {
            return Err(CacheError::MalformedHeader(format!(
                "depth {} tree has {} nodes but the header claims {}",
                self.tree_depth, expected, self.node_count
            )));
        }
        Ok(())
    }
}

fn validate_depths(tree_depth: Level, imagery_depth: Level) -> CacheResult<()> {
    if tree_depth == 0 || tree_depth > MAX_TREE_DEPTH {
        return Err(CacheError::MalformedHeader(format!(
            "tree depth {} is outside of 1..={}",
            tree_depth, MAX_TREE_DEPTH
        )));
    }
    if imagery_depth > tree_depth {
        return Err(CacheError::MalformedHeader(format!(
            "imagery depth {} exceeds tree depth {}",
            imagery_depth, tree_depth
        )));
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct TocEntry {
    pub geometry_offset: u64,
    pub imagery_offset: u64,
    pub geometry_len: u32,
    pub imagery_len: u32,
}

const_assert_eq!(mem::size_of::<TocEntry>(), 24);

impl TocEntry {
    fn frame(&self, kind: LoadKind) -> Option<(u64, u32)> {
        let (offset, len) = match kind {
            LoadKind::Geometry => (self.geometry_offset, self.geometry_len),
            LoadKind::Imagery => (self.imagery_offset, self.imagery_len),
        };
        (len > 0).then(|| (offset, len))
    }
}

/// A chunk file opened for streaming.
///
/// Reads are serialized on a file lock; only the loader thread reads in steady state.
pub struct ChunkFile {
    header: ChunkFileHeader,
    toc: Vec<TocEntry>,
    file: Mutex<File>,
    path: PathBuf,
}

impl ChunkFile {
    pub fn open(path: impl AsRef<Path>) -> CacheResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;
        let file_len = file.metadata()?.len();

        let mut header_bytes = [0; mem::size_of::<ChunkFileHeader>()];
        read_exact_or_malformed(&mut file, &mut header_bytes, "header")?;
        let header: ChunkFileHeader = bytemuck::pod_read_unaligned(&header_bytes);
        header.validate()?;

        let mut toc_bytes = vec![0; header.node_count as usize * mem::size_of::<TocEntry>()];
        read_exact_or_malformed(&mut file, &mut toc_bytes, "table of contents")?;
        let toc: Vec<TocEntry> = toc_bytes
            .chunks_exact(mem::size_of::<TocEntry>())
            .map(bytemuck::pod_read_unaligned)
            .collect();

        for (i, entry) in toc.iter().enumerate() {
            for kind in LoadKind::ALL {
                if let Some((offset, len)) = entry.frame(kind) {
                    if offset.checked_add(u64::from(len)).map_or(true, |end| end > file_len) {
                        return Err(CacheError::MalformedHeader(format!(
                            "{} frame of node {} ends past the end of the file",
                            kind, i
                        )));
                    }
                }
            }
        }

        log::debug!(
            "Opened chunk file {} (depth {}, imagery depth {})",
            path.display(),
            header.tree_depth,
            header.imagery_depth
        );

        Ok(Self {
            header,
            toc,
            file: Mutex::new(file),
            path,
        })
    }

    pub fn header(&self) -> &ChunkFileHeader {
        &self.header
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, key: &NodeKey, kind: LoadKind) -> bool {
        key.is_within(self.header.tree_depth) && self.toc[node_index(*key)].frame(kind).is_some()
    }

    fn read_payload(&self, key: &NodeKey, kind: LoadKind) -> CacheResult<Vec<u8>> {
        if !key.is_within(self.header.tree_depth) {
            return Err(CacheError::NodeOutOfRange {
                key: *key,
                depth: self.header.tree_depth,
            });
        }
        let (offset, len) =
            self.toc[node_index(*key)]
                .frame(kind)
                .ok_or(CacheError::MissingPayload {
                    key: *key,
                    kind: kind.name(),
                })?;

        let mut compressed = vec![0; len as usize];
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut compressed)?;
        }

        let mut decoder = FrameDecoder::new(compressed.as_slice());
        let mut bytes = Vec::new();
        io::copy(&mut decoder, &mut bytes)
            .map_err(|e| CacheError::Decompress(format!("{} of chunk {}: {}", kind, key, e)))?;
        Ok(bytes)
    }
}

impl ChunkSource for ChunkFile {
    fn tree_depth(&self) -> Level {
        self.header.tree_depth
    }

    fn imagery_depth(&self) -> Level {
        self.header.imagery_depth
    }

    fn load_geometry(&self, key: &NodeKey) -> CacheResult<Geometry> {
        Geometry::from_bytes(&self.read_payload(key, LoadKind::Geometry)?)
    }

    fn load_imagery(&self, key: &NodeKey) -> CacheResult<ImageData> {
        ImageData::from_bytes(&self.read_payload(key, LoadKind::Imagery)?)
    }
}

fn read_exact_or_malformed(file: &mut File, buf: &mut [u8], what: &str) -> CacheResult<()> {
    file.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => CacheError::MalformedHeader(format!("truncated {}", what)),
        _ => CacheError::Io(e),
    })
}

/// Builds a [`ChunkFile`] in memory and writes it out in one go.
pub struct ChunkFileWriter {
    header: ChunkFileHeader,
    frames: Vec<[Option<Vec<u8>>; 2]>,
}

impl ChunkFileWriter {
    pub fn new(tree_depth: Level, imagery_depth: Level) -> CacheResult<Self> {
        validate_depths(tree_depth, imagery_depth)?;
        let header = ChunkFileHeader::new(tree_depth, imagery_depth);
        Ok(Self {
            frames: vec![[None, None]; header.node_count as usize],
            header,
        })
    }

    /// Bakes every payload `source` can produce.
    pub fn from_source(source: &dyn ChunkSource) -> CacheResult<Self> {
        let tree_depth = source.tree_depth();
        let imagery_depth = source.imagery_depth();
        let mut writer = Self::new(tree_depth, imagery_depth)?;
        for level in 0..tree_depth {
            let side = level_side(level);
            for y in 0..side {
                for x in 0..side {
                    let key = NodeKey::new(level, UVec2::new(x, y));
                    writer.set_geometry(&key, &source.load_geometry(&key)?)?;
                    if level < imagery_depth {
                        writer.set_imagery(&key, &source.load_imagery(&key)?)?;
                    }
                }
            }
        }
        Ok(writer)
    }

    pub fn set_geometry(&mut self, key: &NodeKey, geometry: &Geometry) -> CacheResult<()> {
        self.set_frame(key, LoadKind::Geometry, &geometry.to_bytes())
    }

    pub fn set_imagery(&mut self, key: &NodeKey, image: &ImageData) -> CacheResult<()> {
        if key.level >= self.header.imagery_depth {
            return Err(CacheError::NodeOutOfRange {
                key: *key,
                depth: self.header.imagery_depth,
            });
        }
        self.set_frame(key, LoadKind::Imagery, &image.to_bytes())
    }

    fn set_frame(&mut self, key: &NodeKey, kind: LoadKind, mut bytes: &[u8]) -> CacheResult<()> {
        if !key.is_within(self.header.tree_depth) {
            return Err(CacheError::NodeOutOfRange {
                key: *key,
                depth: self.header.tree_depth,
            });
        }
        let mut encoder = FrameEncoder::new(Vec::new());
        io::copy(&mut bytes, &mut encoder)?;
        let compressed = encoder
            .finish()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        self.frames[node_index(*key)][kind.index()] = Some(compressed);
        Ok(())
    }

    pub fn write(&self, path: impl AsRef<Path>) -> CacheResult<()> {
        let mut offset = (mem::size_of::<ChunkFileHeader>()
            + self.frames.len() * mem::size_of::<TocEntry>()) as u64;
        let mut toc = Vec::with_capacity(self.frames.len());
        for [geometry, imagery] in &self.frames {
            let mut entry = TocEntry::default();
            if let Some(frame) = geometry {
                entry.geometry_offset = offset;
                entry.geometry_len = frame.len() as u32;
                offset += frame.len() as u64;
            }
            if let Some(frame) = imagery {
                entry.imagery_offset = offset;
                entry.imagery_len = frame.len() as u32;
                offset += frame.len() as u64;
            }
            toc.push(entry);
        }

        let mut out = BufWriter::new(File::create(path.as_ref())?);
        out.write_all(bytes_of(&self.header))?;
        out.write_all(bytemuck::cast_slice(&toc))?;
        for frame in self.frames.iter().flatten().flatten() {
            out.write_all(frame)?;
        }
        out.flush()?;
        Ok(())
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
    use crate::source::ProceduralSource;

    fn baked_file(dir: &tempfile::TempDir) -> PathBuf {
        let source = ProceduralSource {
            imagery_depth: 2,
            patch_resolution: 4,
            texture_resolution: 4,
            ..ProceduralSource::new(3)
        };
        let path = dir.path().join("terrain.strata");
        ChunkFileWriter::from_source(&source)
            .unwrap()
            .write(&path)
            .unwrap();
        path
    }

    #[test]
    fn baked_file_serves_the_same_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = baked_file(&dir);
        let source = ProceduralSource {
            imagery_depth: 2,
            patch_resolution: 4,
            texture_resolution: 4,
            ..ProceduralSource::new(3)
        };

        let file = ChunkFile::open(&path).unwrap();
        assert_eq!(file.tree_depth(), 3);
        assert_eq!(file.imagery_depth(), 2);

        let key = NodeKey::new(2, UVec2::new(1, 3));
        assert_eq!(
            file.load_geometry(&key).unwrap(),
            source.load_geometry(&key).unwrap()
        );
        assert!(file.contains(&NodeKey::new(1, UVec2::ZERO), LoadKind::Imagery));
        assert!(!file.contains(&key, LoadKind::Imagery));
        assert!(matches!(
            file.load_imagery(&key),
            Err(CacheError::MissingPayload { .. })
        ));
    }

    #[test]
    fn open_rejects_other_versions() {
        let dir = tempfile::tempdir().unwrap();
        let path = baked_file(&dir);

        let mut bytes = std::fs::read(&path).unwrap();
        let mut header: ChunkFileHeader =
            bytemuck::pod_read_unaligned(&bytes[..mem::size_of::<ChunkFileHeader>()]);
        header.version = CHUNK_FILE_VERSION + 1;
        bytes[..mem::size_of::<ChunkFileHeader>()].copy_from_slice(bytes_of(&header));
        std::fs::write(&path, &bytes).unwrap();

        match ChunkFile::open(&path) {
            Err(CacheError::VersionMismatch { found, expected }) => {
                assert_eq!(found, CHUNK_FILE_VERSION + 1);
                assert_eq!(expected, CHUNK_FILE_VERSION);
            }
            other => panic!("expected a version mismatch, got {:?}", other.err()),
        }
    }

    #[test]
    fn open_rejects_foreign_and_truncated_files() {
        let dir = tempfile::tempdir().unwrap();

        let foreign = dir.path().join("foreign.bin");
        std::fs::write(&foreign, [0xAB; 64]).unwrap();
        assert!(matches!(
            ChunkFile::open(&foreign),
            Err(CacheError::BadTag { .. })
        ));

        let path = baked_file(&dir);
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..40]).unwrap();
        assert!(matches!(
            ChunkFile::open(&path),
            Err(CacheError::MalformedHeader(_))
        ));

        assert!(matches!(
            ChunkFile::open(dir.path().join("missing.strata")),
            Err(CacheError::Io(_))
        ));
    }

    #[test]
    fn open_rejects_frames_past_the_address_space() {
        let dir = tempfile::tempdir().unwrap();
        let path = baked_file(&dir);
        let mut bytes = std::fs::read(&path).unwrap();

        // Root geometry offset, the first field of the first table entry.
        let at = mem::size_of::<ChunkFileHeader>();
        bytes[at..at + 8].copy_from_slice(&(u64::MAX - 1).to_ne_bytes());
        std::fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            ChunkFile::open(&path),
            Err(CacheError::MalformedHeader(_))
        ));
    }
}
