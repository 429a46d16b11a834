mod node;

pub use node::*;

use crate::coordinates::{
    level_offset, level_side, node_index, nodes_in_tree, visit_children, Level, NodeKey,
};
use crate::core::bitset::AtomicBitset8;
use crate::core::glam::UVec2;
use crate::payload::{Geometry, ImageryHandle};
use crate::request::LoadKind;

use std::ops::Index;
use std::sync::Arc;

/// Index of a [`ChunkNode`] in its [`ChunkTree`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The complete quadtree of chunks for one terrain source.
///
/// Nodes are stored level-major, so the table never moves once built and a [`NodeId`] can be computed from a [`NodeKey`]
/// without searching.
pub struct ChunkTree {
    depth: Level,
    nodes: Vec<ChunkNode>,
    residency: Arc<ResidencyTable>,
}

impl ChunkTree {
    /// Builds every node of a tree with `depth` levels. Nothing is resident.
    pub fn new(depth: Level) -> Self {
        let num_nodes = nodes_in_tree(depth);
        let mut nodes = Vec::with_capacity(num_nodes);
        for level in 0..depth {
            let side = level_side(level);
            for y in 0..side {
                for x in 0..side {
                    let key = NodeKey::new(level, UVec2::new(x, y));
                    let parent = key.parent().map(|p| NodeId(node_index(p) as u32));
                    nodes.push(ChunkNode::new(key, parent));
                }
            }
        }
        debug_assert_eq!(nodes.len(), num_nodes);

        Self {
            depth,
            nodes,
            residency: Arc::new(ResidencyTable::new(num_nodes)),
        }
    }

    #[inline]
    pub fn depth(&self) -> Level {
        self.depth
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node_id(&self, key: NodeKey) -> Option<NodeId> {
        key.is_within(self.depth)
            .then(|| NodeId(node_index(key) as u32))
    }

    pub fn get(&self, id: NodeId) -> Option<&ChunkNode> {
        self.nodes.get(id.index())
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> &mut ChunkNode {
        &mut self.nodes[id.index()]
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    /// All nodes on the deepest level.
    pub fn leaves(&self) -> impl Iterator<Item = NodeId> {
        let first = level_offset(self.depth - 1) as u32;
        (first..self.nodes.len() as u32).map(NodeId)
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        self[id].level() + 1 == self.depth
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self[id].parent()
    }

    pub fn children(&self, id: NodeId) -> Option<[NodeId; 4]> {
        if self.is_leaf(id) {
            return None;
        }
        let key = self[id].key();
        let mut children = [NodeId(0); 4];
        visit_children(key.coordinates, |i, coords| {
            children[i as usize] = NodeId(node_index(NodeKey::new(key.level + 1, coords)) as u32);
        });
        Some(children)
    }

    #[inline]
    pub fn has_resident(&self, id: NodeId, kind: LoadKind) -> bool {
        self[id].has_resident(kind)
    }

    /// True if a `kind` payload on `id` would have a resident fallback. Always true for the root.
    pub fn parent_has_resident(&self, id: NodeId, kind: LoadKind) -> bool {
        self.parent(id)
            .map_or(true, |parent| self.has_resident(parent, kind))
    }

    pub fn num_resident(&self, kind: LoadKind) -> usize {
        self.nodes.iter().filter(|n| n.has_resident(kind)).count()
    }

    pub(crate) fn residency(&self) -> &Arc<ResidencyTable> {
        &self.residency
    }

    pub(crate) fn install_geometry(&mut self, id: NodeId, geometry: Geometry) -> Option<Geometry> {
        self.residency.set(id, LoadKind::Geometry, true);
        self.nodes[id.index()].put_geometry(geometry)
    }

    pub(crate) fn take_geometry(&mut self, id: NodeId) -> Option<Geometry> {
        self.residency.set(id, LoadKind::Geometry, false);
        self.nodes[id.index()].take_geometry()
    }

    pub(crate) fn install_imagery(
        &mut self,
        id: NodeId,
        imagery: ImageryHandle,
    ) -> Option<ImageryHandle> {
        self.residency.set(id, LoadKind::Imagery, true);
        self.nodes[id.index()].put_imagery(imagery)
    }

    pub(crate) fn take_imagery(&mut self, id: NodeId) -> Option<ImageryHandle> {
        self.residency.set(id, LoadKind::Imagery, false);
        self.nodes[id.index()].take_imagery()
    }
}

impl Index<NodeId> for ChunkTree {
    type Output = ChunkNode;

    fn index(&self, id: NodeId) -> &Self::Output {
        &self.nodes[id.index()]
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
enum ResidencyBit {
    Geometry = 0,
    Imagery = 1,
}

impl From<LoadKind> for ResidencyBit {
    fn from(kind: LoadKind) -> Self {
        match kind {
            LoadKind::Geometry => ResidencyBit::Geometry,
            LoadKind::Imagery => ResidencyBit::Imagery,
        }
    }
}

/// A copy of every node's residency that the loader thread can read without touching the tree.
///
/// Only the consuming thread writes, and only while it also holds `&mut ChunkTree`.
#[derive(Debug)]
pub(crate) struct ResidencyTable {
    bits: Box<[AtomicBitset8]>,
}

impl ResidencyTable {
    fn new(num_nodes: usize) -> Self {
        Self {
            bits: (0..num_nodes).map(|_| AtomicBitset8::default()).collect(),
        }
    }

    #[inline]
    pub fn is_resident(&self, id: NodeId, kind: LoadKind) -> bool {
        self.bits[id.index()].bit_is_set(ResidencyBit::from(kind) as u8)
    }

    #[inline]
    fn set(&self, id: NodeId, kind: LoadKind, resident: bool) {
        self.bits[id.index()].assign_bit(ResidencyBit::from(kind) as u8, resident);
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
