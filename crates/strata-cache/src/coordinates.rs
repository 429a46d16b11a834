use crate::glam::UVec2;

use std::fmt;

/// Depth of a node in the chunk quadtree. The root is level 0.
pub type Level = u8;

/// Index of a child within its parent, in `0..4`.
pub type ChildIndex = u8;

/// Trees deeper than this would need more than `u32::MAX` nodes' worth of bookkeeping.
pub const MAX_TREE_DEPTH: Level = 12;

/// Uniquely identifies a chunk by its level and its grid coordinates within that level.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct NodeKey {
    pub level: Level,
    pub coordinates: UVec2,
}

impl NodeKey {
    pub const ROOT: Self = Self {
        level: 0,
        coordinates: UVec2::ZERO,
    };

    pub fn new(level: Level, coordinates: UVec2) -> Self {
        Self { level, coordinates }
    }

    pub fn parent(&self) -> Option<Self> {
        (self.level > 0).then(|| Self::new(self.level - 1, parent_coords(self.coordinates)))
    }

    pub fn is_within(&self, depth: Level) -> bool {
        let side = level_side(self.level);
        self.level < depth && self.coordinates.x < side && self.coordinates.y < side
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}) @ {}",
            self.coordinates.x, self.coordinates.y, self.level
        )
    }
}

/// Number of chunks along one edge of `level`.
pub const fn level_side(level: Level) -> u32 {
    1 << level
}

/// Number of nodes in all levels above `level`, which is also the table index of the first node in `level`.
pub const fn level_offset(level: Level) -> usize {
    ((1usize << (2 * level as usize)) - 1) / 3
}

/// Number of nodes in a complete quadtree with `depth` levels.
pub const fn nodes_in_tree(depth: Level) -> usize {
    level_offset(depth)
}

/// Position of `key` in a level-major, row-major node table.
pub fn node_index(key: NodeKey) -> usize {
    let side = level_side(key.level) as usize;
    level_offset(key.level) + key.coordinates.y as usize * side + key.coordinates.x as usize
}

pub fn min_child_coords(parent_coords: UVec2) -> UVec2 {
    UVec2::new(parent_coords.x << 1, parent_coords.y << 1)
}

pub fn parent_coords(child_coords: UVec2) -> UVec2 {
    UVec2::new(child_coords.x >> 1, child_coords.y >> 1)
}

pub fn delinearize_child(child: ChildIndex) -> UVec2 {
    UVec2::new(u32::from(child & 1), u32::from((child >> 1) & 1))
}

pub fn visit_children(parent_coords: UVec2, mut visitor: impl FnMut(ChildIndex, UVec2)) {
    let min_child = min_child_coords(parent_coords);
    for child_i in 0..4 {
        visitor(child_i, min_child + delinearize_child(child_i));
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
