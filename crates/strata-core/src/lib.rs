pub mod allocator;
pub mod bitset;
pub mod geometry;
pub mod work_timer;

use ahash::AHashMap;

/// Hash map for small `Copy` keys like node ids.
pub type SmallKeyHashMap<K, V> = AHashMap<K, V>;

// Re-exports.
pub use glam;
pub use static_assertions;
