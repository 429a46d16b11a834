use slab::Slab;
use static_assertions::const_assert_eq;
use std::{
    mem,
    num::NonZeroU32,
    ops::{Index, IndexMut},
};

/// An opaque number that uniquely identifies a record stored in an [`Allocator32`].
///
/// An `Option<AllocId32>` still only requires 32 bits, so pending queues of ids stay compact.
pub type AllocId32 = NonZeroU32;

const_assert_eq!(
    mem::size_of::<Option<AllocId32>>(),
    mem::size_of::<AllocId32>()
);

/// A free-list backed store of short-lived records, indexed by 32-bit [`AllocId32`].
///
/// Removed entries are recycled by the next insert, so a steady stream of requests does not keep allocating.
pub struct Allocator32<T> {
    values: Slab<T>,
}

impl<T> Default for Allocator32<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Allocator32<T> {
    pub fn new() -> Self {
        Self {
            values: Slab::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn insert(&mut self, value: T) -> AllocId32 {
        let index = self.values.insert(value);
        Self::index_to_id(index)
    }

    /// Removes the record, panicking if `id` is vacant.
    #[inline]
    pub fn remove(&mut self, id: AllocId32) -> T {
        self.values.remove(Self::id_to_index(id))
    }

    const MAX_VALID_INDEX: usize = (u32::MAX - 1) as usize;

    const fn id_to_index(id: AllocId32) -> usize {
        // Flipping every bit maps the first slab index (zero) onto u32::MAX, which keeps the id nonzero.
        (id.get() ^ u32::MAX) as usize
    }

    fn index_to_id(index: usize) -> AllocId32 {
        assert!(index <= Self::MAX_VALID_INDEX, "Allocator32 is full");
        match AllocId32::new((index as u32) ^ u32::MAX) {
            Some(id) => id,
            None => unreachable!(),
        }
    }
}

impl<T> Index<AllocId32> for Allocator32<T> {
    type Output = T;

    #[inline]
    fn index(&self, id: AllocId32) -> &Self::Output {
        self.values.index(Self::id_to_index(id))
    }
}

impl<T> IndexMut<AllocId32> for Allocator32<T> {
    #[inline]
    fn index_mut(&mut self, id: AllocId32) -> &mut Self::Output {
        self.values.index_mut(Self::id_to_index(id))
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
