use std::sync::atomic::{AtomicU8, Ordering};

/// Eight flags packed into a byte.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Bitset8 {
    pub bits: u8,
}

impl Bitset8 {
    #[inline]
    pub const fn new(bits: u8) -> Self {
        Self { bits }
    }

    #[inline]
    pub fn any(&self) -> bool {
        self.bits != 0
    }

    #[inline]
    pub fn none(&self) -> bool {
        self.bits == 0
    }

    #[inline]
    pub fn bit_is_set(&self, bit: u8) -> bool {
        self.bits & (1 << bit) != 0
    }

    #[inline]
    pub fn set_bit(&mut self, bit: u8) {
        self.bits |= 1 << bit;
    }

    #[inline]
    pub fn unset_bit(&mut self, bit: u8) {
        self.bits &= !(1 << bit);
    }

    #[inline]
    pub fn assign_bit(&mut self, bit: u8, value: bool) {
        if value {
            self.set_bit(bit)
        } else {
            self.unset_bit(bit)
        }
    }
}

/// A [`Bitset8`] that can be read from one thread while another thread flips bits.
///
/// All accesses are `SeqCst`. The flags are only ever written by one owner, so contention is not a concern.
#[derive(Debug, Default)]
pub struct AtomicBitset8 {
    pub bits: AtomicU8,
}

impl AtomicBitset8 {
    #[inline]
    pub fn load(&self) -> Bitset8 {
        Bitset8::new(self.bits.load(Ordering::SeqCst))
    }

    #[inline]
    pub fn any(&self) -> bool {
        self.load().any()
    }

    #[inline]
    pub fn bit_is_set(&self, bit: u8) -> bool {
        self.load().bit_is_set(bit)
    }

    #[inline]
    pub fn set_bit(&self, bit: u8) {
        self.bits.fetch_or(1 << bit, Ordering::SeqCst);
    }

    #[inline]
    pub fn unset_bit(&self, bit: u8) {
        self.bits.fetch_and(!(1 << bit), Ordering::SeqCst);
    }

    #[inline]
    pub fn assign_bit(&self, bit: u8, value: bool) {
        if value {
            self.set_bit(bit)
        } else {
            self.unset_bit(bit)
        }
    }

    /// Returns the previous value of the bit.
    #[inline]
    pub fn fetch_and_set_bit(&self, bit: u8) -> bool {
        self.bits.fetch_or(1 << bit, Ordering::SeqCst) & (1 << bit) != 0
    }

    /// Returns the previous value of the bit.
    #[inline]
    pub fn fetch_and_unset_bit(&self, bit: u8) -> bool {
        self.bits.fetch_and(!(1 << bit), Ordering::SeqCst) & (1 << bit) != 0
    }

    #[inline]
    pub fn clear(&self) {
        self.bits.store(0, Ordering::SeqCst);
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

    #[test]
    fn plain_bits() {
        let mut set = Bitset8::default();
        assert!(set.none());
        set.set_bit(3);
        assert!(set.any());
        assert!(set.bit_is_set(3));
        assert!(!set.bit_is_set(2));
        set.assign_bit(3, false);
        assert!(set.none());
    }

    #[test]
    fn atomic_fetch_reports_previous_value() {
        let set = AtomicBitset8::default();
        assert!(!set.fetch_and_set_bit(1));
        assert!(set.fetch_and_set_bit(1));
        assert!(set.bit_is_set(1));

        set.set_bit(5);
        assert_eq!(set.load().bits, 0b0010_0010);

        assert!(set.fetch_and_unset_bit(1));
        assert!(!set.fetch_and_unset_bit(1));
        assert_eq!(set.load(), Bitset8::new(0b0010_0000));

        set.clear();
        assert!(!set.any());
    }
}
