//! Bit-field packing helpers
//!
//! Several headers pack sub-byte fields into one word, e.g. the IPv6
//! version/traffic-class/flow-label word or the IPv4 flags/fragment-offset
//! halfword. A [`BitField`] names one such field by shift and width.

/// A field of `width` bits starting `shift` bits above the least
/// significant bit of a 32-bit word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitField {
    shift: u32,
    width: u32,
}

impl BitField {
    /// Field of `width` bits at `shift`; panics if it does not fit in 32 bits
    pub const fn new(shift: u32, width: u32) -> Self {
        assert!(width > 0 && shift + width <= 32);
        BitField { shift, width }
    }

    /// Mask of the field's bits, unshifted
    pub const fn max(&self) -> u32 {
        if self.width == 32 {
            u32::MAX
        } else {
            (1 << self.width) - 1
        }
    }

    /// Extract the field from `word`
    pub const fn get(&self, word: u32) -> u32 {
        (word >> self.shift) & self.max()
    }

    /// Return `word` with the field replaced by `value` (excess bits of
    /// `value` are dropped)
    pub const fn set(&self, word: u32, value: u32) -> u32 {
        let mask = self.max() << self.shift;
        (word & !mask) | ((value & self.max()) << self.shift)
    }

    /// Whether `value` fits in the field without truncation
    pub const fn fits(&self, value: u32) -> bool {
        value <= self.max()
    }
}
