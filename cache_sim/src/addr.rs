use crate::{
    cache::ConfigurationError,
    common::{SetIndex, Tag},
};

/// width of a trace address in bits.
pub const ADDRESS_BITS: u32 = u64::BITS;

/// upper bound of set index bits; `2^MAX_INDEX_BITS` sets are allocated eagerly.
pub const MAX_INDEX_BITS: u32 = 20;

/// upper bound of `2^index_bits * lines_per_set`.
pub const MAX_LINES: usize = 1 << 24;

/// all-ones mask of `bits` width. saturates at 64.
#[inline]
pub const fn low_mask(bits: u32) -> u64 {
    if bits >= ADDRESS_BITS {
        u64::MAX
    } else {
        (1 << bits) - 1
    }
}

/// logical right shift which yields 0 instead of overflowing.
#[inline]
pub const fn shift_right(value: u64, amount: u32) -> u64 {
    if amount >= ADDRESS_BITS {
        0
    } else {
        value >> amount
    }
}

/// splits `addr` into (tag, set index).
///
/// callers pass widths validated by [`Geometry::new`]; wider ones saturate
/// instead of overflowing, and the set index only fits `usize` for
/// `index_bits <= usize::BITS`.
#[inline]
pub const fn decode(addr: u64, offset_bits: u32, index_bits: u32) -> (Tag, SetIndex) {
    let set = shift_right(addr, offset_bits) & low_mask(index_bits);
    let tag = shift_right(addr, offset_bits.saturating_add(index_bits));
    (Tag::new(tag), SetIndex::new(set as usize))
}

/// validated shape of a cache: `2^index_bits` sets of `lines_per_set` lines,
/// each line covering `2^offset_bits` bytes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Geometry {
    offset_bits: u32,
    index_bits: u32,
    lines_per_set: usize,
}

impl Geometry {
    pub fn new(
        offset_bits: u32,
        index_bits: u32,
        lines_per_set: usize,
    ) -> Result<Self, ConfigurationError> {
        if lines_per_set < 1 {
            return Err(ConfigurationError::NoLines);
        }
        match offset_bits.checked_add(index_bits) {
            Some(total) if total <= ADDRESS_BITS => {}
            _ => {
                return Err(ConfigurationError::AddressWidthExceeded {
                    offset_bits,
                    index_bits,
                    width: ADDRESS_BITS,
                })
            }
        }
        if index_bits > MAX_INDEX_BITS {
            return Err(ConfigurationError::TooManySets {
                index_bits,
                max: MAX_INDEX_BITS,
            });
        }
        match lines_per_set.checked_mul(1 << index_bits) {
            Some(total) if total <= MAX_LINES => {}
            _ => {
                return Err(ConfigurationError::TooManyLines {
                    index_bits,
                    lines_per_set,
                    max: MAX_LINES,
                })
            }
        }
        Ok(Self {
            offset_bits,
            index_bits,
            lines_per_set,
        })
    }
    pub fn offset_bits(&self) -> u32 {
        self.offset_bits
    }
    pub fn index_bits(&self) -> u32 {
        self.index_bits
    }
    pub fn lines_per_set(&self) -> usize {
        self.lines_per_set
    }
    pub fn num_sets(&self) -> usize {
        1 << self.index_bits
    }
    #[inline]
    pub fn decode(&self, addr: u64) -> (Tag, SetIndex) {
        decode(addr, self.offset_bits, self.index_bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_low_mask() {
        assert_eq!(0, low_mask(0));
        assert_eq!(0b1111, low_mask(4));
        assert_eq!(u64::MAX, low_mask(64));
    }
    #[test]
    fn test_decode() {
        // b = 4, s = 2: 0b_1011_10_0110
        let (tag, set) = decode(0b1011_10_0110, 4, 2);
        assert_eq!(Tag::new(0b1011), tag);
        assert_eq!(SetIndex::new(0b10), set);
    }
    #[test]
    fn test_decode_single_set() {
        for addr in [0u64, 0x10, 0xdead_beef, u64::MAX] {
            let (tag, set) = decode(addr, 0, 0);
            assert_eq!(SetIndex::new(0), set);
            assert_eq!(Tag::new(addr), tag);
        }
        let (tag, set) = decode(0x7ff, 5, 0);
        assert_eq!(SetIndex::new(0), set);
        assert_eq!(Tag::new(0x3f), tag);
    }
    #[test]
    fn test_decode_full_width() {
        let (tag, set) = decode(u64::MAX, 64, 0);
        assert_eq!(Tag::new(0), tag);
        assert_eq!(SetIndex::new(0), set);
        let (tag, set) = decode(0xabcd, 34, 30);
        assert_eq!(Tag::new(0), tag);
        assert_eq!(SetIndex::new(0), set);
    }
    #[test]
    fn test_decode_saturates_widths() {
        assert_eq!((Tag::new(0), SetIndex::new(0)), decode(0xffff, u32::MAX, 1));
        assert_eq!((Tag::new(0), SetIndex::new(1)), decode(0x3, 1, u32::MAX));
    }
    #[test]
    fn test_geometry_at_address_width() {
        let g = Geometry::new(64, 0, 4).unwrap();
        assert_eq!((Tag::new(0), SetIndex::new(0)), g.decode(u64::MAX));
        let g = Geometry::new(44, 20, 1).unwrap();
        assert_eq!(1 << 20, g.num_sets());
        assert_eq!(
            (Tag::new(0), SetIndex::new(0xabcde)),
            g.decode(0xabcde << 44)
        );
        assert!(matches!(
            Geometry::new(45, 20, 1),
            Err(ConfigurationError::AddressWidthExceeded { .. })
        ));
        assert!(matches!(
            Geometry::new(65, 0, 1),
            Err(ConfigurationError::AddressWidthExceeded { .. })
        ));
    }
    #[test]
    fn test_decode_is_deterministic() {
        let g = Geometry::new(3, 5, 2).unwrap();
        for addr in [0x0u64, 0x7fff_1234, 0xffff_ffff_ffff_fff0] {
            assert_eq!(g.decode(addr), g.decode(addr));
            assert_eq!(g.decode(addr), decode(addr, 3, 5));
        }
    }
    #[test]
    fn test_geometry_validation() {
        assert!(matches!(
            Geometry::new(4, 4, 0),
            Err(ConfigurationError::NoLines)
        ));
        assert!(matches!(
            Geometry::new(40, 25, 1),
            Err(ConfigurationError::AddressWidthExceeded { .. })
        ));
        assert!(matches!(
            Geometry::new(u32::MAX, 1, 1),
            Err(ConfigurationError::AddressWidthExceeded { .. })
        ));
        assert!(matches!(
            Geometry::new(0, 21, 1),
            Err(ConfigurationError::TooManySets { .. })
        ));
        assert!(matches!(
            Geometry::new(0, 0, usize::MAX),
            Err(ConfigurationError::TooManyLines { .. })
        ));
        assert!(matches!(
            Geometry::new(0, 20, 1 << 20),
            Err(ConfigurationError::TooManyLines { .. })
        ));
        assert!(matches!(
            Geometry::new(0, 20, 17),
            Err(ConfigurationError::TooManyLines { .. })
        ));
        assert_eq!(MAX_LINES, Geometry::new(0, 20, 16).unwrap().num_sets() * 16);
        let g = Geometry::new(0, 0, 1).unwrap();
        assert_eq!(1, g.num_sets());
        let g = Geometry::new(6, 4, 8).unwrap();
        assert_eq!(16, g.num_sets());
        assert_eq!(8, g.lines_per_set());
    }
}
