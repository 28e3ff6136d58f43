//! Bit-range helpers with the z/Architecture MSB-first numbering:
//! bit 0 is the most significant bit of the 64-bit register, bit 63
//! the least significant.

/// Build a 64-bit mask with ones in the inclusive MSB-first bit range
/// `left..=right`.
///
/// `make_mask(0, 63)` is all ones; `make_mask(63, 63)` is `1`;
/// `make_mask(0, 0)` is the sign bit.
///
/// # Panics
///
/// Panics unless `left <= right <= 63`.
#[must_use]
pub fn make_mask(left: u32, right: u32) -> u64 {
    assert!(left <= right, "mask range is empty: {left}..={right}");
    assert!(right <= 63, "bit index {right} out of range");
    let upper = if left == 0 {
        u64::MAX
    } else {
        (1u64 << (64 - left)) - 1
    };
    let lower = if right == 63 {
        0
    } else {
        (1u64 << (63 - right)) - 1
    };
    upper & !lower
}

/// Number of the highest set bit in MSB-first numbering, or `None` for
/// zero.
#[must_use]
pub fn leading_bit(value: u64) -> Option<u32> {
    if value == 0 {
        None
    } else {
        Some(value.leading_zeros())
    }
}

/// Number of the lowest set bit in MSB-first numbering, or `None` for
/// zero.
#[must_use]
pub fn trailing_bit(value: u64) -> Option<u32> {
    if value == 0 {
        None
    } else {
        Some(63 - value.trailing_zeros())
    }
}

/// True if `value` is a single contiguous run of ones.
#[must_use]
pub fn is_contiguous_mask(value: u64) -> bool {
    match (leading_bit(value), trailing_bit(value)) {
        (Some(l), Some(r)) => value == make_mask(l, r),
        _ => false,
    }
}

/// How a rotate-then-combine operation folds the rotated value into
/// the destination under a bit-range mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitCombine {
    /// Keep the selected range of the rotated value, zero the rest.
    MaskZero,
    /// Keep the selected range of the rotated value, set the rest.
    MaskOne,
    /// Insert the selected range into the destination, zeroing bits
    /// outside the range (RISBG with the zero-remaining flag).
    Insert,
    /// AND the selected range into the destination.
    And,
    /// OR the selected range into the destination.
    Or,
    /// XOR the selected range into the destination.
    Xor,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_and_single_bit_masks() {
        assert_eq!(make_mask(0, 63), u64::MAX);
        assert_eq!(make_mask(63, 63), 1);
        assert_eq!(make_mask(0, 0), 1u64 << 63);
    }

    #[test]
    fn interior_ranges() {
        assert_eq!(make_mask(48, 63), 0xFFFF);
        assert_eq!(make_mask(32, 47), 0xFFFF_0000);
        assert_eq!(make_mask(0, 31), 0xFFFF_FFFF_0000_0000);
        assert_eq!(make_mask(8, 55), 0x00FF_FFFF_FFFF_FF00);
    }

    #[test]
    #[should_panic(expected = "mask range is empty")]
    fn reversed_range_panics() {
        let _ = make_mask(5, 4);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn out_of_range_panics() {
        let _ = make_mask(0, 64);
    }

    #[test]
    fn bit_positions() {
        assert_eq!(leading_bit(0), None);
        assert_eq!(leading_bit(1), Some(63));
        assert_eq!(leading_bit(1u64 << 63), Some(0));
        assert_eq!(trailing_bit(0b1100), Some(61));
        assert_eq!(leading_bit(0b1100), Some(60));
    }

    #[test]
    fn contiguous_detection() {
        assert!(is_contiguous_mask(0xFF00));
        assert!(is_contiguous_mask(1));
        assert!(is_contiguous_mask(u64::MAX));
        assert!(!is_contiguous_mask(0));
        assert!(!is_contiguous_mask(0b1010));
    }
}
