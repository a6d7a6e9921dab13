//! Signed index types used inside kernels

use num_traits::{PrimInt, Signed};
use std::fmt::Debug;

/// A signed integer type used for index arithmetic inside a kernel.
///
/// Kernels are instantiated for `i32` by default and for `i64` when a tensor
/// holds more than `i32::MAX` elements. Window starts may be negative, which
/// is why only signed types qualify.
pub trait Index: PrimInt + Signed + Debug + Send + Sync + 'static {
    /// Number of value bits, excluding the sign bit
    const DIGITS: u32;

    /// Mask for the unsigned counterpart of this type, widened to `u64`
    const UNSIGNED_MASK: u64;

    /// Convert from `usize`; the caller guarantees the value fits
    fn from_usize(v: usize) -> Self;

    /// Convert from `isize`; the caller guarantees the value fits
    fn from_isize(v: isize) -> Self;

    /// Convert to `usize`; the caller guarantees the value is non-negative
    fn as_usize(self) -> usize;

    /// High half of the unsigned product `value * multiple`
    fn mul_hi(value: Self, multiple: u64) -> u64;
}

impl Index for i32 {
    const DIGITS: u32 = i32::BITS - 1;
    const UNSIGNED_MASK: u64 = u32::MAX as u64;

    #[inline]
    fn from_usize(v: usize) -> Self {
        v as i32
    }

    #[inline]
    fn from_isize(v: isize) -> Self {
        v as i32
    }

    #[inline]
    fn as_usize(self) -> usize {
        self as usize
    }

    #[inline]
    fn mul_hi(value: Self, multiple: u64) -> u64 {
        ((value as u32 as u64) * (multiple & Self::UNSIGNED_MASK)) >> 32
    }
}

impl Index for i64 {
    const DIGITS: u32 = i64::BITS - 1;
    const UNSIGNED_MASK: u64 = u64::MAX;

    #[inline]
    fn from_usize(v: usize) -> Self {
        v as i64
    }

    #[inline]
    fn from_isize(v: isize) -> Self {
        v as i64
    }

    #[inline]
    fn as_usize(self) -> usize {
        self as usize
    }

    #[inline]
    fn mul_hi(value: Self, multiple: u64) -> u64 {
        (((value as u64 as u128) * (multiple as u128)) >> 64) as u64
    }
}

/// Half-open range `start..stop` in the index type `I`
#[inline]
pub fn range<I: Index>(start: I, stop: I) -> IndexRange<I> {
    IndexRange { next: start, stop }
}

/// Iterator returned by [`range`]
#[derive(Debug, Clone, Copy)]
pub struct IndexRange<I> {
    next: I,
    stop: I,
}

impl<I: Index> Iterator for IndexRange<I> {
    type Item = I;

    #[inline]
    fn next(&mut self) -> Option<I> {
        if self.next < self.stop {
            let value = self.next;
            self.next = value + I::one();
            Some(value)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mul_hi() {
        assert_eq!(<i32 as Index>::mul_hi(1 << 20, 1 << 20), 1 << 8);
        assert_eq!(<i64 as Index>::mul_hi(1 << 40, 1 << 40), 1 << 16);
    }

    #[test]
    fn test_range() {
        assert_eq!(range(-2i32, 2).collect::<Vec<_>>(), vec![-2, -1, 0, 1]);
        assert_eq!(range(3i64, 3).count(), 0);
        assert_eq!(range(5i64, 1).count(), 0);
    }

    #[test]
    fn test_digits() {
        assert_eq!(<i32 as Index>::DIGITS, 31);
        assert_eq!(<i64 as Index>::DIGITS, 63);
    }
}
