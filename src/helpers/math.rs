//! Integer ratio helpers

use super::Index;

/// Ratio of two integers rounded towards +inf, clamped to zero for negative
/// numerators.
#[inline]
pub fn round_ratio_up_above_zero<I: Index>(num: I, div: I) -> I {
    debug_assert!(div != I::zero(), "Cannot divide by zero");
    if num < I::zero() {
        I::zero()
    } else if num % div != I::zero() {
        num / div + I::one()
    } else {
        num / div
    }
}

/// Ratio of two integers rounded towards +inf.
#[inline]
pub fn round_ratio_up<I: Index>(num: I, div: I) -> I {
    debug_assert!(div != I::zero(), "Cannot divide by zero");
    let quotient = num / div;
    if num < I::zero() || num % div == I::zero() {
        quotient
    } else {
        quotient + I::one()
    }
}

/// Ceiling division on host-side sizes.
#[inline]
pub fn div_ceil(num: usize, div: usize) -> usize {
    num.div_ceil(div)
}

/// Round `val` up to the nearest multiple of `multiplier`.
#[inline]
pub fn round_up_to_nearest_multiple(val: usize, multiplier: usize) -> usize {
    let diff = val % multiplier;
    if diff > 0 { val + (multiplier - diff) } else { val }
}
