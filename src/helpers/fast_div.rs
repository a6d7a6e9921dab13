//! Integer division strategies for index unflattening
//!
//! Kernels unflatten a work-item id into tensor coordinates with repeated
//! divisions by sizes that are fixed for a launch. [`FastDiv`] replaces each
//! of those divisions by a multiply-high and a shift, using a magic number
//! computed once on the host (Hacker's Delight, chapter 10). [`PlainDiv`]
//! keeps the hardware division. Kernels are generic over [`IndexDivisor`]
//! so the dispatcher chooses the strategy per launch.

use super::Index;

/// Division of non-negative indices by a divisor fixed at construction.
pub trait IndexDivisor<I: Index>: Copy + Send + Sync + 'static {
    /// Whether this strategy uses magic-number division
    const IS_FAST: bool;

    /// Build a divisor for `divisor`.
    ///
    /// Fast division requires `divisor > 1`; the dispatcher checks this
    /// before selecting it.
    fn new(divisor: I) -> Self;

    /// Compute `value / divisor` for a non-negative `value`.
    fn divide(&self, value: I) -> I;
}

/// Plain integer division.
#[derive(Debug, Clone, Copy)]
pub struct PlainDiv<I: Index> {
    divisor: I,
}

impl<I: Index> IndexDivisor<I> for PlainDiv<I> {
    const IS_FAST: bool = false;

    #[inline]
    fn new(divisor: I) -> Self {
        Self { divisor }
    }

    #[inline]
    fn divide(&self, value: I) -> I {
        value / self.divisor
    }
}

/// Magic-number division by a constant.
#[derive(Debug, Clone, Copy)]
pub struct FastDiv<I: Index> {
    multiple: u64,
    shift: u32,
    _index: std::marker::PhantomData<I>,
}

/// Double a `(quotient, remainder)` pair of `2^p / div` into `2^(p+1) / div`,
/// wrapping at the width of the unsigned index type.
#[inline]
fn increase_two_power_by_one(div: u64, quot: &mut u64, rem: &mut u64, mask: u64) {
    *quot = quot.wrapping_mul(2) & mask;
    *rem = rem.wrapping_mul(2) & mask;
    if *rem >= div {
        *quot = quot.wrapping_add(1) & mask;
        *rem -= div;
    }
}

impl<I: Index> IndexDivisor<I> for FastDiv<I> {
    const IS_FAST: bool = true;

    fn new(divisor: I) -> Self {
        debug_assert!(
            divisor > I::one(),
            "FastDiv requires the divisor to be greater than 1"
        );
        let mask = I::UNSIGNED_MASK;
        let bits = I::DIGITS;
        let two_pow: u64 = 1u64 << bits;
        let d = divisor.as_usize() as u64;
        let nc = (two_pow - 1 - (two_pow % d)) & mask;

        let mut power = bits;
        let mut two_p_quot_nc = two_pow / nc;
        let mut two_p_rem_nc = two_pow % nc;
        let mut two_p_quot_d = two_pow / d;
        let mut two_p_rem_d = two_pow % d;

        loop {
            power += 1;
            increase_two_power_by_one(nc, &mut two_p_quot_nc, &mut two_p_rem_nc, mask);
            increase_two_power_by_one(d, &mut two_p_quot_d, &mut two_p_rem_d, mask);
            let delta = d - two_p_rem_d;
            if !(two_p_quot_nc < delta || (two_p_quot_nc == delta && two_p_rem_nc == 0)) {
                break;
            }
        }

        Self {
            multiple: two_p_quot_d.wrapping_add(1) & mask,
            shift: power - bits - 1,
            _index: std::marker::PhantomData,
        }
    }

    #[inline]
    fn divide(&self, value: I) -> I {
        debug_assert!(value >= I::zero(), "FastDiv requires nonnegative values");
        let quotient = I::mul_hi(value, self.multiple) >> self.shift;
        I::from_usize(quotient as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_divisor<I: Index>(divisor: I, values: &[I]) {
        let fast = FastDiv::<I>::new(divisor);
        let plain = PlainDiv::<I>::new(divisor);
        for &v in values {
            assert_eq!(
                fast.divide(v),
                plain.divide(v),
                "{:?} / {:?} (multiple={}, shift={})",
                v,
                divisor,
                fast.multiple,
                fast.shift
            );
        }
    }

    #[test]
    fn test_fast_div_i32_small_divisors() {
        let values: Vec<i32> = (0..2048).chain([i32::MAX - 1, i32::MAX]).collect();
        for d in 2..130 {
            check_divisor(d, &values);
        }
    }

    #[test]
    fn test_fast_div_i32_large_divisors() {
        let values = [0, 1, 7, 1 << 20, 123_456_789, i32::MAX / 3, i32::MAX];
        for d in [1000, 65_535, 65_536, 1 << 30, i32::MAX - 1, i32::MAX] {
            check_divisor(d, &values);
            check_divisor(d, &[d - 1, d, d + (d < i32::MAX) as i32]);
        }
    }

    #[test]
    fn test_fast_div_i64() {
        let values = [0i64, 1, 17, 1 << 40, 987_654_321_012, i64::MAX / 5, i64::MAX];
        for d in [2i64, 3, 7, 10, 641, 1 << 33, 6_700_417, i64::MAX] {
            check_divisor(d, &values);
        }
    }

    #[test]
    fn test_plain_div() {
        let div = PlainDiv::<i32>::new(1);
        assert_eq!(div.divide(42), 42);
        assert!(!PlainDiv::<i32>::IS_FAST);
        assert!(FastDiv::<i64>::IS_FAST);
    }
}
