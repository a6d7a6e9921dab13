//! Tree reduction across the items of one work-group

use crate::dtype::Element;

/// Sum the partial values of a work-group held in `scratch`.
///
/// Item `i` has stored its partial sum in `scratch[i]`. Each halving step
/// lets the lower half of the items fold in the upper half; the end of a step
/// is a barrier, so no item reads a slot that is still being written. The
/// group size must be a power of two. Only item 0 should store the returned
/// total.
pub fn workgroup_reduce<T: Element>(scratch: &mut [T]) -> T {
    debug_assert!(
        scratch.len().is_power_of_two(),
        "work-group size must be a power of two"
    );
    let mut offset = scratch.len() / 2;
    while offset > 0 {
        for item in 0..offset {
            scratch[item] = scratch[item] + scratch[item + offset];
        }
        offset /= 2;
    }
    scratch.first().copied().unwrap_or_else(T::zero)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workgroup_reduce() {
        let mut scratch: Vec<f64> = (1..=16).map(|v| v as f64).collect();
        assert_eq!(workgroup_reduce(&mut scratch), 136.0);

        let mut single = [3.5f32];
        assert_eq!(workgroup_reduce(&mut single), 3.5);
    }
}
