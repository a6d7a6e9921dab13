//! Unflattening of work-item ids into tensor coordinates

use super::{Index, IndexDivisor};

/// Coordinates of a flat index into a 2-D tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorIndex2D<I> {
    /// Outer coordinate
    pub s0: I,
    /// Inner coordinate
    pub s1: I,
}

/// Coordinates of a flat index into a 3-D tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorIndex3D<I> {
    /// Outermost coordinate
    pub s0: I,
    /// Middle coordinate
    pub s1: I,
    /// Innermost coordinate
    pub s2: I,
}

/// Coordinates of a flat index into a 4-D tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorIndex4D<I> {
    /// Outermost coordinate
    pub s0: I,
    /// Second coordinate
    pub s1: I,
    /// Third coordinate
    pub s2: I,
    /// Innermost coordinate
    pub s3: I,
}

/// Split `index` into `(index / size1, index % size1)`.
#[inline]
pub fn unflatten2d<I: Index, D: IndexDivisor<I>>(index: I, div1: &D, size1: I) -> TensorIndex2D<I> {
    let s0 = div1.divide(index);
    TensorIndex2D {
        s0,
        s1: index - s0 * size1,
    }
}

/// Split `index` over a tensor with inner extents `size1` and `size2`.
#[inline]
pub fn unflatten3d<I: Index, D: IndexDivisor<I>>(
    index: I,
    div1: &D,
    size1: I,
    div2: &D,
    size2: I,
) -> TensorIndex3D<I> {
    let inner = unflatten2d(index, div2, size2);
    let outer = unflatten2d(inner.s0, div1, size1);
    TensorIndex3D {
        s0: outer.s0,
        s1: outer.s1,
        s2: inner.s1,
    }
}

/// Split `index` over a tensor with inner extents `size1`, `size2`, `size3`.
#[inline]
pub fn unflatten4d<I: Index, D: IndexDivisor<I>>(
    index: I,
    divisors: [&D; 3],
    sizes: [I; 3],
) -> TensorIndex4D<I> {
    let inner = unflatten2d(index, divisors[2], sizes[2]);
    let rest = unflatten3d(inner.s0, divisors[0], sizes[0], divisors[1], sizes[1]);
    TensorIndex4D {
        s0: rest.s0,
        s1: rest.s1,
        s2: rest.s2,
        s3: inner.s1,
    }
}
