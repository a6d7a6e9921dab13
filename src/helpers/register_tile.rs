//! Fixed-size register blocks used inside kernels
//!
//! Kernels keep their per-item working set in these arrays so that loop trip
//! counts are compile-time constants and nothing is heap-allocated.

use crate::dtype::Element;
use std::ops::{Index, IndexMut};

/// A 1-D block of `N` values
#[derive(Debug, Clone, Copy)]
pub struct RegisterTile1D<T, const N: usize> {
    /// The values
    pub data: [T; N],
}

impl<T: Element, const N: usize> RegisterTile1D<T, N> {
    /// A block filled with zeros
    #[inline]
    pub fn zeros() -> Self {
        Self { data: [T::zero(); N] }
    }

    /// A block built from a function of the position
    #[inline]
    pub fn from_fn(f: impl FnMut(usize) -> T) -> Self {
        Self {
            data: std::array::from_fn(f),
        }
    }
}

impl<T, const N: usize> Index<usize> for RegisterTile1D<T, N> {
    type Output = T;

    #[inline]
    fn index(&self, i: usize) -> &T {
        &self.data[i]
    }
}

impl<T, const N: usize> IndexMut<usize> for RegisterTile1D<T, N> {
    #[inline]
    fn index_mut(&mut self, i: usize) -> &mut T {
        &mut self.data[i]
    }
}

/// A 2-D block of `R x C` values, row-major
#[derive(Debug, Clone, Copy)]
pub struct RegisterTile2D<T, const R: usize, const C: usize> {
    /// The values
    pub data: [[T; C]; R],
}

impl<T: Element, const R: usize, const C: usize> RegisterTile2D<T, R, C> {
    /// A block filled with zeros
    #[inline]
    pub fn zeros() -> Self {
        Self {
            data: [[T::zero(); C]; R],
        }
    }

    /// A block built from a function of `(row, col)`
    #[inline]
    pub fn from_fn(mut f: impl FnMut(usize, usize) -> T) -> Self {
        Self {
            data: std::array::from_fn(|r| std::array::from_fn(|c| f(r, c))),
        }
    }
}

impl<T, const R: usize, const C: usize> Index<(usize, usize)> for RegisterTile2D<T, R, C> {
    type Output = T;

    #[inline]
    fn index(&self, (r, c): (usize, usize)) -> &T {
        &self.data[r][c]
    }
}

impl<T, const R: usize, const C: usize> IndexMut<(usize, usize)> for RegisterTile2D<T, R, C> {
    #[inline]
    fn index_mut(&mut self, (r, c): (usize, usize)) -> &mut T {
        &mut self.data[r][c]
    }
}

/// A 3-D block of `A x B x C` values
#[derive(Debug, Clone, Copy)]
pub struct RegisterTile3D<T, const A: usize, const B: usize, const C: usize> {
    /// The values
    pub data: [[[T; C]; B]; A],
}

impl<T: Element, const A: usize, const B: usize, const C: usize> RegisterTile3D<T, A, B, C> {
    /// A block filled with zeros
    #[inline]
    pub fn zeros() -> Self {
        Self {
            data: [[[T::zero(); C]; B]; A],
        }
    }
}

impl<T, const A: usize, const B: usize, const C: usize> Index<(usize, usize, usize)>
    for RegisterTile3D<T, A, B, C>
{
    type Output = T;

    #[inline]
    fn index(&self, (a, b, c): (usize, usize, usize)) -> &T {
        &self.data[a][b][c]
    }
}

impl<T, const A: usize, const B: usize, const C: usize> IndexMut<(usize, usize, usize)>
    for RegisterTile3D<T, A, B, C>
{
    #[inline]
    fn index_mut(&mut self, (a, b, c): (usize, usize, usize)) -> &mut T {
        &mut self.data[a][b][c]
    }
}
