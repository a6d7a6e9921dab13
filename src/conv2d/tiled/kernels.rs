//! Register-blocked forward and input-gradient kernels
//!
//! A work item owns a `TR x TC` block of results for one vector of output
//! channels. Filter taps and input values are staged in register tiles so
//! every inner loop has a compile-time trip count.

use crate::backend::{Kernel, ReadMem, WriteMem};
use crate::conv2d::layout::{FilterStrides, Geometry, ImageStrides};
use crate::dtype::Element;
use crate::helpers::tensor_index::unflatten4d;
use crate::helpers::{
    Index, IndexDivisor, RegisterTile1D, RegisterTile2D, RegisterTile3D, range,
};

/// Tensor views and strides shared by both tiled kernels
#[derive(Debug, Clone, Copy)]
pub(crate) struct TiledBuffers<T, I> {
    pub input: ReadMem<T>,
    pub filter: ReadMem<T>,
    pub output: WriteMem<T>,
    pub geometry: Geometry<I>,
    pub in_strides: ImageStrides<I>,
    pub filter_strides: FilterStrides<I>,
    pub out_strides: ImageStrides<I>,
}

/// Forward kernel: `W x W` window at stride `S`, `TR x TC` output tile,
/// channels consumed `CV` at a time, `FV` features per item.
pub(crate) struct TiledForward<
    T,
    I,
    D,
    const W: usize,
    const S: usize,
    const TR: usize,
    const TC: usize,
    const CV: usize,
    const FV: usize,
> {
    pub buffers: TiledBuffers<T, I>,
    /// Tile rows, tile columns and feature vectors
    pub extents: [I; 3],
    pub divisors: [D; 3],
}

impl<
    T: Element,
    I: Index,
    D: IndexDivisor<I>,
    const W: usize,
    const S: usize,
    const TR: usize,
    const TC: usize,
    const CV: usize,
    const FV: usize,
> TiledForward<T, I, D, W, S, TR, TC, CV, FV>
{
    #[inline]
    fn load_filter(&self, channel: I, feature: I) -> RegisterTile3D<T, W, W, FV> {
        let b = &self.buffers;
        let mut tile = RegisterTile3D::zeros();
        for kr in 0..W {
            for kc in 0..W {
                for fv in 0..FV {
                    let offset = b.filter_strides.offset(
                        I::from_usize(kr),
                        I::from_usize(kc),
                        channel,
                        feature + I::from_usize(fv),
                    );
                    // SAFETY: channel and feature vector lie inside the filter
                    tile[(kr, kc, fv)] = unsafe { b.filter.load(offset.as_usize()) };
                }
            }
        }
        tile
    }

    /// The `W` input values under each output column of the tile, for one
    /// input row. Values in the padding are zero.
    #[inline]
    fn load_row(&self, image: I, row: I, channel: I, col_start: I) -> RegisterTile2D<T, TC, W> {
        let b = &self.buffers;
        let g = &b.geometry;
        RegisterTile2D::from_fn(|tc, kc| {
            let col = col_start + I::from_usize(tc * S + kc);
            if col < I::zero() || col >= g.in_cols {
                return T::zero();
            }
            let offset = b.in_strides.offset(image, row, col, channel);
            // SAFETY: bounds checked above
            unsafe { b.input.load(offset.as_usize()) }
        })
    }
}

impl<
    T: Element,
    I: Index,
    D: IndexDivisor<I>,
    const W: usize,
    const S: usize,
    const TR: usize,
    const TC: usize,
    const CV: usize,
    const FV: usize,
> Kernel for TiledForward<T, I, D, W, S, TR, TC, CV, FV>
{
    fn run(&self, item: usize) {
        let b = &self.buffers;
        let g = &b.geometry;
        let [d0, d1, d2] = &self.divisors;
        let idx = unflatten4d(I::from_usize(item), [d0, d1, d2], self.extents);
        let image = idx.s0;
        let out_row = idx.s1 * I::from_usize(TR);
        let out_col = idx.s2 * I::from_usize(TC);
        let feature = idx.s3 * I::from_usize(FV);

        let stride = I::from_usize(S);
        let row_start = out_row * stride - g.pad_rows;
        let col_start = out_col * stride - g.pad_cols;
        let in_tile_rows = (TR - 1) * S + W;

        let mut acc = RegisterTile3D::<T, TR, TC, FV>::zeros();
        let chunks = g.channels / I::from_usize(CV);
        for chunk in range(I::zero(), chunks) {
            for cv in 0..CV {
                let channel = chunk * I::from_usize(CV) + I::from_usize(cv);
                let filter = self.load_filter(channel, feature);
                for i in 0..in_tile_rows {
                    let row = row_start + I::from_usize(i);
                    if row < I::zero() || row >= g.in_rows {
                        continue;
                    }
                    let input = self.load_row(image, row, channel, col_start);
                    for tr in 0..TR {
                        // filter row this input row meets for output row `tr`
                        let Some(kr) = i.checked_sub(tr * S).filter(|&kr| kr < W) else {
                            continue;
                        };
                        for tc in 0..TC {
                            for kc in 0..W {
                                let x = input[(tc, kc)];
                                for fv in 0..FV {
                                    acc[(tr, tc, fv)] =
                                        x.mad(filter[(kr, kc, fv)], acc[(tr, tc, fv)]);
                                }
                            }
                        }
                    }
                }
            }
        }

        for tr in 0..TR {
            let r = out_row + I::from_usize(tr);
            if r >= g.out_rows {
                break;
            }
            for tc in 0..TC {
                let c = out_col + I::from_usize(tc);
                if c >= g.out_cols {
                    break;
                }
                let base = b.out_strides.offset(image, r, c, feature);
                for fv in 0..FV {
                    let index = (base + I::from_usize(fv)).as_usize();
                    // SAFETY: edge tiles are clipped to the output extent and
                    // each item owns its block
                    unsafe { b.output.store(index, acc[(tr, tc, fv)]) }
                }
            }
        }
    }
}

/// Input-gradient kernel: each item owns a `TR x TC` block of the input
/// gradient for `CV` channels and reduces over features `FV` at a time.
pub(crate) struct TiledInputGradient<
    T,
    I,
    D,
    const W: usize,
    const S: usize,
    const TR: usize,
    const TC: usize,
    const CV: usize,
    const FV: usize,
> {
    pub buffers: TiledBuffers<T, I>,
    /// Tile rows, tile columns and channel vectors
    pub extents: [I; 3],
    pub divisors: [D; 3],
}

impl<
    T: Element,
    I: Index,
    D: IndexDivisor<I>,
    const W: usize,
    const S: usize,
    const TR: usize,
    const TC: usize,
    const CV: usize,
    const FV: usize,
> TiledInputGradient<T, I, D, W, S, TR, TC, CV, FV>
{
    /// One filter row: `[kc][cv][fv]`
    #[inline]
    fn load_filter_row(&self, kr: usize, channel: I, feature: I) -> RegisterTile3D<T, W, CV, FV> {
        let b = &self.buffers;
        let mut tile = RegisterTile3D::zeros();
        for kc in 0..W {
            for cv in 0..CV {
                for fv in 0..FV {
                    let offset = b.filter_strides.offset(
                        I::from_usize(kr),
                        I::from_usize(kc),
                        channel + I::from_usize(cv),
                        feature + I::from_usize(fv),
                    );
                    // SAFETY: channel and feature vectors lie inside the filter
                    tile[(kc, cv, fv)] = unsafe { b.filter.load(offset.as_usize()) };
                }
            }
        }
        tile
    }

    /// Output-gradient position reached from input position `index` through
    /// tap `tap`, if the stride lands on one.
    #[inline]
    fn source(index: I, pad: I, tap: usize, extent: I) -> Option<I> {
        let stride = I::from_usize(S);
        let t = index + pad - I::from_usize(tap);
        if t < I::zero() || t % stride != I::zero() {
            return None;
        }
        let out = t / stride;
        (out < extent).then_some(out)
    }
}

impl<
    T: Element,
    I: Index,
    D: IndexDivisor<I>,
    const W: usize,
    const S: usize,
    const TR: usize,
    const TC: usize,
    const CV: usize,
    const FV: usize,
> Kernel for TiledInputGradient<T, I, D, W, S, TR, TC, CV, FV>
{
    fn run(&self, item: usize) {
        let b = &self.buffers;
        let g = &b.geometry;
        let [d0, d1, d2] = &self.divisors;
        let idx = unflatten4d(I::from_usize(item), [d0, d1, d2], self.extents);
        let image = idx.s0;
        let row0 = idx.s1 * I::from_usize(TR);
        let col0 = idx.s2 * I::from_usize(TC);
        let channel = idx.s3 * I::from_usize(CV);

        let mut acc = RegisterTile3D::<T, TR, TC, CV>::zeros();
        let chunks = g.features / I::from_usize(FV);
        for chunk in range(I::zero(), chunks) {
            let feature = chunk * I::from_usize(FV);
            for kr in 0..W {
                let filter = self.load_filter_row(kr, channel, feature);
                for tr in 0..TR {
                    let row = row0 + I::from_usize(tr);
                    let Some(grad_row) = Self::source(row, g.pad_rows, kr, g.out_rows) else {
                        continue;
                    };
                    for tc in 0..TC {
                        let col = col0 + I::from_usize(tc);
                        for kc in 0..W {
                            let Some(grad_col) = Self::source(col, g.pad_cols, kc, g.out_cols)
                            else {
                                continue;
                            };
                            let base = b.in_strides.offset(image, grad_row, grad_col, feature);
                            let grad = RegisterTile1D::<T, FV>::from_fn(|fv| {
                                // SAFETY: `source` keeps the position inside
                                // the output gradient
                                unsafe { b.input.load((base + I::from_usize(fv)).as_usize()) }
                            });
                            for cv in 0..CV {
                                for fv in 0..FV {
                                    acc[(tr, tc, cv)] =
                                        grad[fv].mad(filter[(kc, cv, fv)], acc[(tr, tc, cv)]);
                                }
                            }
                        }
                    }
                }
            }
        }

        for tr in 0..TR {
            let r = row0 + I::from_usize(tr);
            if r >= g.in_rows {
                break;
            }
            for tc in 0..TC {
                let c = col0 + I::from_usize(tc);
                if c >= g.in_cols {
                    break;
                }
                let base = b.out_strides.offset(image, r, c, channel);
                for cv in 0..CV {
                    let index = (base + I::from_usize(cv)).as_usize();
                    // SAFETY: clipped to the input-gradient extent
                    unsafe { b.output.store(index, acc[(tr, tc, cv)]) }
                }
            }
        }
    }
}
