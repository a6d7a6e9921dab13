//! Transform kernels of the Winograd pipeline
//!
//! Transformed tensors are stored position-major: `[A * B][rows][vector]`,
//! so the batched matmul sees one contiguous matrix per transform point.
//! Each work item handles `VW` adjacent channels or features.

use super::coefficients::{Coefficients, Minimal};
use super::tiles::{FilterTile, TransformTile, transform_filter, transform_input, transform_output};
use crate::backend::{Kernel, ReadMem, WriteMem};
use crate::conv2d::layout::{FilterStrides, ImageStrides};
use crate::dtype::Element;
use crate::helpers::Index;

/// Tile grid of one image
#[derive(Debug, Clone, Copy)]
pub(crate) struct TileGrid<I> {
    pub rows: I,
    pub cols: I,
}

impl<I: Index> TileGrid<I> {
    #[inline]
    pub fn number(&self) -> I {
        self.rows * self.cols
    }

    /// `(image, tile row, tile col)` of flat tile `index`
    #[inline]
    fn split(&self, index: I) -> (I, I, I) {
        let per_image = self.number();
        let tile = index % per_image;
        (index / per_image, tile / self.cols, tile % self.cols)
    }
}

/// Store `tile` at `[ab][row][lane]` of a position-major buffer with `rows`
/// matrix rows of `width` lanes.
#[inline]
fn scatter<T: Element, I: Index, const A: usize, const B: usize>(
    out: &WriteMem<T>,
    tile: &TransformTile<T, A, B>,
    rows: I,
    width: I,
    row: I,
    lane: I,
) {
    for a in 0..A {
        for b in 0..B {
            let ab = I::from_usize(a * B + b);
            let offset = (ab * rows + row) * width + lane;
            // SAFETY: one item per (row, lane), every transform point
            unsafe { out.store(offset.as_usize(), tile[(a, b)]) }
        }
    }
}

/// Load `[ab][row][lane]` of a position-major buffer as a tile
#[inline]
fn gather<T: Element, I: Index, const A: usize, const B: usize>(
    input: &ReadMem<T>,
    rows: I,
    width: I,
    row: I,
    lane: I,
) -> TransformTile<T, A, B> {
    TransformTile::from_fn(|a, b| {
        let ab = I::from_usize(a * B + b);
        // SAFETY: the launcher sized the buffer for every row and lane
        unsafe { input.load(((ab * rows + row) * width + lane).as_usize()) }
    })
}

/// Filter transform: `[A * B][channels][features]` from a user filter,
/// read mirrored for the input gradient.
pub(crate) struct FilterTransform<
    T,
    I,
    const M: usize,
    const N: usize,
    const R: usize,
    const S: usize,
    const A: usize,
    const B: usize,
    const VW: usize,
> {
    pub filter: ReadMem<T>,
    pub out: WriteMem<T>,
    pub strides: FilterStrides<I>,
    pub channels: I,
    pub features: I,
    pub mirror: bool,
}

impl<
    T: Element,
    I: Index,
    const M: usize,
    const N: usize,
    const R: usize,
    const S: usize,
    const A: usize,
    const B: usize,
    const VW: usize,
> FilterTransform<T, I, M, N, R, S, A, B, VW>
{
    pub fn range(&self) -> usize {
        (self.channels * self.features).as_usize() / VW
    }
}

impl<
    T: Element,
    I: Index,
    const M: usize,
    const N: usize,
    const R: usize,
    const S: usize,
    const A: usize,
    const B: usize,
    const VW: usize,
> Kernel for FilterTransform<T, I, M, N, R, S, A, B, VW>
where
    Minimal: Coefficients<M, R, A> + Coefficients<N, S, B>,
{
    fn run(&self, item: usize) {
        let vectors = self.features / I::from_usize(VW);
        let index = I::from_usize(item);
        let channel = index / vectors;
        let feature = (index % vectors) * I::from_usize(VW);
        for v in 0..VW {
            let feature = feature + I::from_usize(v);
            let tile = FilterTile::<T, R, S>::from_fn(|r, s| {
                let (r, s) = if self.mirror {
                    (R - 1 - r, S - 1 - s)
                } else {
                    (r, s)
                };
                let offset = self
                    .strides
                    .offset(I::from_usize(r), I::from_usize(s), channel, feature);
                // SAFETY: every tap of the filter exists
                unsafe { self.filter.load(offset.as_usize()) }
            });
            let u = transform_filter::<T, M, N, R, S, A, B>(&tile);
            scatter(&self.out, &u, self.channels, self.features, channel, feature);
        }
    }
}

/// Input transform: `A x B` patches of an image, one per tile, stored as
/// `[A * B][images * tiles][channels]`.
///
/// Consecutive patches start `step_rows` and `step_cols` apart; positions
/// outside the image read as zero.
pub(crate) struct InputTransform<
    T,
    I,
    const M: usize,
    const N: usize,
    const R: usize,
    const S: usize,
    const A: usize,
    const B: usize,
    const VW: usize,
> {
    pub input: ReadMem<T>,
    pub out: WriteMem<T>,
    pub strides: ImageStrides<I>,
    pub rows: I,
    pub cols: I,
    pub channels: I,
    pub pad_rows: I,
    pub pad_cols: I,
    pub step_rows: I,
    pub step_cols: I,
    pub grid: TileGrid<I>,
    pub images: I,
}

impl<
    T: Element,
    I: Index,
    const M: usize,
    const N: usize,
    const R: usize,
    const S: usize,
    const A: usize,
    const B: usize,
    const VW: usize,
> InputTransform<T, I, M, N, R, S, A, B, VW>
{
    pub fn range(&self) -> usize {
        (self.images * self.grid.number() * self.channels).as_usize() / VW
    }
}

impl<
    T: Element,
    I: Index,
    const M: usize,
    const N: usize,
    const R: usize,
    const S: usize,
    const A: usize,
    const B: usize,
    const VW: usize,
> Kernel for InputTransform<T, I, M, N, R, S, A, B, VW>
where
    Minimal: Coefficients<M, R, A> + Coefficients<N, S, B>,
{
    fn run(&self, item: usize) {
        let vectors = self.channels / I::from_usize(VW);
        let index = I::from_usize(item);
        let row = index / vectors;
        let channel = (index % vectors) * I::from_usize(VW);
        let (image, tile_row, tile_col) = self.grid.split(row);
        let row_start = tile_row * self.step_rows - self.pad_rows;
        let col_start = tile_col * self.step_cols - self.pad_cols;
        let total_rows = self.images * self.grid.number();

        for v in 0..VW {
            let channel = channel + I::from_usize(v);
            let patch = TransformTile::<T, A, B>::from_fn(|a, b| {
                let r = row_start + I::from_usize(a);
                let c = col_start + I::from_usize(b);
                if r < I::zero() || r >= self.rows || c < I::zero() || c >= self.cols {
                    return T::zero();
                }
                // SAFETY: bounds checked above
                unsafe {
                    self.input
                        .load(self.strides.offset(image, r, c, channel).as_usize())
                }
            });
            let transformed = transform_input::<T, M, N, R, S, A, B>(&patch);
            scatter(&self.out, &transformed, total_rows, self.channels, row, channel);
        }
    }
}

/// Filter-gradient transform of the output gradient: `R x S` chunks, one per
/// tile, stored as `[A * B][images * tiles][features]`. Positions past the
/// gradient extent read as zero.
pub(crate) struct GradientTransform<
    T,
    I,
    const M: usize,
    const N: usize,
    const R: usize,
    const S: usize,
    const A: usize,
    const B: usize,
    const VW: usize,
> {
    pub grad: ReadMem<T>,
    pub out: WriteMem<T>,
    pub strides: ImageStrides<I>,
    pub rows: I,
    pub cols: I,
    pub features: I,
    pub grid: TileGrid<I>,
    pub images: I,
}

impl<
    T: Element,
    I: Index,
    const M: usize,
    const N: usize,
    const R: usize,
    const S: usize,
    const A: usize,
    const B: usize,
    const VW: usize,
> GradientTransform<T, I, M, N, R, S, A, B, VW>
{
    pub fn range(&self) -> usize {
        (self.images * self.grid.number() * self.features).as_usize() / VW
    }
}

impl<
    T: Element,
    I: Index,
    const M: usize,
    const N: usize,
    const R: usize,
    const S: usize,
    const A: usize,
    const B: usize,
    const VW: usize,
> Kernel for GradientTransform<T, I, M, N, R, S, A, B, VW>
where
    Minimal: Coefficients<M, R, A> + Coefficients<N, S, B>,
{
    fn run(&self, item: usize) {
        let vectors = self.features / I::from_usize(VW);
        let index = I::from_usize(item);
        let row = index / vectors;
        let feature = (index % vectors) * I::from_usize(VW);
        let (image, tile_row, tile_col) = self.grid.split(row);
        let row_start = tile_row * I::from_usize(R);
        let col_start = tile_col * I::from_usize(S);
        let total_rows = self.images * self.grid.number();

        for v in 0..VW {
            let feature = feature + I::from_usize(v);
            let chunk = FilterTile::<T, R, S>::from_fn(|r, s| {
                let r = row_start + I::from_usize(r);
                let c = col_start + I::from_usize(s);
                if r >= self.rows || c >= self.cols {
                    return T::zero();
                }
                // SAFETY: bounds checked above
                unsafe { self.grad.load(self.strides.offset(image, r, c, feature).as_usize()) }
            });
            let u = transform_filter::<T, M, N, R, S, A, B>(&chunk);
            scatter(&self.out, &u, total_rows, self.features, row, feature);
        }
    }
}

/// Output transform of the forward and input-gradient passes: maps each
/// `[A * B][images * tiles][features]` column back to an `M x N` block of
/// the result, clipped at the image edge.
pub(crate) struct OutputTransform<
    T,
    I,
    const M: usize,
    const N: usize,
    const R: usize,
    const S: usize,
    const A: usize,
    const B: usize,
    const VW: usize,
> {
    pub intermediate: ReadMem<T>,
    pub output: WriteMem<T>,
    pub strides: ImageStrides<I>,
    pub rows: I,
    pub cols: I,
    pub features: I,
    pub grid: TileGrid<I>,
    pub images: I,
}

impl<
    T: Element,
    I: Index,
    const M: usize,
    const N: usize,
    const R: usize,
    const S: usize,
    const A: usize,
    const B: usize,
    const VW: usize,
> OutputTransform<T, I, M, N, R, S, A, B, VW>
{
    pub fn range(&self) -> usize {
        (self.images * self.grid.number() * self.features).as_usize() / VW
    }
}

impl<
    T: Element,
    I: Index,
    const M: usize,
    const N: usize,
    const R: usize,
    const S: usize,
    const A: usize,
    const B: usize,
    const VW: usize,
> Kernel for OutputTransform<T, I, M, N, R, S, A, B, VW>
where
    Minimal: Coefficients<M, R, A> + Coefficients<N, S, B>,
{
    fn run(&self, item: usize) {
        let vectors = self.features / I::from_usize(VW);
        let index = I::from_usize(item);
        let row = index / vectors;
        let feature = (index % vectors) * I::from_usize(VW);
        let (image, tile_row, tile_col) = self.grid.split(row);
        let row_start = tile_row * I::from_usize(M);
        let col_start = tile_col * I::from_usize(N);
        let row_end = (self.rows - row_start).min(I::from_usize(M)).as_usize();
        let col_end = (self.cols - col_start).min(I::from_usize(N)).as_usize();
        let total_rows = self.images * self.grid.number();

        for v in 0..VW {
            let feature = feature + I::from_usize(v);
            let tile: TransformTile<T, A, B> =
                gather(&self.intermediate, total_rows, self.features, row, feature);
            let y = transform_output::<T, M, N, R, S, A, B>(&tile);
            for i in 0..row_end {
                for j in 0..col_end {
                    let offset = self.strides.offset(
                        image,
                        row_start + I::from_usize(i),
                        col_start + I::from_usize(j),
                        feature,
                    );
                    // SAFETY: clipped to the result extent
                    unsafe { self.output.store(offset.as_usize(), y[(i, j)]) }
                }
            }
        }
    }
}

/// Output transform of the filter gradient: maps `[A * B][channels][features]`
/// to the full `M x N` filter, overwriting or accumulating.
pub(crate) struct FilterGradientOutput<
    T,
    I,
    const M: usize,
    const N: usize,
    const R: usize,
    const S: usize,
    const A: usize,
    const B: usize,
    const VW: usize,
> {
    pub intermediate: ReadMem<T>,
    pub output: WriteMem<T>,
    pub strides: FilterStrides<I>,
    pub channels: I,
    pub features: I,
    pub accumulate: bool,
}

impl<
    T: Element,
    I: Index,
    const M: usize,
    const N: usize,
    const R: usize,
    const S: usize,
    const A: usize,
    const B: usize,
    const VW: usize,
> FilterGradientOutput<T, I, M, N, R, S, A, B, VW>
{
    pub fn range(&self) -> usize {
        (self.channels * self.features).as_usize() / VW
    }
}

impl<
    T: Element,
    I: Index,
    const M: usize,
    const N: usize,
    const R: usize,
    const S: usize,
    const A: usize,
    const B: usize,
    const VW: usize,
> Kernel for FilterGradientOutput<T, I, M, N, R, S, A, B, VW>
where
    Minimal: Coefficients<M, R, A> + Coefficients<N, S, B>,
{
    fn run(&self, item: usize) {
        let vectors = self.features / I::from_usize(VW);
        let index = I::from_usize(item);
        let channel = index / vectors;
        let feature = (index % vectors) * I::from_usize(VW);

        for v in 0..VW {
            let feature = feature + I::from_usize(v);
            let tile: TransformTile<T, A, B> =
                gather(&self.intermediate, self.channels, self.features, channel, feature);
            let y = transform_output::<T, M, N, R, S, A, B>(&tile);
            for i in 0..M {
                for j in 0..N {
                    let offset = self
                        .strides
                        .offset(I::from_usize(i), I::from_usize(j), channel, feature)
                        .as_usize();
                    // SAFETY: one item per (channel, feature); read-modify-write
                    // stays within the item
                    unsafe {
                        let value = if self.accumulate {
                            self.output.load(offset) + y[(i, j)]
                        } else {
                            y[(i, j)]
                        };
                        self.output.store(offset, value);
                    }
                }
            }
        }
    }
}
