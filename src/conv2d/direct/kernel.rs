//! Direct convolution kernel, one work item per `VW` adjacent outputs

use crate::backend::{Kernel, ReadMem, WriteMem};
use crate::conv2d::conv_type::{ConvType, Direction};
use crate::conv2d::layout::{FilterStrides, Geometry, ImageStrides};
use crate::dtype::Element;
use crate::helpers::tensor_index::unflatten4d;
use crate::helpers::{
    Index, IndexDivisor, RegisterTile1D, in_window_from_output, out_window_from_input, range,
};
use std::marker::PhantomData;

/// Direct convolution for direction `C`.
///
/// `WINDOW`/`STRIDE` fix a square window and equal strides at compile time;
/// 0 means read them from the geometry. For FilterGradient the fixed window
/// is the filter, held by the geometry as the output extent.
///
/// Tensor roles:
/// - Forward: `input` image, `filter`, `output` image.
/// - InputGradient: `input` is the output gradient, `filter` the filter read
///   mirrored with channel and feature strides swapped, `output` the input
///   gradient.
/// - FilterGradient: `input` image, `filter` holds the output gradient
///   (located through `out_strides`), `output` the filter gradient (located
///   through `filter_strides`).
pub(crate) struct DirectKernel<
    T,
    I,
    C,
    D,
    const WINDOW: usize,
    const STRIDE: usize,
    const VW: usize,
> {
    pub input: ReadMem<T>,
    pub filter: ReadMem<T>,
    pub output: WriteMem<T>,
    pub geometry: Geometry<I>,
    pub in_strides: ImageStrides<I>,
    pub filter_strides: FilterStrides<I>,
    pub out_strides: ImageStrides<I>,
    /// Extents of the three inner dimensions of the work-item space
    pub extents: [I; 3],
    pub divisors: [D; 3],
    pub _direction: PhantomData<C>,
}

impl<T, I, C, D, const WINDOW: usize, const STRIDE: usize, const VW: usize>
    DirectKernel<T, I, C, D, WINDOW, STRIDE, VW>
where
    T: Element,
    I: Index,
    C: ConvType,
    D: IndexDivisor<I>,
{
    #[inline]
    fn window(dynamic: I) -> I {
        if WINDOW > 0 { I::from_usize(WINDOW) } else { dynamic }
    }

    #[inline]
    fn stride(dynamic: I) -> I {
        if STRIDE > 0 { I::from_usize(STRIDE) } else { dynamic }
    }

    #[inline]
    fn in_bounds(value: I, extent: I) -> bool {
        value >= I::zero() && value < extent
    }

    fn store(&self, base: I, step: I, acc: &RegisterTile1D<T, VW>) {
        for v in 0..VW {
            let offset = base + I::from_usize(v) * step;
            // SAFETY: the launcher checked the output buffer against the
            // output size, and each item owns its VW outputs.
            unsafe { self.output.store(offset.as_usize(), acc[v]) };
        }
    }

    fn forward(&self, index: I) {
        let g = &self.geometry;
        let pos = unflatten4d(
            index,
            [&self.divisors[0], &self.divisors[1], &self.divisors[2]],
            self.extents,
        );
        let (b, row, col) = (pos.s0, pos.s1, pos.s2);
        let feature = pos.s3 * I::from_usize(VW);
        let window_rows = Self::window(g.window_rows);
        let window_cols = Self::window(g.window_cols);
        let rows = in_window_from_output(row, Self::stride(g.stride_rows), g.pad_rows);
        let cols = in_window_from_output(col, Self::stride(g.stride_cols), g.pad_cols);

        let mut acc = RegisterTile1D::<T, VW>::zeros();
        for kr in range(I::zero(), window_rows) {
            let r = rows.window_start + kr;
            if !Self::in_bounds(r, g.in_rows) {
                continue;
            }
            for kc in range(I::zero(), window_cols) {
                let c = cols.window_start + kc;
                if !Self::in_bounds(c, g.in_cols) {
                    continue;
                }
                for ch in range(I::zero(), g.channels) {
                    let filter_base = self.filter_strides.offset(kr, kc, ch, feature);
                    // SAFETY: all coordinates are in range of their tensors,
                    // whose buffers the launcher checked.
                    unsafe {
                        let x = self.input.load(self.in_strides.offset(b, r, c, ch).as_usize());
                        for v in 0..VW {
                            let w = self.filter.load(
                                (filter_base + I::from_usize(v) * self.filter_strides.feature)
                                    .as_usize(),
                            );
                            acc[v] = x.mad(w, acc[v]);
                        }
                    }
                }
            }
        }
        let base = self.out_strides.offset(b, row, col, feature);
        self.store(base, self.out_strides.channel, &acc);
    }

    fn input_gradient(&self, index: I) {
        let g = &self.geometry;
        let pos = unflatten4d(
            index,
            [&self.divisors[0], &self.divisors[1], &self.divisors[2]],
            self.extents,
        );
        let (b, row, col) = (pos.s0, pos.s1, pos.s2);
        let feature = pos.s3 * I::from_usize(VW);
        let window_rows = Self::window(g.window_rows);
        let window_cols = Self::window(g.window_cols);
        let stride_rows = Self::stride(g.stride_rows);
        let stride_cols = Self::stride(g.stride_cols);
        let rows = out_window_from_input(row, stride_rows, g.pad_rows);
        let cols = out_window_from_input(col, stride_cols, g.pad_cols);
        let one = I::one();

        let mut acc = RegisterTile1D::<T, VW>::zeros();
        let mut in_r = rows.window_start;
        let mut tap_r = rows.filter_start;
        while tap_r < window_rows && in_r < g.in_rows {
            let mut in_c = cols.window_start;
            let mut tap_c = cols.filter_start;
            while tap_c < window_cols && in_c < g.in_cols {
                // taps are walked mirrored
                let kr = window_rows - one - tap_r;
                let kc = window_cols - one - tap_c;
                for ch in range(I::zero(), g.channels) {
                    let filter_base = self.filter_strides.offset(kr, kc, ch, feature);
                    // SAFETY: see `forward`
                    unsafe {
                        let x = self
                            .input
                            .load(self.in_strides.offset(b, in_r, in_c, ch).as_usize());
                        for v in 0..VW {
                            let w = self.filter.load(
                                (filter_base + I::from_usize(v) * self.filter_strides.feature)
                                    .as_usize(),
                            );
                            acc[v] = x.mad(w, acc[v]);
                        }
                    }
                }
                in_c = in_c + one;
                tap_c = tap_c + stride_cols;
            }
            in_r = in_r + one;
            tap_r = tap_r + stride_rows;
        }
        let base = self.out_strides.offset(b, row, col, feature);
        self.store(base, self.out_strides.channel, &acc);
    }

    fn filter_gradient(&self, index: I) {
        let g = &self.geometry;
        let [filter_cols, channels, vectors] = self.extents;
        let pos = unflatten4d(
            index,
            [&self.divisors[0], &self.divisors[1], &self.divisors[2]],
            [Self::window(filter_cols), channels, vectors],
        );
        let (kr, kc, ch) = (pos.s0, pos.s1, pos.s2);
        let feature = pos.s3 * I::from_usize(VW);
        let stride_rows = Self::stride(g.stride_rows);
        let stride_cols = Self::stride(g.stride_cols);

        let mut acc = RegisterTile1D::<T, VW>::zeros();
        for b in range(I::zero(), g.batch) {
            for out_r in range(I::zero(), g.window_rows) {
                let r = out_r * stride_rows - g.pad_rows + kr;
                if !Self::in_bounds(r, g.in_rows) {
                    continue;
                }
                for out_c in range(I::zero(), g.window_cols) {
                    let c = out_c * stride_cols - g.pad_cols + kc;
                    if !Self::in_bounds(c, g.in_cols) {
                        continue;
                    }
                    let grad_base = self.out_strides.offset(b, out_r, out_c, feature);
                    // SAFETY: see `forward`
                    unsafe {
                        let x = self.input.load(self.in_strides.offset(b, r, c, ch).as_usize());
                        for v in 0..VW {
                            let dy = self.filter.load(
                                (grad_base + I::from_usize(v) * self.out_strides.channel)
                                    .as_usize(),
                            );
                            acc[v] = x.mad(dy, acc[v]);
                        }
                    }
                }
            }
        }
        let base = self.filter_strides.offset(kr, kc, ch, feature);
        self.store(base, self.filter_strides.feature, &acc);
    }
}

impl<T, I, C, D, const WINDOW: usize, const STRIDE: usize, const VW: usize> Kernel
    for DirectKernel<T, I, C, D, WINDOW, STRIDE, VW>
where
    T: Element,
    I: Index,
    C: ConvType,
    D: IndexDivisor<I>,
{
    fn run(&self, item: usize) {
        let index = I::from_usize(item);
        match C::DIRECTION {
            Direction::Forward => self.forward(index),
            Direction::InputGradient => self.input_gradient(index),
            Direction::FilterGradient => self.filter_gradient(index),
        }
    }
}
