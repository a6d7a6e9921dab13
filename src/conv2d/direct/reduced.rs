//! Filter gradient with a work-group reduction over batch positions

use crate::backend::{GroupKernel, ReadMem, WriteMem};
use crate::conv2d::layout::{FilterStrides, Geometry, ImageStrides};
use crate::dtype::Element;
use crate::helpers::Index;
use crate::helpers::workgroup_reduce::workgroup_reduce;

/// One work-group per filter-gradient element.
///
/// The items of a group split the `batch * rows * cols` output-gradient
/// positions between them, then fold their partial sums together. The
/// geometry holds kernel parameters, so the output extent is the filter and
/// the window is the output gradient.
pub(crate) struct ReducedFilterGradient<T, I> {
    pub input: ReadMem<T>,
    pub grad: ReadMem<T>,
    pub output: WriteMem<T>,
    pub geometry: Geometry<I>,
    pub in_strides: ImageStrides<I>,
    pub grad_strides: ImageStrides<I>,
    pub filter_strides: FilterStrides<I>,
}

impl<T: Element, I: Index> ReducedFilterGradient<T, I> {
    /// Number of work-groups
    pub fn groups(&self) -> usize {
        let g = &self.geometry;
        (g.out_rows * g.out_cols * g.channels * g.features).as_usize()
    }

    fn partial_sum(&self, tap: [I; 4], first: I, step: I) -> T {
        let g = &self.geometry;
        let [kr, kc, ch, feature] = tap;
        let positions = g.batch * g.window_rows * g.window_cols;
        let mut sum = T::zero();
        let mut pos = first;
        while pos < positions {
            let out_c = pos % g.window_cols;
            let rest = pos / g.window_cols;
            let out_r = rest % g.window_rows;
            let b = rest / g.window_rows;
            pos = pos + step;

            let r = out_r * g.stride_rows - g.pad_rows + kr;
            let c = out_c * g.stride_cols - g.pad_cols + kc;
            if r < I::zero() || r >= g.in_rows || c < I::zero() || c >= g.in_cols {
                continue;
            }
            // SAFETY: coordinates are in range of buffers checked at launch
            unsafe {
                let x = self.input.load(self.in_strides.offset(b, r, c, ch).as_usize());
                let dy = self
                    .grad
                    .load(self.grad_strides.offset(b, out_r, out_c, feature).as_usize());
                sum = x.mad(dy, sum);
            }
        }
        sum
    }
}

impl<T: Element, I: Index> GroupKernel for ReducedFilterGradient<T, I> {
    type Scratch = T;

    fn run_group(&self, group: usize, scratch: &mut [T]) {
        let g = &self.geometry;
        let group = I::from_usize(group);
        let feature = group % g.features;
        let rest = group / g.features;
        let ch = rest % g.channels;
        let rest = rest / g.channels;
        let kc = rest % g.out_cols;
        let kr = rest / g.out_cols;
        let tap = [kr, kc, ch, feature];

        let local_size = I::from_usize(scratch.len());
        for (item, slot) in scratch.iter_mut().enumerate() {
            *slot = self.partial_sum(tap, I::from_usize(item), local_size);
        }
        let total = workgroup_reduce(scratch);

        let offset = self.filter_strides.offset(kr, kc, ch, feature);
        // SAFETY: one group per filter element; only item 0 stores
        unsafe { self.output.store(offset.as_usize(), total) };
    }
}
