//! Im2col extraction and filter rearrangement kernels

use crate::backend::{Kernel, ReadMem, WriteMem};
use crate::conv2d::layout::{FilterStrides, Geometry, GroupMap, ImageStrides};
use crate::dtype::Element;
use crate::helpers::{Index, out_window_from_input, range};

/// Sets every element of `out` to zero
pub(crate) struct ZeroFill<T> {
    pub out: WriteMem<T>,
}

impl<T: Element> Kernel for ZeroFill<T> {
    fn run(&self, item: usize) {
        // SAFETY: the launch range is the view length
        unsafe { self.out.store(item, T::zero()) }
    }
}

/// Forward extraction: one tile row per output position and group, holding
/// the window taps of `VW` channels per item.
///
/// Tiles are `[image][group][out_rows * out_cols][window * channels/group]`.
pub(crate) struct ExtractForward<T, I, const VW: usize> {
    pub input: ReadMem<T>,
    pub tiles: WriteMem<T>,
    pub geometry: Geometry<I>,
    pub groups: GroupMap<I>,
    pub in_strides: ImageStrides<I>,
}

impl<T: Element, I: Index, const VW: usize> ExtractForward<T, I, VW> {
    pub fn range(&self, images: usize) -> usize {
        let g = &self.geometry;
        images * (self.groups.groups * g.out_rows * g.out_cols * self.groups.channels_per_group)
            .as_usize()
            / VW
    }
}

impl<T: Element, I: Index, const VW: usize> Kernel for ExtractForward<T, I, VW> {
    fn run(&self, item: usize) {
        let g = &self.geometry;
        let cg = self.groups.channels_per_group;
        let vectors = cg / I::from_usize(VW);
        let positions = g.out_rows * g.out_cols;

        let index = I::from_usize(item);
        let vector = index % vectors;
        let rest = index / vectors;
        let pos = rest % positions;
        let rest = rest / positions;
        let group = rest % self.groups.groups;
        let image = rest / self.groups.groups;
        let out_r = pos / g.out_cols;
        let out_c = pos % g.out_cols;

        let row_len = g.window_rows * g.window_cols * cg;
        let row_base = ((image * self.groups.groups + group) * positions + pos) * row_len;
        let local = vector * I::from_usize(VW);
        for kr in range(I::zero(), g.window_rows) {
            let r = out_r * g.stride_rows - g.pad_rows + kr;
            for kc in range(I::zero(), g.window_cols) {
                let c = out_c * g.stride_cols - g.pad_cols + kc;
                if !g.in_input(r, c) {
                    continue;
                }
                let col = (kr * g.window_cols + kc) * cg + local;
                for v in 0..VW {
                    let v = I::from_usize(v);
                    let ch = self.groups.channel(group, local + v);
                    // SAFETY: the tile buffer holds every image of the
                    // minibatch and the input view starts at its first image
                    unsafe {
                        let x = self.input.load(self.in_strides.offset(image, r, c, ch).as_usize());
                        self.tiles.store((row_base + col + v).as_usize(), x);
                    }
                }
            }
        }
    }
}

/// Input-gradient extraction: one tile row per input position, holding the
/// output-gradient values each mirrored tap touches, `VW` features per item.
///
/// Tiles are `[image][in_rows * in_cols][window * features]`; taps that no
/// output reaches at this stride keep their zero.
pub(crate) struct ExtractInputGradient<T, I, const VW: usize> {
    pub grad: ReadMem<T>,
    pub tiles: WriteMem<T>,
    pub geometry: Geometry<I>,
    pub grad_strides: ImageStrides<I>,
}

impl<T: Element, I: Index, const VW: usize> ExtractInputGradient<T, I, VW> {
    pub fn range(&self, images: usize) -> usize {
        let g = &self.geometry;
        images * (g.in_rows * g.in_cols * g.features).as_usize() / VW
    }
}

impl<T: Element, I: Index, const VW: usize> Kernel for ExtractInputGradient<T, I, VW> {
    fn run(&self, item: usize) {
        let g = &self.geometry;
        let one = I::one();
        let vectors = g.features / I::from_usize(VW);
        let positions = g.in_rows * g.in_cols;

        let index = I::from_usize(item);
        let vector = index % vectors;
        let rest = index / vectors;
        let pos = rest % positions;
        let image = rest / positions;
        let row = pos / g.in_cols;
        let col = pos % g.in_cols;

        let rows = out_window_from_input(row, g.stride_rows, g.window_rows - one - g.pad_rows);
        let cols = out_window_from_input(col, g.stride_cols, g.window_cols - one - g.pad_cols);
        let row_base = (image * positions + pos) * g.window_rows * g.window_cols * g.features;
        let feature = vector * I::from_usize(VW);

        let mut out_r = rows.window_start;
        let mut tap_r = rows.filter_start;
        while tap_r < g.window_rows && out_r < g.out_rows {
            let mut out_c = cols.window_start;
            let mut tap_c = cols.filter_start;
            while tap_c < g.window_cols && out_c < g.out_cols {
                let col_base = (tap_r * g.window_cols + tap_c) * g.features + feature;
                let grad_base = self.grad_strides.offset(image, out_r, out_c, feature);
                for v in 0..VW {
                    let v = I::from_usize(v);
                    // SAFETY: see `ExtractForward`
                    unsafe {
                        let dy = self.grad.load((grad_base + v).as_usize());
                        self.tiles.store((row_base + col_base + v).as_usize(), dy);
                    }
                }
                out_c = out_c + one;
                tap_c = tap_c + g.stride_cols;
            }
            out_r = out_r + one;
            tap_r = tap_r + g.stride_rows;
        }
    }
}

/// Filter-gradient extraction, transposed: one tile row per `(kr, kc, c)`
/// tap, holding the input value the tap sees at every output position of
/// every image.
///
/// Tiles are `[window * channels][images * out_rows * out_cols]`.
pub(crate) struct ExtractFilterGradient<T, I> {
    pub input: ReadMem<T>,
    pub tiles: WriteMem<T>,
    pub geometry: Geometry<I>,
    pub in_strides: ImageStrides<I>,
    pub images: I,
}

impl<T: Element, I: Index> ExtractFilterGradient<T, I> {
    pub fn range(&self) -> usize {
        let g = &self.geometry;
        (self.images * g.window_rows * g.window_cols * g.channels).as_usize()
    }
}

impl<T: Element, I: Index> Kernel for ExtractFilterGradient<T, I> {
    fn run(&self, item: usize) {
        let g = &self.geometry;
        let taps = g.window_rows * g.window_cols * g.channels;
        let positions = g.out_rows * g.out_cols;

        let index = I::from_usize(item);
        let tap = index % taps;
        let image = index / taps;
        let ch = tap % g.channels;
        let rest = tap / g.channels;
        let kc = rest % g.window_cols;
        let kr = rest / g.window_cols;

        let base = tap * self.images * positions + image * positions;
        for out_r in range(I::zero(), g.out_rows) {
            let r = out_r * g.stride_rows - g.pad_rows + kr;
            for out_c in range(I::zero(), g.out_cols) {
                let c = out_c * g.stride_cols - g.pad_cols + kc;
                if !g.in_input(r, c) {
                    continue;
                }
                // SAFETY: see `ExtractForward`
                unsafe {
                    let x = self.input.load(self.in_strides.offset(image, r, c, ch).as_usize());
                    self.tiles
                        .store((base + out_r * g.out_cols + out_c).as_usize(), x);
                }
            }
        }
    }
}

/// Rewrites the filter as `[rows][cols][features][channels]` with mirrored
/// taps, the matrix the input gradient multiplies by.
pub(crate) struct MirrorFilter<T, I> {
    pub filter: ReadMem<T>,
    pub out: WriteMem<T>,
    pub geometry: Geometry<I>,
    pub filter_strides: FilterStrides<I>,
}

impl<T: Element, I: Index> Kernel for MirrorFilter<T, I> {
    fn run(&self, item: usize) {
        let g = &self.geometry;
        let one = I::one();
        let index = I::from_usize(item);
        let ch = index % g.channels;
        let rest = index / g.channels;
        let feature = rest % g.features;
        let rest = rest / g.features;
        let kc = rest % g.window_cols;
        let kr = rest / g.window_cols;
        let src = self.filter_strides.offset(
            g.window_rows - one - kr,
            g.window_cols - one - kc,
            ch,
            feature,
        );
        // SAFETY: one item per element of the rewritten filter
        unsafe { self.out.store(item, self.filter.load(src.as_usize())) }
    }
}

/// Rewrites a grouped filter as `[groups][rows * cols * channels/group][features/group]`
pub(crate) struct RegroupFilter<T, I> {
    pub filter: ReadMem<T>,
    pub out: WriteMem<T>,
    pub geometry: Geometry<I>,
    pub groups: GroupMap<I>,
    pub filter_strides: FilterStrides<I>,
}

impl<T: Element, I: Index> Kernel for RegroupFilter<T, I> {
    fn run(&self, item: usize) {
        let g = &self.geometry;
        let fg = self.groups.features_per_group;
        let cg = self.groups.channels_per_group;
        let index = I::from_usize(item);
        let local_feature = index % fg;
        let rest = index / fg;
        let local_channel = rest % cg;
        let rest = rest / cg;
        let kc = rest % g.window_cols;
        let rest = rest / g.window_cols;
        let kr = rest % g.window_rows;
        let group = rest / g.window_rows;
        let feature = self.groups.feature(group, local_feature);
        let src = self.filter_strides.offset(kr, kc, local_channel, feature);
        // SAFETY: one item per element of the rewritten filter
        unsafe { self.out.store(item, self.filter.load(src.as_usize())) }
    }
}

/// Scatters per-group results `[image][group][positions][features/group]`
/// into the output's feature order.
pub(crate) struct ScatterGroups<T, I> {
    pub grouped: ReadMem<T>,
    pub output: WriteMem<T>,
    pub positions: I,
    pub features: I,
    pub groups: GroupMap<I>,
}

impl<T: Element, I: Index> Kernel for ScatterGroups<T, I> {
    fn run(&self, item: usize) {
        let index = I::from_usize(item);
        let feature = index % self.features;
        let rest = index / self.features;
        let pos = rest % self.positions;
        let image = rest / self.positions;
        let (group, local) = self.groups.split_feature(feature);
        let src = ((image * self.groups.groups + group) * self.positions + pos)
            * self.groups.features_per_group
            + local;
        // SAFETY: one item per output element of the minibatch
        unsafe { self.output.store(item, self.grouped.load(src.as_usize())) }
    }
}
