//! Direct convolution
//!
//! Each work item computes `VW` adjacent outputs straight from the input and
//! filter, skipping taps that fall into the padding. The dispatcher picks the
//! index type, the divisor strategy, a static window/stride specialisation
//! and the vector width, then launches the matching instantiation.

mod kernel;
mod reduced;

use kernel::DirectKernel;
use reduced::ReducedFilterGradient;

use super::conv_type::{ConvType, Direction};
use super::dispatch::{
    IndexWidth, can_use_fast_div, select_index_width, select_static_window, select_vector_width,
};
use super::layout::{FilterStrides, Geometry, ImageStrides};
use super::{Algorithm, Conv2DParams, LaunchOptions, check_buffers, kernel_params};
use crate::backend::{Backend, NdRange, ReadMem, WriteMem};
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::helpers::{FastDiv, Index, IndexDivisor, PlainDiv};
use std::marker::PhantomData;

/// Everything a direct launch needs, before the index type is fixed
struct DirectLaunch<'a, T, B: Backend> {
    backend: &'a B,
    queue: B::Queue,
    depends_on: &'a [B::Event],
    input: ReadMem<T>,
    filter: ReadMem<T>,
    output: WriteMem<T>,
    kp: Conv2DParams,
    in_strides: ImageStrides<usize>,
    filter_strides: FilterStrides<usize>,
    out_strides: ImageStrides<usize>,
    vector_width: usize,
    static_window: (usize, usize),
    fast_div: bool,
}

/// Launch a direct convolution of direction `C`.
///
/// Buffer roles follow [`get_sizes`](super::get_sizes): for InputGradient the
/// `input` is the output gradient and `output` the input gradient; for
/// FilterGradient `filter` is the output gradient and `output` the filter
/// gradient.
#[allow(clippy::too_many_arguments)]
pub fn launch_direct<T: Element, C: ConvType, B: Backend>(
    input: &[T],
    filter: &[T],
    output: &mut [T],
    params: &Conv2DParams,
    backend: &B,
    options: &LaunchOptions,
    depends_on: &[B::Event],
) -> Result<B::Event> {
    if params.groups != 1 {
        return Err(Error::invalid_algorithm(
            Algorithm::Direct,
            format!("{} groups are not supported", params.groups),
        ));
    }
    let sizes = check_buffers::<T, C>(input, filter, output, params)?;
    let width = select_index_width(
        sizes.input_size.max(sizes.filter_size).max(sizes.output_size),
        options.allow_int64,
    )?;

    let launch =
        DirectLaunch::new::<C>(input, filter, output, params, backend, options, depends_on);

    let positions = params.batch * params.out_rows * params.out_cols;
    if C::DIRECTION == Direction::FilterGradient && positions >= options.reduction_threshold {
        log::debug!(
            "direct filter gradient: work-group reduction over {} positions, {:?} indices",
            positions,
            width
        );
        return match width {
            IndexWidth::I32 => launch.reduced::<i32>(options.workgroup_size),
            IndexWidth::I64 => launch.reduced::<i64>(options.workgroup_size),
        };
    }

    log::debug!(
        "direct {:?}: {:?} indices, vector width {}, fast div {}, static window {:?}",
        C::DIRECTION,
        width,
        launch.vector_width,
        launch.fast_div,
        launch.static_window
    );
    match width {
        IndexWidth::I32 => launch.with_divisor::<i32, C>(),
        IndexWidth::I64 => launch.with_divisor::<i64, C>(),
    }
}

/// Strides of the image, filter and result tensors as the kernel sees them
fn strides<C: ConvType>(
    params: &Conv2DParams,
    kp: &Conv2DParams,
) -> (ImageStrides<usize>, FilterStrides<usize>, ImageStrides<usize>) {
    let format = params.input_format;
    let filter = FilterStrides::new(
        params.filter_format,
        params.window_rows,
        params.window_cols,
        params.channels,
        params.features,
    );
    let input = ImageStrides::new(format, kp.in_rows, kp.in_cols, kp.channels);
    match C::DIRECTION {
        Direction::Forward => (
            input,
            filter,
            ImageStrides::new(format, kp.out_rows, kp.out_cols, kp.features),
        ),
        Direction::InputGradient => (
            input,
            filter.swap_channels(),
            ImageStrides::new(format, kp.out_rows, kp.out_cols, kp.features),
        ),
        // the output gradient plays the window, read as an image
        Direction::FilterGradient => (
            input,
            filter,
            ImageStrides::new(format, kp.window_rows, kp.window_cols, kp.features),
        ),
    }
}

impl<'a, T: Element, B: Backend> DirectLaunch<'a, T, B> {
    /// Kernel parameters, strides and specialisation choices of a launch
    /// whose buffers have been checked.
    fn new<C: ConvType>(
        input: &[T],
        filter: &[T],
        output: &mut [T],
        params: &Conv2DParams,
        backend: &'a B,
        options: &LaunchOptions,
        depends_on: &'a [B::Event],
    ) -> Self {
        let kp = kernel_params::<C>(params);
        let (in_strides, filter_strides, out_strides) = strides::<C>(params, &kp);

        let vector_width = if options.vectorise {
            select_vector_width::<C>(&kp)
        } else {
            1
        };
        let static_window = if options.static_direct {
            select_static_window::<C>(&kp)
        } else {
            (0, 0)
        };
        let fast_div = options.use_fast_div && can_use_fast_div::<C>(&kp, vector_width);

        Self {
            backend,
            queue: backend.get_queue(),
            depends_on,
            input: backend.get_device_buffer(input),
            filter: backend.get_device_buffer(filter),
            output: backend.get_device_buffer_mut(output),
            kp,
            in_strides,
            filter_strides,
            out_strides,
            vector_width,
            static_window,
            fast_div,
        }
    }

    fn reduced<I: Index>(self, workgroup_size: usize) -> Result<B::Event> {
        let kernel = ReducedFilterGradient::<T, I> {
            input: self.input,
            grad: self.filter,
            output: self.output,
            geometry: Geometry::new(&self.kp),
            in_strides: self.in_strides.cast(),
            grad_strides: self.out_strides.cast(),
            filter_strides: self.filter_strides.cast(),
        };
        let range = NdRange {
            groups: kernel.groups(),
            local_size: workgroup_size,
        };
        self.backend
            .enqueue_nd(&self.queue, range, &kernel, self.depends_on)
    }

    fn with_divisor<I: Index, C: ConvType>(self) -> Result<B::Event> {
        if self.fast_div {
            self.with_window::<I, C, FastDiv<I>>()
        } else {
            self.with_window::<I, C, PlainDiv<I>>()
        }
    }

    fn with_window<I: Index, C: ConvType, D: IndexDivisor<I>>(self) -> Result<B::Event> {
        match self.static_window {
            (1, 1) => self.with_vector::<I, C, D, 1, 1>(),
            (3, 1) => self.with_vector::<I, C, D, 3, 1>(),
            (3, 2) => self.with_vector::<I, C, D, 3, 2>(),
            (5, 1) => self.with_vector::<I, C, D, 5, 1>(),
            (5, 2) => self.with_vector::<I, C, D, 5, 2>(),
            _ => self.with_vector::<I, C, D, 0, 0>(),
        }
    }

    fn with_vector<I: Index, C: ConvType, D: IndexDivisor<I>, const W: usize, const S: usize>(
        self,
    ) -> Result<B::Event> {
        match self.vector_width {
            4 => self.enqueue::<I, C, D, W, S, 4>(),
            2 => self.enqueue::<I, C, D, W, S, 2>(),
            _ => self.enqueue::<I, C, D, W, S, 1>(),
        }
    }

    fn enqueue<
        I: Index,
        C: ConvType,
        D: IndexDivisor<I>,
        const W: usize,
        const S: usize,
        const VW: usize,
    >(
        self,
    ) -> Result<B::Event> {
        let kp = &self.kp;
        let vectors = kp.features / VW;
        let (outer, extents) = match C::DIRECTION {
            Direction::FilterGradient => (kp.out_rows, [kp.out_cols, kp.channels, vectors]),
            _ => (kp.batch, [kp.out_rows, kp.out_cols, vectors]),
        };
        let extents = extents.map(I::from_usize);
        let kernel = DirectKernel::<T, I, C, D, W, S, VW> {
            input: self.input,
            filter: self.filter,
            output: self.output,
            geometry: Geometry::new(&self.kp),
            in_strides: self.in_strides.cast(),
            filter_strides: self.filter_strides.cast(),
            out_strides: self.out_strides.cast(),
            extents,
            divisors: extents.map(D::new),
            _direction: PhantomData,
        };
        let range = outer * extents.iter().map(|e| e.as_usize()).product::<usize>();
        self.backend
            .enqueue(&self.queue, range, &kernel, self.depends_on)
    }
}

#[cfg(all(test, feature = "cpu"))]
mod tests {
    use super::*;
    use crate::backend::CompletionToken;
    use crate::backend::cpu::CpuBackend;
    use crate::conv2d::{FilterGradient, get_sizes};

    fn naive_filter_gradient(p: &Conv2DParams, x: &[f64], dy: &[f64]) -> Vec<f64> {
        let mut dw = vec![0.0; get_sizes::<FilterGradient>(p).output_size];
        for b in 0..p.batch {
            for or in 0..p.out_rows {
                for oc in 0..p.out_cols {
                    for kr in 0..p.window_rows {
                        for kc in 0..p.window_cols {
                            let r = (or * p.stride_rows + kr) as isize - p.pad_rows;
                            let c = (oc * p.stride_cols + kc) as isize - p.pad_cols;
                            if r < 0 || c < 0 || r >= p.in_rows as isize || c >= p.in_cols as isize
                            {
                                continue;
                            }
                            let (r, c) = (r as usize, c as usize);
                            for ch in 0..p.channels {
                                for f in 0..p.features {
                                    let xi =
                                        ((b * p.in_rows + r) * p.in_cols + c) * p.channels + ch;
                                    let yi =
                                        ((b * p.out_rows + or) * p.out_cols + oc) * p.features + f;
                                    let wi = ((kr * p.window_cols + kc) * p.channels + ch)
                                        * p.features
                                        + f;
                                    dw[wi] += x[xi] * dy[yi];
                                }
                            }
                        }
                    }
                }
            }
        }
        dw
    }

    fn run_reduced<I: Index>(p: &Conv2DParams, x: &[f64], dy: &[f64]) -> Vec<f64> {
        let backend = CpuBackend::new();
        let mut dw = vec![f64::NAN; get_sizes::<FilterGradient>(p).output_size];
        let launch = DirectLaunch::new::<FilterGradient>(
            x,
            dy,
            &mut dw,
            p,
            &backend,
            &LaunchOptions::default(),
            &[],
        );
        launch.reduced::<I>(8).unwrap().wait();
        dw
    }

    #[test]
    fn test_reduced_filter_gradient_index_widths() {
        let p = Conv2DParams::new(2, 6, 5, 3, 3, 3, 2)
            .with_stride(2, 1)
            .with_padding(1, 1);
        let sizes = get_sizes::<FilterGradient>(&p);
        let x: Vec<f64> = (0..sizes.input_size).map(|i| ((i * 7) % 11) as f64 - 5.0).collect();
        let dy: Vec<f64> = (0..sizes.filter_size).map(|i| ((i * 3) % 5) as f64 - 2.0).collect();
        let expected = naive_filter_gradient(&p, &x, &dy);

        // small integers, so every summation order is exact
        assert_eq!(run_reduced::<i32>(&p, &x, &dy), expected);
        assert_eq!(run_reduced::<i64>(&p, &x, &dy), expected);
    }

    #[test]
    fn test_groups_rejected() {
        let p = Conv2DParams::new(1, 4, 4, 2, 3, 3, 2)
            .with_groups(2, crate::conv2d::GroupFormat::Contiguous);
        let sizes = get_sizes::<crate::conv2d::Forward>(&p);
        let err = launch_direct::<f64, crate::conv2d::Forward, _>(
            &vec![0.0; sizes.input_size],
            &vec![0.0; sizes.filter_size],
            &mut vec![0.0; sizes.output_size],
            &p,
            &CpuBackend::new(),
            &LaunchOptions::default(),
            &[],
        )
        .unwrap_err();
        assert_eq!(err.status(), crate::error::StatusCode::InvalidAlgorithm);
    }
}
