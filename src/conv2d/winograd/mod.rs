//! Winograd minimal-filtering convolution
//!
//! The pipeline is: filter transform, input transform, one batched matmul
//! per transform point, output transform. Transforms run per `M x N` output
//! tile with the separable matrices of [`coefficients`]. The filter gradient
//! reuses the engine with the output gradient as the "filter": its output
//! tile is the whole filter and the matmul reduces over images and tiles.

pub mod coefficients;
mod kernels;
mod tiles;

use kernels::{
    FilterGradientOutput, FilterTransform, GradientTransform, InputTransform, OutputTransform,
    TileGrid,
};

use self::coefficients::{Coefficients, Minimal};
use super::chain::EventChain;
use super::conv_type::{ConvType, Direction};
use super::dispatch::{IndexWidth, select_index_width, widest_vector};
use super::layout::{FilterStrides, ImageStrides};
use super::workspace::{Scratch, WorkspaceSize, plan_batches};
use super::{
    Algorithm, BatchInfo, Conv2DParams, DataFormat, LaunchOptions, check_buffers, kernel_params,
};
use crate::backend::{
    Backend, BatchStrides, CompletionToken, Kernel, MatmulParams, ReadMem, WriteMem,
};
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::helpers::Index;

/// Output tile `M x N` and filter `R x S` of one Winograd instantiation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WinogradConfig {
    /// Output tile rows
    pub m: usize,
    /// Output tile columns
    pub n: usize,
    /// Filter rows
    pub r: usize,
    /// Filter columns
    pub s: usize,
}

impl WinogradConfig {
    const fn new(m: usize, n: usize, r: usize, s: usize) -> Self {
        Self { m, n, r, s }
    }

    /// Transform points, `(M + R - 1) * (N + S - 1)`
    pub fn points(&self) -> usize {
        (self.m + self.r - 1) * (self.n + self.s - 1)
    }
}

/// The instantiation used for direction `C` on the user's window, if any.
///
/// `large` selects the 4x4 output tiles (3x3 filter tiles for the filter
/// gradient), which exist for 3x3 windows only.
pub fn select_config<C: ConvType>(params: &Conv2DParams, large: bool) -> Option<WinogradConfig> {
    let window = (params.window_rows, params.window_cols);
    let gradient = C::DIRECTION == Direction::FilterGradient;
    let config = match (window, large, gradient) {
        ((3, 3), false, false) => WinogradConfig::new(2, 2, 3, 3),
        ((3, 1), false, false) => WinogradConfig::new(2, 1, 3, 1),
        ((1, 3), false, false) => WinogradConfig::new(1, 2, 1, 3),
        ((3, 3), true, false) => WinogradConfig::new(4, 4, 3, 3),
        ((3, 3), false, true) => WinogradConfig::new(3, 3, 2, 2),
        ((3, 1), false, true) => WinogradConfig::new(3, 1, 2, 1),
        ((1, 3), false, true) => WinogradConfig::new(1, 3, 1, 2),
        ((3, 3), true, true) => WinogradConfig::new(3, 3, 3, 3),
        _ => return None,
    };
    Some(config)
}

/// The parameters the Winograd kernels of direction `C` compute.
pub fn get_params<C: ConvType>(params: &Conv2DParams) -> Conv2DParams {
    kernel_params::<C>(params)
}

/// Tile grid of one image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileInfo {
    /// Tiles down the image
    pub rows: usize,
    /// Tiles across the image
    pub cols: usize,
    /// `rows * cols`
    pub number: usize,
}

/// Tiles per image for direction `C` under `config`.
///
/// Forward and InputGradient tile their result in `M x N` blocks. The
/// filter gradient tiles the output gradient in `R x S` chunks.
pub fn get_tile_info<C: ConvType>(params: &Conv2DParams, config: &WinogradConfig) -> TileInfo {
    let kp = get_params::<C>(params);
    let (rows, cols) = match C::DIRECTION {
        Direction::FilterGradient => (
            kp.window_rows.div_ceil(config.r),
            kp.window_cols.div_ceil(config.s),
        ),
        _ => (
            kp.out_rows.div_ceil(config.m),
            kp.out_cols.div_ceil(config.n),
        ),
    };
    TileInfo {
        rows,
        cols,
        number: rows * cols,
    }
}

/// Workspace split: `(fixed, per image)` in elements
fn workspace_parts(
    params: &Conv2DParams,
    config: &WinogradConfig,
    tiles: &TileInfo,
) -> (usize, usize) {
    let points = config.points();
    let fixed = points * params.channels * params.features;
    let per_image = points * tiles.number * (params.channels + params.features);
    (fixed, per_image)
}

/// Workspace needed by a Winograd launch of direction `C`; zero when no
/// instantiation applies.
pub fn workspace_size<C: ConvType>(params: &Conv2DParams, large: bool) -> WorkspaceSize {
    let Some(config) = select_config::<C>(params, large) else {
        return WorkspaceSize::default();
    };
    let tiles = get_tile_info::<C>(params, &config);
    let (fixed, per_image) = workspace_parts(params, &config, &tiles);
    WorkspaceSize::new(fixed, per_image, params.batch)
}

/// Launch a Winograd convolution of direction `C` with 2x2, 2x1 or 1x2
/// output tiles.
///
/// The workspace behaves as for [`launch_im2col`](super::launch_im2col).
#[allow(clippy::too_many_arguments)]
pub fn launch_winograd<T: Element, C: ConvType, B: Backend>(
    input: &[T],
    filter: &[T],
    output: &mut [T],
    workspace: &mut [T],
    params: &Conv2DParams,
    backend: &B,
    options: &LaunchOptions,
    depends_on: &[B::Event],
) -> Result<B::Event> {
    launch::<T, C, B>(
        input, filter, output, workspace, params, backend, options, depends_on, false,
    )
}

/// Launch a Winograd convolution of direction `C` with 4x4 output tiles.
#[allow(clippy::too_many_arguments)]
pub fn launch_winograd_large<T: Element, C: ConvType, B: Backend>(
    input: &[T],
    filter: &[T],
    output: &mut [T],
    workspace: &mut [T],
    params: &Conv2DParams,
    backend: &B,
    options: &LaunchOptions,
    depends_on: &[B::Event],
) -> Result<B::Event> {
    launch::<T, C, B>(
        input, filter, output, workspace, params, backend, options, depends_on, true,
    )
}

#[allow(clippy::too_many_arguments)]
fn launch<T: Element, C: ConvType, B: Backend>(
    input: &[T],
    filter: &[T],
    output: &mut [T],
    workspace: &mut [T],
    params: &Conv2DParams,
    backend: &B,
    options: &LaunchOptions,
    depends_on: &[B::Event],
    large: bool,
) -> Result<B::Event> {
    let algorithm = if large {
        Algorithm::WinogradLarge
    } else {
        Algorithm::Winograd
    };
    if params.stride_rows != 1 || params.stride_cols != 1 {
        return Err(Error::invalid_algorithm(algorithm, "the stride is not 1"));
    }
    if !params.is_nhwc_hwcf() || params.groups != 1 {
        return Err(Error::invalid_algorithm(
            algorithm,
            "only ungrouped NHWC/HWCF convolutions are supported",
        ));
    }
    let config = select_config::<C>(params, large).ok_or_else(|| {
        Error::invalid_algorithm(
            algorithm,
            format!(
                "no instantiation for a {}x{} window",
                params.window_rows, params.window_cols
            ),
        )
    })?;

    let sizes = check_buffers::<T, C>(input, filter, output, params)?;
    let tiles = get_tile_info::<C>(params, &config);
    let (fixed, per_image) = workspace_parts(params, &config, &tiles);
    let ws_size = WorkspaceSize::new(fixed, per_image, params.batch);
    let width = select_index_width(
        [
            sizes.input_size,
            sizes.filter_size,
            sizes.output_size,
            ws_size.recommended_size,
        ]
        .into_iter()
        .max()
        .unwrap_or(0),
        options.allow_int64,
    )?;

    let mut scratch = Scratch::acquire(workspace, ws_size)?;
    let workspace = scratch.as_mut_slice();
    let batches = plan_batches(workspace.len(), fixed, per_image, params.batch)?;

    let points = config.points();
    let vectorise = options.vectorise && points <= options.winograd_vector_limit;
    if options.vectorise && !vectorise {
        log::trace!(
            "winograd: {} transform points exceed the vector limit {}",
            points,
            options.winograd_vector_limit
        );
    }
    log::debug!(
        "winograd {:?}: {:?}, {} tiles per image, {:?} indices",
        C::DIRECTION,
        config,
        tiles.number,
        width
    );

    let launch = WinogradLaunch {
        backend,
        queue: backend.get_queue(),
        input: backend.get_device_buffer(input),
        filter: backend.get_device_buffer(filter),
        output: backend.get_device_buffer_mut(output),
        workspace: backend.get_device_buffer_mut(workspace),
        params: *params,
        kp: get_params::<C>(params),
        tiles,
        batches,
        fixed,
        vectorise,
        direction: C::DIRECTION,
    };
    let event = match width {
        IndexWidth::I32 => launch.with_config::<i32>(&config, depends_on),
        IndexWidth::I64 => launch.with_config::<i64>(&config, depends_on),
    }?;
    if scratch.is_owned() {
        event.wait();
    }
    Ok(event)
}

/// Enqueue the instantiation of `$kernel` for the vector width `$width`
macro_rules! enqueue_vectorised {
    (
        $launch:expr, $chain:expr, $width:expr,
        $kernel:ident::<$($g:tt),*> { $($field:ident: $value:expr),* $(,)? }
    ) => {
        match $width {
            4 => {
                let kernel = $kernel::<$($g,)* 4> { $($field: $value),* };
                $launch.enqueue($chain, kernel.range(), &kernel)
            }
            2 => {
                let kernel = $kernel::<$($g,)* 2> { $($field: $value),* };
                $launch.enqueue($chain, kernel.range(), &kernel)
            }
            _ => {
                let kernel = $kernel::<$($g,)* 1> { $($field: $value),* };
                $launch.enqueue($chain, kernel.range(), &kernel)
            }
        }
    };
}

struct WinogradLaunch<'a, T, Be: Backend> {
    backend: &'a Be,
    queue: Be::Queue,
    input: ReadMem<T>,
    filter: ReadMem<T>,
    output: WriteMem<T>,
    workspace: WriteMem<T>,
    params: Conv2DParams,
    kp: Conv2DParams,
    tiles: TileInfo,
    batches: BatchInfo,
    fixed: usize,
    vectorise: bool,
    direction: Direction,
}

impl<T: Element, Be: Backend> WinogradLaunch<'_, T, Be> {
    fn with_config<I: Index>(
        &self,
        config: &WinogradConfig,
        depends_on: &[Be::Event],
    ) -> Result<Be::Event> {
        match (config.m, config.n, config.r, config.s) {
            (2, 2, 3, 3) => self.pipeline::<I, 2, 2, 3, 3, 4, 4>(depends_on),
            (2, 1, 3, 1) => self.pipeline::<I, 2, 1, 3, 1, 4, 1>(depends_on),
            (1, 2, 1, 3) => self.pipeline::<I, 1, 2, 1, 3, 1, 4>(depends_on),
            (4, 4, 3, 3) => self.pipeline::<I, 4, 4, 3, 3, 6, 6>(depends_on),
            (3, 3, 2, 2) => self.pipeline::<I, 3, 3, 2, 2, 4, 4>(depends_on),
            (3, 1, 2, 1) => self.pipeline::<I, 3, 1, 2, 1, 4, 1>(depends_on),
            (1, 3, 1, 2) => self.pipeline::<I, 1, 3, 1, 2, 1, 4>(depends_on),
            (3, 3, 3, 3) => self.pipeline::<I, 3, 3, 3, 3, 5, 5>(depends_on),
            _ => Err(Error::invalid_algorithm(
                Algorithm::Winograd,
                format!("{config:?} is not compiled"),
            )),
        }
    }

    fn vector_width(&self, len: usize) -> usize {
        if self.vectorise { widest_vector(len) } else { 1 }
    }

    fn enqueue<K: Kernel>(
        &self,
        chain: &mut EventChain<Be>,
        range: usize,
        kernel: &K,
    ) -> Result<()> {
        let event = self
            .backend
            .enqueue(&self.queue, range, kernel, chain.deps())?;
        chain.then(event);
        Ok(())
    }

    fn grid<I: Index>(&self) -> TileGrid<I> {
        TileGrid {
            rows: I::from_usize(self.tiles.rows),
            cols: I::from_usize(self.tiles.cols),
        }
    }

    fn image_strides<I: Index>(rows: usize, cols: usize, channels: usize) -> ImageStrides<I> {
        ImageStrides::new(DataFormat::Nhwc, rows, cols, channels).cast()
    }

    fn filter_strides<I: Index>(&self) -> FilterStrides<I> {
        let p = &self.params;
        FilterStrides::new(p.filter_format, p.window_rows, p.window_cols, p.channels, p.features)
            .cast()
    }

    fn pipeline<
        I: Index,
        const M: usize,
        const N: usize,
        const R: usize,
        const S: usize,
        const A: usize,
        const B: usize,
    >(
        &self,
        depends_on: &[Be::Event],
    ) -> Result<Be::Event>
    where
        Minimal: Coefficients<M, R, A> + Coefficients<N, S, B>,
    {
        let mut chain = EventChain::<Be>::new(depends_on);
        match self.direction {
            Direction::FilterGradient => {
                self.filter_gradient::<I, M, N, R, S, A, B>(&mut chain)?
            }
            _ => self.forward::<I, M, N, R, S, A, B>(&mut chain)?,
        }
        chain.finish()
    }

    /// Forward and input gradient: both run a forward pass on the kernel
    /// parameters, the input gradient with the mirrored filter.
    fn forward<
        I: Index,
        const M: usize,
        const N: usize,
        const R: usize,
        const S: usize,
        const A: usize,
        const B: usize,
    >(
        &self,
        chain: &mut EventChain<Be>,
    ) -> Result<()>
    where
        Minimal: Coefficients<M, R, A> + Coefficients<N, S, B>,
    {
        let p = &self.params;
        let kp = &self.kp;
        let points = A * B;
        let tiles = self.tiles.number;
        let mirrored = self.direction == Direction::InputGradient;

        let transformed_filter = self.workspace;
        enqueue_vectorised!(self, chain, self.vector_width(p.features),
            FilterTransform::<T, I, M, N, R, S, A, B> {
                filter: self.filter,
                out: transformed_filter,
                strides: self.filter_strides(),
                channels: I::from_usize(p.channels),
                features: I::from_usize(p.features),
                mirror: mirrored,
            })?;

        let in_image = kp.in_rows * kp.in_cols * kp.channels;
        let out_image = kp.out_rows * kp.out_cols * kp.features;
        for (first, images) in self.batches.minibatches() {
            let rows = images * tiles;
            let transformed_input = self.workspace.offset(self.fixed);
            let intermediate = transformed_input.offset(points * rows * kp.channels);

            enqueue_vectorised!(self, chain, self.vector_width(kp.channels),
                InputTransform::<T, I, M, N, R, S, A, B> {
                    input: self.input.offset(first * in_image),
                    out: transformed_input,
                    strides: Self::image_strides(kp.in_rows, kp.in_cols, kp.channels),
                    rows: I::from_usize(kp.in_rows),
                    cols: I::from_usize(kp.in_cols),
                    channels: I::from_usize(kp.channels),
                    pad_rows: I::from_isize(kp.pad_rows),
                    pad_cols: I::from_isize(kp.pad_cols),
                    step_rows: I::from_usize(M),
                    step_cols: I::from_usize(N),
                    grid: self.grid(),
                    images: I::from_usize(images),
                })?;

            // the transformed filter is [C][F] of the user filter; the input
            // gradient reads it as [F][C]
            let event = self.backend.batch_matmul(
                &self.queue,
                transformed_input.as_read(),
                transformed_filter.as_read(),
                intermediate,
                MatmulParams::new(rows, kp.channels, kp.features).transpose_rhs(mirrored),
                BatchStrides {
                    batch: points,
                    lhs: rows * kp.channels,
                    rhs: kp.channels * kp.features,
                    out: rows * kp.features,
                },
                chain.deps(),
            )?;
            chain.then(event);

            enqueue_vectorised!(self, chain, self.vector_width(kp.features),
                OutputTransform::<T, I, M, N, R, S, A, B> {
                    intermediate: intermediate.as_read(),
                    output: self.output.offset(first * out_image),
                    strides: Self::image_strides(kp.out_rows, kp.out_cols, kp.features),
                    rows: I::from_usize(kp.out_rows),
                    cols: I::from_usize(kp.out_cols),
                    features: I::from_usize(kp.features),
                    grid: self.grid(),
                    images: I::from_usize(images),
                })?;
        }
        Ok(())
    }

    /// Filter gradient: image patches and output-gradient chunks meet in a
    /// matmul that reduces over every tile of the minibatch. The first
    /// minibatch overwrites the result, later ones add to it.
    fn filter_gradient<
        I: Index,
        const M: usize,
        const N: usize,
        const R: usize,
        const S: usize,
        const A: usize,
        const B: usize,
    >(
        &self,
        chain: &mut EventChain<Be>,
    ) -> Result<()>
    where
        Minimal: Coefficients<M, R, A> + Coefficients<N, S, B>,
    {
        let kp = &self.kp;
        let points = A * B;
        let tiles = self.tiles.number;
        let intermediate = self.workspace;

        let in_image = kp.in_rows * kp.in_cols * kp.channels;
        let grad_image = kp.window_rows * kp.window_cols * kp.features;
        for (index, (first, images)) in self.batches.minibatches().enumerate() {
            let rows = images * tiles;
            let transformed_input = self.workspace.offset(self.fixed);
            let transformed_grad = transformed_input.offset(points * rows * kp.channels);

            enqueue_vectorised!(self, chain, self.vector_width(kp.channels),
                InputTransform::<T, I, M, N, R, S, A, B> {
                    input: self.input.offset(first * in_image),
                    out: transformed_input,
                    strides: Self::image_strides(kp.in_rows, kp.in_cols, kp.channels),
                    rows: I::from_usize(kp.in_rows),
                    cols: I::from_usize(kp.in_cols),
                    channels: I::from_usize(kp.channels),
                    pad_rows: I::from_isize(kp.pad_rows),
                    pad_cols: I::from_isize(kp.pad_cols),
                    step_rows: I::from_usize(R),
                    step_cols: I::from_usize(S),
                    grid: self.grid(),
                    images: I::from_usize(images),
                })?;

            enqueue_vectorised!(self, chain, self.vector_width(kp.features),
                GradientTransform::<T, I, M, N, R, S, A, B> {
                    grad: self.filter.offset(first * grad_image),
                    out: transformed_grad,
                    strides: Self::image_strides(kp.window_rows, kp.window_cols, kp.features),
                    rows: I::from_usize(kp.window_rows),
                    cols: I::from_usize(kp.window_cols),
                    features: I::from_usize(kp.features),
                    grid: self.grid(),
                    images: I::from_usize(images),
                })?;

            let event = self.backend.batch_matmul(
                &self.queue,
                transformed_input.as_read(),
                transformed_grad.as_read(),
                intermediate,
                MatmulParams::new(kp.channels, rows, kp.features).transpose_lhs(true),
                BatchStrides {
                    batch: points,
                    lhs: rows * kp.channels,
                    rhs: rows * kp.features,
                    out: kp.channels * kp.features,
                },
                chain.deps(),
            )?;
            chain.then(event);

            enqueue_vectorised!(self, chain, self.vector_width(kp.features),
                FilterGradientOutput::<T, I, M, N, R, S, A, B> {
                    intermediate: intermediate.as_read(),
                    output: self.output,
                    strides: self.filter_strides(),
                    channels: I::from_usize(kp.channels),
                    features: I::from_usize(kp.features),
                    accumulate: index > 0,
                })?;
        }
        Ok(())
    }
}
