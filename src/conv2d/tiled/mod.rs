//! Tiled (register-blocked) convolution
//!
//! Every supported shape is a compile-time entry of a catalogue of
//! `(window, stride, tile_rows, tile_cols, channel_vector, feature_vector)`
//! configurations. A launch picks the first entry matching the window, the
//! stride and the channel divisibility, and fails with `InvalidAlgorithm`
//! when none does. The filter gradient has no tiled kernels.

mod kernels;

use kernels::{TiledBuffers, TiledForward, TiledInputGradient};

use super::conv_type::{ConvType, Direction};
use super::dispatch::{IndexWidth, select_index_width};
use super::layout::{FilterStrides, Geometry, ImageStrides};
use super::{Algorithm, Conv2DParams, DataFormat, LaunchOptions, check_buffers};
use crate::backend::{Backend, ReadMem, WriteMem};
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::helpers::{FastDiv, Index, IndexDivisor, PlainDiv};

/// One compiled tile shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileConfig {
    /// Square window size
    pub window: usize,
    /// Stride in both dimensions
    pub stride: usize,
    /// Result rows per work item
    pub tile_rows: usize,
    /// Result columns per work item
    pub tile_cols: usize,
    /// Channels handled together
    pub channel_vector: usize,
    /// Features handled together
    pub feature_vector: usize,
}

impl TileConfig {
    const fn new(
        window: usize,
        stride: usize,
        tile_rows: usize,
        tile_cols: usize,
        channel_vector: usize,
        feature_vector: usize,
    ) -> Self {
        Self {
            window,
            stride,
            tile_rows,
            tile_cols,
            channel_vector,
            feature_vector,
        }
    }

    fn matches(&self, params: &Conv2DParams) -> bool {
        params.window_rows == self.window
            && params.window_cols == self.window
            && params.stride_rows == self.stride
            && params.stride_cols == self.stride
            && params.channels % self.channel_vector == 0
            && params.features % self.feature_vector == 0
    }
}

/// Work decomposition of a tiled launch, per image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileInfo {
    /// Tiles down the result
    pub rows: usize,
    /// Tiles across the result
    pub cols: usize,
    /// Channel (or feature) vectors of the result
    pub output_vectors: usize,
}

/// Tiles covering the result of direction `C` with `config`.
pub fn get_tile_info<C: ConvType>(params: &Conv2DParams, config: &TileConfig) -> TileInfo {
    match C::DIRECTION {
        Direction::InputGradient => TileInfo {
            rows: params.in_rows.div_ceil(config.tile_rows),
            cols: params.in_cols.div_ceil(config.tile_cols),
            output_vectors: params.channels / config.channel_vector,
        },
        _ => TileInfo {
            rows: params.out_rows.div_ceil(config.tile_rows),
            cols: params.out_cols.div_ceil(config.tile_cols),
            output_vectors: params.features / config.feature_vector,
        },
    }
}

/// Declares the configurations compiled for one direction and the launcher
/// that maps a runtime [`TileConfig`] onto its instantiation.
macro_rules! tiled_configs {
    (
        $dir:ident,
        $kernel:ident: [
            $(($w:literal, $s:literal, $tr:literal, $tc:literal, $cv:literal, $fv:literal)),* $(,)?
        ]
    ) => {
        paste::paste! {
            /// Configurations compiled for this direction, in match order
            pub const [<$dir:upper _CONFIGS>]: &[TileConfig] = &[
                $(TileConfig::new($w, $s, $tr, $tc, $cv, $fv)),*
            ];

            impl<T: Element, B: Backend> TiledLaunch<'_, T, B> {
                fn [<$dir _config>]<I: Index, D: IndexDivisor<I>>(&self) -> Result<B::Event> {
                    $(
                        if self.config == TileConfig::new($w, $s, $tr, $tc, $cv, $fv) {
                            let kernel = $kernel::<T, I, D, $w, $s, $tr, $tc, $cv, $fv> {
                                buffers: self.buffers(),
                                extents: self.extents(),
                                divisors: self.extents().map(D::new),
                            };
                            return self.backend.enqueue(
                                &self.queue,
                                self.range,
                                &kernel,
                                self.depends_on,
                            );
                        }
                    )*
                    Err(Error::invalid_algorithm(
                        Algorithm::Tiled,
                        format!("{:?} is not compiled", self.config),
                    ))
                }
            }
        }
    };
}

tiled_configs!(forward, TiledForward: [
    (1, 2, 1, 2, 1, 4),
    (1, 2, 1, 2, 1, 1),
    (3, 2, 2, 2, 1, 4),
    (3, 2, 2, 2, 1, 1),
    (3, 1, 2, 2, 1, 4),
    (3, 1, 3, 4, 1, 1),
    (5, 1, 2, 2, 1, 2),
    (5, 1, 2, 4, 1, 1),
    (1, 1, 2, 2, 1, 4),
    (1, 1, 2, 2, 1, 1),
    (1, 2, 2, 2, 1, 1),
]);

tiled_configs!(input_gradient, TiledInputGradient: [
    (1, 2, 2, 2, 1, 4),
    (1, 2, 2, 2, 1, 1),
    (3, 2, 2, 4, 1, 2),
    (3, 1, 3, 4, 1, 4),
    (3, 1, 2, 2, 1, 4),
    (3, 1, 3, 4, 1, 1),
    (3, 2, 2, 2, 1, 1),
    (5, 1, 2, 2, 1, 2),
    (5, 1, 2, 4, 1, 1),
    (1, 1, 2, 2, 1, 4),
    (1, 1, 2, 2, 1, 1),
    (1, 2, 2, 2, 1, 1),
]);

/// First compiled configuration of direction `C` matching `params`.
pub fn find_config<C: ConvType>(params: &Conv2DParams) -> Option<TileConfig> {
    let configs = match C::DIRECTION {
        Direction::Forward => FORWARD_CONFIGS,
        Direction::InputGradient => INPUT_GRADIENT_CONFIGS,
        Direction::FilterGradient => return None,
    };
    configs.iter().copied().find(|config| config.matches(params))
}

/// Launch a tiled convolution of direction `C`.
///
/// Only Forward and InputGradient have tiled kernels; both need NHWC images,
/// HWCF filters and a single group.
pub fn launch_tiled<T: Element, C: ConvType, B: Backend>(
    input: &[T],
    filter: &[T],
    output: &mut [T],
    params: &Conv2DParams,
    backend: &B,
    options: &LaunchOptions,
    depends_on: &[B::Event],
) -> Result<B::Event> {
    if C::DIRECTION == Direction::FilterGradient {
        return Err(Error::invalid_algorithm(
            Algorithm::Tiled,
            "the filter gradient has no tiled kernels",
        ));
    }
    if !params.is_nhwc_hwcf() || params.groups != 1 {
        return Err(Error::invalid_algorithm(
            Algorithm::Tiled,
            "only ungrouped NHWC/HWCF convolutions are supported",
        ));
    }
    let sizes = check_buffers::<T, C>(input, filter, output, params)?;
    let config = find_config::<C>(params).ok_or_else(|| {
        Error::invalid_algorithm(
            Algorithm::Tiled,
            format!(
                "no configuration for a {}x{} window at stride {}x{}",
                params.window_rows, params.window_cols, params.stride_rows, params.stride_cols
            ),
        )
    })?;

    let tiles = get_tile_info::<C>(params, &config);
    let range = params.batch * tiles.rows * tiles.cols * tiles.output_vectors;
    let width = select_index_width(
        [sizes.input_size, sizes.filter_size, sizes.output_size, range]
            .into_iter()
            .max()
            .unwrap_or(0),
        options.allow_int64,
    )?;
    let fast_div = options.use_fast_div
        && tiles.rows != 1
        && tiles.cols != 1
        && tiles.output_vectors != 1;
    log::debug!(
        "tiled {:?}: {:?}, {:?} indices, fast div {}",
        C::DIRECTION,
        config,
        width,
        fast_div
    );

    let launch = TiledLaunch {
        backend,
        queue: backend.get_queue(),
        depends_on,
        input: backend.get_device_buffer(input),
        filter: backend.get_device_buffer(filter),
        output: backend.get_device_buffer_mut(output),
        params: *params,
        config,
        tiles,
        range,
        direction: C::DIRECTION,
    };
    match (width, fast_div) {
        (IndexWidth::I32, true) => launch.with_direction::<i32, FastDiv<i32>>(),
        (IndexWidth::I32, false) => launch.with_direction::<i32, PlainDiv<i32>>(),
        (IndexWidth::I64, true) => launch.with_direction::<i64, FastDiv<i64>>(),
        (IndexWidth::I64, false) => launch.with_direction::<i64, PlainDiv<i64>>(),
    }
}

struct TiledLaunch<'a, T, B: Backend> {
    backend: &'a B,
    queue: B::Queue,
    depends_on: &'a [B::Event],
    input: ReadMem<T>,
    filter: ReadMem<T>,
    output: WriteMem<T>,
    params: Conv2DParams,
    config: TileConfig,
    tiles: TileInfo,
    range: usize,
    direction: Direction,
}

impl<T: Element, B: Backend> TiledLaunch<'_, T, B> {
    fn with_direction<I: Index, D: IndexDivisor<I>>(&self) -> Result<B::Event> {
        match self.direction {
            Direction::Forward => self.forward_config::<I, D>(),
            _ => self.input_gradient_config::<I, D>(),
        }
    }

    fn extents<I: Index>(&self) -> [I; 3] {
        [self.tiles.rows, self.tiles.cols, self.tiles.output_vectors].map(I::from_usize)
    }

    fn buffers<I: Index>(&self) -> TiledBuffers<T, I> {
        let p = &self.params;
        let filter_strides = FilterStrides::new(
            p.filter_format,
            p.window_rows,
            p.window_cols,
            p.channels,
            p.features,
        );
        let image = |rows, cols, channels| {
            ImageStrides::new(DataFormat::Nhwc, rows, cols, channels).cast::<I>()
        };
        let (in_strides, out_strides) = match self.direction {
            Direction::InputGradient => (
                image(p.out_rows, p.out_cols, p.features),
                image(p.in_rows, p.in_cols, p.channels),
            ),
            _ => (
                image(p.in_rows, p.in_cols, p.channels),
                image(p.out_rows, p.out_cols, p.features),
            ),
        };
        TiledBuffers {
            input: self.input,
            filter: self.filter,
            output: self.output,
            geometry: Geometry::new(p),
            in_strides,
            filter_strides: filter_strides.cast(),
            out_strides,
        }
    }
}
