//! Im2col: unroll convolution windows into a matrix and multiply
//!
//! Each minibatch zeroes a tile buffer, copies every window into one tile
//! row, then hands the product with the (possibly rearranged) filter to the
//! backend's matmul. Grouped forward convolutions multiply group by group
//! and scatter the result into the output's feature order.

mod kernels;

use kernels::{
    ExtractFilterGradient, ExtractForward, ExtractInputGradient, MirrorFilter, RegroupFilter,
    ScatterGroups, ZeroFill,
};

use super::chain::EventChain;
use super::conv_type::{ConvType, Direction};
use super::dispatch::{IndexWidth, select_index_width, widest_vector};
use super::layout::{FilterStrides, Geometry, GroupMap, ImageStrides};
use super::workspace::{Scratch, WorkspaceSize, plan_batches};
use super::{Algorithm, BatchInfo, Conv2DParams, DataFormat, FilterFormat, LaunchOptions};
use super::check_buffers;
use crate::backend::{
    Backend, BatchStrides, CompletionToken, Kernel, MatmulParams, ReadMem, WriteMem,
};
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::helpers::Index;

/// Shape of the unrolled windows of one image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileInfo {
    /// Number of tile rows
    pub number: usize,
    /// Length of each tile row
    pub size: usize,
}

/// Tile shape per image (and per group) for direction `C`.
pub fn get_tile_info<C: ConvType>(params: &Conv2DParams) -> TileInfo {
    let window = params.window_size();
    match C::DIRECTION {
        Direction::Forward => TileInfo {
            number: params.out_rows * params.out_cols,
            size: window * params.channels_per_group(),
        },
        Direction::InputGradient => TileInfo {
            number: params.in_rows * params.in_cols,
            size: window * params.features,
        },
        Direction::FilterGradient => TileInfo {
            number: window * params.channels,
            size: params.out_rows * params.out_cols,
        },
    }
}

/// Workspace split: `(fixed, per image)` in elements
fn workspace_parts<C: ConvType>(params: &Conv2DParams) -> (usize, usize) {
    let tile = get_tile_info::<C>(params);
    let tiles = tile.number * tile.size * params.groups;
    let grouped = params.groups > 1 && C::DIRECTION == Direction::Forward;
    let output_per_image = if grouped {
        params.out_rows * params.out_cols * params.features
    } else {
        0
    };
    let filter_transform = match C::DIRECTION {
        Direction::InputGradient => params.window_size() * params.channels * params.features,
        Direction::Forward if grouped => {
            params.window_size() * params.channels_per_group() * params.features
        }
        _ => 0,
    };
    (filter_transform, tiles + output_per_image)
}

/// Workspace needed by an im2col launch of direction `C`.
pub fn workspace_size<C: ConvType>(params: &Conv2DParams) -> WorkspaceSize {
    let (fixed, per_image) = workspace_parts::<C>(params);
    WorkspaceSize::new(fixed, per_image, params.batch)
}

/// Launch an im2col convolution of direction `C`.
///
/// An empty `workspace` makes the launcher allocate the recommended size and
/// wait for the launch before returning. A workspace smaller than one image
/// needs fails with `InsufficientWorkspace`; anything in between is used in
/// minibatches.
#[allow(clippy::too_many_arguments)]
pub fn launch_im2col<T: Element, C: ConvType, B: Backend>(
    input: &[T],
    filter: &[T],
    output: &mut [T],
    workspace: &mut [T],
    params: &Conv2DParams,
    backend: &B,
    options: &LaunchOptions,
    depends_on: &[B::Event],
) -> Result<B::Event> {
    if params.input_format != DataFormat::Nhwc || params.filter_format == FilterFormat::Fchw {
        return Err(Error::invalid_algorithm(
            Algorithm::Im2col,
            "only NHWC images with HWCF or FHWC filters are supported",
        ));
    }
    if params.groups > 1 && C::DIRECTION != Direction::Forward {
        return Err(Error::invalid_algorithm(
            Algorithm::Im2col,
            format!("grouped {:?} is not supported", C::DIRECTION),
        ));
    }
    let sizes = check_buffers::<T, C>(input, filter, output, params)?;
    let ws_size = workspace_size::<C>(params);
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
    let (fixed, per_image) = workspace_parts::<C>(params);
    let batches = plan_batches(workspace.len(), fixed, per_image, params.batch)?;

    let vector_width = if !options.vectorise {
        1
    } else {
        match C::DIRECTION {
            Direction::Forward => widest_vector(params.channels_per_group()),
            Direction::InputGradient => widest_vector(params.features),
            Direction::FilterGradient => 1,
        }
    };
    log::debug!(
        "im2col {:?}: {:?} indices, vector width {}, {} groups",
        C::DIRECTION,
        width,
        vector_width,
        params.groups
    );

    let launch = Im2colLaunch {
        backend,
        queue: backend.get_queue(),
        input: backend.get_device_buffer(input),
        filter: backend.get_device_buffer(filter),
        output: backend.get_device_buffer_mut(output),
        workspace: backend.get_device_buffer_mut(workspace),
        params: *params,
        batches,
        fixed,
        vector_width,
    };
    let event = match width {
        IndexWidth::I32 => launch.run::<i32, C>(depends_on),
        IndexWidth::I64 => launch.run::<i64, C>(depends_on),
    }?;
    if scratch.is_owned() {
        event.wait();
    }
    Ok(event)
}

struct Im2colLaunch<'a, T, B: Backend> {
    backend: &'a B,
    queue: B::Queue,
    input: ReadMem<T>,
    filter: ReadMem<T>,
    output: WriteMem<T>,
    workspace: WriteMem<T>,
    params: Conv2DParams,
    batches: BatchInfo,
    fixed: usize,
    vector_width: usize,
}

impl<T: Element, B: Backend> Im2colLaunch<'_, T, B> {
    fn run<I: Index, C: ConvType>(&self, depends_on: &[B::Event]) -> Result<B::Event> {
        let mut chain = EventChain::<B>::new(depends_on);
        match C::DIRECTION {
            Direction::Forward if self.params.groups > 1 => self.grouped_forward::<I>(&mut chain)?,
            Direction::Forward => self.forward::<I>(&mut chain)?,
            Direction::InputGradient => self.input_gradient::<I>(&mut chain)?,
            Direction::FilterGradient => self.filter_gradient::<I>(&mut chain)?,
        }
        chain.finish()
    }

    fn enqueue<K: Kernel>(
        &self,
        chain: &mut EventChain<B>,
        range: usize,
        kernel: &K,
    ) -> Result<()> {
        let event = self
            .backend
            .enqueue(&self.queue, range, kernel, chain.deps())?;
        chain.then(event);
        Ok(())
    }

    fn zero(&self, chain: &mut EventChain<B>, tiles: WriteMem<T>, len: usize) -> Result<()> {
        self.enqueue(chain, len, &ZeroFill { out: tiles })
    }

    fn filter_strides<I: Index>(&self) -> FilterStrides<I> {
        let p = &self.params;
        FilterStrides::new(
            p.filter_format,
            p.window_rows,
            p.window_cols,
            p.channels_per_group(),
            p.features,
        )
        .cast()
    }

    fn input_strides<I: Index>(&self) -> ImageStrides<I> {
        let p = &self.params;
        ImageStrides::new(DataFormat::Nhwc, p.in_rows, p.in_cols, p.channels).cast()
    }

    fn forward<I: Index>(&self, chain: &mut EventChain<B>) -> Result<()> {
        let p = &self.params;
        let positions = p.out_rows * p.out_cols;
        let k = p.window_size() * p.channels;
        let geometry = Geometry::<I>::new(p);
        let groups = GroupMap::<I>::new(p);
        let in_strides = self.input_strides::<I>();
        let transpose_filter = p.filter_format == FilterFormat::Fhwc;

        for (first, images) in self.batches.minibatches() {
            let tiles = self.workspace.offset(self.fixed);
            self.zero(chain, tiles, images * positions * k)?;

            let input = self.input.offset(first * p.in_rows * p.in_cols * p.channels);
            match self.vector_width {
                4 => self.extract_forward::<I, 4>(
                    chain, input, tiles, geometry, groups, in_strides, images,
                )?,
                2 => self.extract_forward::<I, 2>(
                    chain, input, tiles, geometry, groups, in_strides, images,
                )?,
                _ => self.extract_forward::<I, 1>(
                    chain, input, tiles, geometry, groups, in_strides, images,
                )?,
            }

            let event = self.backend.matmul(
                &self.queue,
                tiles.as_read(),
                self.filter,
                self.output.offset(first * positions * p.features),
                MatmulParams::new(images * positions, k, p.features)
                    .transpose_rhs(transpose_filter),
                chain.deps(),
            )?;
            chain.then(event);
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn extract_forward<I: Index, const VW: usize>(
        &self,
        chain: &mut EventChain<B>,
        input: ReadMem<T>,
        tiles: WriteMem<T>,
        geometry: Geometry<I>,
        groups: GroupMap<I>,
        in_strides: ImageStrides<I>,
        images: usize,
    ) -> Result<()> {
        let kernel = ExtractForward::<T, I, VW> {
            input,
            tiles,
            geometry,
            groups,
            in_strides,
        };
        self.enqueue(chain, kernel.range(images), &kernel)
    }

    fn grouped_forward<I: Index>(&self, chain: &mut EventChain<B>) -> Result<()> {
        let p = &self.params;
        let positions = p.out_rows * p.out_cols;
        let group_count = p.groups;
        let k = p.window_size() * p.channels_per_group();
        let fg = p.features_per_group();
        let geometry = Geometry::<I>::new(p);
        let groups = GroupMap::<I>::new(p);
        let in_strides = self.input_strides::<I>();

        let regrouped = self.workspace;
        let regroup = RegroupFilter {
            filter: self.filter,
            out: regrouped,
            geometry,
            groups,
            filter_strides: self.filter_strides::<I>(),
        };
        self.enqueue(chain, self.fixed, &regroup)?;

        let tile_len = group_count * positions * k;
        let out_len = positions * p.features;
        for (first, images) in self.batches.minibatches() {
            let tiles = self.workspace.offset(self.fixed);
            let grouped_out = tiles.offset(images * tile_len);
            self.zero(chain, tiles, images * tile_len)?;

            let input = self.input.offset(first * p.in_rows * p.in_cols * p.channels);
            match self.vector_width {
                4 => self.extract_forward::<I, 4>(
                    chain, input, tiles, geometry, groups, in_strides, images,
                )?,
                2 => self.extract_forward::<I, 2>(
                    chain, input, tiles, geometry, groups, in_strides, images,
                )?,
                _ => self.extract_forward::<I, 1>(
                    chain, input, tiles, geometry, groups, in_strides, images,
                )?,
            }

            // one batch of per-group products for every image
            let strides = BatchStrides {
                batch: group_count,
                lhs: positions * k,
                rhs: k * fg,
                out: positions * fg,
            };
            let after_extract: Vec<B::Event> = chain.deps().to_vec();
            let mut products = Vec::with_capacity(images);
            for image in 0..images {
                products.push(self.backend.batch_matmul(
                    &self.queue,
                    tiles.offset(image * tile_len).as_read(),
                    regrouped.as_read(),
                    grouped_out.offset(image * out_len),
                    MatmulParams::new(positions, k, fg),
                    strides,
                    &after_extract,
                )?);
            }

            let scatter = ScatterGroups {
                grouped: grouped_out.as_read(),
                output: self.output.offset(first * out_len),
                positions: I::from_usize(positions),
                features: I::from_usize(p.features),
                groups,
            };
            let event =
                self.backend
                    .enqueue(&self.queue, images * out_len, &scatter, &products)?;
            chain.then(event);
        }
        Ok(())
    }

    fn input_gradient<I: Index>(&self, chain: &mut EventChain<B>) -> Result<()> {
        let p = &self.params;
        let positions = p.in_rows * p.in_cols;
        let k = p.window_size() * p.features;
        let geometry = Geometry::<I>::new(p);
        let grad_strides =
            ImageStrides::new(DataFormat::Nhwc, p.out_rows, p.out_cols, p.features).cast::<I>();

        let mirrored = self.workspace;
        let mirror = MirrorFilter {
            filter: self.filter,
            out: mirrored,
            geometry,
            filter_strides: self.filter_strides::<I>(),
        };
        self.enqueue(chain, self.fixed, &mirror)?;

        for (first, images) in self.batches.minibatches() {
            let tiles = self.workspace.offset(self.fixed);
            self.zero(chain, tiles, images * positions * k)?;

            let grad = self.input.offset(first * p.out_rows * p.out_cols * p.features);
            match self.vector_width {
                4 => self.extract_input_gradient::<I, 4>(
                    chain, grad, tiles, geometry, grad_strides, images,
                )?,
                2 => self.extract_input_gradient::<I, 2>(
                    chain, grad, tiles, geometry, grad_strides, images,
                )?,
                _ => self.extract_input_gradient::<I, 1>(
                    chain, grad, tiles, geometry, grad_strides, images,
                )?,
            }

            let event = self.backend.matmul(
                &self.queue,
                tiles.as_read(),
                mirrored.as_read(),
                self.output.offset(first * positions * p.channels),
                MatmulParams::new(images * positions, k, p.channels),
                chain.deps(),
            )?;
            chain.then(event);
        }
        Ok(())
    }

    fn extract_input_gradient<I: Index, const VW: usize>(
        &self,
        chain: &mut EventChain<B>,
        grad: ReadMem<T>,
        tiles: WriteMem<T>,
        geometry: Geometry<I>,
        grad_strides: ImageStrides<I>,
        images: usize,
    ) -> Result<()> {
        let kernel = ExtractInputGradient::<T, I, VW> {
            grad,
            tiles,
            geometry,
            grad_strides,
        };
        self.enqueue(chain, kernel.range(images), &kernel)
    }

    fn filter_gradient<I: Index>(&self, chain: &mut EventChain<B>) -> Result<()> {
        let p = &self.params;
        let positions = p.out_rows * p.out_cols;
        let taps = p.window_size() * p.channels;
        let geometry = Geometry::<I>::new(p);
        let in_strides = self.input_strides::<I>();
        let transposed_output = p.filter_format == FilterFormat::Fhwc;

        for (index, (first, images)) in self.batches.minibatches().enumerate() {
            let tiles = self.workspace.offset(self.fixed);
            let columns = images * positions;
            self.zero(chain, tiles, taps * columns)?;

            let extract = ExtractFilterGradient {
                input: self.input.offset(first * p.in_rows * p.in_cols * p.channels),
                tiles,
                geometry,
                in_strides,
                images: I::from_usize(images),
            };
            self.enqueue(chain, extract.range(), &extract)?;

            let grad = self.filter.offset(first * positions * p.features);
            let accumulate = index > 0;
            let event = if transposed_output {
                // [F, columns] x [columns, taps] gives FHWC directly
                self.backend.matmul(
                    &self.queue,
                    grad,
                    tiles.as_read(),
                    self.output,
                    MatmulParams::new(p.features, columns, taps)
                        .transpose_lhs(true)
                        .transpose_rhs(true)
                        .accumulate(accumulate),
                    chain.deps(),
                )?
            } else {
                self.backend.matmul(
                    &self.queue,
                    tiles.as_read(),
                    grad,
                    self.output,
                    MatmulParams::new(taps, columns, p.features).accumulate(accumulate),
                    chain.deps(),
                )?
            };
            chain.then(event);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conv2d::{FilterGradient, Forward, GroupFormat, InputGradient};

    #[test]
    fn test_tile_info() {
        let p = Conv2DParams::new(2, 7, 6, 4, 3, 2, 5).with_stride(2, 1);
        assert_eq!(
            get_tile_info::<Forward>(&p),
            TileInfo {
                number: p.out_rows * p.out_cols,
                size: 3 * 2 * 4
            }
        );
        assert_eq!(
            get_tile_info::<InputGradient>(&p),
            TileInfo {
                number: 7 * 6,
                size: 3 * 2 * 5
            }
        );
        assert_eq!(
            get_tile_info::<FilterGradient>(&p),
            TileInfo {
                number: 3 * 2 * 4,
                size: p.out_rows * p.out_cols
            }
        );
    }

    #[test]
    fn test_workspace_sizes() {
        let p = Conv2DParams::new(3, 5, 5, 4, 3, 3, 6);
        let fwd = workspace_size::<Forward>(&p);
        assert_eq!(fwd.required_size, 9 * 36);
        assert_eq!(fwd.recommended_size, 3 * 9 * 36);

        let ig = workspace_size::<InputGradient>(&p);
        assert_eq!(ig.required_size, 25 * 54 + 9 * 24);
        assert_eq!(ig.recommended_size, 3 * 25 * 54 + 9 * 24);

        let grouped = p.with_groups(2, GroupFormat::Strided);
        let gs = workspace_size::<Forward>(&grouped);
        let per_image = 9 * 18 * 2 + 9 * 6;
        assert_eq!(gs.required_size, per_image + 9 * 2 * 6);
        assert_eq!(gs.recommended_size, 3 * per_image + 9 * 2 * 6);
    }
}
