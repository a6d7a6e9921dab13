//! 2-D convolution: parameters, algorithms and dispatch
//!
//! A launch runs one of three directions, named by a [`ConvType`] tag:
//!
//! | Direction | `input` | `filter` | `output` |
//! |---|---|---|---|
//! | [`Forward`] | image | filter | result |
//! | [`InputGradient`] | output gradient | filter | input gradient |
//! | [`FilterGradient`] | image | output gradient | filter gradient |
//!
//! Images are NHWC unless the parameters say NCHW; filters are HWCF unless
//! they say otherwise. [`get_sizes`] gives the element count of every buffer.

mod batch_info;
mod chain;
mod conv_type;
pub mod direct;
pub mod dispatch;
pub mod im2col;
mod kernel_params;
mod layout;
pub mod matmul;
mod options;
mod params;
pub mod selector;
mod sizes;
pub mod tiled;
pub mod winograd;
mod workspace;

pub use batch_info::BatchInfo;
pub use conv_type::{ConvType, Direction, FilterGradient, Forward, InputGradient};
pub use direct::launch_direct;
pub use im2col::launch_im2col;
pub use kernel_params::kernel_params;
pub use layout::{FilterStrides, ImageStrides};
pub use matmul::launch_matmul;
pub use options::LaunchOptions;
pub use params::{
    Conv2DParams, DataFormat, FilterFormat, GroupFormat, compute_output_size, validate_params,
};
pub use selector::{
    ConstantSelector, DefaultSelector, MatmulSelector, Selector, TiledSelector,
    WinogradLargeSelector, WinogradSelector,
};
pub use sizes::{ConvSizes, get_sizes};
pub use tiled::launch_tiled;
pub use winograd::{launch_winograd, launch_winograd_large};
pub use workspace::{WorkspaceSize, query_workspace_size, workspace_size};

use crate::backend::Backend;
use crate::dtype::Element;
use crate::error::{Error, Result};

/// Convolution algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// Straightforward loops over the window
    Direct,
    /// Register-blocked direct computation
    Tiled,
    /// Unroll windows into a matrix and multiply
    Im2col,
    /// Winograd minimal filtering with 2x2 (or 2x1, 1x2) output tiles
    Winograd,
    /// Winograd minimal filtering with 4x4 output tiles
    WinogradLarge,
    /// A single matrix product, for 1x1 windows
    Matmul,
    /// No algorithm applies
    NotSupported,
}

/// Validate `params` and check that every buffer holds its tensor.
pub(crate) fn check_buffers<T: Element, C: ConvType>(
    input: &[T],
    filter: &[T],
    output: &[T],
    params: &Conv2DParams,
) -> Result<ConvSizes> {
    validate_params(params)?;
    let sizes = get_sizes::<C>(params);
    let buffers = [
        ("input", input.len(), sizes.input_size),
        ("filter", filter.len(), sizes.filter_size),
        ("output", output.len(), sizes.output_size),
    ];
    for (arg, len, needed) in buffers {
        if len < needed {
            return Err(Error::invalid_parameter(
                arg,
                format!("holds {len} elements, {:?} needs {needed}", C::DIRECTION),
            ));
        }
    }
    Ok(sizes)
}

/// Run the convolution of direction `C` with the algorithm `selector` picks.
///
/// `workspace` is scratch memory for algorithms that need it; pass an empty
/// slice to have the launcher allocate the recommended amount. The first
/// kernel waits for every event in `depends_on`.
#[allow(clippy::too_many_arguments)]
pub fn launch<T, C, B, S>(
    input: &[T],
    filter: &[T],
    output: &mut [T],
    workspace: &mut [T],
    params: &Conv2DParams,
    selector: &mut S,
    backend: &B,
    options: &LaunchOptions,
    depends_on: &[B::Event],
) -> Result<B::Event>
where
    T: Element,
    C: ConvType,
    B: Backend,
    S: Selector,
{
    validate_params(params)?;
    let algorithm = selector.select::<C>(params);
    log::debug!(
        "{} selected {:?} for {:?} in {} on {}",
        selector.name(),
        algorithm,
        C::DIRECTION,
        T::DTYPE.name(),
        B::name()
    );

    match algorithm {
        Algorithm::Direct => {
            launch_direct::<T, C, B>(input, filter, output, params, backend, options, depends_on)
        }
        Algorithm::Tiled => {
            launch_tiled::<T, C, B>(input, filter, output, params, backend, options, depends_on)
        }
        Algorithm::Im2col => launch_im2col::<T, C, B>(
            input, filter, output, workspace, params, backend, options, depends_on,
        ),
        Algorithm::Winograd => launch_winograd::<T, C, B>(
            input, filter, output, workspace, params, backend, options, depends_on,
        ),
        Algorithm::WinogradLarge => launch_winograd_large::<T, C, B>(
            input, filter, output, workspace, params, backend, options, depends_on,
        ),
        Algorithm::Matmul => {
            launch_matmul::<T, C, B>(input, filter, output, params, backend, options, depends_on)
        }
        Algorithm::NotSupported => Err(Error::invalid_algorithm(
            Algorithm::NotSupported,
            format!("{} found no algorithm", selector.name()),
        )),
    }
}
