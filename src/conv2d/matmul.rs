//! 1x1 convolutions as a single matrix product
//!
//! With a 1x1 window, unit stride and no padding, an NHWC image is already
//! a `[batch * rows * cols, channels]` matrix and an HWCF filter a
//! `[channels, features]` one, so each direction is one backend matmul.

use super::conv_type::{ConvType, Direction};
use super::dispatch::select_index_width;
use super::{Algorithm, Conv2DParams, LaunchOptions, check_buffers};
use crate::backend::{Backend, MatmulParams};
use crate::dtype::Element;
use crate::error::{Error, Result};

fn check_shape(params: &Conv2DParams) -> Result<()> {
    let reason = if params.window_rows != 1 || params.window_cols != 1 {
        "the window is not 1x1"
    } else if params.stride_rows != 1 || params.stride_cols != 1 {
        "the stride is not 1"
    } else if params.pad_rows != 0 || params.pad_cols != 0 {
        "the input is padded"
    } else if !params.is_nhwc_hwcf() {
        "only NHWC images with HWCF filters are supported"
    } else if params.groups != 1 {
        "grouped convolutions are not supported"
    } else {
        return Ok(());
    };
    Err(Error::invalid_algorithm(Algorithm::Matmul, reason))
}

/// Launch a 1x1 convolution of direction `C` as one matrix product.
///
/// | Direction | product |
/// |---|---|
/// | Forward | `[bHW, C] x [C, F]` |
/// | InputGradient | `[bHW, F] x [C, F]^T` |
/// | FilterGradient | `[bHW, C]^T x [bHW, F]` |
pub fn launch_matmul<T: Element, C: ConvType, B: Backend>(
    input: &[T],
    filter: &[T],
    output: &mut [T],
    params: &Conv2DParams,
    backend: &B,
    options: &LaunchOptions,
    depends_on: &[B::Event],
) -> Result<B::Event> {
    check_shape(params)?;
    let sizes = check_buffers::<T, C>(input, filter, output, params)?;
    // index checks match the other algorithms even though the backend
    // product indexes with usize
    select_index_width(
        sizes.input_size.max(sizes.filter_size).max(sizes.output_size),
        options.allow_int64,
    )?;

    let rows = params.batch * params.in_rows * params.in_cols;
    let matmul = match C::DIRECTION {
        Direction::Forward => MatmulParams::new(rows, params.channels, params.features),
        Direction::InputGradient => {
            MatmulParams::new(rows, params.features, params.channels).transpose_rhs(true)
        }
        Direction::FilterGradient => {
            MatmulParams::new(params.channels, rows, params.features).transpose_lhs(true)
        }
    };
    log::debug!(
        "matmul {:?}: m={} k={} n={}",
        C::DIRECTION,
        matmul.m,
        matmul.k,
        matmul.n
    );

    backend.matmul(
        &backend.get_queue(),
        backend.get_device_buffer(input),
        backend.get_device_buffer(filter),
        backend.get_device_buffer_mut(output),
        matmul,
        depends_on,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StatusCode;

    #[test]
    fn test_shape_restrictions() {
        let p = Conv2DParams::new(2, 4, 4, 3, 1, 1, 5);
        assert!(check_shape(&p).is_ok());
        let bad = [
            Conv2DParams::new(2, 4, 4, 3, 3, 3, 5),
            p.with_stride(2, 2),
            p.with_padding(1, 0),
        ];
        for params in bad {
            let err = check_shape(&params).unwrap_err();
            assert_eq!(err.status(), StatusCode::InvalidAlgorithm);
        }
    }
}
