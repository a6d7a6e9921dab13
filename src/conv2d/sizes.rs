//! Element counts of the tensors touched by a convolution

use super::conv_type::{ConvType, Direction};
use super::params::Conv2DParams;

/// Element counts of the three tensors of one direction.
///
/// The roles follow the kernel: `input` is read as the image, `filter` as the
/// window and `output` is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConvSizes {
    /// Image operand
    pub input_size: usize,
    /// Window operand
    pub filter_size: usize,
    /// Result
    pub output_size: usize,
}

/// Sizes of the tensors of direction `C` for user parameters `params`.
pub fn get_sizes<C: ConvType>(params: &Conv2DParams) -> ConvSizes {
    let batch = params.batch;
    let in_spatial = params.in_rows * params.in_cols;
    let out_spatial = params.out_rows * params.out_cols;
    let window = params.window_rows * params.window_cols;
    let filter_channels = params.channels_per_group() * params.features;

    match C::DIRECTION {
        Direction::Forward => ConvSizes {
            input_size: batch * in_spatial * params.channels,
            filter_size: window * filter_channels,
            output_size: batch * out_spatial * params.features,
        },
        Direction::InputGradient => ConvSizes {
            input_size: batch * out_spatial * params.features,
            filter_size: window * filter_channels,
            output_size: batch * in_spatial * params.channels,
        },
        Direction::FilterGradient => ConvSizes {
            input_size: batch * in_spatial * params.channels,
            filter_size: batch * out_spatial * params.features,
            output_size: window * filter_channels,
        },
    }
}
