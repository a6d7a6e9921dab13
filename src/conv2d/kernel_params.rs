//! Rewriting user parameters into the shape a kernel computes

use super::conv_type::{ConvType, Direction};
use super::params::Conv2DParams;

/// The parameters a kernel of direction `C` sees.
///
/// - Forward runs on the user parameters.
/// - InputGradient is a forward-style pass over the output gradient: channels
///   and features swap, the input and output extents swap, and the padding
///   becomes `window - 1 - pad`. The filter is read mirrored.
/// - FilterGradient treats the output gradient as the window and the filter
///   as the output, so their extents swap.
pub fn kernel_params<C: ConvType>(params: &Conv2DParams) -> Conv2DParams {
    let mut kp = *params;
    match C::DIRECTION {
        Direction::Forward => {}
        Direction::InputGradient => {
            std::mem::swap(&mut kp.channels, &mut kp.features);
            std::mem::swap(&mut kp.in_rows, &mut kp.out_rows);
            std::mem::swap(&mut kp.in_cols, &mut kp.out_cols);
            kp.pad_rows = kp.window_rows as isize - 1 - kp.pad_rows;
            kp.pad_cols = kp.window_cols as isize - 1 - kp.pad_cols;
        }
        Direction::FilterGradient => {
            std::mem::swap(&mut kp.out_rows, &mut kp.window_rows);
            std::mem::swap(&mut kp.out_cols, &mut kp.window_cols);
        }
    }
    kp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conv2d::{FilterGradient, Forward, InputGradient};

    #[test]
    fn test_forward_identity() {
        let p = Conv2DParams::new(2, 9, 7, 3, 3, 3, 5).with_padding(1, 0);
        assert_eq!(kernel_params::<Forward>(&p), p);
    }

    #[test]
    fn test_input_gradient_round_trip() {
        let p = Conv2DParams::new(2, 9, 7, 3, 5, 3, 5)
            .with_stride(2, 1)
            .with_padding(2, 1);
        let kp = kernel_params::<InputGradient>(&p);
        assert_eq!((kp.channels, kp.features), (5, 3));
        assert_eq!((kp.in_rows, kp.out_rows), (p.out_rows, 9));
        assert_eq!((kp.pad_rows, kp.pad_cols), (2, 1));

        let twice = kernel_params::<InputGradient>(&kp);
        assert_eq!((twice.window_rows, twice.window_cols), (5, 3));
        assert_eq!((twice.pad_rows, twice.pad_cols), (p.pad_rows, p.pad_cols));
        assert_eq!(twice, p);
    }

    #[test]
    fn test_filter_gradient_swaps_window() {
        let p = Conv2DParams::new(1, 8, 8, 2, 3, 3, 4);
        let kp = kernel_params::<FilterGradient>(&p);
        assert_eq!((kp.out_rows, kp.out_cols), (3, 3));
        assert_eq!((kp.window_rows, kp.window_cols), (6, 6));
    }
}
