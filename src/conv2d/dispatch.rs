//! Runtime choices that pick one compiled instantiation of a kernel

use super::conv_type::{ConvType, Direction};
use super::params::{Conv2DParams, DataFormat};
use crate::error::{Error, Result};

/// Integer type used for index arithmetic inside kernels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexWidth {
    /// `i32`
    I32,
    /// `i64`
    I64,
}

/// The narrowest index type that can address `size` elements.
pub fn select_index_width(size: usize, allow_int64: bool) -> Result<IndexWidth> {
    if size <= i32::MAX as usize {
        Ok(IndexWidth::I32)
    } else if allow_int64 && size <= i64::MAX as usize {
        Ok(IndexWidth::I64)
    } else {
        Err(Error::IndexExceeded { size })
    }
}

/// Widest of 4, 2 and 1 dividing the vectorised dimension of kernel
/// parameters `kp`.
///
/// That dimension is `kp.features`, which is the user's features for Forward
/// and FilterGradient and the user's channels for InputGradient. Layouts
/// other than NHWC/HWCF keep it strided, so they get width 1.
pub fn select_vector_width<C: ConvType>(kp: &Conv2DParams) -> usize {
    if kp.input_format == DataFormat::Nchw || !kp.is_nhwc_hwcf() || kp.groups != 1 {
        return 1;
    }
    widest_vector(kp.features)
}

/// Widest of 4, 2 and 1 dividing `len`
pub fn widest_vector(len: usize) -> usize {
    [4, 2].into_iter().find(|w| len % w == 0).unwrap_or(1)
}

/// Window and stride with a dedicated direct kernel
pub const STATIC_WINDOWS: [(usize, usize); 5] = [(1, 1), (3, 1), (3, 2), (5, 1), (5, 2)];

/// `(window, stride)` of the static direct kernel matching kernel parameters
/// `kp`, or `(0, 0)` for the dynamic kernel.
///
/// For FilterGradient the window fixed at compile time is the filter, which
/// the kernel parameters hold as the output extent.
pub fn select_static_window<C: ConvType>(kp: &Conv2DParams) -> (usize, usize) {
    let (rows, cols) = match C::DIRECTION {
        Direction::FilterGradient => (kp.out_rows, kp.out_cols),
        _ => (kp.window_rows, kp.window_cols),
    };
    if rows != cols || kp.stride_rows != kp.stride_cols {
        return (0, 0);
    }
    let shape = (rows, kp.stride_rows);
    if STATIC_WINDOWS.contains(&shape) {
        shape
    } else {
        (0, 0)
    }
}

/// Whether every divisor used to unflatten a direct work-item id exceeds 1.
pub fn can_use_fast_div<C: ConvType>(kp: &Conv2DParams, vector_width: usize) -> bool {
    let vectors = kp.features / vector_width;
    match C::DIRECTION {
        Direction::Forward | Direction::InputGradient => {
            vectors != 1 && kp.out_rows != 1 && kp.out_cols != 1
        }
        Direction::FilterGradient => vectors != 1 && kp.channels != 1 && kp.out_cols != 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conv2d::{FilterFormat, FilterGradient, Forward, InputGradient, kernel_params};
    use crate::error::StatusCode;

    #[test]
    fn test_index_width_boundary() {
        let max = i32::MAX as usize;
        assert_eq!(select_index_width(max, false).unwrap(), IndexWidth::I32);
        let err = select_index_width(max + 1, false).unwrap_err();
        assert_eq!(err.status(), StatusCode::IndexExceeded);
        assert_eq!(select_index_width(max + 1, true).unwrap(), IndexWidth::I64);
    }

    #[test]
    fn test_vector_width() {
        let p = Conv2DParams::new(1, 5, 5, 6, 3, 3, 8);
        assert_eq!(select_vector_width::<Forward>(&kernel_params::<Forward>(&p)), 4);
        // input gradient vectorises over the user's channels
        assert_eq!(
            select_vector_width::<InputGradient>(&kernel_params::<InputGradient>(&p)),
            2
        );
        let odd = Conv2DParams::new(1, 5, 5, 6, 3, 3, 7);
        assert_eq!(select_vector_width::<Forward>(&odd), 1);
        let nchw = p.with_formats(DataFormat::Nchw, FilterFormat::Fchw);
        assert_eq!(select_vector_width::<Forward>(&nchw), 1);
    }

    #[test]
    fn test_static_window() {
        let p = Conv2DParams::new(1, 9, 9, 2, 3, 3, 2).with_stride(2, 2);
        assert_eq!(select_static_window::<Forward>(&p), (3, 2));
        let rect = Conv2DParams::new(1, 9, 9, 2, 3, 1, 2);
        assert_eq!(select_static_window::<Forward>(&rect), (0, 0));
        let big = Conv2DParams::new(1, 9, 9, 2, 7, 7, 2);
        assert_eq!(select_static_window::<Forward>(&big), (0, 0));

        let fg = kernel_params::<FilterGradient>(&Conv2DParams::new(1, 9, 9, 2, 5, 5, 2));
        assert_eq!(select_static_window::<FilterGradient>(&fg), (5, 1));
    }

    #[test]
    fn test_fast_div_rules() {
        let p = Conv2DParams::new(2, 6, 6, 3, 3, 3, 8);
        assert!(can_use_fast_div::<Forward>(&p, 4));
        assert!(!can_use_fast_div::<Forward>(&p, 8));
        let single_row = Conv2DParams::new(2, 3, 6, 3, 3, 3, 8);
        assert!(!can_use_fast_div::<Forward>(&single_row, 1));

        let fg = kernel_params::<FilterGradient>(&Conv2DParams::new(2, 6, 6, 1, 3, 3, 8));
        assert!(!can_use_fast_div::<FilterGradient>(&fg, 1));
    }
}
