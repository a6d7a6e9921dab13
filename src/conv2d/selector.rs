//! Choosing an algorithm for a set of parameters

use super::conv_type::{ConvType, Direction, Forward};
use super::params::Conv2DParams;
use super::{Algorithm, tiled};

/// Picks the algorithm used for each direction
pub trait Selector {
    /// Algorithm for the forward pass
    fn select_forward(&mut self, params: &Conv2DParams) -> Algorithm;

    /// Algorithm for the input gradient
    fn select_input_gradient(&mut self, params: &Conv2DParams) -> Algorithm;

    /// Algorithm for the filter gradient
    fn select_filter_gradient(&mut self, params: &Conv2DParams) -> Algorithm;

    /// Descriptive name of the selector
    fn name(&self) -> &'static str;

    /// Algorithm for direction `C`
    fn select<C: ConvType>(&mut self, params: &Conv2DParams) -> Algorithm
    where
        Self: Sized,
    {
        match C::DIRECTION {
            Direction::Forward => self.select_forward(params),
            Direction::InputGradient => self.select_input_gradient(params),
            Direction::FilterGradient => self.select_filter_gradient(params),
        }
    }
}

/// Always picks the same algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantSelector(pub Algorithm);

impl Selector for ConstantSelector {
    fn select_forward(&mut self, _params: &Conv2DParams) -> Algorithm {
        self.0
    }

    fn select_input_gradient(&mut self, _params: &Conv2DParams) -> Algorithm {
        self.0
    }

    fn select_filter_gradient(&mut self, _params: &Conv2DParams) -> Algorithm {
        self.0
    }

    fn name(&self) -> &'static str {
        "ConstantSelector"
    }
}

fn unit_stride(params: &Conv2DParams) -> bool {
    params.stride_rows == 1 && params.stride_cols == 1
}

fn winograd_window(params: &Conv2DParams) -> bool {
    matches!((params.window_rows, params.window_cols), (3, 3) | (3, 1) | (1, 3))
}

/// Picks Winograd for 3x3, 3x1 and 1x3 windows at unit stride
#[derive(Debug, Clone, Copy, Default)]
pub struct WinogradSelector;

impl WinogradSelector {
    fn choose(params: &Conv2DParams) -> Algorithm {
        if winograd_window(params) && unit_stride(params) {
            Algorithm::Winograd
        } else {
            Algorithm::NotSupported
        }
    }
}

impl Selector for WinogradSelector {
    fn select_forward(&mut self, params: &Conv2DParams) -> Algorithm {
        Self::choose(params)
    }

    fn select_input_gradient(&mut self, params: &Conv2DParams) -> Algorithm {
        Self::choose(params)
    }

    fn select_filter_gradient(&mut self, params: &Conv2DParams) -> Algorithm {
        Self::choose(params)
    }

    fn name(&self) -> &'static str {
        "WinogradSelector"
    }
}

/// Picks large-tile Winograd for 3x3 windows at unit stride
#[derive(Debug, Clone, Copy, Default)]
pub struct WinogradLargeSelector;

impl WinogradLargeSelector {
    fn choose(params: &Conv2DParams) -> Algorithm {
        if params.window_rows == 3 && params.window_cols == 3 && unit_stride(params) {
            Algorithm::WinogradLarge
        } else {
            Algorithm::NotSupported
        }
    }
}

impl Selector for WinogradLargeSelector {
    fn select_forward(&mut self, params: &Conv2DParams) -> Algorithm {
        Self::choose(params)
    }

    fn select_input_gradient(&mut self, params: &Conv2DParams) -> Algorithm {
        Self::choose(params)
    }

    fn select_filter_gradient(&mut self, params: &Conv2DParams) -> Algorithm {
        Self::choose(params)
    }

    fn name(&self) -> &'static str {
        "WinogradLargeSelector"
    }
}

/// Picks the tiled algorithm for the forward pass of common square windows
#[derive(Debug, Clone, Copy, Default)]
pub struct TiledSelector;

impl Selector for TiledSelector {
    fn select_forward(&mut self, params: &Conv2DParams) -> Algorithm {
        let square = params.window_rows == params.window_cols;
        let equal_strides = params.stride_rows == params.stride_cols;
        let supported = matches!(
            (params.window_rows, params.stride_rows),
            (1, 1) | (1, 2) | (3, 1) | (3, 2) | (5, 1)
        );
        if square && equal_strides && supported {
            Algorithm::Tiled
        } else {
            Algorithm::NotSupported
        }
    }

    fn select_input_gradient(&mut self, _params: &Conv2DParams) -> Algorithm {
        Algorithm::NotSupported
    }

    fn select_filter_gradient(&mut self, _params: &Conv2DParams) -> Algorithm {
        Algorithm::NotSupported
    }

    fn name(&self) -> &'static str {
        "TiledSelector"
    }
}

/// Picks the plain matmul for 1x1 unit-stride unpadded convolutions
#[derive(Debug, Clone, Copy, Default)]
pub struct MatmulSelector;

impl MatmulSelector {
    fn choose(params: &Conv2DParams) -> Algorithm {
        let window = params.window_rows == 1 && params.window_cols == 1;
        let pad = params.pad_rows == 0 && params.pad_cols == 0;
        if window && unit_stride(params) && pad && params.is_nhwc_hwcf() && params.groups == 1 {
            Algorithm::Matmul
        } else {
            Algorithm::NotSupported
        }
    }
}

impl Selector for MatmulSelector {
    fn select_forward(&mut self, params: &Conv2DParams) -> Algorithm {
        Self::choose(params)
    }

    fn select_input_gradient(&mut self, params: &Conv2DParams) -> Algorithm {
        Self::choose(params)
    }

    fn select_filter_gradient(&mut self, params: &Conv2DParams) -> Algorithm {
        Self::choose(params)
    }

    fn name(&self) -> &'static str {
        "MatmulSelector"
    }
}

/// Picks a reasonable algorithm for any parameters.
///
/// In order: matmul for 1x1 windows, Winograd for unit-stride 3x3 windows
/// with at least 8 channels and features, the tiled kernels for forward
/// shapes they cover, im2col for grouped convolutions, and direct otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSelector;

impl DefaultSelector {
    /// Smallest channel and feature count for which Winograd pays off
    pub const WINOGRAD_MIN_CHANNELS: usize = 8;

    fn choose<C: ConvType>(params: &Conv2DParams) -> Algorithm {
        if MatmulSelector::choose(params) == Algorithm::Matmul {
            return Algorithm::Matmul;
        }
        let plain = params.groups == 1 && params.is_nhwc_hwcf();
        if plain
            && params.window_rows == 3
            && params.window_cols == 3
            && unit_stride(params)
            && params.channels >= Self::WINOGRAD_MIN_CHANNELS
            && params.features >= Self::WINOGRAD_MIN_CHANNELS
        {
            return Algorithm::Winograd;
        }
        if plain
            && C::DIRECTION == Direction::Forward
            && tiled::find_config::<Forward>(params).is_some()
        {
            return Algorithm::Tiled;
        }
        if params.groups > 1 {
            log::debug!("DefaultSelector: falling back to im2col for {} groups", params.groups);
            return Algorithm::Im2col;
        }
        log::debug!("DefaultSelector: falling back to direct for {:?}", C::DIRECTION);
        Algorithm::Direct
    }
}

impl Selector for DefaultSelector {
    fn select_forward(&mut self, params: &Conv2DParams) -> Algorithm {
        Self::choose::<Forward>(params)
    }

    fn select_input_gradient(&mut self, params: &Conv2DParams) -> Algorithm {
        Self::choose::<super::InputGradient>(params)
    }

    fn select_filter_gradient(&mut self, params: &Conv2DParams) -> Algorithm {
        Self::choose::<super::FilterGradient>(params)
    }

    fn name(&self) -> &'static str {
        "DefaultSelector"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conv2d::{FilterGradient, GroupFormat, InputGradient};

    #[test]
    fn test_specialised_selectors() {
        let p3 = Conv2DParams::new(1, 8, 8, 4, 3, 3, 4);
        let p31 = Conv2DParams::new(1, 8, 8, 4, 3, 1, 4);
        let strided = p3.with_stride(2, 2);

        assert_eq!(WinogradSelector.select::<Forward>(&p3), Algorithm::Winograd);
        assert_eq!(WinogradSelector.select::<FilterGradient>(&p31), Algorithm::Winograd);
        assert_eq!(WinogradSelector.select::<Forward>(&strided), Algorithm::NotSupported);
        assert_eq!(WinogradLargeSelector.select::<Forward>(&p31), Algorithm::NotSupported);
        assert_eq!(TiledSelector.select::<Forward>(&strided), Algorithm::Tiled);
        assert_eq!(TiledSelector.select::<InputGradient>(&p3), Algorithm::NotSupported);

        let one = Conv2DParams::new(1, 8, 8, 4, 1, 1, 4);
        assert_eq!(MatmulSelector.select::<InputGradient>(&one), Algorithm::Matmul);
        assert_eq!(
            MatmulSelector.select::<Forward>(&one.with_padding(1, 1)),
            Algorithm::NotSupported
        );
    }

    #[test]
    fn test_default_selector() {
        let mut selector = DefaultSelector;
        let one = Conv2DParams::new(1, 8, 8, 4, 1, 1, 4);
        assert_eq!(selector.select::<Forward>(&one), Algorithm::Matmul);

        let wide = Conv2DParams::new(1, 8, 8, 8, 3, 3, 16).with_same_padding();
        assert_eq!(selector.select::<InputGradient>(&wide), Algorithm::Winograd);

        let narrow = Conv2DParams::new(1, 8, 8, 3, 3, 3, 4);
        assert_eq!(selector.select::<Forward>(&narrow), Algorithm::Tiled);
        assert_eq!(selector.select::<FilterGradient>(&narrow), Algorithm::Direct);

        let grouped =
            Conv2DParams::new(1, 8, 8, 4, 3, 3, 4).with_groups(2, GroupFormat::Contiguous);
        assert_eq!(selector.select::<Forward>(&grouped), Algorithm::Im2col);

        assert_eq!(ConstantSelector(Algorithm::Direct).select::<Forward>(&wide), Algorithm::Direct);
    }
}
