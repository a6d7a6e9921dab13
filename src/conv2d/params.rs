//! User-level convolution parameters

use crate::error::{Error, Result};

/// Layout of image tensors (input, output and their gradients)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DataFormat {
    /// `[batch][rows][cols][channels]`
    #[default]
    Nhwc,
    /// `[batch][channels][rows][cols]`
    Nchw,
}

/// Layout of filter tensors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FilterFormat {
    /// `[rows][cols][channels / groups][features]`
    #[default]
    Hwcf,
    /// `[features][channels / groups][rows][cols]`
    Fchw,
    /// `[features][rows][cols][channels / groups]`
    Fhwc,
}

/// How channels and features are assigned to groups
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum GroupFormat {
    /// Group `g` owns one contiguous block of channels and of features
    #[default]
    Contiguous,
    /// Group `g` owns every `groups`-th channel and feature starting at `g`
    Strided,
}

/// Parameters of a 2-D convolution.
///
/// Counts and extents are element counts. `pad_*` is signed because the
/// input-gradient transform can produce negative padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Conv2DParams {
    /// Input channels
    pub channels: usize,
    /// Output features
    pub features: usize,
    /// Images per launch
    pub batch: usize,
    /// Input rows
    pub in_rows: usize,
    /// Input columns
    pub in_cols: usize,
    /// Filter rows
    pub window_rows: usize,
    /// Filter columns
    pub window_cols: usize,
    /// Row stride
    pub stride_rows: usize,
    /// Column stride
    pub stride_cols: usize,
    /// Output rows
    pub out_rows: usize,
    /// Output columns
    pub out_cols: usize,
    /// Zero padding above and below
    pub pad_rows: isize,
    /// Zero padding left and right
    pub pad_cols: isize,
    /// Row dilation
    pub dilation_rows: usize,
    /// Column dilation
    pub dilation_cols: usize,
    /// Channel groups
    pub groups: usize,
    /// Layout of the input and output images
    pub input_format: DataFormat,
    /// Layout of the filter
    pub filter_format: FilterFormat,
    /// Assignment of channels and features to groups
    pub group_format: GroupFormat,
}

/// Output extent of one spatial dimension, or 0 when the window does not fit.
pub fn compute_output_size(
    input: usize,
    window: usize,
    stride: usize,
    pad: isize,
    dilation: usize,
) -> usize {
    let span = input as isize + 2 * pad - (dilation * window.saturating_sub(1)) as isize - 1;
    if span < 0 || stride == 0 {
        0
    } else {
        span as usize / stride + 1
    }
}

impl Conv2DParams {
    /// Unit-stride, unpadded, ungrouped NHWC/HWCF parameters.
    pub fn new(
        batch: usize,
        in_rows: usize,
        in_cols: usize,
        channels: usize,
        window_rows: usize,
        window_cols: usize,
        features: usize,
    ) -> Self {
        let mut params = Self {
            channels,
            features,
            batch,
            in_rows,
            in_cols,
            window_rows,
            window_cols,
            stride_rows: 1,
            stride_cols: 1,
            out_rows: 0,
            out_cols: 0,
            pad_rows: 0,
            pad_cols: 0,
            dilation_rows: 1,
            dilation_cols: 1,
            groups: 1,
            input_format: DataFormat::Nhwc,
            filter_format: FilterFormat::Hwcf,
            group_format: GroupFormat::Contiguous,
        };
        params.update_output_size();
        params
    }

    /// Set the strides
    pub fn with_stride(mut self, rows: usize, cols: usize) -> Self {
        self.stride_rows = rows;
        self.stride_cols = cols;
        self.update_output_size();
        self
    }

    /// Set the padding
    pub fn with_padding(mut self, rows: isize, cols: isize) -> Self {
        self.pad_rows = rows;
        self.pad_cols = cols;
        self.update_output_size();
        self
    }

    /// Padding that keeps the output extent equal to the input extent at
    /// unit stride, for odd windows
    pub fn with_same_padding(self) -> Self {
        let rows = (self.window_rows.saturating_sub(1) / 2) as isize;
        let cols = (self.window_cols.saturating_sub(1) / 2) as isize;
        self.with_padding(rows, cols)
    }

    /// Set the number of groups and how they are laid out
    pub fn with_groups(mut self, groups: usize, format: GroupFormat) -> Self {
        self.groups = groups;
        self.group_format = format;
        self
    }

    /// Set the image and filter layouts
    pub fn with_formats(mut self, input: DataFormat, filter: FilterFormat) -> Self {
        self.input_format = input;
        self.filter_format = filter;
        self
    }

    fn update_output_size(&mut self) {
        self.out_rows = compute_output_size(
            self.in_rows,
            self.window_rows,
            self.stride_rows,
            self.pad_rows,
            self.dilation_rows,
        );
        self.out_cols = compute_output_size(
            self.in_cols,
            self.window_cols,
            self.stride_cols,
            self.pad_cols,
            self.dilation_cols,
        );
    }

    /// Channels seen by each group
    pub fn channels_per_group(&self) -> usize {
        self.channels / self.groups.max(1)
    }

    /// Features produced by each group
    pub fn features_per_group(&self) -> usize {
        self.features / self.groups.max(1)
    }

    /// Taps in one filter window
    pub fn window_size(&self) -> usize {
        self.window_rows * self.window_cols
    }

    /// Whether images are NHWC and filters HWCF
    pub fn is_nhwc_hwcf(&self) -> bool {
        self.input_format == DataFormat::Nhwc && self.filter_format == FilterFormat::Hwcf
    }
}

fn require(cond: bool, arg: &'static str, reason: impl FnOnce() -> String) -> Result<()> {
    if cond {
        Ok(())
    } else {
        Err(Error::invalid_parameter(arg, reason()))
    }
}

/// Check that `params` describe a convolution this crate can run.
pub fn validate_params(params: &Conv2DParams) -> Result<()> {
    let counts = [
        ("batch", params.batch),
        ("channels", params.channels),
        ("features", params.features),
        ("groups", params.groups),
        ("in_rows", params.in_rows),
        ("in_cols", params.in_cols),
        ("window_rows", params.window_rows),
        ("window_cols", params.window_cols),
        ("stride_rows", params.stride_rows),
        ("stride_cols", params.stride_cols),
        ("out_rows", params.out_rows),
        ("out_cols", params.out_cols),
    ];
    for (arg, value) in counts {
        require(value > 0, arg, || "must be positive".to_string())?;
    }

    require(params.pad_rows >= 0, "pad_rows", || {
        format!("{} is negative", params.pad_rows)
    })?;
    require(params.pad_cols >= 0, "pad_cols", || {
        format!("{} is negative", params.pad_cols)
    })?;
    require(
        params.dilation_rows == 1 && params.dilation_cols == 1,
        "dilation",
        || {
            format!(
                "only unit dilation is supported, got {}x{}",
                params.dilation_rows, params.dilation_cols
            )
        },
    )?;
    require(params.channels % params.groups == 0, "channels", || {
        format!(
            "{} is not divisible by {} groups",
            params.channels, params.groups
        )
    })?;
    require(params.features % params.groups == 0, "features", || {
        format!(
            "{} is not divisible by {} groups",
            params.features, params.groups
        )
    })?;

    let out_rows = compute_output_size(
        params.in_rows,
        params.window_rows,
        params.stride_rows,
        params.pad_rows,
        params.dilation_rows,
    );
    let out_cols = compute_output_size(
        params.in_cols,
        params.window_cols,
        params.stride_cols,
        params.pad_cols,
        params.dilation_cols,
    );
    require(
        params.out_rows == out_rows && params.out_cols == out_cols,
        "out_rows",
        || {
            format!(
                "output {}x{} does not match the {}x{} implied by the input",
                params.out_rows, params.out_cols, out_rows, out_cols
            )
        },
    )?;

    let layout_ok = matches!(
        (params.input_format, params.filter_format),
        (DataFormat::Nhwc, FilterFormat::Hwcf)
            | (DataFormat::Nhwc, FilterFormat::Fhwc)
            | (DataFormat::Nchw, FilterFormat::Fchw)
    );
    require(layout_ok, "filter_format", || {
        format!(
            "{:?} filters cannot be used with {:?} images",
            params.filter_format, params.input_format
        )
    })?;

    if params.group_format == GroupFormat::Strided {
        require(params.groups > 1, "group_format", || {
            "strided groups need more than one group".to_string()
        })?;
        require(params.filter_format == FilterFormat::Hwcf, "group_format", || {
            format!("strided groups need HWCF filters, got {:?}", params.filter_format)
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StatusCode;

    #[test]
    fn test_output_size() {
        assert_eq!(compute_output_size(7, 3, 1, 0, 1), 5);
        assert_eq!(compute_output_size(7, 3, 2, 1, 1), 4);
        assert_eq!(compute_output_size(2, 5, 1, 0, 1), 0);
        let p = Conv2DParams::new(1, 8, 6, 3, 3, 3, 4).with_same_padding();
        assert_eq!((p.out_rows, p.out_cols), (8, 6));
    }

    #[test]
    fn test_validate_accepts_defaults() {
        let p = Conv2DParams::new(2, 5, 5, 4, 3, 3, 8).with_stride(2, 2);
        assert!(validate_params(&p).is_ok());
    }

    #[test]
    fn test_validate_rejects() {
        let base = Conv2DParams::new(1, 5, 5, 4, 3, 3, 6);

        let grouped = base.with_groups(4, GroupFormat::Contiguous);
        let err = validate_params(&grouped).unwrap_err();
        assert_eq!(err.status(), StatusCode::InvalidParameter);

        let mut wrong_out = base;
        wrong_out.out_rows = 4;
        assert!(validate_params(&wrong_out).is_err());

        let mixed = base.with_formats(DataFormat::Nchw, FilterFormat::Hwcf);
        assert!(validate_params(&mixed).is_err());

        let strided_single = base.with_groups(1, GroupFormat::Strided);
        assert!(validate_params(&strided_single).is_err());

        let window_too_big = Conv2DParams::new(1, 2, 2, 1, 3, 3, 1);
        assert!(validate_params(&window_too_big).is_err());
    }
}
