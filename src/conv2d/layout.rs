//! Element strides of image and filter tensors

use super::params::{Conv2DParams, DataFormat, FilterFormat, GroupFormat};
use crate::helpers::Index;

/// Extents, strides and padding of a launch in kernel index type
#[derive(Debug, Clone, Copy)]
pub(crate) struct Geometry<I> {
    pub batch: I,
    pub channels: I,
    pub features: I,
    pub in_rows: I,
    pub in_cols: I,
    pub out_rows: I,
    pub out_cols: I,
    pub window_rows: I,
    pub window_cols: I,
    pub stride_rows: I,
    pub stride_cols: I,
    pub pad_rows: I,
    pub pad_cols: I,
}

impl<I: Index> Geometry<I> {
    pub fn new(params: &Conv2DParams) -> Self {
        Self {
            batch: I::from_usize(params.batch),
            channels: I::from_usize(params.channels),
            features: I::from_usize(params.features),
            in_rows: I::from_usize(params.in_rows),
            in_cols: I::from_usize(params.in_cols),
            out_rows: I::from_usize(params.out_rows),
            out_cols: I::from_usize(params.out_cols),
            window_rows: I::from_usize(params.window_rows),
            window_cols: I::from_usize(params.window_cols),
            stride_rows: I::from_usize(params.stride_rows),
            stride_cols: I::from_usize(params.stride_cols),
            pad_rows: I::from_isize(params.pad_rows),
            pad_cols: I::from_isize(params.pad_cols),
        }
    }

    /// Whether `(row, col)` lies inside the input
    #[inline]
    pub fn in_input(&self, row: I, col: I) -> bool {
        row >= I::zero() && row < self.in_rows && col >= I::zero() && col < self.in_cols
    }
}

/// Maps group-local channel and feature indices to tensor indices
#[derive(Debug, Clone, Copy)]
pub(crate) struct GroupMap<I> {
    pub groups: I,
    pub channels_per_group: I,
    pub features_per_group: I,
    pub strided: bool,
}

impl<I: Index> GroupMap<I> {
    pub fn new(params: &Conv2DParams) -> Self {
        Self {
            groups: I::from_usize(params.groups),
            channels_per_group: I::from_usize(params.channels_per_group()),
            features_per_group: I::from_usize(params.features_per_group()),
            strided: params.group_format == GroupFormat::Strided,
        }
    }

    /// Input channel of local channel `local` in group `group`
    #[inline]
    pub fn channel(&self, group: I, local: I) -> I {
        if self.strided {
            local * self.groups + group
        } else {
            group * self.channels_per_group + local
        }
    }

    /// Output feature of local feature `local` in group `group`
    #[inline]
    pub fn feature(&self, group: I, local: I) -> I {
        if self.strided {
            local * self.groups + group
        } else {
            group * self.features_per_group + local
        }
    }

    /// `(group, local feature)` of output feature `feature`
    #[inline]
    pub fn split_feature(&self, feature: I) -> (I, I) {
        if self.strided {
            (feature % self.groups, feature / self.groups)
        } else {
            (
                feature / self.features_per_group,
                feature % self.features_per_group,
            )
        }
    }
}

/// Strides of a 4-D image tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageStrides<I> {
    /// Between images
    pub batch: I,
    /// Between rows
    pub row: I,
    /// Between columns
    pub col: I,
    /// Between channels
    pub channel: I,
}

impl ImageStrides<usize> {
    /// Strides of a `rows x cols x channels` image stored as `format`
    pub fn new(format: DataFormat, rows: usize, cols: usize, channels: usize) -> Self {
        match format {
            DataFormat::Nhwc => Self {
                batch: rows * cols * channels,
                row: cols * channels,
                col: channels,
                channel: 1,
            },
            DataFormat::Nchw => Self {
                batch: channels * rows * cols,
                row: cols,
                col: 1,
                channel: rows * cols,
            },
        }
    }

    /// The same strides in kernel index type
    pub fn cast<I: Index>(self) -> ImageStrides<I> {
        ImageStrides {
            batch: I::from_usize(self.batch),
            row: I::from_usize(self.row),
            col: I::from_usize(self.col),
            channel: I::from_usize(self.channel),
        }
    }
}

impl<I: Index> ImageStrides<I> {
    /// Offset of element `(b, row, col, channel)`
    #[inline]
    pub fn offset(&self, b: I, row: I, col: I, channel: I) -> I {
        b * self.batch + row * self.row + col * self.col + channel * self.channel
    }
}

/// Strides of a 4-D filter tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterStrides<I> {
    /// Between filter rows
    pub row: I,
    /// Between filter columns
    pub col: I,
    /// Between input channels
    pub channel: I,
    /// Between output features
    pub feature: I,
}

impl FilterStrides<usize> {
    /// Strides of a `rows x cols x channels x features` filter stored as `format`
    pub fn new(
        format: FilterFormat,
        rows: usize,
        cols: usize,
        channels: usize,
        features: usize,
    ) -> Self {
        match format {
            FilterFormat::Hwcf => Self {
                row: cols * channels * features,
                col: channels * features,
                channel: features,
                feature: 1,
            },
            FilterFormat::Fchw => Self {
                row: cols,
                col: 1,
                channel: rows * cols,
                feature: channels * rows * cols,
            },
            FilterFormat::Fhwc => Self {
                row: cols * channels,
                col: channels,
                channel: 1,
                feature: rows * cols * channels,
            },
        }
    }

    /// The strides seen when channels and features trade places
    pub fn swap_channels(self) -> Self {
        Self {
            channel: self.feature,
            feature: self.channel,
            ..self
        }
    }

    /// The same strides in kernel index type
    pub fn cast<I: Index>(self) -> FilterStrides<I> {
        FilterStrides {
            row: I::from_usize(self.row),
            col: I::from_usize(self.col),
            channel: I::from_usize(self.channel),
            feature: I::from_usize(self.feature),
        }
    }
}

impl<I: Index> FilterStrides<I> {
    /// Offset of element `(row, col, channel, feature)`
    #[inline]
    pub fn offset(&self, row: I, col: I, channel: I, feature: I) -> I {
        row * self.row + col * self.col + channel * self.channel + feature * self.feature
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_map() {
        let p = Conv2DParams::new(1, 4, 4, 6, 1, 1, 9).with_groups(3, GroupFormat::Contiguous);
        let contiguous = GroupMap::<i32>::new(&p);
        assert_eq!(contiguous.channel(2, 1), 5);
        assert_eq!(contiguous.feature(1, 2), 5);
        assert_eq!(contiguous.split_feature(5), (1, 2));

        let strided = GroupMap::<i32>::new(&p.with_groups(3, GroupFormat::Strided));
        assert_eq!(strided.channel(2, 1), 5);
        assert_eq!(strided.feature(1, 2), 7);
        assert_eq!(strided.split_feature(7), (1, 2));
    }

    #[test]
    fn test_image_strides() {
        let nhwc = ImageStrides::new(DataFormat::Nhwc, 4, 5, 3).cast::<i32>();
        assert_eq!(nhwc.offset(1, 2, 3, 1), 60 + 30 + 9 + 1);
        let nchw = ImageStrides::new(DataFormat::Nchw, 4, 5, 3).cast::<i64>();
        assert_eq!(nchw.offset(1, 2, 3, 1), 60 + 10 + 3 + 20);
    }

    #[test]
    fn test_filter_strides() {
        let hwcf = FilterStrides::new(FilterFormat::Hwcf, 3, 3, 2, 4);
        assert_eq!((hwcf.row, hwcf.col, hwcf.channel, hwcf.feature), (24, 8, 4, 1));
        let fhwc = FilterStrides::new(FilterFormat::Fhwc, 3, 3, 2, 4);
        assert_eq!(fhwc.feature, 18);
        let swapped = hwcf.swap_channels();
        assert_eq!((swapped.channel, swapped.feature), (1, 4));
    }
}
