//! Mapping between input and output windows of a strided, padded convolution

use super::Index;
use super::math::round_ratio_up_above_zero;

/// The first output (or input) index touched by a window together with the
/// filter tap that touches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowIndices<I> {
    /// First index of the window in the target tensor. May be negative when
    /// the window starts inside the padding.
    pub window_start: I,
    /// Filter tap matching `window_start`
    pub filter_start: I,
}

/// Start of the input window read by output position `index`.
///
/// The window spans `[index * stride - pad, index * stride - pad + window)`,
/// always starting at filter tap 0.
#[inline]
pub fn in_window_from_output<I: Index>(index: I, stride: I, pad: I) -> WindowIndices<I> {
    WindowIndices {
        window_start: index * stride - pad,
        filter_start: I::zero(),
    }
}

/// First output position whose window covers input position `index`.
///
/// Output `window_start` sees `index` through filter tap `filter_start`;
/// every following output sees it through a tap `stride` further along, so
/// the caller walks both until the tap leaves the filter.
#[inline]
pub fn out_window_from_input<I: Index>(index: I, stride: I, pad: I) -> WindowIndices<I> {
    let padded = index - pad;
    let window_start = round_ratio_up_above_zero(padded, stride);
    WindowIndices {
        window_start,
        filter_start: window_start * stride - padded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_window_from_output() {
        let w = in_window_from_output(3i32, 2, 1);
        assert_eq!(w.window_start, 5);
        assert_eq!(w.filter_start, 0);
        assert_eq!(in_window_from_output(0i64, 1, 2).window_start, -2);
    }

    // Called with the mirrored pad `window - 1 - pad`, the helper walks every
    // (output, tap) pair with out * stride - pad + tap == input.
    #[test]
    fn test_out_window_matches_enumeration() {
        for stride in 1..4i32 {
            for pad in 0..3i32 {
                for window in 1..6i32 {
                    let out_size = 7;
                    for input in 0..((out_size - 1) * stride + window) {
                        let mut expected = Vec::new();
                        for out in 0..out_size {
                            for tap in 0..window {
                                if out * stride - pad + tap == input {
                                    expected.push((out, tap));
                                }
                            }
                        }

                        let w = out_window_from_input(input, stride, window - 1 - pad);
                        let mut found = Vec::new();
                        let mut out = w.window_start;
                        let mut tap = window - 1 - w.filter_start;
                        while out < out_size && tap >= 0 {
                            found.push((out, tap));
                            out += 1;
                            tap -= stride;
                        }
                        found.sort();
                        expected.sort();
                        assert_eq!(found, expected, "in={input} s={stride} p={pad} w={window}");
                    }
                }
            }
        }
    }
}
