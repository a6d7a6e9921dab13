//! Element types supported by the convolution kernels
//!
//! `DType` is the runtime tag for an element type and [`Element`] connects
//! Rust types to it. Only floating-point types are supported: every
//! algorithm accumulates products, and the Winograd transforms use
//! fractional coefficients.

mod element;

pub use element::Element;

use std::fmt;

/// Runtime tag for an element type
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum DType {
    /// 64-bit IEEE float
    F64,
    /// 32-bit IEEE float
    F32,
    /// 16-bit IEEE float
    F16,
    /// 16-bit brain float
    BF16,
}

impl DType {
    /// Size of one element in bytes
    pub const fn size_in_bytes(self) -> usize {
        match self {
            Self::F64 => 8,
            Self::F32 => 4,
            Self::F16 | Self::BF16 => 2,
        }
    }

    /// Short lowercase name, as used in log output
    pub const fn name(self) -> &'static str {
        match self {
            Self::F64 => "f64",
            Self::F32 => "f32",
            Self::F16 => "f16",
            Self::BF16 => "bf16",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        assert_eq!(DType::F64.size_in_bytes(), 8);
        assert_eq!(DType::F32.size_in_bytes(), 4);
        assert_eq!(DType::BF16.size_in_bytes(), 2);
    }

    #[test]
    fn test_display() {
        assert_eq!(DType::F32.to_string(), "f32");
        assert_eq!(format!("{}", DType::BF16), "bf16");
    }
}
