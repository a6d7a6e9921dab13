//! # convkit
//!
//! **2-D convolutions for forward and backward passes, with several
//! algorithms behind one launch interface.**
//!
//! convkit computes the forward convolution, the input gradient and the
//! filter gradient of a 2-D convolution over batched images. Each direction
//! can run with:
//!
//! - **Direct**: loops over the window, any shape and layout
//! - **Tiled**: register-blocked direct kernels for common square windows
//! - **Im2col**: window unrolling plus a matrix product, including grouped
//!   forward convolutions
//! - **Winograd**: minimal filtering for 3x3, 3x1 and 1x3 windows
//! - **Matmul**: a single product for 1x1 windows
//!
//! A [`Selector`](conv2d::Selector) picks the algorithm, and a
//! [`Backend`](backend::Backend) runs the kernels.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use convkit::prelude::*;
//!
//! let params = Conv2DParams::new(1, 8, 8, 3, 3, 3, 4).with_same_padding();
//! let sizes = get_sizes::<Forward>(&params);
//! let input = vec![1.0f32; sizes.input_size];
//! let filter = vec![0.5f32; sizes.filter_size];
//! let mut output = vec![0.0f32; sizes.output_size];
//!
//! let backend = CpuBackend::new();
//! let event = launch::<f32, Forward, _, _>(
//!     &input, &filter, &mut output, &mut [],
//!     &params, &mut DefaultSelector, &backend, &LaunchOptions::default(), &[],
//! )?;
//! event.wait();
//! ```
//!
//! ## Feature Flags
//!
//! - `cpu` (default): CPU backend
//! - `rayon` (default): multi-threaded CPU kernels
//! - `f16`: half-precision elements (F16, BF16)
//! - `int64`: 64-bit index kernels for very large tensors

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod conv2d;
pub mod dtype;
pub mod error;
pub mod helpers;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::backend::{Backend, CompletionToken};
    pub use crate::conv2d::{
        Algorithm, Conv2DParams, ConvType, DataFormat, DefaultSelector, FilterFormat,
        FilterGradient, Forward, GroupFormat, InputGradient, LaunchOptions, Selector,
        WorkspaceSize, get_sizes, launch, query_workspace_size,
    };
    pub use crate::dtype::{DType, Element};
    pub use crate::error::{Error, Result, StatusCode};

    #[cfg(feature = "cpu")]
    pub use crate::backend::cpu::{CpuBackend, CpuConfig};
}
