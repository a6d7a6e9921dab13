//! Error types for convkit

use crate::conv2d::Algorithm;
use thiserror::Error;

/// Result type alias using convkit's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse status of a launch, one per error category.
///
/// Every [`Error`] maps onto exactly one status through [`Error::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// The launch was enqueued
    Ok,
    /// No instantiation of the algorithm exists for the requested shape
    InvalidAlgorithm,
    /// A tensor is too large for the available index width
    IndexExceeded,
    /// The workspace cannot hold even a single image
    InsufficientWorkspace,
    /// Temporary storage could not be allocated
    AllocationProblem,
    /// The convolution parameters are malformed
    InvalidParameter,
    /// The backend failed to run a launch
    BackendError,
}

/// Errors that can occur when sizing or launching a convolution
#[derive(Error, Debug)]
pub enum Error {
    /// The algorithm has no instantiation matching the parameters
    #[error("{algorithm:?} cannot run this convolution: {reason}")]
    InvalidAlgorithm {
        /// The algorithm that was requested
        algorithm: Algorithm,
        /// Why no instantiation applies
        reason: String,
    },

    /// An element count exceeds the largest supported index type
    #[error("Tensor of {size} elements exceeds the supported index width")]
    IndexExceeded {
        /// The element count that overflowed
        size: usize,
    },

    /// The caller-provided workspace is too small
    #[error("Insufficient workspace: {required} elements required, {available} available")]
    InsufficientWorkspace {
        /// Minimum number of elements needed
        required: usize,
        /// Number of elements provided
        available: usize,
    },

    /// Scratch allocation failed
    #[error("Failed to allocate {size} elements of scratch memory")]
    AllocationProblem {
        /// Requested element count
        size: usize,
    },

    /// Invalid parameter provided to a launch
    #[error("Invalid parameter '{arg}': {reason}")]
    InvalidParameter {
        /// The parameter name
        arg: &'static str,
        /// Reason for invalidity
        reason: String,
    },

    /// Backend-specific error
    #[error("Backend error: {0}")]
    Backend(String),
}

impl Error {
    /// Create an invalid algorithm error
    pub fn invalid_algorithm(algorithm: Algorithm, reason: impl Into<String>) -> Self {
        Self::InvalidAlgorithm {
            algorithm,
            reason: reason.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(arg: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            arg,
            reason: reason.into(),
        }
    }

    /// The status code reported for this error
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidAlgorithm { .. } => StatusCode::InvalidAlgorithm,
            Self::IndexExceeded { .. } => StatusCode::IndexExceeded,
            Self::InsufficientWorkspace { .. } => StatusCode::InsufficientWorkspace,
            Self::AllocationProblem { .. } => StatusCode::AllocationProblem,
            Self::InvalidParameter { .. } => StatusCode::InvalidParameter,
            Self::Backend(_) => StatusCode::BackendError,
        }
    }
}
