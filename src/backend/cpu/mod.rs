//! Host CPU backend
//!
//! Launches execute synchronously on the calling thread (spread over the
//! rayon pool when the `rayon` feature is on) and return tokens that are
//! already complete.

mod backend;
mod matmul;
mod queue;

pub use backend::{CpuBackend, CpuConfig};
pub use queue::{CpuEvent, CpuQueue};
