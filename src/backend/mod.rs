//! Backend abstraction consumed by the convolution launchers
//!
//! A backend owns queues and device memory and runs three kinds of work:
//! flat kernels ([`Kernel`]), work-group kernels ([`GroupKernel`]) and
//! (batched) matrix products. Every launch takes the completion tokens it
//! must wait for and returns its own token, so a launcher can chain the
//! phases of an algorithm without blocking.

mod kernel;
mod memory;

#[cfg(feature = "cpu")]
pub mod cpu;

pub use kernel::{GroupKernel, Kernel, NdRange};
pub use memory::{ReadMem, WriteMem};

use crate::dtype::Element;
use crate::error::Result;

/// Completion token for an enqueued launch
pub trait CompletionToken: Clone + Send + Sync {
    /// Block until the launch has finished
    fn wait(&self);

    /// Whether the launch has finished
    fn is_complete(&self) -> bool;
}

/// Shape of a matrix product `out = op(lhs) x op(rhs)`.
///
/// `op(lhs)` is `m x k` and `op(rhs)` is `k x n`. A transposed operand is
/// stored as the transpose of its logical shape, row-major and contiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatmulParams {
    /// Rows of the product
    pub m: usize,
    /// Reduction length
    pub k: usize,
    /// Columns of the product
    pub n: usize,
    /// `lhs` is stored as `k x m`
    pub transpose_lhs: bool,
    /// `rhs` is stored as `n x k`
    pub transpose_rhs: bool,
    /// Add the product to `out` (beta = 1) instead of overwriting it
    pub accumulate: bool,
}

impl MatmulParams {
    /// A plain `m x k` by `k x n` product that overwrites its output
    pub fn new(m: usize, k: usize, n: usize) -> Self {
        Self {
            m,
            k,
            n,
            transpose_lhs: false,
            transpose_rhs: false,
            accumulate: false,
        }
    }

    /// Read `lhs` transposed
    pub fn transpose_lhs(mut self, transpose: bool) -> Self {
        self.transpose_lhs = transpose;
        self
    }

    /// Read `rhs` transposed
    pub fn transpose_rhs(mut self, transpose: bool) -> Self {
        self.transpose_rhs = transpose;
        self
    }

    /// Accumulate into the output
    pub fn accumulate(mut self, accumulate: bool) -> Self {
        self.accumulate = accumulate;
        self
    }
}

/// Element strides between consecutive products of a batched matmul
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchStrides {
    /// Number of products
    pub batch: usize,
    /// Distance between consecutive `lhs` matrices
    pub lhs: usize,
    /// Distance between consecutive `rhs` matrices
    pub rhs: usize,
    /// Distance between consecutive outputs
    pub out: usize,
}

/// A compute backend: queues, device buffers and kernel execution.
///
/// # Memory
///
/// [`ReadMem`] and [`WriteMem`] are untracked views. A caller must keep the
/// underlying buffers alive and unaliased until the token returned by the
/// launch that uses them has completed.
pub trait Backend: Clone + Send + Sync + 'static {
    /// Queue that orders launches
    type Queue: Clone + Send + Sync;

    /// Completion token returned by every launch
    type Event: CompletionToken;

    /// Human-readable name of this backend
    fn name() -> &'static str;

    /// The queue launches are submitted to
    fn get_queue(&self) -> Self::Queue;

    /// Read-only device view of host data
    fn get_device_buffer<T: Element>(&self, data: &[T]) -> ReadMem<T>;

    /// Writable device view of host data
    fn get_device_buffer_mut<T: Element>(&self, data: &mut [T]) -> WriteMem<T>;

    /// Run `kernel` once for every item in `0..range`.
    fn enqueue<K: Kernel>(
        &self,
        queue: &Self::Queue,
        range: usize,
        kernel: &K,
        depends_on: &[Self::Event],
    ) -> Result<Self::Event>;

    /// Run `kernel` once for every work-group of `range`.
    fn enqueue_nd<K: GroupKernel>(
        &self,
        queue: &Self::Queue,
        range: NdRange,
        kernel: &K,
        depends_on: &[Self::Event],
    ) -> Result<Self::Event>;

    /// `strides.batch` independent products laid out at fixed strides.
    fn batch_matmul<T: Element>(
        &self,
        queue: &Self::Queue,
        lhs: ReadMem<T>,
        rhs: ReadMem<T>,
        out: WriteMem<T>,
        params: MatmulParams,
        strides: BatchStrides,
        depends_on: &[Self::Event],
    ) -> Result<Self::Event>;

    /// A single product.
    fn matmul<T: Element>(
        &self,
        queue: &Self::Queue,
        lhs: ReadMem<T>,
        rhs: ReadMem<T>,
        out: WriteMem<T>,
        params: MatmulParams,
        depends_on: &[Self::Event],
    ) -> Result<Self::Event> {
        let strides = BatchStrides {
            batch: 1,
            lhs: params.m * params.k,
            rhs: params.k * params.n,
            out: params.m * params.n,
        };
        self.batch_matmul(queue, lhs, rhs, out, params, strides, depends_on)
    }
}
