//! CPU implementation of [`Backend`]

use super::matmul::MatmulRows;
use super::queue::{CpuEvent, CpuQueue};
use crate::backend::{
    Backend, BatchStrides, CompletionToken, GroupKernel, Kernel, MatmulParams, NdRange, ReadMem,
    WriteMem,
};
use crate::dtype::Element;
use crate::error::{Error, Result};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// CPU backend configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuConfig {
    /// Minimum number of work items handed to one rayon task
    pub min_parallel_len: usize,
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            min_parallel_len: 64,
        }
    }
}

/// Backend running kernels on the host
#[derive(Clone, Debug, Default)]
pub struct CpuBackend {
    config: CpuConfig,
    queue: CpuQueue,
}

impl CpuBackend {
    /// Create a backend with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend with the given configuration
    pub fn with_config(config: CpuConfig) -> Self {
        Self {
            config,
            queue: CpuQueue::new(),
        }
    }

    fn wait_all(depends_on: &[CpuEvent]) {
        for event in depends_on {
            event.wait();
        }
    }

    #[cfg(feature = "rayon")]
    fn for_each_item(&self, range: usize, f: impl Fn(usize) + Sync + Send) {
        let min_len = self.config.min_parallel_len.max(1);
        if range <= min_len {
            (0..range).for_each(f);
        } else {
            (0..range).into_par_iter().with_min_len(min_len).for_each(f);
        }
    }

    #[cfg(not(feature = "rayon"))]
    fn for_each_item(&self, range: usize, f: impl Fn(usize) + Sync + Send) {
        (0..range).for_each(f);
    }
}

impl Backend for CpuBackend {
    type Queue = CpuQueue;
    type Event = CpuEvent;

    fn name() -> &'static str {
        "cpu"
    }

    fn get_queue(&self) -> CpuQueue {
        self.queue.clone()
    }

    fn get_device_buffer<T: Element>(&self, data: &[T]) -> ReadMem<T> {
        ReadMem::from_slice(data)
    }

    fn get_device_buffer_mut<T: Element>(&self, data: &mut [T]) -> WriteMem<T> {
        WriteMem::from_slice_mut(data)
    }

    fn enqueue<K: Kernel>(
        &self,
        queue: &CpuQueue,
        range: usize,
        kernel: &K,
        depends_on: &[CpuEvent],
    ) -> Result<CpuEvent> {
        Self::wait_all(depends_on);
        self.for_each_item(range, |item| kernel.run(item));
        Ok(queue.record())
    }

    fn enqueue_nd<K: GroupKernel>(
        &self,
        queue: &CpuQueue,
        range: NdRange,
        kernel: &K,
        depends_on: &[CpuEvent],
    ) -> Result<CpuEvent> {
        if !range.local_size.is_power_of_two() {
            return Err(Error::invalid_parameter(
                "local_size",
                format!("{} is not a power of two", range.local_size),
            ));
        }
        Self::wait_all(depends_on);
        let local_size = range.local_size;

        #[cfg(feature = "rayon")]
        (0..range.groups)
            .into_par_iter()
            .with_min_len(1)
            .for_each_init(
                || vec![K::Scratch::zero(); local_size],
                |scratch, group| kernel.run_group(group, scratch),
            );

        #[cfg(not(feature = "rayon"))]
        {
            let mut scratch = vec![K::Scratch::zero(); local_size];
            for group in 0..range.groups {
                kernel.run_group(group, &mut scratch);
            }
        }

        Ok(queue.record())
    }

    fn batch_matmul<T: Element>(
        &self,
        queue: &CpuQueue,
        lhs: ReadMem<T>,
        rhs: ReadMem<T>,
        out: WriteMem<T>,
        params: MatmulParams,
        strides: BatchStrides,
        depends_on: &[CpuEvent],
    ) -> Result<CpuEvent> {
        let kernel = MatmulRows {
            lhs,
            rhs,
            out,
            params,
            strides,
        };
        if !kernel.in_bounds() {
            return Err(Error::Backend(format!(
                "matmul {params:?} x {strides:?} does not fit buffers of {}, {} and {} elements",
                lhs.len(),
                rhs.len(),
                out.len()
            )));
        }
        if params.m == 0 || params.n == 0 {
            Self::wait_all(depends_on);
            return Ok(queue.record());
        }
        self.enqueue(queue, kernel.range(), &kernel, depends_on)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Square {
        out: WriteMem<f32>,
    }

    impl Kernel for Square {
        fn run(&self, item: usize) {
            unsafe { self.out.store(item, (item * item) as f32) }
        }
    }

    #[test]
    fn test_enqueue_runs_every_item() {
        let backend = CpuBackend::with_config(CpuConfig {
            min_parallel_len: 4,
        });
        let queue = backend.get_queue();
        let mut data = vec![0.0f32; 100];
        let kernel = Square {
            out: backend.get_device_buffer_mut(&mut data),
        };
        let event = backend.enqueue(&queue, 100, &kernel, &[]).unwrap();
        assert!(event.is_complete());
        assert_eq!(data[9], 81.0);
        assert_eq!(queue.submitted(), 1);
    }

    #[test]
    fn test_matmul_transposes() {
        let backend = CpuBackend::new();
        let queue = backend.get_queue();
        // [2,3] x [3,2]
        let a = [1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0];
        let b = [7.0f64, 8.0, 9.0, 10.0, 11.0, 12.0];
        let expected = [58.0, 64.0, 139.0, 154.0];

        let mut out = [0.0f64; 4];
        backend
            .matmul(
                &queue,
                ReadMem::from_slice(&a),
                ReadMem::from_slice(&b),
                WriteMem::from_slice_mut(&mut out),
                MatmulParams::new(2, 3, 2),
                &[],
            )
            .unwrap();
        assert_eq!(out, expected);

        // Same product with both operands stored transposed
        let at = [1.0f64, 4.0, 2.0, 5.0, 3.0, 6.0];
        let bt = [7.0f64, 9.0, 11.0, 8.0, 10.0, 12.0];
        let mut out_t = [1.0f64; 4];
        backend
            .matmul(
                &queue,
                ReadMem::from_slice(&at),
                ReadMem::from_slice(&bt),
                WriteMem::from_slice_mut(&mut out_t),
                MatmulParams::new(2, 3, 2)
                    .transpose_lhs(true)
                    .transpose_rhs(true)
                    .accumulate(true),
                &[],
            )
            .unwrap();
        assert_eq!(out_t, expected.map(|v| v + 1.0));
    }

    #[test]
    fn test_matmul_out_of_bounds() {
        let backend = CpuBackend::new();
        let a = [1.0f32; 4];
        let mut out = [0.0f32; 4];
        let err = backend
            .matmul(
                &backend.get_queue(),
                ReadMem::from_slice(&a),
                ReadMem::from_slice(&a),
                WriteMem::from_slice_mut(&mut out),
                MatmulParams::new(2, 3, 2),
                &[],
            )
            .unwrap_err();
        assert!(matches!(err, Error::Backend(_)));
    }
}
