//! Row-parallel matrix product used by the CPU backend

use crate::backend::{BatchStrides, Kernel, MatmulParams, ReadMem, WriteMem};
use crate::dtype::Element;

/// One work item per output row across the whole batch
pub(super) struct MatmulRows<T> {
    pub lhs: ReadMem<T>,
    pub rhs: ReadMem<T>,
    pub out: WriteMem<T>,
    pub params: MatmulParams,
    pub strides: BatchStrides,
}

impl<T: Element> MatmulRows<T> {
    /// Work items needed to cover every output row
    pub fn range(&self) -> usize {
        self.strides.batch * self.params.m
    }

    /// Whether every matrix of the batch lies inside its buffer
    pub fn in_bounds(&self) -> bool {
        let MatmulParams { m, k, n, .. } = self.params;
        let last = self.strides.batch.saturating_sub(1);
        let fits = |stride: usize, size: usize, len: usize| {
            size == 0 || last * stride + size <= len
        };
        self.strides.batch == 0
            || (fits(self.strides.lhs, m * k, self.lhs.len())
                && fits(self.strides.rhs, k * n, self.rhs.len())
                && fits(self.strides.out, m * n, self.out.len()))
    }
}

impl<T: Element> Kernel for MatmulRows<T> {
    fn run(&self, item: usize) {
        let MatmulParams {
            m,
            k,
            n,
            transpose_lhs,
            transpose_rhs,
            accumulate,
        } = self.params;
        let batch = item / m;
        let row = item % m;

        let lhs = self.lhs.offset(batch * self.strides.lhs);
        let rhs = self.rhs.offset(batch * self.strides.rhs);
        let out = self.out.offset(batch * self.strides.out + row * n);

        // SAFETY: `in_bounds` was checked before launch and each item owns
        // one output row.
        unsafe {
            if !accumulate {
                for j in 0..n {
                    out.store(j, T::zero());
                }
            }

            // ikj order: contiguous walk over rhs rows
            for kk in 0..k {
                let a = if transpose_lhs {
                    lhs.load(kk * m + row)
                } else {
                    lhs.load(row * k + kk)
                };
                for j in 0..n {
                    let b = if transpose_rhs {
                        rhs.load(j * k + kk)
                    } else {
                        rhs.load(kk * n + j)
                    };
                    out.store(j, a.mad(b, out.load(j)));
                }
            }
        }
    }
}
