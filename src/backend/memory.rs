//! Untracked views of device memory

use std::fmt;
use std::marker::PhantomData;

/// Read-only view of `len` elements of device memory.
///
/// Views are plain handles: copying one does not copy data, and the view
/// does not keep the memory alive.
pub struct ReadMem<T> {
    ptr: *const T,
    len: usize,
    _marker: PhantomData<T>,
}

/// Writable view of `len` elements of device memory.
///
/// Work items of one launch write disjoint elements through copies of the
/// same view.
pub struct WriteMem<T> {
    ptr: *mut T,
    len: usize,
    _marker: PhantomData<T>,
}

// SAFETY: views are device pointers shared by work items; the launch that
// uses them guarantees disjoint writes and keeps the memory alive.
unsafe impl<T: Send + Sync> Send for ReadMem<T> {}
unsafe impl<T: Send + Sync> Sync for ReadMem<T> {}
unsafe impl<T: Send + Sync> Send for WriteMem<T> {}
unsafe impl<T: Send + Sync> Sync for WriteMem<T> {}

impl<T> Clone for ReadMem<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ReadMem<T> {}

impl<T> Clone for WriteMem<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for WriteMem<T> {}

impl<T> fmt::Debug for ReadMem<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadMem")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

impl<T> fmt::Debug for WriteMem<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteMem")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

impl<T: Copy> ReadMem<T> {
    /// View over a host slice
    pub fn from_slice(data: &[T]) -> Self {
        Self {
            ptr: data.as_ptr(),
            len: data.len(),
            _marker: PhantomData,
        }
    }

    /// Number of elements in view
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the view is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The view starting `count` elements further on
    pub fn offset(self, count: usize) -> Self {
        debug_assert!(count <= self.len, "offset {count} past end {}", self.len);
        let count = count.min(self.len);
        Self {
            // SAFETY: `count <= len`, so the pointer stays in (or one past) the buffer
            ptr: unsafe { self.ptr.add(count) },
            len: self.len - count,
            _marker: PhantomData,
        }
    }

    /// Read element `index`.
    ///
    /// # Safety
    ///
    /// `index < len` and the memory is alive and not being written.
    #[inline]
    pub unsafe fn load(&self, index: usize) -> T {
        debug_assert!(index < self.len, "load {index} out of {}", self.len);
        unsafe { *self.ptr.add(index) }
    }
}

impl<T: Copy> WriteMem<T> {
    /// View over a mutable host slice
    pub fn from_slice_mut(data: &mut [T]) -> Self {
        Self {
            ptr: data.as_mut_ptr(),
            len: data.len(),
            _marker: PhantomData,
        }
    }

    /// Number of elements in view
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the view is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The view starting `count` elements further on
    pub fn offset(self, count: usize) -> Self {
        debug_assert!(count <= self.len, "offset {count} past end {}", self.len);
        let count = count.min(self.len);
        Self {
            // SAFETY: `count <= len`, so the pointer stays in (or one past) the buffer
            ptr: unsafe { self.ptr.add(count) },
            len: self.len - count,
            _marker: PhantomData,
        }
    }

    /// A read-only view of the same memory, for a later phase that consumes
    /// what this one produced
    pub fn as_read(self) -> ReadMem<T> {
        ReadMem {
            ptr: self.ptr,
            len: self.len,
            _marker: PhantomData,
        }
    }

    /// Read element `index`.
    ///
    /// # Safety
    ///
    /// `index < len` and no other work item writes this element.
    #[inline]
    pub unsafe fn load(&self, index: usize) -> T {
        debug_assert!(index < self.len, "load {index} out of {}", self.len);
        unsafe { *self.ptr.add(index) }
    }

    /// Write element `index`.
    ///
    /// # Safety
    ///
    /// `index < len` and no other work item touches this element.
    #[inline]
    pub unsafe fn store(&self, index: usize, value: T) {
        debug_assert!(index < self.len, "store {index} out of {}", self.len);
        unsafe { *self.ptr.add(index) = value }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_views() {
        let mut data = [1.0f32, 2.0, 3.0, 4.0];
        let out = WriteMem::from_slice_mut(&mut data);
        let tail = out.offset(2);
        assert_eq!(tail.len(), 2);
        unsafe {
            tail.store(1, 9.0);
            assert_eq!(out.as_read().load(3), 9.0);
        }
        assert!(ReadMem::from_slice(&data).offset(4).is_empty());
    }
}
