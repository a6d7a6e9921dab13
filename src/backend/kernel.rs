//! Kernel traits run by a backend

use crate::dtype::Element;

/// A flat kernel: one call per work item.
///
/// Items of one launch are independent and write disjoint outputs, so a
/// backend may run them in any order and in parallel.
pub trait Kernel: Sync {
    /// Run work item `item`
    fn run(&self, item: usize);
}

/// Work-group decomposition of an nd-range launch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NdRange {
    /// Number of work-groups
    pub groups: usize,
    /// Items per work-group; a power of two
    pub local_size: usize,
}

/// A kernel whose items cooperate within a work-group.
///
/// `run_group` executes every item of `group`. Items share `scratch`, which
/// holds one slot per item; the body sequences its phases so that the end of
/// each phase acts as a group barrier.
pub trait GroupKernel: Sync {
    /// Element type of the shared scratch buffer
    type Scratch: Element;

    /// Run all items of work-group `group`
    fn run_group(&self, group: usize, scratch: &mut [Self::Scratch]);
}
