//! CPU queue and completion tokens

use crate::backend::CompletionToken;
use parking_lot::Mutex;
use std::sync::Arc;

/// In-order queue for the CPU backend.
///
/// Launches run when they are enqueued; the queue only numbers them.
#[derive(Clone, Debug, Default)]
pub struct CpuQueue {
    submitted: Arc<Mutex<u64>>,
}

impl CpuQueue {
    /// Create a new queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of launches submitted so far
    pub fn submitted(&self) -> u64 {
        *self.submitted.lock()
    }

    pub(crate) fn record(&self) -> CpuEvent {
        let mut submitted = self.submitted.lock();
        *submitted += 1;
        CpuEvent { id: *submitted }
    }
}

/// Token of a finished CPU launch
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CpuEvent {
    id: u64,
}

impl CpuEvent {
    /// Position of the launch in its queue, starting at 1
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl CompletionToken for CpuEvent {
    fn wait(&self) {
        // CPU launches are synchronous, nothing to do
    }

    fn is_complete(&self) -> bool {
        true
    }
}
