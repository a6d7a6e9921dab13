//! Ordering the launches of a multi-phase algorithm

use crate::backend::Backend;
use crate::error::{Error, Result};
use smallvec::SmallVec;

/// The completion tokens the next launch must wait for
pub(crate) struct EventChain<B: Backend> {
    pending: SmallVec<[B::Event; 4]>,
}

impl<B: Backend> EventChain<B> {
    /// Start a chain that waits for `depends_on`
    pub fn new(depends_on: &[B::Event]) -> Self {
        Self {
            pending: depends_on.iter().cloned().collect(),
        }
    }

    /// Tokens the next launch depends on
    pub fn deps(&self) -> &[B::Event] {
        &self.pending
    }

    /// Make `event` the only dependency of the next launch
    pub fn then(&mut self, event: B::Event) {
        self.pending.clear();
        self.pending.push(event);
    }

    /// The token of the last launch
    pub fn finish(mut self) -> Result<B::Event> {
        self.pending
            .pop()
            .ok_or_else(|| Error::Backend("no launch was enqueued".to_string()))
    }
}
