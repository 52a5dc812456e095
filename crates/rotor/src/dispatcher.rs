//! Round-robin slot selection

use crate::error::{PoolError, Result};

/// Rotating cursor over a fixed number of slots
///
/// Selection is purely positional: the k-th call returns `(k - 1) % size`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dispatcher {
    cursor: usize,
    size: usize,
}

impl Dispatcher {
    /// Cursor over `size` slots, starting at slot 0
    pub fn new(size: usize) -> Self {
        Self { cursor: 0, size }
    }

    /// Slot the next call to [`Dispatcher::next_slot`] will return
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Take the slot under the cursor and advance with wraparound
    pub fn next_slot(&mut self) -> Result<usize> {
        if self.size == 0 {
            return Err(PoolError::PoolNotReady);
        }
        let slot = self.cursor;
        self.cursor = if slot + 1 < self.size { slot + 1 } else { 0 };
        Ok(slot)
    }
}
