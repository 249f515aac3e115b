//! The consumer half of the transport: single-shot reads off the ring, plus
//! a multi-worker [`ReaderPool`] that reconstructs chronological order.

use std::sync::Arc;
use std::time::Duration;

use crate::error::Status;
use crate::Core::alloc::Allocator;

use super::Reader::{ReaderPool, RecordIter};
use super::Record::EventView;

/// Reads trace records off a named ring, either one at a time or via a
/// pooled, chronologically-ordered iterator.
pub struct Consumer {
    allocator: Arc<Allocator>,
}

impl Consumer {
    pub(crate) fn new(allocator: Arc<Allocator>) -> Self {
        Consumer { allocator }
    }

    /// Single-shot read: returns the next complete record, or `Empty` if
    /// none is available within the allocator's configured retry budget.
    pub fn read_trace_record(&self) -> Status<EventView> {
        let guard = self.allocator.reserve_read()?;
        let bytes = guard.to_vec();
        drop(guard);
        EventView::parse(&bytes)
    }

    /// Spawn `num_consumers` workers draining the ring into a sliding-window
    /// priority queue, and return a blocking iterator over the
    /// chronologically-ordered result. Workers poll every `polling_interval`
    /// and exit once they've been idle for `timeout`; once every worker has
    /// exited the iterator drains and then ends.
    pub fn reader(
        &self,
        timeout: Duration,
        polling_interval: Duration,
        num_consumers: usize,
        min_window_ns: i64,
        max_window_ns: i64,
    ) -> RecordIter {
        let pool = ReaderPool::spawn(
            Arc::clone(&self.allocator),
            num_consumers,
            min_window_ns,
            max_window_ns,
            timeout,
            polling_interval,
        );
        pool.into_iter()
    }
}
