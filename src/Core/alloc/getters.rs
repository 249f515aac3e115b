use super::*;

/// Read-only introspection used by debug formatting and tests: nothing here
/// is needed on the hot publish/consume path.
impl Allocator {
    /// Capacity of the data region in bytes, excluding the control area.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// This process's liveness threshold for judging a peer's cursor slot
    /// abandoned.
    pub fn cursor_timeout_ns(&self) -> u64 {
        self.cursor_timeout_ns
    }

    /// Retry budget for a single reserve call before it gives up with
    /// `Full`/`Empty`.
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Current write head, mostly useful for tests and metrics.
    pub fn write_head(&self) -> Position {
        self.control().write_head.load(Ordering::SeqCst)
    }

    /// Current read head.
    pub fn read_head(&self) -> Position {
        self.control().read_head.load(Ordering::SeqCst)
    }

    /// Raw handle to the underlying OS shared-memory object, if callers need
    /// it (e.g. to assert on file descriptor counts in tests).
    pub fn raw_handle(&self) -> crate::Core::SharedMemory::RawHandle {
        self.shm.raw_handle()
    }
}
