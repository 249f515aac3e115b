use std::fmt;

use super::Allocator;

/// Kept as a standalone debug module (mirroring `Debug::StructDebug`) rather
/// than a derive, since the allocator holds a raw pointer into shared memory
/// that must never be dereferenced just to print it.
impl fmt::Debug for Allocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Allocator")
            .field("buffer_size", &self.buffer_size())
            .field("write_head", &self.write_head())
            .field("read_head", &self.read_head())
            .field("cursor_timeout_ns", &self.cursor_timeout_ns())
            .finish_non_exhaustive()
    }
}
