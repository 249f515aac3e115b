//! The producer half of the transport: turns a type/category/name/args
//! tuple into a framed, self-describing trace record written into the ring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Status;
use crate::Core::alloc::Allocator;
use crate::Config;

use super::Record::event::{EventType, MutableEventView};
use super::Record::Arg;

fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}

#[cfg(target_os = "linux")]
fn current_tid() -> i32 {
    unsafe { libc::gettid() }
}

#[cfg(not(target_os = "linux"))]
fn current_tid() -> i32 {
    0
}

/// Publishes trace records into a named ring. Cheap to clone (shares the
/// underlying allocator); safe to call `publish` from any number of threads.
pub struct Producer {
    allocator: Arc<Allocator>,
    counter: AtomicU64,
}

impl Producer {
    pub(crate) fn new(allocator: Arc<Allocator>) -> Self {
        Producer {
            allocator,
            counter: AtomicU64::new(0),
        }
    }

    /// Encode and publish one trace record. A no-op returning `Ok(())`
    /// while [`Config::is_trace_disabled`] is set. Returns `Full` if the
    /// ring has no room or the producer cursor pool is saturated; this is
    /// the normal backpressure signal, not an error to retry aggressively.
    pub fn publish(&self, event_type: EventType, category: u8, name: &str, args: &[Arg]) -> Status<()> {
        if Config::is_trace_disabled() {
            return Ok(());
        }

        let storage_size = MutableEventView::storage_size(name, args);
        let guard = self.allocator.reserve_write(storage_size as u32)?;

        let counter = self.counter.fetch_add(1, Ordering::Relaxed);
        let mut view = MutableEventView::new(
            guard,
            event_type,
            category,
            counter,
            now_ns(),
            std::process::id() as i32,
            current_tid(),
            name,
        );
        for arg in args {
            view.append(arg);
        }
        Ok(())
    }
}
