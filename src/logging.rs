//! Minimal log sink abstraction consumed by the core. The host application
//! owns the real logging story; the core only ever calls through this trait
//! with an already-formatted string.

use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// A destination for core log lines. No formatting contract beyond "already
/// a string" — implementors just forward it.
pub trait LogSink: Send + Sync {
    fn info(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

struct NullSink;

impl LogSink for NullSink {}

lazy_static! {
    static ref CURRENT: RwLock<Arc<dyn LogSink>> = RwLock::new(Arc::new(NullSink));
}

/// Install `sink` as the process-wide logger. Dropping the returned handle
/// restores the no-op sink, mirroring the cursor handle's scoped-release idiom.
pub fn set_logger(sink: Arc<dyn LogSink>) -> LoggerHandle {
    *CURRENT.write() = sink;
    LoggerHandle { _private: () }
}

/// RAII handle returned by [`set_logger`]. Restores the no-op sink on drop.
pub struct LoggerHandle {
    _private: (),
}

impl Drop for LoggerHandle {
    fn drop(&mut self) {
        *CURRENT.write() = Arc::new(NullSink);
    }
}

pub(crate) fn log_info(message: &str) {
    CURRENT.read().info(message);
}

pub(crate) fn log_warn(message: &str) {
    CURRENT.read().warn(message);
}

pub(crate) fn log_error(message: &str) {
    CURRENT.read().error(message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        infos: AtomicUsize,
    }

    impl LogSink for CountingSink {
        fn info(&self, _message: &str) {
            self.infos.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    #[serial_test::serial(logging)]
    fn default_sink_is_a_silent_no_op() {
        // Must not panic even though nothing is installed.
        log_info("hello");
        log_warn("hello");
        log_error("hello");
    }

    #[test]
    #[serial_test::serial(logging)]
    fn installed_sink_receives_calls_until_handle_drops() {
        let sink = Arc::new(CountingSink { infos: AtomicUsize::new(0) });
        {
            let _handle = set_logger(sink.clone());
            log_info("one");
            log_info("two");
        }
        assert_eq!(sink.infos.load(Ordering::SeqCst), 2);

        // Handle dropped: logger reverts to the no-op sink, counter stays put.
        log_info("three");
        assert_eq!(sink.infos.load(Ordering::SeqCst), 2);
    }
}
