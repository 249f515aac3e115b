//! Process-wide configuration: the event queue name and the trace-disabled
//! flag. Both are read on every `publish` and are meant to be set once,
//! before the first producer or consumer is built in the process.

use std::sync::atomic::{AtomicBool, Ordering};

use lazy_static::lazy_static;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use crate::logging::log_warn;

fn default_event_queue_name() -> String {
    let mut hasher = Sha256::new();
    hasher.update(env!("CARGO_PKG_NAME").as_bytes());
    hasher.update(env!("CARGO_PKG_VERSION").as_bytes());
    let digest = hasher.finalize();

    let mut suffix = String::with_capacity(8);
    for byte in &digest[..4] {
        suffix.push_str(&format!("{byte:02x}"));
    }
    format!("/ringtrace-{suffix}-events")
}

lazy_static! {
    static ref EVENT_QUEUE_NAME: RwLock<String> = RwLock::new(default_event_queue_name());
}

static TRACE_DISABLED: AtomicBool = AtomicBool::new(false);
static NAME_LOCKED: AtomicBool = AtomicBool::new(false);

/// Process-wide configuration record, mirrored by free functions for
/// ergonomic use from the producer/consumer builders.
pub struct Config;

impl Config {
    /// Current event queue name. Defaults to a name derived from the crate's
    /// own package identity so two unrelated processes that never call
    /// `set_event_queue_name` still agree with each other.
    pub fn event_queue_name() -> String {
        EVENT_QUEUE_NAME.read().clone()
    }

    /// Set the event queue name. Intended to be called once, before the
    /// first producer/consumer is built; later calls are accepted but
    /// logged as a warning since anything already attached keeps the old name.
    pub fn set_event_queue_name(name: impl Into<String>) {
        if NAME_LOCKED.swap(true, Ordering::SeqCst) {
            log_warn("set_event_queue_name called after first use; name is unchanged");
            return;
        }
        *EVENT_QUEUE_NAME.write() = name.into();
    }

    pub fn is_trace_disabled() -> bool {
        TRACE_DISABLED.load(Ordering::SeqCst)
    }

    pub fn disable_trace() {
        TRACE_DISABLED.store(true, Ordering::SeqCst);
    }

    pub fn enable_trace() {
        TRACE_DISABLED.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_name_has_the_expected_shape() {
        let name = default_event_queue_name();
        assert!(name.starts_with("/ringtrace-"));
        assert!(name.ends_with("-events"));
    }

    #[test]
    #[serial_test::serial(event_queue_name)]
    fn set_event_queue_name_is_a_no_op_after_the_first_call() {
        Config::set_event_queue_name("/first-name");
        assert_eq!(Config::event_queue_name(), "/first-name");

        Config::set_event_queue_name("/second-name");
        assert_eq!(
            Config::event_queue_name(),
            "/first-name",
            "a second call must leave the already-locked name unchanged"
        );
    }

    #[test]
    #[serial_test::serial(trace_flag)]
    fn enable_disable_round_trips() {
        Config::enable_trace();
        assert!(!Config::is_trace_disabled());
        Config::disable_trace();
        assert!(Config::is_trace_disabled());
        Config::enable_trace();
    }
}
