//! Fluent builders that resolve a named shared region into an [`Allocator`]
//! and hand back a [`Producer`] or [`Consumer`]. Mirrors the channel
//! builder's attach-or-create idiom, generalised from a fixed channel id to
//! an arbitrarily named trace queue.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use crate::Config;
use crate::Core::alloc::Allocator;

use super::{Consumer, Producer};

const DEFAULT_BUFFER_SIZE: usize = 64 * 1024 * 1024;
const DEFAULT_CURSOR_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_MAX_ATTEMPTS: usize = 8;

pub struct ProducerBuilder {
    name: Option<String>,
    buffer_size: usize,
    cursor_timeout: Duration,
    max_attempts: usize,
}

impl Default for ProducerBuilder {
    fn default() -> Self {
        ProducerBuilder {
            name: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
            cursor_timeout: DEFAULT_CURSOR_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ProducerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the queue name. Defaults to [`Config::event_queue_name`].
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn with_cursor_timeout(mut self, timeout: Duration) -> Self {
        self.cursor_timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Attach to the named region if it already exists; otherwise create it.
    pub fn build(self) -> io::Result<Producer> {
        let name = self.name.unwrap_or_else(Config::event_queue_name);
        let timeout_ns = self.cursor_timeout.as_nanos() as u64;
        let allocator = match Allocator::attach(&name, self.buffer_size, timeout_ns, self.max_attempts) {
            Ok(allocator) => allocator,
            Err(_) => Allocator::open_or_create(&name, self.buffer_size, timeout_ns, self.max_attempts)?,
        };
        Ok(Producer::new(Arc::new(allocator)))
    }
}

pub struct ConsumerBuilder {
    name: Option<String>,
    buffer_size: usize,
    cursor_timeout: Duration,
    max_attempts: usize,
}

impl Default for ConsumerBuilder {
    fn default() -> Self {
        ConsumerBuilder {
            name: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
            cursor_timeout: DEFAULT_CURSOR_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ConsumerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn with_cursor_timeout(mut self, timeout: Duration) -> Self {
        self.cursor_timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Attach to an existing named region. Fails if no producer has created
    /// it yet.
    pub fn build(self) -> io::Result<Consumer> {
        let name = self.name.unwrap_or_else(Config::event_queue_name);
        let timeout_ns = self.cursor_timeout.as_nanos() as u64;
        let allocator = Allocator::attach(&name, self.buffer_size, timeout_ns, self.max_attempts)?;
        Ok(Consumer::new(Arc::new(allocator)))
    }
}
