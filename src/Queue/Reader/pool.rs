//! A small pool of polling worker threads that drain the ring buffer and
//! feed parsed records into a shared [`WindowQueue`], giving callers one
//! chronological stream regardless of how many workers are pulling frames
//! off the allocator concurrently.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::Error;
use crate::logging::log_warn;
use crate::Core::alloc::Allocator;
use crate::Queue::Record::EventView;

use super::window::WindowQueue;

/// Spawns `num_consumers` worker threads against a shared [`Allocator`];
/// each parses frames into [`EventView`]s and pushes them into a common
/// [`WindowQueue`]. A worker exits once it has found nothing to read for
/// `idle_timeout`; the last worker to exit closes the queue so iteration
/// over [`RecordIter`] terminates.
pub struct ReaderPool {
    queue: Arc<WindowQueue<EventView>>,
    workers: Vec<JoinHandle<()>>,
    out_of_order_drops: Arc<AtomicUsize>,
}

impl ReaderPool {
    pub fn spawn(
        allocator: Arc<Allocator>,
        num_consumers: usize,
        min_window: i64,
        max_window: i64,
        idle_timeout: Duration,
        polling_interval: Duration,
    ) -> Self {
        let queue = Arc::new(WindowQueue::new(min_window, max_window));
        let active = Arc::new(AtomicUsize::new(num_consumers.max(1)));
        let out_of_order_drops = Arc::new(AtomicUsize::new(0));
        let mut workers = Vec::with_capacity(num_consumers.max(1));

        for _ in 0..num_consumers.max(1) {
            let allocator = Arc::clone(&allocator);
            let queue = Arc::clone(&queue);
            let active = Arc::clone(&active);
            let out_of_order_drops = Arc::clone(&out_of_order_drops);
            let polling_interval = polling_interval;
            workers.push(thread::spawn(move || {
                run_worker(&allocator, &queue, idle_timeout, polling_interval, &out_of_order_drops);
                if active.fetch_sub(1, Ordering::SeqCst) == 1 {
                    queue.close();
                }
            }));
        }

        ReaderPool {
            queue,
            workers,
            out_of_order_drops,
        }
    }

    /// Turn the pool into a blocking iterator over chronologically-ordered
    /// records. Dropping the iterator joins the worker threads.
    pub fn into_iter(self) -> RecordIter {
        RecordIter {
            queue: self.queue,
            workers: self.workers,
            out_of_order_drops: self.out_of_order_drops,
        }
    }

    pub fn close(&self) {
        self.queue.close();
    }

    /// Count of records dropped because they arrived below the window's
    /// lower bound (`OutOfOrder`), accumulated across every worker.
    pub fn out_of_order_drops(&self) -> usize {
        self.out_of_order_drops.load(Ordering::Relaxed)
    }
}

impl Drop for ReaderPool {
    fn drop(&mut self) {
        self.queue.close();
        for w in self.workers.drain(..) {
            let _ = w.join();
        }
    }
}

fn run_worker(
    allocator: &Allocator,
    queue: &WindowQueue<EventView>,
    idle_timeout: Duration,
    polling_interval: Duration,
    out_of_order_drops: &AtomicUsize,
) {
    let mut idle_since = Instant::now();
    loop {
        match allocator.reserve_read() {
            Ok(guard) => {
                idle_since = Instant::now();
                let bytes = guard.to_vec();
                drop(guard);
                match EventView::parse(&bytes) {
                    Ok(view) => {
                        let timestamp_ns = view.timestamp_ns();
                        // `OutOfOrder` means this one record arrived too late
                        // for the window; drop it and keep draining. Only
                        // `Closed` (the queue shutting down) ends the worker.
                        match queue.push(timestamp_ns, view) {
                            Ok(()) => {}
                            Err(Error::OutOfOrder { .. }) => {
                                out_of_order_drops.fetch_add(1, Ordering::Relaxed);
                                log_warn("dropping a trace record that arrived below the window's lower bound");
                            }
                            Err(_closed) => return,
                        }
                    }
                    Err(e) => log_warn(&format!("dropping an unparseable trace record: {e}")),
                }
            }
            Err(Error::Empty) => {
                if idle_since.elapsed() >= idle_timeout {
                    return;
                }
                thread::sleep(polling_interval);
            }
            Err(e) => {
                log_warn(&format!("reader worker retrying after an allocator error: {e}"));
                thread::sleep(polling_interval);
            }
        }
    }
}

/// Blocking iterator over a [`ReaderPool`]'s chronologically-merged output.
/// Yields `None` once every worker has gone idle past its timeout and the
/// queue has drained.
pub struct RecordIter {
    queue: Arc<WindowQueue<EventView>>,
    workers: Vec<JoinHandle<()>>,
    out_of_order_drops: Arc<AtomicUsize>,
}

impl RecordIter {
    pub fn close(&self) {
        self.queue.close();
    }

    /// Count of records dropped because they arrived below the window's
    /// lower bound (`OutOfOrder`), accumulated across every worker.
    pub fn out_of_order_drops(&self) -> usize {
        self.out_of_order_drops.load(Ordering::Relaxed)
    }
}

impl Iterator for RecordIter {
    type Item = EventView;

    fn next(&mut self) -> Option<Self::Item> {
        match self.queue.pop() {
            Ok((_, record)) => Some(record),
            Err(_) => None,
        }
    }
}

impl Drop for RecordIter {
    fn drop(&mut self) {
        self.queue.close();
        for w in self.workers.drain(..) {
            let _ = w.join();
        }
    }
}
