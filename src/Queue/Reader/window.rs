//! Bounded, chronologically-ordered priority queue with a sliding horizon
//! between the oldest and newest observed timestamps. The ring guarantees
//! nothing about cross-producer ordering; this is what turns several
//! concurrently-draining readers into one chronological stream.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use parking_lot::{Condvar, Mutex};

use crate::error::{Error, Status};

struct Entry<T> {
    timestamp_ns: i64,
    seq: u64,
    value: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp_ns == other.timestamp_ns && self.seq == other.seq
    }
}
impl<T> Eq for Entry<T> {}
impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.timestamp_ns, self.seq).cmp(&(other.timestamp_ns, other.seq))
    }
}

struct Inner<T> {
    heap: BinaryHeap<Reverse<Entry<T>>>,
    lower: Option<i64>,
    upper: i64,
    closed: bool,
    next_seq: u64,
}

/// A min-heap of `(timestamp_ns, value)` bounded so the gap between the
/// oldest and newest timestamps ever observed never exceeds `max_window`,
/// and pops only proceed once that gap reaches `min_window` — trading
/// latency for a stable chronological horizon.
pub struct WindowQueue<T> {
    inner: Mutex<Inner<T>>,
    not_full: Condvar,
    not_empty: Condvar,
    min_window: i64,
    max_window: i64,
}

impl<T> WindowQueue<T> {
    pub fn new(min_window: i64, max_window: i64) -> Self {
        WindowQueue {
            inner: Mutex::new(Inner {
                heap: BinaryHeap::new(),
                lower: None,
                upper: 0,
                closed: false,
                next_seq: 0,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            min_window,
            max_window,
        }
    }

    /// Blocks while `upper - lower > max_window` would hold after insertion.
    /// Fails `OutOfOrder` if `timestamp_ns` is below the current lower
    /// bound, `Closed` if the queue has been closed.
    pub fn push(&self, timestamp_ns: i64, value: T) -> Status<()> {
        let mut guard = self.inner.lock();
        loop {
            if guard.closed {
                return Err(Error::Closed);
            }
            if let Some(lower) = guard.lower {
                if timestamp_ns < lower {
                    return Err(Error::OutOfOrder {
                        timestamp_ns,
                        lower_ns: lower,
                    });
                }
                if guard.upper.max(timestamp_ns) - lower <= self.max_window {
                    break;
                }
            } else {
                break;
            }
            self.not_full.wait(&mut guard);
        }
        self.insert(&mut guard, timestamp_ns, value);
        self.not_empty.notify_all();
        Ok(())
    }

    /// Non-blocking variant of [`push`](Self::push): returns `Full` instead
    /// of waiting when the insertion would widen the window past
    /// `max_window`.
    pub fn try_push(&self, timestamp_ns: i64, value: T) -> Status<()> {
        let mut guard = self.inner.lock();
        if guard.closed {
            return Err(Error::Closed);
        }
        if let Some(lower) = guard.lower {
            if timestamp_ns < lower {
                return Err(Error::OutOfOrder {
                    timestamp_ns,
                    lower_ns: lower,
                });
            }
            if guard.upper.max(timestamp_ns) - lower > self.max_window {
                return Err(Error::Full);
            }
        }
        self.insert(&mut guard, timestamp_ns, value);
        self.not_empty.notify_all();
        Ok(())
    }

    fn insert(&self, guard: &mut Inner<T>, timestamp_ns: i64, value: T) {
        let seq = guard.next_seq;
        guard.next_seq += 1;
        match guard.lower {
            Some(_) => guard.upper = guard.upper.max(timestamp_ns),
            None => {
                guard.lower = Some(timestamp_ns);
                guard.upper = timestamp_ns;
            }
        }
        guard.heap.push(Reverse(Entry {
            timestamp_ns,
            seq,
            value,
        }));
    }

    /// Blocks while `upper - lower < min_window` and the queue is open.
    /// Returns the smallest-timestamp entry; `lower` advances to the popped
    /// timestamp. Returns `Closed` once closed and drained.
    pub fn pop(&self) -> Status<(i64, T)> {
        let mut guard = self.inner.lock();
        loop {
            let width = guard.lower.map(|l| guard.upper - l).unwrap_or(0);
            if !guard.heap.is_empty() && (width >= self.min_window || guard.closed) {
                break;
            }
            if guard.closed && guard.heap.is_empty() {
                return Err(Error::Closed);
            }
            self.not_empty.wait(&mut guard);
        }
        let entry = guard.heap.pop().expect("checked non-empty above").0;
        guard.lower = Some(entry.timestamp_ns);
        self.not_full.notify_all();
        Ok((entry.timestamp_ns, entry.value))
    }

    /// Non-blocking variant of [`pop`](Self::pop): returns `Empty` instead
    /// of waiting when the window hasn't reached `min_window` yet (and the
    /// queue isn't closed).
    pub fn try_pop(&self) -> Status<(i64, T)> {
        let mut guard = self.inner.lock();
        let width = guard.lower.map(|l| guard.upper - l).unwrap_or(0);
        if guard.heap.is_empty() {
            return if guard.closed { Err(Error::Closed) } else { Err(Error::Empty) };
        }
        if width < self.min_window && !guard.closed {
            return Err(Error::Empty);
        }
        let entry = guard.heap.pop().expect("checked non-empty above").0;
        guard.lower = Some(entry.timestamp_ns);
        self.not_full.notify_all();
        Ok((entry.timestamp_ns, entry.value))
    }

    /// Wake all waiters. After this, pushes fail `Closed`; pops drain
    /// whatever remains and then fail `Closed`.
    pub fn close(&self) {
        {
            let mut guard = self.inner.lock();
            guard.closed = true;
        }
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
