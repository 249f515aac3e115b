//! Position markers and the producer/consumer cursor pools that track which
//! positions are currently "in flight" so a crashed peer can't stall the ring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::logging::log_warn;

const LOCATION_BITS: u32 = 63;
const LOCATION_MASK: u64 = (1u64 << LOCATION_BITS) - 1;
const PARITY_BIT: u64 = 1u64 << LOCATION_BITS;

/// A 64-bit position: a wrap-parity bit plus a 63-bit monotonically
/// increasing location. Ordering compares parity first, then location —
/// which is exactly what comparing the packed `u64` does, since parity
/// occupies the most significant bit.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Position(u64);

impl Position {
    pub const fn zero() -> Self {
        Position(0)
    }

    pub fn new(parity: bool, location: u64) -> Self {
        debug_assert!(location <= LOCATION_MASK, "location does not fit in 63 bits");
        Position(((parity as u64) << LOCATION_BITS) | (location & LOCATION_MASK))
    }

    pub fn parity(self) -> bool {
        self.0 & PARITY_BIT != 0
    }

    pub fn location(self) -> u64 {
        self.0 & LOCATION_MASK
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn from_raw(raw: u64) -> Self {
        Position(raw)
    }

    /// Physical offset of this position inside a buffer of `buffer_size` bytes.
    pub fn offset(self, buffer_size: usize) -> usize {
        (self.location() % buffer_size as u64) as usize
    }

    /// Advance by `delta` bytes, wrapping the location modulo 2^63 and
    /// toggling parity on wrap.
    pub fn advance(self, delta: u64) -> Position {
        let loc = self.location() + delta;
        if loc > LOCATION_MASK {
            Position::new(!self.parity(), loc - PARITY_BIT)
        } else {
            Position::new(self.parity(), loc)
        }
    }
}

impl std::fmt::Debug for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Position")
            .field("parity", &self.parity())
            .field("location", &self.location())
            .finish()
    }
}

/// Atomic storage for a [`Position`].
#[repr(transparent)]
pub struct AtomicPosition(AtomicU64);

impl AtomicPosition {
    pub fn new(pos: Position) -> Self {
        AtomicPosition(AtomicU64::new(pos.raw()))
    }

    pub fn load(&self, order: Ordering) -> Position {
        Position::from_raw(self.0.load(order))
    }

    pub fn store(&self, pos: Position, order: Ordering) {
        self.0.store(pos.raw(), order)
    }

    pub fn compare_exchange_weak(
        &self,
        current: Position,
        new: Position,
        success: Ordering,
        failure: Ordering,
    ) -> Result<Position, Position> {
        self.0
            .compare_exchange_weak(current.raw(), new.raw(), success, failure)
            .map(Position::from_raw)
            .map_err(Position::from_raw)
    }
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the unix epoch")
        .as_nanos() as u64
}

/// A single slot: a state word (0 = free, nonzero = `acquired_at_ns`) plus
/// the position the owner publishes while holding the slot.
///
/// This is `repr(C)` and trivially-copyable-by-construction so it can live
/// inside the shared-memory control area.
#[repr(C)]
pub struct CursorSlot {
    state: AtomicU64,
    position: AtomicPosition,
}

impl CursorSlot {
    pub const fn new() -> Self {
        CursorSlot {
            state: AtomicU64::new(0),
            position: AtomicPosition(AtomicU64::new(0)),
        }
    }

    fn is_live(&self, state: u64, timeout_ns: u64) -> bool {
        state != 0 && now_ns().saturating_sub(state) <= timeout_ns
    }

    /// Try to claim this slot. Returns the observed pre-claim state so the
    /// caller can decide whether it just raced a stale-release, plus the
    /// acquired-at timestamp on success.
    fn try_acquire(&self, timeout_ns: u64) -> Option<u64> {
        let observed = self.state.load(Ordering::SeqCst);
        if observed == 0 {
            let ts = now_ns().max(1);
            return self
                .state
                .compare_exchange(0, ts, Ordering::SeqCst, Ordering::SeqCst)
                .ok();
        }
        if !self.is_live(observed, timeout_ns) {
            // Stale: try to reclaim it for ourselves in one CAS.
            let ts = now_ns().max(1);
            if self
                .state
                .compare_exchange(observed, ts, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                log_warn("cursor pool reclaimed a stale slot past its liveness timeout");
                return Some(ts);
            }
        }
        None
    }

    fn release_if_unchanged(&self, acquired_state: u64) {
        let _ = self
            .state
            .compare_exchange(acquired_state, 0, Ordering::SeqCst, Ordering::SeqCst);
    }

    /// Opportunistically release this slot if it's expired. Returns whether
    /// the slot is currently live (after any such release).
    fn scan_release_if_stale(&self, timeout_ns: u64) -> bool {
        let observed = self.state.load(Ordering::SeqCst);
        if observed == 0 {
            return false;
        }
        if self.is_live(observed, timeout_ns) {
            return true;
        }
        let _ = self
            .state
            .compare_exchange(observed, 0, Ordering::SeqCst, Ordering::SeqCst);
        false
    }
}

impl Default for CursorSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// A bounded pool of `N` cursor slots, scanned in randomized order so load
/// spreads evenly across slots under contention.
///
/// Every field here is zero-valid, so a pool placed inside a memory-mapped
/// region needs no placement constructor: a freshly `ftruncate`d (hence
/// zeroed) region already holds an empty pool. The liveness timeout is
/// therefore a per-call parameter rather than pool-resident state — it's a
/// local policy each process applies when judging a peer's slot stale, not
/// shared ring state.
#[repr(C)]
pub struct CursorPool<const N: usize> {
    slots: [CursorSlot; N],
}

impl<const N: usize> CursorPool<N> {
    pub const fn new() -> Self {
        CursorPool {
            slots: [const { CursorSlot::new() }; N],
        }
    }

    /// Scan the pool up to `max_attempts` full sweeps, claiming the first
    /// free (or reclaimably-stale) slot found.
    pub fn acquire(&self, timeout_ns: u64, max_attempts: usize) -> Option<CursorHandle<'_, N>> {
        if N == 0 {
            return None;
        }
        for _ in 0..max_attempts.max(1) {
            let start = fastrand::usize(0..N);
            for i in 0..N {
                let idx = (start + i) % N;
                if let Some(acquired_state) = self.slots[idx].try_acquire(timeout_ns) {
                    return Some(CursorHandle {
                        pool: self,
                        index: idx,
                        acquired_state,
                    });
                }
            }
        }
        None
    }

    /// True if every live slot holds a position strictly less than `pos`.
    pub fn is_ahead(&self, pos: Position, timeout_ns: u64) -> bool {
        self.slots
            .iter()
            .all(|slot| !slot.scan_release_if_stale(timeout_ns) || slot.position.load(Ordering::SeqCst) < pos)
    }

    /// True if every live slot holds a position strictly greater than `pos`.
    pub fn is_behind(&self, pos: Position, timeout_ns: u64) -> bool {
        self.slots
            .iter()
            .all(|slot| !slot.scan_release_if_stale(timeout_ns) || slot.position.load(Ordering::SeqCst) > pos)
    }
}

impl<const N: usize> Default for CursorPool<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped, movable-not-copyable handle to an acquired cursor slot. Dropping
/// it CAS-releases the slot, but only if the state word is unchanged since
/// acquire — if a stale-scan already released it, the drop is a harmless no-op.
pub struct CursorHandle<'a, const N: usize> {
    pool: &'a CursorPool<N>,
    index: usize,
    acquired_state: u64,
}

impl<'a, const N: usize> CursorHandle<'a, N> {
    /// Publish the in-progress position into this slot.
    pub fn publish(&self, pos: Position) {
        self.pool.slots[self.index].position.store(pos, Ordering::SeqCst);
    }
}

impl<'a, const N: usize> Drop for CursorHandle<'a, N> {
    fn drop(&mut self) {
        self.pool.slots[self.index].release_if_unchanged(self.acquired_state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoffset::offset_of;

    // A `CursorSlot` must be exactly two naturally-aligned atomic words with
    // no compiler-inserted padding, since it's placed directly inside the
    // shared-memory control area and shared across processes built with
    // different compiler flags.
    #[test]
    fn cursor_slot_layout_is_two_packed_atomic_words() {
        assert_eq!(std::mem::size_of::<CursorSlot>(), 16);
        assert_eq!(std::mem::align_of::<CursorSlot>(), 8);
        assert_eq!(offset_of!(CursorSlot, state), 0);
        assert_eq!(offset_of!(CursorSlot, position), 8);
    }

    #[test]
    fn position_advance_wraps_and_toggles_parity() {
        let p = Position::new(false, LOCATION_MASK - 1);
        let advanced = p.advance(5);
        assert!(advanced.parity());
        assert_eq!(advanced.location(), 3);
    }

    #[test]
    fn position_ordering_is_parity_then_location() {
        let low_parity_high_loc = Position::new(false, LOCATION_MASK);
        let high_parity_low_loc = Position::new(true, 0);
        assert!(low_parity_high_loc < high_parity_low_loc);
    }

    const LONG_TIMEOUT_NS: u64 = 30_000_000_000;

    #[test]
    fn acquire_then_drop_frees_the_slot_for_reuse() {
        let pool: CursorPool<4> = CursorPool::new();
        {
            let handle = pool.acquire(LONG_TIMEOUT_NS, 8).expect("slot available");
            handle.publish(Position::new(false, 10));
        }
        // All four slots should be free again.
        for _ in 0..4 {
            let h = pool.acquire(LONG_TIMEOUT_NS, 8).expect("slot available after drop");
            std::mem::forget(h);
        }
    }

    #[test]
    fn pool_saturates_when_all_slots_held() {
        let pool: CursorPool<2> = CursorPool::new();
        let a = pool.acquire(LONG_TIMEOUT_NS, 4).unwrap();
        let b = pool.acquire(LONG_TIMEOUT_NS, 4).unwrap();
        assert!(pool.acquire(LONG_TIMEOUT_NS, 4).is_none());
        drop(a);
        drop(b);
    }

    #[test]
    fn is_ahead_and_is_behind_respect_live_slots() {
        let pool: CursorPool<2> = CursorPool::new();
        let handle = pool.acquire(LONG_TIMEOUT_NS, 4).unwrap();
        handle.publish(Position::new(false, 100));

        assert!(!pool.is_ahead(Position::new(false, 50), LONG_TIMEOUT_NS));
        assert!(pool.is_ahead(Position::new(false, 200), LONG_TIMEOUT_NS));
        assert!(pool.is_behind(Position::new(false, 50), LONG_TIMEOUT_NS));
        assert!(!pool.is_behind(Position::new(false, 200), LONG_TIMEOUT_NS));
    }

    #[test]
    fn stale_slot_is_reclaimed_after_timeout() {
        let pool: CursorPool<1> = CursorPool::new();
        let handle = pool.acquire(1, 1).unwrap();
        std::mem::forget(handle); // simulate a crashed owner: never released
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(pool.acquire(1, 4).is_some());
    }
}
