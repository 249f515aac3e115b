//! The allocator: reserves variable-length blocks inside the shared buffer
//! for producers, hands resolved frames to consumers, and keeps the read
//! and write heads monotonically ordered. This is the component that turns
//! a named byte region plus two cursor pools into a lock-free ring.

mod debug;
mod frame;
mod getters;

use std::io;
use std::ptr;
use std::sync::atomic::Ordering;

use crossbeam_utils::CachePadded;

use crate::error::{Error, Status};
use crate::logging::log_warn;
use crate::Core::cursor::{AtomicPosition, CursorHandle, CursorPool, Position};
use crate::Core::SharedMemory::{self, SharedMemoryBackend};

use frame::{decode_header, encode_header, FRAME_HEADER_SIZE, MAGIC};

/// Producer cursor pool size. Fixed at compile time so the control block has
/// a stable, repr-stable layout shareable across processes without a
/// runtime-negotiated size field.
pub const PRODUCER_SLOTS: usize = 128;

/// Consumer cursor pool size.
pub const CONSUMER_SLOTS: usize = 64;

/// The control area living at the front of the shared region: the two heads
/// plus the two cursor pools. Every field is zero-valid, so a freshly
/// `ftruncate`d (hence zeroed) region is already a correctly initialized
/// control block — no placement constructor runs on the shared copy.
#[repr(C)]
struct ControlBlock {
    write_head: CachePadded<AtomicPosition>,
    read_head: CachePadded<AtomicPosition>,
    write_pool: CursorPool<PRODUCER_SLOTS>,
    read_pool: CursorPool<CONSUMER_SLOTS>,
}

/// Owns the byte buffer, the write/read heads, and the two cursor pools.
/// Reservation is lock-free: producers and consumers only ever CAS the
/// relevant head after checking the other side's cursor pool isn't sitting
/// in the range about to be claimed.
pub struct Allocator {
    shm: Box<dyn SharedMemoryBackend>,
    control: *mut ControlBlock,
    buffer: *mut u8,
    buffer_size: usize,
    cursor_timeout_ns: u64,
    max_attempts: usize,
}

// SAFETY: all mutation of the shared region goes through atomics or CAS
// loops guarded by cursor acquisition; the allocator itself holds no
// interior state that isn't either `Send`-safe already or a raw pointer
// into memory designed for concurrent cross-process access.
unsafe impl Send for Allocator {}
unsafe impl Sync for Allocator {}

impl Allocator {
    /// Attach to `name`, creating and zero-sizing it if it doesn't exist yet.
    /// `buffer_size` is the capacity of the data region, excluding the
    /// control area; `cursor_timeout_ns` is this process's liveness
    /// threshold for judging a peer's cursor slot abandoned.
    pub fn open_or_create(
        name: &str,
        buffer_size: usize,
        cursor_timeout_ns: u64,
        max_attempts: usize,
    ) -> io::Result<Self> {
        let control_size = std::mem::size_of::<ControlBlock>();
        let region_size = control_size + buffer_size;
        let shm = SharedMemory::create_shared_memory(region_size, name)?;
        Self::from_backend(shm, buffer_size, cursor_timeout_ns, max_attempts)
    }

    /// Attach to an existing named region; fails if it doesn't exist.
    pub fn attach(
        name: &str,
        buffer_size: usize,
        cursor_timeout_ns: u64,
        max_attempts: usize,
    ) -> io::Result<Self> {
        let control_size = std::mem::size_of::<ControlBlock>();
        let region_size = control_size + buffer_size;
        let shm = SharedMemory::attach_shared_memory(name, region_size)?;
        Self::from_backend(shm, buffer_size, cursor_timeout_ns, max_attempts)
    }

    fn from_backend(
        shm: Box<dyn SharedMemoryBackend>,
        buffer_size: usize,
        cursor_timeout_ns: u64,
        max_attempts: usize,
    ) -> io::Result<Self> {
        let control_size = std::mem::size_of::<ControlBlock>();
        if shm.size() < control_size + buffer_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "shared region is smaller than the requested control + buffer footprint",
            ));
        }
        let base = shm.as_ptr();
        if (base as usize) % std::mem::align_of::<ControlBlock>() != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "shared region is not aligned for the control block",
            ));
        }
        let control = base as *mut ControlBlock;
        let buffer = unsafe { base.add(control_size) };
        Ok(Allocator {
            shm,
            control,
            buffer,
            buffer_size,
            cursor_timeout_ns,
            max_attempts,
        })
    }

    fn control(&self) -> &ControlBlock {
        unsafe { &*self.control }
    }

    /// Reserve a `payload_size`-byte block for writing. Returns `Full` if the
    /// cursor pool is saturated or there isn't enough free range ahead of
    /// the read head within `max_attempts` retries.
    pub fn reserve_write(&self, payload_size: u32) -> Status<WriteGuard<'_>> {
        let block_size = FRAME_HEADER_SIZE as u32 + payload_size;
        if block_size as usize >= self.buffer_size {
            return Err(Error::Full);
        }
        let control = self.control();
        let handle = control
            .write_pool
            .acquire(self.cursor_timeout_ns, self.max_attempts)
            .ok_or(Error::Full)?;

        for _ in 0..self.max_attempts.max(1) {
            let read_head = control.read_head.load(Ordering::SeqCst);
            let write_head = control.write_head.load(Ordering::SeqCst);
            if read_head > write_head {
                return Err(Error::Full);
            }

            let end = write_head.advance(block_size as u64 - 1);
            let span = end.location().wrapping_sub(read_head.location()).wrapping_add(1);
            if span as usize > self.buffer_size {
                // This block would lap the read head: it would overwrite
                // bytes belonging to records nobody has consumed yet.
                return Err(Error::Full);
            }
            if !control.read_pool.is_ahead(end, self.cursor_timeout_ns) {
                return Err(Error::Full);
            }

            handle.publish(write_head);
            let new_head = end.advance(1);
            if control
                .write_head
                .compare_exchange_weak(write_head, new_head, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                let header = encode_header(MAGIC, payload_size);
                self.write_bytes(write_head, &header);
                let payload_offset = write_head.advance(FRAME_HEADER_SIZE as u64);
                return Ok(WriteGuard {
                    allocator: self,
                    _cursor: handle,
                    payload_offset,
                    payload_size,
                    written: 0,
                });
            }
            // Lost the race on write_head; re-read and retry without
            // releasing the cursor slot.
        }
        Err(Error::Full)
    }

    /// Reserve the next complete frame for reading. Returns `Empty` if no
    /// complete record is available within `max_attempts` retries.
    pub fn reserve_read(&self) -> Status<ReadGuard<'_>> {
        let control = self.control();
        let handle = control
            .read_pool
            .acquire(self.cursor_timeout_ns, self.max_attempts)
            .ok_or(Error::Empty)?;

        for _ in 0..self.max_attempts.max(1) {
            let write_head = control.write_head.load(Ordering::SeqCst);
            let read_head = control.read_head.load(Ordering::SeqCst);
            if read_head >= write_head {
                return Err(Error::Empty);
            }

            let resolved = match self.resolve_frame(read_head, write_head) {
                Some(r) => r,
                None => return Err(Error::Empty),
            };
            let block_size = FRAME_HEADER_SIZE as u32 + resolved.body_size;
            let end = read_head.advance(block_size as u64 - 1);
            if !(read_head < write_head && control.write_pool.is_behind(end, self.cursor_timeout_ns) && end < write_head)
            {
                return Err(Error::Empty);
            }

            handle.publish(read_head);
            let new_head = end.advance(1);
            if control
                .read_head
                .compare_exchange_weak(read_head, new_head, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                if resolved.recovered {
                    self.write_bytes(read_head, &encode_header(MAGIC, resolved.body_size));
                }
                let payload_offset = read_head.advance(FRAME_HEADER_SIZE as u64);
                return Ok(ReadGuard {
                    allocator: self,
                    _cursor: handle,
                    payload_offset,
                    payload_size: resolved.body_size,
                });
            }
        }
        Err(Error::Empty)
    }

    /// Copy `data` starting at `pos`, wrapping around the end of the buffer
    /// as needed. The block itself may straddle the physical end of the
    /// byte array even though it's logically contiguous in position space.
    fn write_bytes(&self, pos: Position, data: &[u8]) {
        let start = pos.offset(self.buffer_size);
        let n = data.len();
        unsafe {
            if start + n <= self.buffer_size {
                ptr::copy_nonoverlapping(data.as_ptr(), self.buffer.add(start), n);
            } else {
                let first = self.buffer_size - start;
                ptr::copy_nonoverlapping(data.as_ptr(), self.buffer.add(start), first);
                ptr::copy_nonoverlapping(data.as_ptr().add(first), self.buffer, n - first);
            }
        }
    }

    fn read_bytes(&self, pos: Position, out: &mut [u8]) {
        let start = pos.offset(self.buffer_size);
        let n = out.len();
        unsafe {
            if start + n <= self.buffer_size {
                ptr::copy_nonoverlapping(self.buffer.add(start), out.as_mut_ptr(), n);
            } else {
                let first = self.buffer_size - start;
                ptr::copy_nonoverlapping(self.buffer.add(start), out.as_mut_ptr(), first);
                ptr::copy_nonoverlapping(self.buffer, out.as_mut_ptr().add(first), n - first);
            }
        }
    }

    /// Determine the size of the frame at `read_head`. If the magic sentinel
    /// there is intact, trust the adjacent size field. Otherwise scan
    /// forward in `FRAME_HEADER_SIZE` strides looking for the next sentinel,
    /// treating the gap as a single recovered block so the read head can
    /// step past the corruption. Returns `None` if no sentinel is found
    /// before `write_head`, in which case the caller must not move the
    /// read head.
    fn resolve_frame(&self, read_head: Position, write_head: Position) -> Option<ResolvedFrame> {
        let mut header = [0u8; FRAME_HEADER_SIZE];
        self.read_bytes(read_head, &mut header);
        let (magic, size) = decode_header(&header);
        if magic == MAGIC {
            return Some(ResolvedFrame {
                body_size: size,
                recovered: false,
            });
        }

        let mut probe = read_head.advance(FRAME_HEADER_SIZE as u64);
        while probe < write_head {
            self.read_bytes(probe, &mut header);
            let (probe_magic, _) = decode_header(&header);
            if probe_magic == MAGIC {
                let distance = probe.location().wrapping_sub(read_head.location());
                let body_size = distance.saturating_sub(FRAME_HEADER_SIZE as u64) as u32;
                log_warn("ring buffer resynchronised past a stale or corrupt frame");
                return Some(ResolvedFrame {
                    body_size,
                    recovered: true,
                });
            }
            probe = probe.advance(FRAME_HEADER_SIZE as u64);
        }
        None
    }
}

struct ResolvedFrame {
    body_size: u32,
    recovered: bool,
}

/// Scoped handle to a reserved write block. Append bytes sequentially with
/// [`WriteGuard::write`]; dropping the guard releases the producer cursor
/// slot (via the embedded [`CursorHandle`]'s own drop), publishing the
/// record to consumers.
pub struct WriteGuard<'a> {
    allocator: &'a Allocator,
    _cursor: CursorHandle<'a, PRODUCER_SLOTS>,
    payload_offset: Position,
    payload_size: u32,
    written: u32,
}

impl<'a> WriteGuard<'a> {
    pub fn payload_size(&self) -> u32 {
        self.payload_size
    }

    /// Append `bytes` at the current write offset within the reserved
    /// block. Callers are expected to write exactly `payload_size` bytes in
    /// total, computed up front via the serializer's storage-size function.
    pub fn write(&mut self, bytes: &[u8]) {
        debug_assert!(
            self.written as usize + bytes.len() <= self.payload_size as usize,
            "trace record writer overran its reserved block"
        );
        let at = self.payload_offset.advance(self.written as u64);
        self.allocator.write_bytes(at, bytes);
        self.written += bytes.len() as u32;
    }

    /// Patch bytes at a fixed offset within the reserved block, independent
    /// of the sequential write cursor. Used to update the header's
    /// `args_count` byte in place as arguments are appended.
    pub fn write_at(&self, rel_offset: u32, bytes: &[u8]) {
        debug_assert!(
            rel_offset as usize + bytes.len() <= self.payload_size as usize,
            "trace record patch overran its reserved block"
        );
        let at = self.payload_offset.advance(rel_offset as u64);
        self.allocator.write_bytes(at, bytes);
    }
}

/// Scoped handle to a resolved read block. Dropping it releases the
/// consumer cursor slot.
pub struct ReadGuard<'a> {
    allocator: &'a Allocator,
    _cursor: CursorHandle<'a, CONSUMER_SLOTS>,
    payload_offset: Position,
    payload_size: u32,
}

impl<'a> ReadGuard<'a> {
    pub fn payload_size(&self) -> u32 {
        self.payload_size
    }

    /// Copy the whole payload into an owned buffer, decoupling the caller
    /// from the ring so this guard (and its cursor) can drop immediately.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.payload_size as usize];
        self.allocator.read_bytes(self.payload_offset, &mut out);
        out
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering as AOrdering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn unique_name(tag: &str) -> String {
        let n = TEST_COUNTER.fetch_add(1, AOrdering::Relaxed);
        format!("/ringtrace-alloc-test-{tag}-{n}-{}", std::process::id())
    }

    #[test]
    fn single_producer_single_consumer_round_trips() {
        let name = unique_name("spsc");
        let _ = SharedMemory::unlink_shared_memory(&name);
        let alloc = Allocator::open_or_create(&name, 4096, 1_000_000_000, 8).unwrap();

        {
            let mut w = alloc.reserve_write(5).unwrap();
            w.write(b"hello");
        }

        let r = alloc.reserve_read().unwrap();
        assert_eq!(r.to_vec(), b"hello");
        assert!(alloc.reserve_read().is_err());

        let _ = SharedMemory::unlink_shared_memory(&name);
    }

    #[test]
    fn full_when_block_would_lap_the_read_head() {
        let name = unique_name("full");
        let _ = SharedMemory::unlink_shared_memory(&name);
        let alloc = Allocator::open_or_create(&name, 32, 1_000_000_000, 4).unwrap();

        let w1 = alloc.reserve_write(10).unwrap();
        std::mem::forget(w1); // leave it unread
        match alloc.reserve_write(10) {
            Err(Error::Full) => {}
            Ok(_) => panic!("expected Full, got Ok"),
            Err(e) => panic!("expected Full, got {e:?}"),
        }

        let _ = SharedMemory::unlink_shared_memory(&name);
    }

    #[test]
    fn stale_producer_recovery_finds_no_sentinel_past_corruption() {
        let name = unique_name("recover");
        let _ = SharedMemory::unlink_shared_memory(&name);
        let alloc = Allocator::open_or_create(&name, 128, 50_000_000, 8).unwrap();

        {
            let mut w = alloc.reserve_write(1).unwrap();
            w.write(b"a");
        }

        let corrupt_offset = {
            let w = alloc.reserve_write(1).unwrap();
            // Corrupt this block's magic before it's ever read, as if the
            // producer crashed between claiming the range and writing it.
            w.payload_offset.offset(alloc.buffer_size) - FRAME_HEADER_SIZE
        };
        unsafe {
            ptr::write_bytes(alloc.buffer.add(corrupt_offset), 0, 4);
        }

        let r = alloc.reserve_read().unwrap();
        assert_eq!(r.to_vec(), b"a");

        assert!(matches!(alloc.reserve_read(), Err(Error::Empty)));

        let _ = SharedMemory::unlink_shared_memory(&name);
    }
}
