//! The trace-record header plus the typed write/read views layered over a
//! framed block. A record is `header || name (as CStr) || args...`; the
//! name is always the first argument, recovered on read as the display
//! name.

use crate::error::{Error, Status};
use crate::Core::alloc::WriteGuard;

use super::serializer::Arg;

/// ABI-stable event type tags. Numeric values are fixed once chosen since
/// they travel over the wire between independently-built processes.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    SyncBegin = 0,
    SyncEnd = 1,
    AsyncBegin = 2,
    AsyncInstance = 3,
    AsyncEnd = 4,
    FlowBegin = 5,
    FlowInstance = 6,
    FlowEnd = 7,
    Counter = 8,
}

impl EventType {
    pub fn from_u8(v: u8) -> Status<Self> {
        Ok(match v {
            0 => EventType::SyncBegin,
            1 => EventType::SyncEnd,
            2 => EventType::AsyncBegin,
            3 => EventType::AsyncInstance,
            4 => EventType::AsyncEnd,
            5 => EventType::FlowBegin,
            6 => EventType::FlowInstance,
            7 => EventType::FlowEnd,
            8 => EventType::Counter,
            _ => {
                return Err(Error::TypeMismatch {
                    expected: "a known event type tag",
                    found: "an unrecognized event type byte",
                })
            }
        })
    }
}

/// Packed header: `type u8 | category u8 | counter u64 LE | timestamp_ns i64
/// LE | pid i32 LE | tid i32 LE | args_count u8`.
#[derive(Debug, Clone, Copy)]
pub struct EventHeader {
    pub event_type: EventType,
    pub category: u8,
    pub counter: u64,
    pub timestamp_ns: i64,
    pub pid: i32,
    pub tid: i32,
    pub args_count: u8,
}

pub const HEADER_SIZE: usize = 1 + 1 + 8 + 8 + 4 + 4 + 1;
const ARGS_COUNT_OFFSET: u32 = (HEADER_SIZE - 1) as u32;

impl EventHeader {
    fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.event_type as u8);
        out.push(self.category);
        out.extend_from_slice(&self.counter.to_le_bytes());
        out.extend_from_slice(&self.timestamp_ns.to_le_bytes());
        out.extend_from_slice(&self.pid.to_le_bytes());
        out.extend_from_slice(&self.tid.to_le_bytes());
        out.push(self.args_count);
    }

    fn decode(bytes: &[u8]) -> Status<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::TypeMismatch {
                expected: "a full trace-record header",
                found: "truncated buffer",
            });
        }
        Ok(EventHeader {
            event_type: EventType::from_u8(bytes[0])?,
            category: bytes[1],
            counter: u64::from_le_bytes(bytes[2..10].try_into().unwrap()),
            timestamp_ns: i64::from_le_bytes(bytes[10..18].try_into().unwrap()),
            pid: i32::from_le_bytes(bytes[18..22].try_into().unwrap()),
            tid: i32::from_le_bytes(bytes[22..26].try_into().unwrap()),
            args_count: bytes[26],
        })
    }
}

/// Write-side builder over a reserved block. Appending an argument writes
/// its self-describing payload at the next offset and patches the header's
/// `args_count` byte in place, mirroring the original's placement-construct-
/// then-append-in-scope idiom.
pub struct MutableEventView<'a> {
    guard: WriteGuard<'a>,
    args_count: u8,
}

impl<'a> MutableEventView<'a> {
    /// `guard` must have been reserved with exactly
    /// `storage_size(name, args)` bytes of payload; see
    /// [`storage_size`](MutableEventView::storage_size).
    pub fn new(
        mut guard: WriteGuard<'a>,
        event_type: EventType,
        category: u8,
        counter: u64,
        timestamp_ns: i64,
        pid: i32,
        tid: i32,
        name: &str,
    ) -> Self {
        let header = EventHeader {
            event_type,
            category,
            counter,
            timestamp_ns,
            pid,
            tid,
            args_count: 0,
        };
        let mut bytes = Vec::with_capacity(HEADER_SIZE);
        header.encode(&mut bytes);
        guard.write(&bytes);

        let mut view = MutableEventView { guard, args_count: 0 };
        view.append(&Arg::CStr(name.to_owned()));
        view
    }

    /// Exact byte count a record with this name and these arguments will
    /// occupy, for reserving the block up front.
    pub fn storage_size(name: &str, args: &[Arg]) -> usize {
        HEADER_SIZE + Arg::CStr(name.to_owned()).storage_size() + args.iter().map(Arg::storage_size).sum::<usize>()
    }

    /// Append one argument, incrementing `args_count`.
    pub fn append(&mut self, arg: &Arg) {
        let mut bytes = Vec::with_capacity(arg.storage_size());
        arg.encode(&mut bytes);
        self.guard.write(&bytes);
        self.args_count += 1;
        self.guard.write_at(ARGS_COUNT_OFFSET, &[self.args_count]);
    }
}

/// Read-side view over an owned, already-copied-out payload.
#[derive(Debug, Clone)]
pub struct EventView {
    header: EventHeader,
    args: Vec<Arg>,
}

impl EventView {
    pub fn parse(bytes: &[u8]) -> Status<Self> {
        let header = EventHeader::decode(bytes)?;
        let mut offset = HEADER_SIZE;
        let mut args = Vec::with_capacity(header.args_count as usize);
        for _ in 0..header.args_count {
            let (arg, consumed) = Arg::decode(&bytes[offset..])?;
            offset += consumed;
            args.push(arg);
        }
        Ok(EventView { header, args })
    }

    pub fn event_type(&self) -> EventType {
        self.header.event_type
    }

    pub fn category(&self) -> u8 {
        self.header.category
    }

    pub fn counter(&self) -> u64 {
        self.header.counter
    }

    pub fn timestamp_ns(&self) -> i64 {
        self.header.timestamp_ns
    }

    pub fn pid(&self) -> i32 {
        self.header.pid
    }

    pub fn tid(&self) -> i32 {
        self.header.tid
    }

    /// The record's display name: always the first argument, a `CStr`.
    pub fn name(&self) -> Status<&str> {
        self.args
            .first()
            .ok_or(Error::TypeMismatch {
                expected: "a name argument",
                found: "a record with no arguments",
            })?
            .as_cstr()
    }

    /// Arguments excluding the leading name.
    pub fn args(&self) -> &[Arg] {
        if self.args.is_empty() {
            &[]
        } else {
            &self.args[1..]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let header = EventHeader {
            event_type: EventType::Counter,
            category: 3,
            counter: 42,
            timestamp_ns: -17,
            pid: 1234,
            tid: 5678,
            args_count: 2,
        };
        let mut bytes = Vec::new();
        header.encode(&mut bytes);
        let decoded = EventHeader::decode(&bytes).unwrap();
        assert_eq!(decoded.category, header.category);
        assert_eq!(decoded.counter, header.counter);
        assert_eq!(decoded.timestamp_ns, header.timestamp_ns);
        assert_eq!(decoded.pid, header.pid);
        assert_eq!(decoded.tid, header.tid);
        assert_eq!(decoded.args_count, header.args_count);
    }

    #[test]
    fn unknown_event_type_byte_is_a_type_mismatch() {
        assert!(matches!(EventType::from_u8(200), Err(Error::TypeMismatch { .. })));
    }
}
