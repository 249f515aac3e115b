//! Self-describing argument encoding: a type tag plus a value, so a reader
//! can decode a trace record's arguments without an external schema. Used
//! both for scalar event arguments and the record's own name (always the
//! first argument, encoded as a `CStr`).

use crate::error::{Error, Status};

/// Stable, bit-exact type tags. Never renumber these — they're part of the
/// wire format and may be read by a process built from a different checkout.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    I16 = 0,
    I32 = 1,
    I64 = 2,
    U8 = 3,
    U16 = 4,
    U32 = 5,
    U64 = 6,
    F32 = 7,
    F64 = 8,
    Char = 9,
    CStr = 10,
    Str = 11,
    Kwarg = 12,
}

impl DataType {
    fn from_tag(tag: u8) -> Status<Self> {
        Ok(match tag {
            0 => DataType::I16,
            1 => DataType::I32,
            2 => DataType::I64,
            3 => DataType::U8,
            4 => DataType::U16,
            5 => DataType::U32,
            6 => DataType::U64,
            7 => DataType::F32,
            8 => DataType::F64,
            9 => DataType::Char,
            10 => DataType::CStr,
            11 => DataType::Str,
            12 => DataType::Kwarg,
            _ => {
                return Err(Error::TypeMismatch {
                    expected: "a known argument tag",
                    found: "an unrecognized tag byte",
                })
            }
        })
    }
}

/// A single self-describing trace-record argument. The length prefix used
/// by `Str` is a fixed 8-byte little-endian count (a stand-in for the
/// original's host `size_t`, pinned to 64 bits for a stable wire format).
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Char(u8),
    CStr(String),
    Str(String),
    Kwarg(String, Box<Arg>),
}

impl Arg {
    pub fn data_type(&self) -> DataType {
        match self {
            Arg::I16(_) => DataType::I16,
            Arg::I32(_) => DataType::I32,
            Arg::I64(_) => DataType::I64,
            Arg::U8(_) => DataType::U8,
            Arg::U16(_) => DataType::U16,
            Arg::U32(_) => DataType::U32,
            Arg::U64(_) => DataType::U64,
            Arg::F32(_) => DataType::F32,
            Arg::F64(_) => DataType::F64,
            Arg::Char(_) => DataType::Char,
            Arg::CStr(_) => DataType::CStr,
            Arg::Str(_) => DataType::Str,
            Arg::Kwarg(..) => DataType::Kwarg,
        }
    }

    /// Exact byte count this argument will occupy once encoded, tag byte
    /// included. Purely structural: callers sum this across a variadic set
    /// to size a block before reserving it.
    pub fn storage_size(&self) -> usize {
        1 + match self {
            Arg::I16(_) => 2,
            Arg::I32(_) => 4,
            Arg::I64(_) => 8,
            Arg::U8(_) => 1,
            Arg::U16(_) => 2,
            Arg::U32(_) => 4,
            Arg::U64(_) => 8,
            Arg::F32(_) => 4,
            Arg::F64(_) => 8,
            Arg::Char(_) => 1,
            Arg::CStr(s) => s.len() + 1,
            Arg::Str(s) => 8 + s.len(),
            Arg::Kwarg(name, nested) => name.len() + 1 + nested.storage_size(),
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.data_type() as u8);
        match self {
            Arg::I16(v) => out.extend_from_slice(&v.to_le_bytes()),
            Arg::I32(v) => out.extend_from_slice(&v.to_le_bytes()),
            Arg::I64(v) => out.extend_from_slice(&v.to_le_bytes()),
            Arg::U8(v) => out.push(*v),
            Arg::U16(v) => out.extend_from_slice(&v.to_le_bytes()),
            Arg::U32(v) => out.extend_from_slice(&v.to_le_bytes()),
            Arg::U64(v) => out.extend_from_slice(&v.to_le_bytes()),
            Arg::F32(v) => out.extend_from_slice(&v.to_le_bytes()),
            Arg::F64(v) => out.extend_from_slice(&v.to_le_bytes()),
            Arg::Char(v) => out.push(*v),
            Arg::CStr(s) => {
                out.extend_from_slice(s.as_bytes());
                out.push(0);
            }
            Arg::Str(s) => {
                out.extend_from_slice(&(s.len() as u64).to_le_bytes());
                out.extend_from_slice(s.as_bytes());
            }
            Arg::Kwarg(name, nested) => {
                out.extend_from_slice(name.as_bytes());
                out.push(0);
                nested.encode(out);
            }
        }
    }

    /// Decode one argument starting at `bytes[0]`. Returns the value and the
    /// number of bytes consumed so the caller can advance to the next one.
    pub fn decode(bytes: &[u8]) -> Status<(Arg, usize)> {
        let tag = *bytes.first().ok_or(Error::TypeMismatch {
            expected: "an argument tag byte",
            found: "end of buffer",
        })?;
        let data_type = DataType::from_tag(tag)?;
        let body = &bytes[1..];

        macro_rules! scalar {
            ($variant:ident, $ty:ty) => {{
                let width = std::mem::size_of::<$ty>();
                let raw: [u8; std::mem::size_of::<$ty>()] = body
                    .get(..width)
                    .and_then(|s| s.try_into().ok())
                    .ok_or(Error::TypeMismatch {
                        expected: "enough bytes for a scalar argument",
                        found: "truncated buffer",
                    })?;
                (Arg::$variant(<$ty>::from_le_bytes(raw)), 1 + width)
            }};
        }

        let (arg, consumed) = match data_type {
            DataType::I16 => scalar!(I16, i16),
            DataType::I32 => scalar!(I32, i32),
            DataType::I64 => scalar!(I64, i64),
            DataType::U16 => scalar!(U16, u16),
            DataType::U32 => scalar!(U32, u32),
            DataType::U64 => scalar!(U64, u64),
            DataType::F32 => scalar!(F32, f32),
            DataType::F64 => scalar!(F64, f64),
            DataType::U8 => {
                let v = *body.first().ok_or(Error::TypeMismatch {
                    expected: "a U8 byte",
                    found: "end of buffer",
                })?;
                (Arg::U8(v), 2)
            }
            DataType::Char => {
                let v = *body.first().ok_or(Error::TypeMismatch {
                    expected: "a CHAR byte",
                    found: "end of buffer",
                })?;
                (Arg::Char(v), 2)
            }
            DataType::CStr => {
                let nul = body.iter().position(|&b| b == 0).ok_or(Error::TypeMismatch {
                    expected: "a NUL-terminated CSTR",
                    found: "unterminated buffer",
                })?;
                let s = String::from_utf8_lossy(&body[..nul]).into_owned();
                (Arg::CStr(s), 1 + nul + 1)
            }
            DataType::Str => {
                let len_bytes: [u8; 8] = body.get(..8).and_then(|s| s.try_into().ok()).ok_or(Error::TypeMismatch {
                    expected: "an 8-byte STR length prefix",
                    found: "truncated buffer",
                })?;
                let len = u64::from_le_bytes(len_bytes) as usize;
                let s_bytes = body.get(8..8 + len).ok_or(Error::TypeMismatch {
                    expected: "enough bytes for the STR payload",
                    found: "truncated buffer",
                })?;
                let s = String::from_utf8_lossy(s_bytes).into_owned();
                (Arg::Str(s), 1 + 8 + len)
            }
            DataType::Kwarg => {
                let nul = body.iter().position(|&b| b == 0).ok_or(Error::TypeMismatch {
                    expected: "a NUL-terminated KWARG name",
                    found: "unterminated buffer",
                })?;
                let name = String::from_utf8_lossy(&body[..nul]).into_owned();
                let (nested, nested_len) = Arg::decode(&body[nul + 1..])?;
                (Arg::Kwarg(name, Box::new(nested)), 1 + nul + 1 + nested_len)
            }
        };
        Ok((arg, consumed))
    }

    fn type_name(&self) -> &'static str {
        match self {
            Arg::I16(_) => "I16",
            Arg::I32(_) => "I32",
            Arg::I64(_) => "I64",
            Arg::U8(_) => "U8",
            Arg::U16(_) => "U16",
            Arg::U32(_) => "U32",
            Arg::U64(_) => "U64",
            Arg::F32(_) => "F32",
            Arg::F64(_) => "F64",
            Arg::Char(_) => "Char",
            Arg::CStr(_) => "CStr",
            Arg::Str(_) => "Str",
            Arg::Kwarg(..) => "Kwarg",
        }
    }
}

macro_rules! typed_getter {
    ($name:ident, $variant:ident, $ty:ty) => {
        impl Arg {
            pub fn $name(&self) -> Status<$ty> {
                match self {
                    Arg::$variant(v) => Ok(*v),
                    other => Err(Error::TypeMismatch {
                        expected: stringify!($variant),
                        found: other.type_name(),
                    }),
                }
            }
        }
    };
}

typed_getter!(as_i16, I16, i16);
typed_getter!(as_i32, I32, i32);
typed_getter!(as_i64, I64, i64);
typed_getter!(as_u8, U8, u8);
typed_getter!(as_u16, U16, u16);
typed_getter!(as_u32, U32, u32);
typed_getter!(as_u64, U64, u64);
typed_getter!(as_f32, F32, f32);
typed_getter!(as_f64, F64, f64);
typed_getter!(as_char, Char, u8);

impl Arg {
    pub fn as_cstr(&self) -> Status<&str> {
        match self {
            Arg::CStr(s) => Ok(s.as_str()),
            other => Err(Error::TypeMismatch {
                expected: "CStr",
                found: other.type_name(),
            }),
        }
    }

    pub fn as_str_arg(&self) -> Status<&str> {
        match self {
            Arg::Str(s) => Ok(s.as_str()),
            other => Err(Error::TypeMismatch {
                expected: "Str",
                found: other.type_name(),
            }),
        }
    }

    pub fn as_kwarg(&self) -> Status<(&str, &Arg)> {
        match self {
            Arg::Kwarg(name, nested) => Ok((name.as_str(), nested.as_ref())),
            other => Err(Error::TypeMismatch {
                expected: "Kwarg",
                found: other.type_name(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(arg: Arg) {
        let mut bytes = Vec::new();
        arg.encode(&mut bytes);
        assert_eq!(bytes.len(), arg.storage_size());
        let (decoded, consumed) = Arg::decode(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded, arg);
    }

    #[test]
    fn all_scalar_types_round_trip() {
        round_trip(Arg::I16(-7));
        round_trip(Arg::I32(-70000));
        round_trip(Arg::I64(-1));
        round_trip(Arg::U8(200));
        round_trip(Arg::U16(40000));
        round_trip(Arg::U32(3_000_000_000));
        round_trip(Arg::U64(u64::MAX));
        round_trip(Arg::F32(1.5));
        round_trip(Arg::F64(-2.25));
        round_trip(Arg::Char(b'x'));
    }

    #[test]
    fn cstr_and_str_round_trip() {
        round_trip(Arg::CStr("hello".into()));
        round_trip(Arg::Str("counted string".into()));
        round_trip(Arg::CStr(String::new()));
        round_trip(Arg::Str(String::new()));
    }

    #[test]
    fn kwarg_round_trips_with_nested_scalar() {
        round_trip(Arg::Kwarg("k".into(), Box::new(Arg::I32(50))));
    }

    #[test]
    fn wrong_type_accessor_returns_type_mismatch() {
        let arg = Arg::I32(5);
        assert!(matches!(arg.as_u64(), Err(Error::TypeMismatch { .. })));
        assert!(arg.as_i32().is_ok());
    }

    #[test]
    fn storage_size_matches_encoded_length_for_mixed_batch() {
        let args = vec![
            Arg::I32(1),
            Arg::Str("abc".into()),
            Arg::Kwarg("name".into(), Box::new(Arg::F64(1.0))),
        ];
        let expected: usize = args.iter().map(Arg::storage_size).sum();
        let mut bytes = Vec::new();
        for a in &args {
            a.encode(&mut bytes);
        }
        assert_eq!(bytes.len(), expected);
    }
}
