//! Wire codec: little-endian scalars, byte-length strings, u16-counted lists.
//!
//! Readers and writers operate over caller-owned, explicitly sized buffers.
//! A successful read or write advances the cursor; a failed one, including
//! a failed enum, string or list, leaves it where it was.

use crate::protocol::error::{ProtocolError, ProtocolResult};

/// Longest string the one-byte length prefix can describe.
pub const MAX_STRING_LEN: usize = u8::MAX as usize;
/// Longest list the two-byte count prefix can describe.
pub const MAX_LIST_LEN: usize = u16::MAX as usize;

/// A value with a fixed, untagged wire representation.
pub trait WireValue: Sized {
    fn encoded_len(&self) -> usize;
    fn encode(&self, writer: &mut WireWriter<'_>) -> ProtocolResult<()>;
    fn decode(reader: &mut WireReader<'_>) -> ProtocolResult<Self>;
}

/// Closed enumeration encoded as a single ordinal byte.
///
/// Decoding is strict: an ordinal at or beyond `COUNT` is an error, never an
/// "unknown" fallback.
pub trait WireEnum: Copy + Sized {
    const NAME: &'static str;
    const COUNT: u8;

    fn ordinal(self) -> u8;
    fn from_ordinal(value: u8) -> Option<Self>;
}

impl<T: WireEnum> WireValue for T {
    fn encoded_len(&self) -> usize {
        1
    }

    fn encode(&self, writer: &mut WireWriter<'_>) -> ProtocolResult<()> {
        writer.write_u8(self.ordinal())
    }

    fn decode(reader: &mut WireReader<'_>) -> ProtocolResult<Self> {
        reader.read_enum()
    }
}

/// Forward-only cursor over an encoded buffer.
#[derive(Debug)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_bytes(&mut self, len: usize) -> ProtocolResult<&'a [u8]> {
        if len > self.remaining() {
            return Err(ProtocolError::BufferUnderrun {
                needed: len,
                remaining: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> ProtocolResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> ProtocolResult<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_bool(&mut self) -> ProtocolResult<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_i16(&mut self) -> ProtocolResult<i16> {
        Ok(i16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u16(&mut self) -> ProtocolResult<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> ProtocolResult<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> ProtocolResult<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> ProtocolResult<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> ProtocolResult<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_f32(&mut self) -> ProtocolResult<f32> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    pub fn read_f64(&mut self) -> ProtocolResult<f64> {
        Ok(f64::from_le_bytes(self.read_array()?))
    }

    pub fn read_string(&mut self) -> ProtocolResult<String> {
        self.rewind_on_err(|r| {
            let len = r.read_u8()? as usize;
            std::str::from_utf8(r.read_bytes(len)?)
                .map(str::to_string)
                .map_err(|_| ProtocolError::InvalidUtf8)
        })
    }

    pub fn read_enum<T: WireEnum>(&mut self) -> ProtocolResult<T> {
        self.rewind_on_err(|r| {
            let value = r.read_u8()?;
            T::from_ordinal(value).ok_or(ProtocolError::EnumOutOfRange {
                name: T::NAME,
                value,
            })
        })
    }

    pub fn read_list<T: WireValue>(&mut self) -> ProtocolResult<Vec<T>> {
        self.rewind_on_err(|r| {
            let count = r.read_u16()? as usize;
            let mut items = Vec::with_capacity(count.min(r.remaining()));
            for _ in 0..count {
                items.push(T::decode(r)?);
            }
            Ok(items)
        })
    }

    fn rewind_on_err<T>(
        &mut self,
        read: impl FnOnce(&mut Self) -> ProtocolResult<T>,
    ) -> ProtocolResult<T> {
        let start = self.pos;
        let result = read(self);
        if result.is_err() {
            self.pos = start;
        }
        result
    }
}

/// Forward-only cursor over a pre-sized output buffer.
#[derive(Debug)]
pub struct WireWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> WireWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> ProtocolResult<()> {
        if bytes.len() > self.remaining() {
            return Err(ProtocolError::BufferOverrun {
                needed: bytes.len(),
                remaining: self.remaining(),
            });
        }
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> ProtocolResult<()> {
        self.write_bytes(&[value])
    }

    pub fn write_bool(&mut self, value: bool) -> ProtocolResult<()> {
        self.write_u8(u8::from(value))
    }

    pub fn write_i16(&mut self, value: i16) -> ProtocolResult<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_u16(&mut self, value: u16) -> ProtocolResult<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_i32(&mut self, value: i32) -> ProtocolResult<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_u32(&mut self, value: u32) -> ProtocolResult<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_i64(&mut self, value: i64) -> ProtocolResult<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_u64(&mut self, value: u64) -> ProtocolResult<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_f32(&mut self, value: f32) -> ProtocolResult<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Writes a double-precision value as the nearest single.
    pub fn write_f32_rounded(&mut self, value: f64) -> ProtocolResult<()> {
        self.write_f32(value as f32)
    }

    pub fn write_f64(&mut self, value: f64) -> ProtocolResult<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_string(&mut self, value: &str) -> ProtocolResult<()> {
        let bytes = value.as_bytes();
        if bytes.len() > MAX_STRING_LEN {
            return Err(ProtocolError::LengthOverflow {
                len: bytes.len(),
                max: MAX_STRING_LEN,
            });
        }
        let needed = bytes.len() + 1;
        if needed > self.remaining() {
            return Err(ProtocolError::BufferOverrun {
                needed,
                remaining: self.remaining(),
            });
        }
        self.write_u8(bytes.len() as u8)?;
        self.write_bytes(bytes)
    }

    pub fn write_enum<T: WireEnum>(&mut self, value: T) -> ProtocolResult<()> {
        self.write_u8(value.ordinal())
    }

    pub fn write_list<T: WireValue>(&mut self, items: &[T]) -> ProtocolResult<()> {
        if items.len() > MAX_LIST_LEN {
            return Err(ProtocolError::LengthOverflow {
                len: items.len(),
                max: MAX_LIST_LEN,
            });
        }
        let start = self.pos;
        let result = self.write_list_body(items);
        if result.is_err() {
            self.pos = start;
        }
        result
    }

    fn write_list_body<T: WireValue>(&mut self, items: &[T]) -> ProtocolResult<()> {
        self.write_u16(items.len() as u16)?;
        for item in items {
            item.encode(self)?;
        }
        Ok(())
    }
}

/// Encoded size of a length-prefixed string.
pub fn string_len(value: &str) -> usize {
    value.len() + 1
}

/// Encoded size of a count-prefixed list.
pub fn list_len<T: WireValue>(items: &[T]) -> usize {
    2 + items.iter().map(WireValue::encoded_len).sum::<usize>()
}
