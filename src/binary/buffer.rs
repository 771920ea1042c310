//! Growable byte buffer with endian-aware primitives and a LEB128 varint codec.
//!
//! The node codec and the media framing both sit on top of this type. Two framing
//! contexts are supported: the `network` buffer whose default order is big-endian,
//! and per-call explicit ordering through the `*_as` methods.

use thiserror::Error;

/// Maximum number of 7-bit groups a 32-bit varint may use.
const MAX_VARINT32_GROUPS: usize = 5;
/// Maximum number of 7-bit groups a 64-bit varint may use.
const MAX_VARINT64_GROUPS: usize = 10;

/// Byte order used for fixed-width primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    #[default]
    Big,
    Little,
}

/// Errors raised by [`Buffer`] reads and guarded writes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    #[error("unexpected end of buffer: wanted {wanted} bytes, {available} available")]
    UnexpectedEnd { wanted: usize, available: usize },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("varint is longer than {0} groups")]
    VarIntOverflow(usize),
}

pub type BufferResult<T> = Result<T, BufferError>;

/// An owned byte sequence with a read cursor. The write cursor is the end of the data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buffer {
    data: Vec<u8>,
    read_pos: usize,
    order: Endianness,
}

macro_rules! fixed_width {
    ($write:ident, $write_as:ident, $read:ident, $read_as:ident, $ty:ty, $width:expr) => {
        /// Append using the buffer's default byte order.
        pub fn $write(&mut self, value: $ty) {
            self.$write_as(value, self.order);
        }

        /// Append using an explicit byte order.
        pub fn $write_as(&mut self, value: $ty, order: Endianness) {
            match order {
                Endianness::Big => self.data.extend_from_slice(&value.to_be_bytes()),
                Endianness::Little => self.data.extend_from_slice(&value.to_le_bytes()),
            }
        }

        /// Read using the buffer's default byte order.
        pub fn $read(&mut self) -> BufferResult<$ty> {
            self.$read_as(self.order)
        }

        /// Read using an explicit byte order.
        pub fn $read_as(&mut self, order: Endianness) -> BufferResult<$ty> {
            let mut raw = [0u8; $width];
            raw.copy_from_slice(self.take($width)?);
            Ok(match order {
                Endianness::Big => <$ty>::from_be_bytes(raw),
                Endianness::Little => <$ty>::from_le_bytes(raw),
            })
        }
    };
}

impl Buffer {
    /// Create an empty buffer in network byte order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer whose default order is network (big-endian).
    pub fn network() -> Self {
        Self::with_order(Endianness::Big)
    }

    /// Create an empty buffer with the given default byte order.
    pub fn with_order(order: Endianness) -> Self {
        Self {
            data: Vec::new(),
            read_pos: 0,
            order,
        }
    }

    /// Wrap received bytes for reading.
    pub fn wrap(data: Vec<u8>) -> Self {
        Self {
            data,
            read_pos: 0,
            order: Endianness::Big,
        }
    }

    /// Default byte order of this buffer.
    pub fn order(&self) -> Endianness {
        self.order
    }

    /// Number of bytes not yet read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.read_pos
    }

    /// Total number of bytes written.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume the buffer, returning everything written.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Consume the buffer, returning only the unread tail.
    pub fn into_remaining(mut self) -> Vec<u8> {
        self.data.split_off(self.read_pos)
    }

    fn take(&mut self, len: usize) -> BufferResult<&[u8]> {
        let available = self.remaining();
        if len > available {
            return Err(BufferError::UnexpectedEnd {
                wanted: len,
                available,
            });
        }
        let start = self.read_pos;
        self.read_pos += len;
        Ok(&self.data[start..start + len])
    }

    pub fn write_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    pub fn write_i8(&mut self, value: i8) {
        self.data.push(value as u8);
    }

    pub fn read_u8(&mut self) -> BufferResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> BufferResult<i8> {
        Ok(self.take(1)?[0] as i8)
    }

    /// Look at the next byte without consuming it.
    pub fn peek_u8(&self) -> BufferResult<u8> {
        self.data
            .get(self.read_pos)
            .copied()
            .ok_or(BufferError::UnexpectedEnd {
                wanted: 1,
                available: 0,
            })
    }

    fixed_width!(write_u16, write_u16_as, read_u16, read_u16_as, u16, 2);
    fixed_width!(write_u32, write_u32_as, read_u32, read_u32_as, u32, 4);
    fixed_width!(write_u64, write_u64_as, read_u64, read_u64_as, u64, 8);
    fixed_width!(write_i16, write_i16_as, read_i16, read_i16_as, i16, 2);
    fixed_width!(write_i32, write_i32_as, read_i32, read_i32_as, i32, 4);
    fixed_width!(write_i64, write_i64_as, read_i64, read_i64_as, i64, 8);
    fixed_width!(write_f32, write_f32_as, read_f32, read_f32_as, f32, 4);
    fixed_width!(write_f64, write_f64_as, read_f64, read_f64_as, f64, 8);

    /// Append an unsigned field of `width` bytes (1, 2, 4 or 8) from a signed value.
    ///
    /// Negative values and values that do not fit the width are rejected instead of
    /// being reinterpreted.
    pub fn write_unsigned(&mut self, value: i64, width: usize, order: Endianness) -> BufferResult<()> {
        if value < 0 {
            return Err(BufferError::InvalidArgument(format!(
                "cannot write negative value {value} as unsigned"
            )));
        }
        let fits = match width {
            1 => value <= u8::MAX as i64,
            2 => value <= u16::MAX as i64,
            4 => value <= u32::MAX as i64,
            8 => true,
            _ => {
                return Err(BufferError::InvalidArgument(format!(
                    "unsupported unsigned width {width}"
                )))
            }
        };
        if !fits {
            return Err(BufferError::InvalidArgument(format!(
                "value {value} does not fit in {width} bytes"
            )));
        }
        match width {
            1 => self.write_u8(value as u8),
            2 => self.write_u16_as(value as u16, order),
            4 => self.write_u32_as(value as u32, order),
            _ => self.write_u64_as(value as u64, order),
        }
        Ok(())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Read exactly `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> BufferResult<Vec<u8>> {
        Ok(self.take(len)?.to_vec())
    }

    /// Read everything left.
    pub fn read_to_end(&mut self) -> Vec<u8> {
        let start = self.read_pos;
        self.read_pos = self.data.len();
        self.data[start..].to_vec()
    }

    /// Write a non-negative integer as 7-bit groups, least significant group first.
    pub fn write_varint(&mut self, value: i64) -> BufferResult<()> {
        if value < 0 {
            return Err(BufferError::InvalidArgument(format!(
                "cannot write negative value {value} as varint"
            )));
        }
        let mut value = value as u64;
        while value >= 0x80 {
            self.data.push((value as u8 & 0x7f) | 0x80);
            value >>= 7;
        }
        self.data.push(value as u8);
        Ok(())
    }

    /// Read a varint holding at most 32 bits.
    pub fn read_varint(&mut self) -> BufferResult<u32> {
        let value = self.read_varint_groups(MAX_VARINT32_GROUPS)?;
        u32::try_from(value).map_err(|_| BufferError::VarIntOverflow(MAX_VARINT32_GROUPS))
    }

    /// Read a varint holding at most 64 bits.
    pub fn read_varint64(&mut self) -> BufferResult<u64> {
        self.read_varint_groups(MAX_VARINT64_GROUPS)
    }

    fn read_varint_groups(&mut self, max_groups: usize) -> BufferResult<u64> {
        let mut value = 0u64;
        for group in 0..max_groups {
            let byte = self.read_u8()?;
            let bits = (byte & 0x7f) as u64;
            let shift = 7 * group as u32;
            if shift >= 64 || (shift > 0 && bits >> (64 - shift) != 0) {
                return Err(BufferError::VarIntOverflow(max_groups));
            }
            value |= bits << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(BufferError::VarIntOverflow(max_groups))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_300() {
        let mut buffer = Buffer::new();
        buffer.write_varint(300).unwrap();
        assert_eq!(buffer.as_bytes(), &[0xAC, 0x02]);

        let mut reader = Buffer::wrap(vec![0xAC, 0x02, 0xFF]);
        assert_eq!(reader.read_varint().unwrap(), 300);
        assert_eq!(reader.remaining(), 1);
    }

    #[test]
    fn test_varint_minimal_lengths() {
        for (value, expected_len) in [
            (0i64, 1usize),
            (127, 1),
            (128, 2),
            (16_383, 2),
            (16_384, 3),
            (u32::MAX as i64, 5),
        ] {
            let mut buffer = Buffer::new();
            buffer.write_varint(value).unwrap();
            assert_eq!(buffer.len(), expected_len, "value {value}");
            let mut reader = Buffer::wrap(buffer.into_bytes());
            assert_eq!(reader.read_varint().unwrap() as i64, value);
        }
    }

    #[test]
    fn test_varint_rejects_long_encoding() {
        let mut reader = Buffer::wrap(vec![0x80, 0x80, 0x80, 0x80, 0x80, 0x01]);
        assert_eq!(
            reader.read_varint(),
            Err(BufferError::VarIntOverflow(MAX_VARINT32_GROUPS))
        );

        let mut reader = Buffer::wrap(vec![0xFF, 0xFF, 0xFF, 0xFF, 0x1F]);
        assert!(reader.read_varint().is_err());
    }

    #[test]
    fn test_varint_truncated() {
        let mut reader = Buffer::wrap(vec![0x80, 0x80]);
        assert!(matches!(
            reader.read_varint(),
            Err(BufferError::UnexpectedEnd { .. })
        ));
    }

    #[test]
    fn test_negative_values_rejected() {
        let mut buffer = Buffer::new();
        assert!(matches!(
            buffer.write_varint(-1),
            Err(BufferError::InvalidArgument(_))
        ));
        assert!(matches!(
            buffer.write_unsigned(-5, 4, Endianness::Big),
            Err(BufferError::InvalidArgument(_))
        ));
        assert!(matches!(
            buffer.write_unsigned(256, 1, Endianness::Big),
            Err(BufferError::InvalidArgument(_))
        ));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_endianness_contexts() {
        let mut network = Buffer::network();
        network.write_u32(0x0102_0304);
        network.write_u16_as(0x0506, Endianness::Little);
        assert_eq!(network.as_bytes(), &[1, 2, 3, 4, 6, 5]);

        let mut little = Buffer::with_order(Endianness::Little);
        little.write_i64(-2);
        little.write_f64(1.5);
        let mut reader = Buffer::wrap(little.into_bytes());
        assert_eq!(reader.read_i64_as(Endianness::Little).unwrap(), -2);
        assert_eq!(reader.read_f64_as(Endianness::Little).unwrap(), 1.5);
    }

    #[test]
    fn test_read_past_end() {
        let mut reader = Buffer::wrap(vec![1, 2, 3]);
        assert_eq!(reader.read_u16().unwrap(), 0x0102);
        assert_eq!(
            reader.read_u32(),
            Err(BufferError::UnexpectedEnd {
                wanted: 4,
                available: 1
            })
        );
        assert_eq!(reader.read_bytes(1).unwrap(), vec![3]);
        assert!(reader.read_bytes(1).is_err());
    }
}
