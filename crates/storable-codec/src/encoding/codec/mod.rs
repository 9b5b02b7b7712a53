//! Per-type encode/decode primitives.
//!
//! [`TypeCodec`] is a closed table of the storage types the engine can write.
//! One is selected per property when a strategy is built, so encoding never has
//! to rediscover how a property is stored. Every entry knows two layouts:
//!
//! - the order-preserving key layout ([`key`]), and
//! - the compact data layout ([`data`]), also used by serial encoding.

pub mod data;
pub mod key;

use crate::error::{CodecError, CodecResult};
use crate::types::{LogicalType, Value};

/// A storage type with a native encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCodec {
    /// `bool`, one byte.
    Bool,
    /// `char`, four bytes.
    Char,
    /// `i8`
    I8,
    /// `u8`
    U8,
    /// `i16`
    I16,
    /// `u16`
    U16,
    /// `i32`
    I32,
    /// `u32`
    U32,
    /// `i64`
    I64,
    /// `u64`
    U64,
    /// `f32`
    F32,
    /// `f64`
    F64,
    /// UTF-8 string
    String,
    /// Byte array
    Bytes,
    /// Arbitrary-precision integer
    BigInt,
    /// Arbitrary-precision decimal
    Decimal,
    /// Large-object locator, stored as its `u64` id.
    Lob,
}

impl TypeCodec {
    /// Selects the codec for a storage type, or `None` if the type has no native encoding.
    #[must_use]
    pub const fn for_type(storage: &LogicalType) -> Option<Self> {
        Some(match storage {
            LogicalType::Bool => Self::Bool,
            LogicalType::Char => Self::Char,
            LogicalType::I8 => Self::I8,
            LogicalType::U8 => Self::U8,
            LogicalType::I16 => Self::I16,
            LogicalType::U16 => Self::U16,
            LogicalType::I32 => Self::I32,
            LogicalType::U32 => Self::U32,
            LogicalType::I64 => Self::I64,
            LogicalType::U64 => Self::U64,
            LogicalType::F32 => Self::F32,
            LogicalType::F64 => Self::F64,
            LogicalType::String => Self::String,
            LogicalType::Bytes => Self::Bytes,
            LogicalType::BigInt => Self::BigInt,
            LogicalType::Decimal => Self::Decimal,
            LogicalType::Lob => Self::Lob,
            LogicalType::Opaque(_) => return None,
        })
    }

    /// Width of the value payload, or `None` if it depends on the value.
    ///
    /// The payload width is the same in key and data layouts.
    #[must_use]
    pub const fn fixed_width(self) -> Option<usize> {
        match self {
            Self::Bool | Self::I8 | Self::U8 => Some(1),
            Self::I16 | Self::U16 => Some(2),
            Self::Char | Self::I32 | Self::U32 | Self::F32 => Some(4),
            Self::I64 | Self::U64 | Self::F64 | Self::Lob => Some(8),
            Self::String | Self::Bytes | Self::BigInt | Self::Decimal => None,
        }
    }

    /// Returns `true` for string, byte array and arbitrary-precision types.
    #[inline]
    #[must_use]
    pub const fn is_variable(self) -> bool {
        self.fixed_width().is_none()
    }

    /// Name used in error messages.
    #[must_use]
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Char => "char",
            Self::I8 => "i8",
            Self::U8 => "u8",
            Self::I16 => "i16",
            Self::U16 => "u16",
            Self::I32 => "i32",
            Self::U32 => "u32",
            Self::I64 => "i64",
            Self::U64 => "u64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::String => "string",
            Self::Bytes => "bytes",
            Self::BigInt => "bigint",
            Self::Decimal => "decimal",
            Self::Lob => "lob",
        }
    }

    /// Returns `true` if `value` is a non-null value this codec can write.
    #[must_use]
    pub const fn accepts(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (Self::Bool, Value::Bool(_))
                | (Self::Char, Value::Char(_))
                | (Self::I8, Value::I8(_))
                | (Self::U8, Value::U8(_))
                | (Self::I16, Value::I16(_))
                | (Self::U16, Value::U16(_))
                | (Self::I32, Value::I32(_))
                | (Self::U32, Value::U32(_))
                | (Self::I64, Value::I64(_))
                | (Self::U64, Value::U64(_))
                | (Self::F32, Value::F32(_))
                | (Self::F64, Value::F64(_))
                | (Self::String, Value::String(_))
                | (Self::Bytes, Value::Bytes(_))
                | (Self::BigInt, Value::BigInt(_))
                | (Self::Decimal, Value::Decimal(_))
                | (Self::Lob, Value::Lob(_))
        )
    }

    fn mismatch(self, value: &Value) -> CodecError {
        CodecError::illegal(format!(
            "{} codec cannot encode a {} value",
            self.type_name(),
            value.type_name()
        ))
    }

    fn null_not_allowed(self) -> CodecError {
        CodecError::illegal(format!("non-nullable {} field has no value", self.type_name()))
    }
}

/// Cursor over an encoded buffer.
///
/// Every byte read through the cursor is XORed with the current mask, which lets
/// descending key fields be decoded without first copying and complementing them.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    mask: u8,
}

impl<'a> Reader<'a> {
    /// Creates a cursor at the start of `bytes`.
    #[must_use]
    pub const fn new(bytes: &'a [u8], mask: u8) -> Self {
        Self { bytes, pos: 0, mask }
    }

    /// Bytes consumed so far.
    #[inline]
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    /// The unread bytes, unmasked.
    #[must_use]
    pub fn rest(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }

    /// The XOR mask currently applied.
    #[inline]
    #[must_use]
    pub const fn mask(&self) -> u8 {
        self.mask
    }

    /// Replaces the XOR mask.
    #[inline]
    pub fn set_mask(&mut self, mask: u8) {
        self.mask = mask;
    }

    fn ensure(&self, len: usize, what: &str) -> CodecResult<()> {
        if self.remaining() < len {
            return Err(CodecError::corrupt(format!("unexpected end of input reading {what}")));
        }
        Ok(())
    }

    /// Reads one byte.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::CorruptEncoding`] at end of input.
    pub fn read_u8(&mut self, what: &str) -> CodecResult<u8> {
        self.ensure(1, what)?;
        let b = self.bytes[self.pos] ^ self.mask;
        self.pos += 1;
        Ok(b)
    }

    /// Reads the next byte without consuming it.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::CorruptEncoding`] at end of input.
    pub fn peek_u8(&self, what: &str) -> CodecResult<u8> {
        self.ensure(1, what)?;
        Ok(self.bytes[self.pos] ^ self.mask)
    }

    /// Reads exactly `N` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::CorruptEncoding`] if fewer than `N` bytes remain.
    pub fn read_array<const N: usize>(&mut self, what: &str) -> CodecResult<[u8; N]> {
        self.ensure(N, what)?;
        let mut out = [0u8; N];
        for (dst, src) in out.iter_mut().zip(&self.bytes[self.pos..self.pos + N]) {
            *dst = src ^ self.mask;
        }
        self.pos += N;
        Ok(out)
    }

    /// Reads exactly `len` bytes into a new vector.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::CorruptEncoding`] if fewer than `len` bytes remain.
    pub fn read_vec(&mut self, len: usize, what: &str) -> CodecResult<Vec<u8>> {
        self.ensure(len, what)?;
        let out = self.bytes[self.pos..self.pos + len].iter().map(|b| b ^ self.mask).collect();
        self.pos += len;
        Ok(out)
    }

    /// Advances past `len` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::CorruptEncoding`] if fewer than `len` bytes remain.
    pub fn skip(&mut self, len: usize, what: &str) -> CodecResult<()> {
        self.ensure(len, what)?;
        self.pos += len;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn opaque_types_have_no_codec() {
        assert_eq!(TypeCodec::for_type(&LogicalType::I32), Some(TypeCodec::I32));
        assert_eq!(TypeCodec::for_type(&LogicalType::Opaque("Uuid".into())), None);
    }

    #[test]
    fn fixed_widths() {
        assert_eq!(TypeCodec::Bool.fixed_width(), Some(1));
        assert_eq!(TypeCodec::Char.fixed_width(), Some(4));
        assert_eq!(TypeCodec::Lob.fixed_width(), Some(8));
        assert!(TypeCodec::Decimal.is_variable());
        assert!(TypeCodec::String.is_variable());
    }

    #[test]
    fn reader_applies_mask() {
        let bytes = [0xFE, 0x00, 0xFF];
        let mut r = Reader::new(&bytes, 0xFF);
        assert_eq!(r.read_u8("marker").unwrap(), 0x01);
        assert_eq!(r.read_array::<2>("body").unwrap(), [0xFF, 0x00]);
        assert_eq!(r.remaining(), 0);
        assert!(r.read_u8("past end").unwrap_err().is_corrupt());
    }

    #[test]
    fn reader_rejects_short_reads_without_consuming() {
        let bytes = [1, 2, 3];
        let mut r = Reader::new(&bytes, 0);
        assert!(r.read_vec(4, "payload").is_err());
        assert_eq!(r.position(), 0);
        r.skip(2, "head").unwrap();
        assert_eq!(r.rest(), &[3]);
    }
}
