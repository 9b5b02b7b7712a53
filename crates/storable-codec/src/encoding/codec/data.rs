//! Compact data layout.
//!
//! Data encodings do not need to sort, so they favour size:
//!
//! - Fixed-width values are written big-endian with no sign flipping. Floats keep
//!   their exact IEEE 754 bits, NaN payload included.
//! - Strings, byte arrays and big integers are prefixed with their byte length.
//! - Decimals are the length-prefixed unscaled integer followed by a 4-byte scale.
//!
//! # Length prefix
//!
//! | First byte | Total bytes | Range |
//! |------------|-------------|-------|
//! | `0xxxxxxx` | 1 | `< 2^7` |
//! | `10xxxxxx` | 2 | `< 2^14` |
//! | `110xxxxx` | 3 | `< 2^21` |
//! | `1110xxxx` | 4 | `< 2^28` |
//! | `0xF0` | 5 | `<= u32::MAX` |
//! | `0xFF` | 1 | null |
//!
//! # Nulls
//!
//! Nullable variable-length fields use the `0xFF` length sentinel. Nullable
//! fixed-width fields carry a presence byte: `0x00` (null, nothing follows) or
//! `0x01` followed by the value.

use bigdecimal::BigDecimal;
use num_bigint::BigInt;

use super::{Reader, TypeCodec};
use crate::error::{CodecError, CodecResult};
use crate::types::{LobLocator, Value};

/// Length sentinel marking a null variable-length field.
pub const NULL_LENGTH: u8 = 0xFF;

/// Presence byte of a null fixed-width field.
pub const ABSENT: u8 = 0x00;
/// Presence byte of a present fixed-width field.
pub const PRESENT: u8 = 0x01;

const LENGTH_32: u8 = 0xF0;

/// Size of the length prefix for a payload of `len` bytes.
///
/// # Errors
///
/// Returns [`CodecError::IllegalArgument`] if `len` exceeds `u32::MAX`.
pub fn length_prefix_size(len: usize) -> CodecResult<usize> {
    Ok(match len {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        0x4000..=0x1F_FFFF => 3,
        0x20_0000..=0xFFF_FFFF => 4,
        _ if u32::try_from(len).is_ok() => 5,
        _ => return Err(CodecError::illegal(format!("length {len} exceeds u32::MAX"))),
    })
}

/// Appends the length prefix for a payload of `len` bytes.
///
/// # Errors
///
/// Returns [`CodecError::IllegalArgument`] if `len` exceeds `u32::MAX`.
#[allow(clippy::cast_possible_truncation)]
pub fn write_length(len: usize, buf: &mut Vec<u8>) -> CodecResult<()> {
    match length_prefix_size(len)? {
        1 => buf.push(len as u8),
        2 => buf.extend_from_slice(&((len as u16) | 0x8000).to_be_bytes()),
        3 => buf.extend_from_slice(&((len as u32) | 0x00C0_0000).to_be_bytes()[1..]),
        4 => buf.extend_from_slice(&((len as u32) | 0xE000_0000).to_be_bytes()),
        _ => {
            buf.push(LENGTH_32);
            buf.extend_from_slice(&(len as u32).to_be_bytes());
        }
    }
    Ok(())
}

/// Reads a length prefix; `None` is the null sentinel.
///
/// # Errors
///
/// Returns [`CodecError::CorruptEncoding`] on truncation or a reserved first byte.
pub fn read_length(r: &mut Reader<'_>) -> CodecResult<Option<usize>> {
    let first = r.read_u8("length")?;
    let len = match first {
        0x00..=0x7F => u32::from(first),
        0x80..=0xBF => u32::from(first & 0x3F) << 8 | u32::from(r.read_u8("length")?),
        0xC0..=0xDF => {
            let [b1, b2] = r.read_array("length")?;
            u32::from(first & 0x1F) << 16 | u32::from(b1) << 8 | u32::from(b2)
        }
        0xE0..=0xEF => {
            let [b1, b2, b3] = r.read_array("length")?;
            u32::from_be_bytes([first & 0x0F, b1, b2, b3])
        }
        LENGTH_32 => u32::from_be_bytes(r.read_array("length")?),
        NULL_LENGTH => return Ok(None),
        other => return Err(CodecError::corrupt(format!("reserved length marker 0x{other:02x}"))),
    };
    usize::try_from(len)
        .map(Some)
        .map_err(|_| CodecError::corrupt("length exceeds platform capacity"))
}

fn prefixed_len(len: usize) -> CodecResult<usize> {
    Ok(length_prefix_size(len)? + len)
}

fn write_prefixed(bytes: &[u8], buf: &mut Vec<u8>) -> CodecResult<()> {
    write_length(bytes.len(), buf)?;
    buf.extend_from_slice(bytes);
    Ok(())
}

fn read_prefixed(r: &mut Reader<'_>, what: &str) -> CodecResult<Option<Vec<u8>>> {
    match read_length(r)? {
        Some(len) => r.read_vec(len, what).map(Some),
        None => Ok(None),
    }
}

impl TypeCodec {
    /// Data length independent of the value, or `None` for variable-length types.
    #[must_use]
    pub const fn data_static_length(self, nullable: bool) -> Option<usize> {
        self.key_static_length(nullable)
    }

    /// The shortest possible data encoding of a field of this type.
    #[must_use]
    pub const fn data_min_length(self, nullable: bool) -> usize {
        match self {
            Self::Decimal if !nullable => 5,
            _ if nullable || self.is_variable() => 1,
            _ => match self.fixed_width() {
                Some(width) => width,
                None => 1,
            },
        }
    }

    /// Exact data length of `value`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::IllegalArgument`] if the value does not fit this codec.
    pub fn data_length(self, value: &Value, nullable: bool) -> CodecResult<usize> {
        if value.is_null() {
            return if nullable { Ok(1) } else { Err(self.null_not_allowed()) };
        }
        if let Some(width) = self.fixed_width() {
            if !self.accepts(value) {
                return Err(self.mismatch(value));
            }
            return Ok(usize::from(nullable) + width);
        }
        match (self, value) {
            (Self::String, Value::String(s)) => prefixed_len(s.len()),
            (Self::Bytes, Value::Bytes(b)) => prefixed_len(b.len()),
            (Self::BigInt, Value::BigInt(v)) => prefixed_len(v.to_signed_bytes_be().len()),
            (Self::Decimal, Value::Decimal(d)) => {
                Ok(prefixed_len(d.as_bigint_and_exponent().0.to_signed_bytes_be().len())? + 4)
            }
            _ => Err(self.mismatch(value)),
        }
    }

    /// Appends the data encoding of `value` to `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::IllegalArgument`] if the value does not fit this codec.
    pub fn encode_data(self, value: &Value, nullable: bool, buf: &mut Vec<u8>) -> CodecResult<()> {
        if value.is_null() {
            if !nullable {
                return Err(self.null_not_allowed());
            }
            buf.push(if self.is_variable() { NULL_LENGTH } else { ABSENT });
            return Ok(());
        }
        if nullable && !self.is_variable() {
            buf.push(PRESENT);
        }
        match (self, value) {
            (Self::Bool, Value::Bool(b)) => buf.push(u8::from(*b)),
            (Self::Char, Value::Char(c)) => buf.extend_from_slice(&u32::from(*c).to_be_bytes()),
            (Self::I8, Value::I8(v)) => buf.extend_from_slice(&v.to_be_bytes()),
            (Self::U8, Value::U8(v)) => buf.push(*v),
            (Self::I16, Value::I16(v)) => buf.extend_from_slice(&v.to_be_bytes()),
            (Self::U16, Value::U16(v)) => buf.extend_from_slice(&v.to_be_bytes()),
            (Self::I32, Value::I32(v)) => buf.extend_from_slice(&v.to_be_bytes()),
            (Self::U32, Value::U32(v)) => buf.extend_from_slice(&v.to_be_bytes()),
            (Self::I64, Value::I64(v)) => buf.extend_from_slice(&v.to_be_bytes()),
            (Self::U64, Value::U64(v)) => buf.extend_from_slice(&v.to_be_bytes()),
            (Self::F32, Value::F32(f)) => buf.extend_from_slice(&f.to_bits().to_be_bytes()),
            (Self::F64, Value::F64(f)) => buf.extend_from_slice(&f.to_bits().to_be_bytes()),
            (Self::String, Value::String(s)) => write_prefixed(s.as_bytes(), buf)?,
            (Self::Bytes, Value::Bytes(b)) => write_prefixed(b, buf)?,
            (Self::BigInt, Value::BigInt(v)) => write_prefixed(&v.to_signed_bytes_be(), buf)?,
            (Self::Decimal, Value::Decimal(d)) => {
                let (unscaled, scale) = d.as_bigint_and_exponent();
                let scale = i32::try_from(scale)
                    .map_err(|_| {
                        CodecError::illegal(format!("decimal scale {scale} out of range"))
                    })?;
                write_prefixed(&unscaled.to_signed_bytes_be(), buf)?;
                buf.extend_from_slice(&scale.to_be_bytes());
            }
            (Self::Lob, Value::Lob(l)) => buf.extend_from_slice(&l.as_u64().to_be_bytes()),
            _ => return Err(self.mismatch(value)),
        }
        Ok(())
    }

    /// Decodes one data field from the start of `bytes`.
    ///
    /// Returns the value and the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::CorruptEncoding`] if the bytes are malformed or truncated.
    pub fn decode_data(self, bytes: &[u8], nullable: bool) -> CodecResult<(Value, usize)> {
        let mut r = Reader::new(bytes, 0);
        let value = self.read_data(&mut r, nullable)?;
        Ok((value, r.position()))
    }

    /// Reads the presence byte of a nullable fixed-width field.
    ///
    /// Returns `false` for an absent value.
    fn read_presence(r: &mut Reader<'_>) -> CodecResult<bool> {
        match r.read_u8("presence byte")? {
            ABSENT => Ok(false),
            PRESENT => Ok(true),
            other => Err(CodecError::corrupt(format!("invalid presence byte 0x{other:02x}"))),
        }
    }

    fn null_sentinel(self, nullable: bool) -> CodecResult<()> {
        if nullable {
            return Ok(());
        }
        Err(CodecError::corrupt(format!(
            "null sentinel in non-nullable {} field",
            self.type_name()
        )))
    }

    pub(crate) fn read_data(self, r: &mut Reader<'_>, nullable: bool) -> CodecResult<Value> {
        if nullable && !self.is_variable() && !Self::read_presence(r)? {
            return Ok(Value::Null);
        }
        let value = match self {
            Self::Bool => match r.read_u8("bool")? {
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                other => {
                    return Err(CodecError::corrupt(format!("invalid bool byte 0x{other:02x}")))
                }
            },
            Self::Char => {
                let raw = u32::from_be_bytes(r.read_array("char")?);
                Value::Char(
                    char::from_u32(raw)
                        .ok_or_else(|| {
                            CodecError::corrupt(format!("invalid char scalar 0x{raw:x}"))
                        })?,
                )
            }
            Self::I8 => Value::I8(i8::from_be_bytes(r.read_array("i8")?)),
            Self::U8 => Value::U8(r.read_u8("u8")?),
            Self::I16 => Value::I16(i16::from_be_bytes(r.read_array("i16")?)),
            Self::U16 => Value::U16(u16::from_be_bytes(r.read_array("u16")?)),
            Self::I32 => Value::I32(i32::from_be_bytes(r.read_array("i32")?)),
            Self::U32 => Value::U32(u32::from_be_bytes(r.read_array("u32")?)),
            Self::I64 => Value::I64(i64::from_be_bytes(r.read_array("i64")?)),
            Self::U64 => Value::U64(u64::from_be_bytes(r.read_array("u64")?)),
            Self::F32 => Value::F32(f32::from_bits(u32::from_be_bytes(r.read_array("f32")?))),
            Self::F64 => Value::F64(f64::from_bits(u64::from_be_bytes(r.read_array("f64")?))),
            Self::Lob => Value::Lob(LobLocator::new(u64::from_be_bytes(r.read_array("lob")?))),
            Self::String | Self::Bytes | Self::BigInt | Self::Decimal => {
                let Some(bytes) = read_prefixed(r, self.type_name())? else {
                    self.null_sentinel(nullable)?;
                    return Ok(Value::Null);
                };
                self.variable_value(r, bytes)?
            }
        };
        Ok(value)
    }

    fn variable_value(self, r: &mut Reader<'_>, bytes: Vec<u8>) -> CodecResult<Value> {
        Ok(match self {
            Self::String => Value::String(
                String::from_utf8(bytes)
                    .map_err(|e| CodecError::corrupt(format!("invalid UTF-8: {e}")))?,
            ),
            Self::BigInt => Value::BigInt(BigInt::from_signed_bytes_be(&bytes)),
            Self::Decimal => {
                let scale = i32::from_be_bytes(r.read_array("decimal scale")?);
                let unscaled = BigInt::from_signed_bytes_be(&bytes);
                Value::Decimal(BigDecimal::new(unscaled, i64::from(scale)))
            }
            _ => Value::Bytes(bytes),
        })
    }

    /// Advances past one data field without materialising it.
    ///
    /// Rejects the same malformed presence bytes and null sentinels as
    /// [`decode_data`](Self::decode_data).
    pub(crate) fn skip_data(self, r: &mut Reader<'_>, nullable: bool) -> CodecResult<()> {
        if let Some(width) = self.fixed_width() {
            if nullable && !Self::read_presence(r)? {
                return Ok(());
            }
            return r.skip(width, self.type_name());
        }
        let Some(len) = read_length(r)? else {
            return self.null_sentinel(nullable);
        };
        r.skip(len, self.type_name())?;
        if self == Self::Decimal {
            r.skip(4, "decimal scale")?;
        }
        Ok(())
    }
}
