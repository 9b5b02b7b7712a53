//! Order-preserving key layout.
//!
//! Encoded keys compare with plain unsigned byte comparison in the same order
//! as the values they encode.
//!
//! # Fixed-width values
//!
//! - Unsigned integers, `char` and LOB locators: big-endian.
//! - Signed integers: big-endian with the sign bit flipped, so negative numbers
//!   sort before positive ones.
//! - Floats: IEEE 754 bits with the sign bit flipped for positive values and every
//!   bit flipped for negative values. NaN is canonicalised and sorts last.
//! - Booleans: `0x00` (false) or `0x01` (true).
//!
//! # Strings and byte arrays
//!
//! Null-terminated with escapes:
//! - `0x00` in the data is escaped to `0x00 0x01`
//! - the field ends with `0x00 0x00`
//!
//! so `"a" < "aa" < "ab" < "b"`, and no payload can be mistaken for the terminator.
//!
//! # Arbitrary precision
//!
//! Big integers carry a 4-byte header that orders by sign, then by magnitude of
//! the byte length, followed by minimal two's-complement bytes. Decimals are
//! normalised and written as sign marker, exponent and digit string; negative
//! decimals complement everything after the marker.
//!
//! # Nulls and direction
//!
//! Nullable fields are preceded by one marker byte (`0x00` null, `0x01` present),
//! so null sorts before every value. A descending field is the bitwise complement
//! of its ascending form, marker, escapes and terminator included.

use bigdecimal::BigDecimal;
use num_bigint::{BigInt, BigUint, Sign};
use num_traits::Zero;

use super::{Reader, TypeCodec};
use crate::error::{CodecError, CodecResult};
use crate::types::{Direction, LobLocator, Value};

/// Marker preceding a null nullable field.
pub const NULL_MARKER: u8 = 0x00;
/// Marker preceding a present nullable field.
pub const PRESENT_MARKER: u8 = 0x01;

const SIGN_FLIP_8: u8 = 0x80;
const SIGN_FLIP_16: u16 = 0x8000;
const SIGN_FLIP_32: u32 = 0x8000_0000;
const SIGN_FLIP_64: u64 = 0x8000_0000_0000_0000;

/// Escape byte: when we see 0x00 in data, we output 0x00 0x01
const ESCAPE_BYTE: u8 = 0x01;
/// Terminator: end of string/bytes is marked by 0x00 0x00
const TERMINATOR: u8 = 0x00;

const BIG_INT_POSITIVE_BASE: u32 = 0x8000_0000;
const BIG_INT_NEGATIVE_BASE: u32 = 0x7FFF_FFFF;

const DECIMAL_NEGATIVE: u8 = 0x7F;
const DECIMAL_ZERO: u8 = 0x80;
const DECIMAL_POSITIVE: u8 = 0x81;
const DECIMAL_TERMINATOR: u8 = 0x00;

impl TypeCodec {
    /// Key length independent of the value, or `None` for variable-length types.
    ///
    /// Nullable fields are never static: a null is its marker byte alone.
    #[must_use]
    pub const fn key_static_length(self, nullable: bool) -> Option<usize> {
        if nullable {
            return None;
        }
        self.fixed_width()
    }

    /// The shortest possible key encoding of a field of this type.
    #[must_use]
    pub const fn key_min_length(self, nullable: bool) -> usize {
        if nullable {
            return 1;
        }
        match self {
            Self::String | Self::Bytes => 2,
            Self::BigInt => 4,
            Self::Decimal => 1,
            _ => match self.fixed_width() {
                Some(width) => width,
                None => 0,
            },
        }
    }

    /// Exact key length of `value`, computed without writing it.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::IllegalArgument`] if the value does not fit this codec.
    pub fn key_length(self, value: &Value, nullable: bool) -> CodecResult<usize> {
        let marker = usize::from(nullable);
        if value.is_null() {
            return if nullable { Ok(1) } else { Err(self.null_not_allowed()) };
        }
        if let Some(width) = self.fixed_width() {
            if !self.accepts(value) {
                return Err(self.mismatch(value));
            }
            return Ok(marker + width);
        }
        let body = match (self, value) {
            (Self::String, Value::String(s)) => escaped_len(s.as_bytes()),
            (Self::Bytes, Value::Bytes(b)) => escaped_len(b),
            (Self::BigInt, Value::BigInt(v)) => 4 + v.to_signed_bytes_be().len(),
            (Self::Decimal, Value::Decimal(d)) => decimal_key_len(d)?,
            _ => return Err(self.mismatch(value)),
        };
        Ok(marker + body)
    }

    /// Appends the key encoding of `value` to `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::IllegalArgument`] if the value does not fit this codec.
    pub fn encode_key(
        self,
        value: &Value,
        nullable: bool,
        direction: Direction,
        buf: &mut Vec<u8>,
    ) -> CodecResult<()> {
        let start = buf.len();
        if value.is_null() {
            if !nullable {
                return Err(self.null_not_allowed());
            }
            buf.push(NULL_MARKER);
        } else {
            if nullable {
                buf.push(PRESENT_MARKER);
            }
            self.encode_key_body(value, buf)?;
        }
        if direction.is_descending() {
            complement(&mut buf[start..]);
        }
        Ok(())
    }

    fn encode_key_body(self, value: &Value, buf: &mut Vec<u8>) -> CodecResult<()> {
        match (self, value) {
            (Self::Bool, Value::Bool(b)) => buf.push(u8::from(*b)),
            (Self::Char, Value::Char(c)) => buf.extend_from_slice(&u32::from(*c).to_be_bytes()),
            (Self::I8, Value::I8(v)) => buf.push((*v as u8) ^ SIGN_FLIP_8),
            (Self::U8, Value::U8(v)) => buf.push(*v),
            (Self::I16, Value::I16(v)) => {
                buf.extend_from_slice(&((*v as u16) ^ SIGN_FLIP_16).to_be_bytes());
            }
            (Self::U16, Value::U16(v)) => buf.extend_from_slice(&v.to_be_bytes()),
            (Self::I32, Value::I32(v)) => {
                buf.extend_from_slice(&((*v as u32) ^ SIGN_FLIP_32).to_be_bytes());
            }
            (Self::U32, Value::U32(v)) => buf.extend_from_slice(&v.to_be_bytes()),
            (Self::I64, Value::I64(v)) => {
                buf.extend_from_slice(&((*v as u64) ^ SIGN_FLIP_64).to_be_bytes());
            }
            (Self::U64, Value::U64(v)) => buf.extend_from_slice(&v.to_be_bytes()),
            (Self::F32, Value::F32(f)) => buf.extend_from_slice(&sortable_f32(*f).to_be_bytes()),
            (Self::F64, Value::F64(f)) => buf.extend_from_slice(&sortable_f64(*f).to_be_bytes()),
            (Self::String, Value::String(s)) => encode_bytes_escaped(s.as_bytes(), buf),
            (Self::Bytes, Value::Bytes(b)) => encode_bytes_escaped(b, buf),
            (Self::BigInt, Value::BigInt(v)) => encode_big_int(v, buf)?,
            (Self::Decimal, Value::Decimal(d)) => encode_decimal(d, buf)?,
            (Self::Lob, Value::Lob(l)) => buf.extend_from_slice(&l.as_u64().to_be_bytes()),
            _ => return Err(self.mismatch(value)),
        }
        Ok(())
    }

    /// Decodes one key field from the start of `bytes`.
    ///
    /// Returns the value and the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::CorruptEncoding`] if the bytes are malformed or truncated.
    pub fn decode_key(
        self,
        bytes: &[u8],
        nullable: bool,
        direction: Direction,
    ) -> CodecResult<(Value, usize)> {
        let mut r = Reader::new(bytes, direction.mask());
        let value = self.read_key(&mut r, nullable)?;
        Ok((value, r.position()))
    }

    /// Reads one key field. The reader's mask must already match the field's direction.
    pub(crate) fn read_key(self, r: &mut Reader<'_>, nullable: bool) -> CodecResult<Value> {
        if nullable && read_null_marker(r)? {
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
            Self::Char => read_char(r)?,
            Self::I8 => Value::I8((r.read_u8("i8")? ^ SIGN_FLIP_8) as i8),
            Self::U8 => Value::U8(r.read_u8("u8")?),
            Self::I16 => {
                Value::I16((u16::from_be_bytes(r.read_array("i16")?) ^ SIGN_FLIP_16) as i16)
            }
            Self::U16 => Value::U16(u16::from_be_bytes(r.read_array("u16")?)),
            Self::I32 => {
                Value::I32((u32::from_be_bytes(r.read_array("i32")?) ^ SIGN_FLIP_32) as i32)
            }
            Self::U32 => Value::U32(u32::from_be_bytes(r.read_array("u32")?)),
            Self::I64 => {
                Value::I64((u64::from_be_bytes(r.read_array("i64")?) ^ SIGN_FLIP_64) as i64)
            }
            Self::U64 => Value::U64(u64::from_be_bytes(r.read_array("u64")?)),
            Self::F32 => Value::F32(f32_from_sortable(u32::from_be_bytes(r.read_array("f32")?))),
            Self::F64 => Value::F64(f64_from_sortable(u64::from_be_bytes(r.read_array("f64")?))),
            Self::String => {
                let bytes = decode_bytes_escaped(r)?;
                let s = String::from_utf8(bytes)
                    .map_err(|e| CodecError::corrupt(format!("invalid UTF-8: {e}")))?;
                Value::String(s)
            }
            Self::Bytes => Value::Bytes(decode_bytes_escaped(r)?),
            Self::BigInt => Value::BigInt(read_big_int(r)?),
            Self::Decimal => Value::Decimal(read_decimal(r)?),
            Self::Lob => Value::Lob(LobLocator::new(u64::from_be_bytes(r.read_array("lob")?))),
        };
        Ok(value)
    }

    /// Advances past one key field without materialising it.
    pub(crate) fn skip_key(self, r: &mut Reader<'_>, nullable: bool) -> CodecResult<()> {
        if nullable && read_null_marker(r)? {
            return Ok(());
        }
        if let Some(width) = self.fixed_width() {
            return r.skip(width, self.type_name());
        }
        match self {
            Self::String | Self::Bytes => skip_bytes_escaped(r),
            Self::BigInt => {
                let (_, len) = read_big_int_header(r)?;
                r.skip(len, "big integer")
            }
            _ => read_decimal(r).map(drop),
        }
    }
}

fn read_null_marker(r: &mut Reader<'_>) -> CodecResult<bool> {
    match r.read_u8("null marker")? {
        NULL_MARKER => Ok(true),
        PRESENT_MARKER => Ok(false),
        other => Err(CodecError::corrupt(format!("invalid null marker 0x{other:02x}"))),
    }
}

fn read_char(r: &mut Reader<'_>) -> CodecResult<Value> {
    let raw = u32::from_be_bytes(r.read_array("char")?);
    char::from_u32(raw)
        .map(Value::Char)
        .ok_or_else(|| CodecError::corrupt(format!("invalid char scalar 0x{raw:x}")))
}

/// Complements every byte in place.
#[inline]
pub(crate) fn complement(bytes: &mut [u8]) {
    for b in bytes {
        *b = !*b;
    }
}

fn sortable_f32(f: f32) -> u32 {
    let bits = if f.is_nan() { f32::NAN.to_bits() } else { f.to_bits() };
    if bits & SIGN_FLIP_32 == 0 {
        bits ^ SIGN_FLIP_32
    } else {
        !bits
    }
}

fn f32_from_sortable(encoded: u32) -> f32 {
    let bits = if encoded & SIGN_FLIP_32 != 0 { encoded ^ SIGN_FLIP_32 } else { !encoded };
    f32::from_bits(bits)
}

fn sortable_f64(f: f64) -> u64 {
    let bits = if f.is_nan() { f64::NAN.to_bits() } else { f.to_bits() };
    if bits & SIGN_FLIP_64 == 0 {
        bits ^ SIGN_FLIP_64
    } else {
        !bits
    }
}

fn f64_from_sortable(encoded: u64) -> f64 {
    let bits = if encoded & SIGN_FLIP_64 != 0 { encoded ^ SIGN_FLIP_64 } else { !encoded };
    f64::from_bits(bits)
}

/// Length of `data` once escaped and terminated.
#[must_use]
pub fn escaped_len(data: &[u8]) -> usize {
    data.len() + data.iter().filter(|&&b| b == 0x00).count() + 2
}

/// Encode bytes with null-escape encoding.
///
/// - Each 0x00 in input becomes 0x00 0x01
/// - Sequence ends with 0x00 0x00
fn encode_bytes_escaped(data: &[u8], buf: &mut Vec<u8>) {
    for &byte in data {
        if byte == 0x00 {
            buf.push(0x00);
            buf.push(ESCAPE_BYTE);
        } else {
            buf.push(byte);
        }
    }
    buf.push(TERMINATOR);
    buf.push(TERMINATOR);
}

fn decode_bytes_escaped(r: &mut Reader<'_>) -> CodecResult<Vec<u8>> {
    let mut result = Vec::new();
    loop {
        let byte = r.read_u8("escaped bytes").map_err(|_| missing_terminator())?;
        if byte != 0x00 {
            result.push(byte);
            continue;
        }
        match r.read_u8("escaped bytes").map_err(|_| missing_terminator())? {
            TERMINATOR => return Ok(result),
            ESCAPE_BYTE => result.push(0x00),
            other => {
                return Err(CodecError::corrupt(format!(
                    "invalid escape sequence: 0x00 0x{other:02x}"
                )))
            }
        }
    }
}

fn skip_bytes_escaped(r: &mut Reader<'_>) -> CodecResult<()> {
    loop {
        if r.read_u8("escaped bytes").map_err(|_| missing_terminator())? != 0x00 {
            continue;
        }
        match r.read_u8("escaped bytes").map_err(|_| missing_terminator())? {
            TERMINATOR => return Ok(()),
            ESCAPE_BYTE => {}
            other => {
                return Err(CodecError::corrupt(format!(
                    "invalid escape sequence: 0x00 0x{other:02x}"
                )))
            }
        }
    }
}

fn missing_terminator() -> CodecError {
    CodecError::corrupt("missing terminator in escaped bytes")
}

fn big_int_header(v: &BigInt, len: usize) -> CodecResult<u32> {
    let len = u32::try_from(len)
        .ok()
        .filter(|&l| l <= BIG_INT_NEGATIVE_BASE)
        .ok_or_else(|| CodecError::illegal("big integer too long for key encoding"))?;
    Ok(if v.sign() == Sign::Minus {
        BIG_INT_NEGATIVE_BASE - len
    } else {
        BIG_INT_POSITIVE_BASE + len
    })
}

fn encode_big_int(v: &BigInt, buf: &mut Vec<u8>) -> CodecResult<()> {
    let bytes = v.to_signed_bytes_be();
    buf.extend_from_slice(&big_int_header(v, bytes.len())?.to_be_bytes());
    buf.extend_from_slice(&bytes);
    Ok(())
}

fn read_big_int_header(r: &mut Reader<'_>) -> CodecResult<(bool, usize)> {
    let header = u32::from_be_bytes(r.read_array("big integer header")?);
    let (negative, len) = if header & BIG_INT_POSITIVE_BASE != 0 {
        (false, header - BIG_INT_POSITIVE_BASE)
    } else {
        (true, BIG_INT_NEGATIVE_BASE - header)
    };
    let len = usize::try_from(len)
        .map_err(|_| CodecError::corrupt("big integer length exceeds platform capacity"))?;
    Ok((negative, len))
}

fn read_big_int(r: &mut Reader<'_>) -> CodecResult<BigInt> {
    let (negative, len) = read_big_int_header(r)?;
    let bytes = r.read_vec(len, "big integer")?;
    let value = BigInt::from_signed_bytes_be(&bytes);
    if negative != (value.sign() == Sign::Minus) {
        return Err(CodecError::corrupt("big integer sign does not match its header"));
    }
    Ok(value)
}

/// Sign, decimal exponent and significant digits of a non-zero decimal.
///
/// The value equals `0.d1d2d3... * 10^exponent` with `d1 != 0` and no trailing
/// zeros. Trailing zeros are dropped from the digit string, which leaves the
/// exponent unchanged, so the decimal itself is never rescaled.
fn decimal_parts(d: &BigDecimal) -> CodecResult<(bool, i64, String)> {
    let (unscaled, scale) = d.as_bigint_and_exponent();
    let mut digits = unscaled.magnitude().to_str_radix(10);
    let exponent = i64::try_from(digits.len())
        .ok()
        .and_then(|n| n.checked_sub(scale))
        .ok_or_else(|| CodecError::illegal("decimal exponent out of range"))?;
    digits.truncate(digits.trim_end_matches('0').len());
    Ok((unscaled.sign() == Sign::Minus, exponent, digits))
}

fn decimal_key_len(d: &BigDecimal) -> CodecResult<usize> {
    if d.is_zero() {
        return Ok(1);
    }
    let (_, _, digits) = decimal_parts(d)?;
    Ok(1 + 8 + digits.len() + 1)
}

fn encode_decimal(d: &BigDecimal, buf: &mut Vec<u8>) -> CodecResult<()> {
    if d.is_zero() {
        buf.push(DECIMAL_ZERO);
        return Ok(());
    }
    let (negative, exponent, digits) = decimal_parts(d)?;
    buf.push(if negative { DECIMAL_NEGATIVE } else { DECIMAL_POSITIVE });
    let body = buf.len();
    buf.extend_from_slice(&((exponent as u64) ^ SIGN_FLIP_64).to_be_bytes());
    // Digits shift up by one so the terminator stays below every digit.
    buf.extend(digits.bytes().map(|d| d - b'0' + 1));
    buf.push(DECIMAL_TERMINATOR);
    if negative {
        complement(&mut buf[body..]);
    }
    Ok(())
}

fn read_decimal(r: &mut Reader<'_>) -> CodecResult<BigDecimal> {
    let negative = match r.read_u8("decimal marker")? {
        DECIMAL_ZERO => return Ok(BigDecimal::zero()),
        DECIMAL_POSITIVE => false,
        DECIMAL_NEGATIVE => true,
        other => return Err(CodecError::corrupt(format!("invalid decimal marker 0x{other:02x}"))),
    };

    let field_mask = r.mask();
    if negative {
        r.set_mask(!field_mask);
    }
    let exponent = (u64::from_be_bytes(r.read_array("decimal exponent")?) ^ SIGN_FLIP_64) as i64;
    let mut digits = Vec::new();
    loop {
        match r.read_u8("decimal digits")? {
            DECIMAL_TERMINATOR => break,
            d @ 1..=10 => digits.push(b'0' + d - 1),
            other => {
                r.set_mask(field_mask);
                return Err(CodecError::corrupt(format!(
                    "invalid decimal digit byte 0x{other:02x}"
                )));
            }
        }
    }
    r.set_mask(field_mask);

    let magnitude = BigUint::parse_bytes(&digits, 10)
        .ok_or_else(|| CodecError::corrupt("decimal has no digits"))?;
    let scale = i64::try_from(digits.len())
        .ok()
        .and_then(|n| n.checked_sub(exponent))
        .ok_or_else(|| CodecError::corrupt("decimal exponent out of range"))?;
    let sign = if negative { Sign::Minus } else { Sign::Plus };
    Ok(BigDecimal::new(BigInt::from_biguint(sign, magnitude), scale))
}
