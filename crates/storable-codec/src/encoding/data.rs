//! Compact value encoding.
//!
//! # Layout
//!
//! ```text
//! [prefix padding] [generation tag?] [field 0] ... [field n-1] [suffix padding]
//! ```
//!
//! The generation tag is written when the caller passes a generation and read
//! back when the caller expects one; the two sides must agree on whether a tag
//! is present. A single byte-array property is written raw, with no length
//! prefix, since it runs to the end of the body.

use std::borrow::{Borrow, Cow};
use std::sync::Arc;

use tracing::trace;

use super::codec::data::{ABSENT, PRESENT};
use super::codec::{Reader, TypeCodec};
use super::field::Field;
use super::generation::GenerationTag;
use super::length::{EncodingMode, FieldRange, LengthCalculator};
use crate::error::{CodecError, CodecResult};
use crate::types::Value;

/// Outcome of a generation-checked decode.
#[derive(Debug, Clone, PartialEq)]
pub enum DataDecoding {
    /// The buffer carried the expected generation (or none was expected).
    Current(Vec<Value>),
    /// The buffer was written by another generation and was not decoded.
    Other {
        /// The generation found in the buffer.
        generation: u32,
    },
}

/// Compact encoder/decoder for the non-key properties of a schema.
#[derive(Debug, Clone)]
pub struct DataCodec {
    fields: Arc<[Field]>,
    prefix: usize,
    suffix: usize,
    lengths: LengthCalculator,
    raw_bytes: bool,
}

impl DataCodec {
    /// Creates a codec over `fields`, reserving `prefix` and `suffix` zero bytes.
    #[must_use]
    pub fn new(fields: Vec<Field>, prefix: usize, suffix: usize) -> Self {
        let lengths = LengthCalculator::new(EncodingMode::Data, &fields, prefix, suffix);
        let raw_bytes = matches!(fields.as_slice(), [field] if field.codec() == TypeCodec::Bytes);
        Self { fields: fields.into(), prefix, suffix, lengths, raw_bytes }
    }

    /// The data fields.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Number of data properties.
    #[must_use]
    pub fn property_count(&self) -> usize {
        self.fields.len()
    }

    /// Reserved prefix length.
    #[must_use]
    pub const fn prefix_len(&self) -> usize {
        self.prefix
    }

    /// Reserved suffix length.
    #[must_use]
    pub const fn suffix_len(&self) -> usize {
        self.suffix
    }

    /// Encodes `values`, one per data field, tagged with `generation` if given.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::IllegalArgument`] if the value count is wrong, a
    /// value does not fit its field, or the generation is out of range.
    pub fn encode<V: Borrow<Value>>(
        &self,
        values: &[V],
        generation: Option<u32>,
    ) -> CodecResult<Vec<u8>> {
        if values.len() != self.fields.len() {
            return Err(CodecError::illegal(format!(
                "expected {} data values, got {}",
                self.fields.len(),
                values.len()
            )));
        }
        let tag = generation.map(GenerationTag::new).transpose()?;
        let header = tag.map_or(0, GenerationTag::encoded_len);
        let stored = self
            .fields
            .iter()
            .zip(values)
            .map(|(field, value)| field.storage_value(value.borrow()))
            .collect::<CodecResult<Vec<_>>>()?;

        let len = if self.raw_bytes {
            self.prefix + header + self.raw_len(&stored[0]) + self.suffix
        } else {
            let full = FieldRange::full(self.fields.len());
            self.lengths.encoded_length(&self.fields, &stored, full, header)?
        };

        let mut buf = Vec::with_capacity(len);
        buf.resize(self.prefix, 0);
        if let Some(tag) = tag {
            tag.write(&mut buf);
        }
        if self.raw_bytes {
            self.encode_raw(&stored[0], &mut buf);
        } else {
            for (field, value) in self.fields.iter().zip(&stored) {
                field.encode_data(value, &mut buf)?;
            }
        }
        buf.resize(buf.len() + self.suffix, 0);
        debug_assert_eq!(buf.len(), len, "data length mismatch");
        Ok(buf)
    }

    fn raw_len(&self, stored: &Value) -> usize {
        usize::from(self.fields[0].is_nullable()) + stored.as_bytes().map_or(0, <[u8]>::len)
    }

    fn encode_raw(&self, stored: &Cow<'_, Value>, buf: &mut Vec<u8>) {
        trace!("encoding single byte-array data");
        if self.fields[0].is_nullable() {
            buf.push(if stored.is_null() { ABSENT } else { PRESENT });
        }
        buf.extend_from_slice(stored.as_bytes().unwrap_or_default());
    }

    /// Reads the generation tag without decoding any property.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::CorruptEncoding`] if the buffer ends before the tag does.
    pub fn peek_generation(&self, bytes: &[u8]) -> CodecResult<u32> {
        let body = bytes.get(self.prefix..).unwrap_or_default();
        GenerationTag::read(&mut Reader::new(body, 0)).map(GenerationTag::get)
    }

    /// Decodes a buffer, failing if it carries a generation other than `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::CorruptEncoding`] on malformed input or a generation
    /// mismatch; the latter carries both generations.
    pub fn decode(&self, bytes: &[u8], expected: Option<u32>) -> CodecResult<Vec<Value>> {
        match self.decode_checked(bytes, expected)? {
            DataDecoding::Current(values) => Ok(values),
            DataDecoding::Other { generation } => Err(CodecError::generation_mismatch(
                expected.unwrap_or_default(),
                generation,
            )),
        }
    }

    /// Decodes a buffer, reporting a foreign generation instead of failing on it.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::CorruptEncoding`] on malformed input.
    pub fn decode_checked(&self, bytes: &[u8], expected: Option<u32>) -> CodecResult<DataDecoding> {
        let mut r = Reader::new(self.body(bytes, expected)?, 0);
        if let Some(generation) = Self::foreign_generation(&mut r, expected)? {
            return Ok(DataDecoding::Other { generation });
        }

        if self.raw_bytes {
            return self.decode_raw(r.rest()).map(|v| DataDecoding::Current(vec![v]));
        }

        let values = self
            .fields
            .iter()
            .map(|field| field.decode_data(&mut r))
            .collect::<CodecResult<Vec<_>>>()?;
        if r.remaining() != 0 {
            return Err(CodecError::corrupt(format!("{} trailing bytes after data", r.remaining())));
        }
        Ok(DataDecoding::Current(values))
    }

    /// Decodes the data property at `index` alone, skipping the fields before it.
    ///
    /// Fields after `index` are not read, so their corruption goes unnoticed.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::IllegalArgument`] if `index` is out of range, and
    /// [`CodecError::CorruptEncoding`] on malformed input or a generation
    /// mismatch; the latter carries both generations.
    pub fn decode_field(
        &self,
        bytes: &[u8],
        expected: Option<u32>,
        index: usize,
    ) -> CodecResult<Value> {
        let Some(field) = self.fields.get(index) else {
            return Err(CodecError::illegal(format!(
                "data property {index} requested, schema has {}",
                self.fields.len()
            )));
        };
        let mut r = Reader::new(self.body(bytes, expected)?, 0);
        if let Some(generation) = Self::foreign_generation(&mut r, expected)? {
            return Err(CodecError::generation_mismatch(expected.unwrap_or_default(), generation));
        }

        if self.raw_bytes {
            return self.decode_raw(r.rest());
        }
        for skipped in &self.fields[..index] {
            skipped.skip_data(&mut r)?;
        }
        field.decode_data(&mut r)
    }

    /// The bytes between the padding, once the buffer is long enough to hold them.
    fn body<'b>(&self, bytes: &'b [u8], expected: Option<u32>) -> CodecResult<&'b [u8]> {
        let min = self.minimum_length() + usize::from(expected.is_some());
        if bytes.len() < min {
            return Err(CodecError::corrupt(format!(
                "data needs at least {min} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(&bytes[self.prefix..bytes.len() - self.suffix])
    }

    /// Reads the generation tag when one is expected, returning it if it differs.
    fn foreign_generation(r: &mut Reader<'_>, expected: Option<u32>) -> CodecResult<Option<u32>> {
        let Some(expected) = expected else {
            return Ok(None);
        };
        let actual = GenerationTag::read(r)?.get();
        Ok((actual != expected).then_some(actual))
    }

    fn minimum_length(&self) -> usize {
        if self.raw_bytes {
            return self.prefix + usize::from(self.fields[0].is_nullable()) + self.suffix;
        }
        self.lengths.minimum_length(FieldRange::full(self.fields.len()))
    }

    fn decode_raw(&self, body: &[u8]) -> CodecResult<Value> {
        trace!("decoding single byte-array data");
        let field = &self.fields[0];
        let stored = if field.is_nullable() {
            match body.split_first() {
                Some((&ABSENT, [])) => Value::Null,
                Some((&PRESENT, rest)) => Value::Bytes(rest.to_vec()),
                _ => return Err(CodecError::corrupt("invalid presence byte in byte-array data")),
            }
        } else {
            Value::Bytes(body.to_vec())
        };
        field.logical_value(stored)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{LogicalType, PropertyDescriptor};

    fn codec(descriptors: &[PropertyDescriptor], prefix: usize, suffix: usize) -> DataCodec {
        let fields = descriptors.iter().map(|d| Field::new(d).unwrap()).collect();
        DataCodec::new(fields, prefix, suffix)
    }

    fn person() -> DataCodec {
        codec(
            &[
                PropertyDescriptor::new("name", LogicalType::String),
                PropertyDescriptor::new("age", LogicalType::U8).nullable(),
                PropertyDescriptor::new("email", LogicalType::String).nullable(),
            ],
            1,
            2,
        )
    }

    #[test]
    fn roundtrip_with_generation() {
        let codec = person();
        let values = vec![Value::String("Ada".into()), Value::U8(36), Value::Null];
        let bytes = codec.encode(&values, Some(3)).unwrap();
        // prefix, generation, name, age, email, suffix
        assert_eq!(bytes, vec![0, 3, 3, b'A', b'd', b'a', PRESENT, 36, 0xFF, 0, 0]);
        assert_eq!(codec.decode(&bytes, Some(3)).unwrap(), values);
        assert_eq!(codec.peek_generation(&bytes).unwrap(), 3);
    }

    #[test]
    fn roundtrip_without_generation() {
        let codec = person();
        let values = vec![Value::String(String::new()), Value::Null, Value::String("a@b".into())];
        let bytes = codec.encode(&values, None).unwrap();
        assert_eq!(codec.decode(&bytes, None).unwrap(), values);
    }

    #[test]
    fn wide_generation() {
        let codec = person();
        let values = vec![Value::String("x".into()), Value::Null, Value::Null];
        let bytes = codec.encode(&values, Some(1000)).unwrap();
        assert_eq!(&bytes[1..5], &(1000u32 | 0x8000_0000).to_be_bytes());
        assert_eq!(codec.decode(&bytes, Some(1000)).unwrap(), values);
    }

    #[test]
    fn generation_mismatch_is_corrupt() {
        let codec = person();
        let values = vec![Value::String("x".into()), Value::Null, Value::Null];
        let bytes = codec.encode(&values, Some(5)).unwrap();
        let err = codec.decode(&bytes, Some(6)).unwrap_err();
        assert!(err.is_corrupt());
        assert_eq!(err.generations(), Some((6, 5)));
        assert_eq!(
            codec.decode_checked(&bytes, Some(6)).unwrap(),
            DataDecoding::Other { generation: 5 }
        );
    }

    #[test]
    fn decode_single_field() {
        let codec = person();
        let values = vec![Value::String("Ada".into()), Value::U8(36), Value::Null];
        let bytes = codec.encode(&values, Some(3)).unwrap();
        for (index, value) in values.iter().enumerate() {
            assert_eq!(&codec.decode_field(&bytes, Some(3), index).unwrap(), value);
        }

        let err = codec.decode_field(&bytes, Some(4), 1).unwrap_err();
        assert_eq!(err.generations(), Some((4, 3)));
        let err = codec.decode_field(&bytes, Some(3), 3).unwrap_err();
        assert!(matches!(err, CodecError::IllegalArgument(_)));
    }

    #[test]
    fn decode_single_field_checks_skipped_presence() {
        let codec = person();
        let values = vec![Value::String("Ada".into()), Value::U8(36), Value::Null];
        let mut bytes = codec.encode(&values, Some(3)).unwrap();
        bytes[6] = 0x02;
        assert_eq!(codec.decode_field(&bytes, Some(3), 0).unwrap(), values[0]);
        assert!(codec.decode_field(&bytes, Some(3), 2).unwrap_err().is_corrupt());
        assert!(codec.decode(&bytes, Some(3)).unwrap_err().is_corrupt());
    }

    #[test]
    fn generation_out_of_range() {
        let codec = person();
        let values = vec![Value::String("x".into()), Value::Null, Value::Null];
        let result = codec.encode(&values, Some(u32::MAX));
        assert!(matches!(result, Err(CodecError::IllegalArgument(_))));
    }

    #[test]
    fn wrong_value_count() {
        let codec = person();
        assert!(matches!(codec.encode(&[Value::Null], None), Err(CodecError::IllegalArgument(_))));
    }

    #[test]
    fn raw_bytes_fast_path() {
        let codec = codec(&[PropertyDescriptor::new("payload", LogicalType::Bytes)], 2, 0);
        let bytes = codec.encode(&[Value::Bytes(vec![9, 8, 7])], Some(1)).unwrap();
        assert_eq!(bytes, vec![0, 0, 1, 9, 8, 7]);
        assert_eq!(codec.decode(&bytes, Some(1)).unwrap(), vec![Value::Bytes(vec![9, 8, 7])]);
    }

    #[test]
    fn raw_bytes_nullable() {
        let codec =
            codec(&[PropertyDescriptor::new("payload", LogicalType::Bytes).nullable()], 0, 0);
        let null = codec.encode(&[Value::Null], None).unwrap();
        assert_eq!(null, vec![ABSENT]);
        assert_eq!(codec.decode(&null, None).unwrap(), vec![Value::Null]);
        let present = codec.encode(&[Value::Bytes(vec![])], None).unwrap();
        assert_eq!(codec.decode(&present, None).unwrap(), vec![Value::Bytes(vec![])]);
    }

    #[test]
    fn empty_codec() {
        let codec = codec(&[], 0, 0);
        let bytes = codec.encode::<Value>(&[], Some(0)).unwrap();
        assert_eq!(bytes, vec![0]);
        assert!(codec.decode(&bytes, Some(0)).unwrap().is_empty());
    }

    #[test]
    fn truncated_is_corrupt() {
        let codec = person();
        let values = vec![Value::String("Ada".into()), Value::U8(36), Value::Null];
        let bytes = codec.encode(&values, Some(3)).unwrap();
        assert!(codec.decode(&bytes[..5], Some(3)).unwrap_err().is_corrupt());
    }

    #[test]
    fn trailing_bytes_are_corrupt() {
        let codec = codec(&[PropertyDescriptor::new("n", LogicalType::I16)], 0, 0);
        let mut bytes = codec.encode(&[Value::I16(1)], None).unwrap();
        bytes.push(0);
        assert!(codec.decode(&bytes, None).unwrap_err().is_corrupt());
    }
}
