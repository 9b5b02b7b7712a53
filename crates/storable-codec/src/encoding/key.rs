//! Composite key encoding.
//!
//! A [`KeyCodec`] writes the key properties of a schema, in key order, using
//! the order-preserving layout of each field. The result compares byte-wise in
//! the same order as the tuple compares field by field, each field honouring
//! its direction.
//!
//! # Layout
//!
//! ```text
//! [prefix padding] [field 0] [field 1] ... [field n-1] [suffix padding]
//! ```
//!
//! A partial key covers a contiguous `[start, end)` slice of the fields. The
//! prefix padding is only written when `start == 0` and the suffix padding
//! only when `end == n`, so partial encodings over adjoining ranges concatenate
//! to the full encoding.
//!
//! # Single byte-array keys
//!
//! A key made of one ascending byte-array property is written without escaping
//! or terminator: the raw bytes already sort correctly when nothing follows
//! them. Descending byte-array keys take the general path, since complemented
//! raw bytes would sort a prefix before its extensions.

use std::borrow::{Borrow, Cow};
use std::ops::RangeBounds;
use std::sync::Arc;

use tracing::trace;

use super::codec::key::{NULL_MARKER, PRESENT_MARKER};
use super::codec::{Reader, TypeCodec};
use super::field::Field;
use super::length::{EncodingMode, FieldRange, LengthCalculator};
use crate::error::{CodecError, CodecResult};
use crate::types::Value;

/// Order-preserving encoder/decoder for a fixed list of key fields.
#[derive(Debug, Clone)]
pub struct KeyCodec {
    fields: Arc<[Field]>,
    prefix: usize,
    suffix: usize,
    lengths: LengthCalculator,
    raw_bytes: bool,
}

impl KeyCodec {
    /// Creates a codec over `fields`, in key order, reserving `prefix` and
    /// `suffix` zero bytes around every full key.
    #[must_use]
    pub fn new(fields: Vec<Field>, prefix: usize, suffix: usize) -> Self {
        let lengths = LengthCalculator::new(EncodingMode::Key, &fields, prefix, suffix);
        let raw_bytes = matches!(
            fields.as_slice(),
            [field] if field.codec() == TypeCodec::Bytes && !field.direction().is_descending()
        );
        Self { fields: fields.into(), prefix, suffix, lengths, raw_bytes }
    }

    /// The key fields, in key order.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Number of key properties.
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

    /// Length of every key, if it does not depend on the values.
    #[must_use]
    pub fn static_length(&self) -> Option<usize> {
        self.lengths.static_length(FieldRange::full(self.fields.len()))
    }

    fn minimum_length(&self, range: FieldRange) -> usize {
        if self.raw_bytes {
            return self.prefix + usize::from(self.fields[0].is_nullable()) + self.suffix;
        }
        self.lengths.minimum_length(range)
    }

    /// Resolves caller bounds against the key fields.
    ///
    /// Single-property keys have no meaningful partial range; their bounds are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::IllegalArgument`] for invalid bounds.
    pub fn resolve_range(&self, range: impl RangeBounds<usize>) -> CodecResult<FieldRange> {
        if self.fields.len() == 1 {
            return Ok(FieldRange::full(1));
        }
        FieldRange::resolve(range, self.fields.len())
    }

    /// Encodes a full key. `values` are in key order.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::IllegalArgument`] if there are too few values, a
    /// non-nullable value is null, or a value has the wrong type.
    pub fn encode<V: Borrow<Value>>(&self, values: &[V]) -> CodecResult<Vec<u8>> {
        self.encode_range(values, ..)
    }

    /// Encodes the `range` slice of the key fields.
    ///
    /// `values` are in key order and must cover at least `range.end`; values
    /// outside the range are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::IllegalArgument`] for invalid bounds, too few
    /// values, or a value that does not fit its field.
    pub fn encode_range<V: Borrow<Value>>(
        &self,
        values: &[V],
        range: impl RangeBounds<usize>,
    ) -> CodecResult<Vec<u8>> {
        let range = self.resolve_range(range)?;
        if values.len() < range.end() {
            return Err(CodecError::illegal(format!(
                "expected at least {} key values, got {}",
                range.end(),
                values.len()
            )));
        }
        let stored = range
            .indices()
            .map(|i| self.fields[i].storage_value(values[i].borrow()))
            .collect::<CodecResult<Vec<_>>>()?;

        if self.raw_bytes {
            return Ok(self.encode_raw(&stored[0]));
        }

        let len = self.lengths.encoded_length(&self.fields, &stored, range, 0)?;
        let mut buf = Vec::with_capacity(len);
        if range.has_prefix() {
            buf.resize(self.prefix, 0);
        }
        for (field, value) in self.fields[range.indices()].iter().zip(&stored) {
            field.encode_key(value, &mut buf)?;
        }
        if range.has_suffix() {
            buf.resize(buf.len() + self.suffix, 0);
        }
        debug_assert_eq!(buf.len(), len, "key length mismatch");
        Ok(buf)
    }

    fn encode_raw(&self, stored: &Cow<'_, Value>) -> Vec<u8> {
        trace!("encoding single byte-array key");
        let nullable = self.fields[0].is_nullable();
        let body = stored.as_bytes().unwrap_or_default();
        let len = self.prefix + usize::from(nullable) + body.len() + self.suffix;
        let mut buf = Vec::with_capacity(len);
        buf.resize(self.prefix, 0);
        if nullable {
            buf.push(if stored.is_null() { NULL_MARKER } else { PRESENT_MARKER });
        }
        buf.extend_from_slice(body);
        buf.resize(buf.len() + self.suffix, 0);
        buf
    }

    /// Decodes a full key into values in key order.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::CorruptEncoding`] if the key is too short, malformed,
    /// or has trailing bytes.
    pub fn decode(&self, bytes: &[u8]) -> CodecResult<Vec<Value>> {
        self.decode_range(bytes, ..)
    }

    /// Decodes a buffer produced by [`encode_range`](Self::encode_range) with the same bounds.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::IllegalArgument`] for invalid bounds and
    /// [`CodecError::CorruptEncoding`] for malformed input.
    pub fn decode_range(
        &self,
        bytes: &[u8],
        range: impl RangeBounds<usize>,
    ) -> CodecResult<Vec<Value>> {
        self.decode_fields(bytes, self.resolve_range(range)?)
    }

    /// Decodes a buffer holding exactly the fields of an already resolved range.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::CorruptEncoding`] for malformed input.
    pub fn decode_fields(&self, bytes: &[u8], range: FieldRange) -> CodecResult<Vec<Value>> {
        let min = self.minimum_length(range);
        if bytes.len() < min {
            return Err(CodecError::corrupt(format!(
                "key needs at least {min} bytes, got {}",
                bytes.len()
            )));
        }
        let start = if range.has_prefix() { self.prefix } else { 0 };
        let end = bytes.len() - if range.has_suffix() { self.suffix } else { 0 };
        let body = &bytes[start..end];

        if self.raw_bytes {
            return self.decode_raw(body).map(|v| vec![v]);
        }

        let mut r = Reader::new(body, 0);
        let values = self.fields[range.indices()]
            .iter()
            .map(|field| field.decode_key(&mut r))
            .collect::<CodecResult<Vec<_>>>()?;
        if r.remaining() != 0 {
            return Err(CodecError::corrupt(format!("{} trailing bytes after key", r.remaining())));
        }
        Ok(values)
    }

    fn decode_raw(&self, body: &[u8]) -> CodecResult<Value> {
        trace!("decoding single byte-array key");
        let field = &self.fields[0];
        let stored = if field.is_nullable() {
            match body.split_first() {
                Some((&NULL_MARKER, [])) => Value::Null,
                Some((&PRESENT_MARKER, rest)) => Value::Bytes(rest.to_vec()),
                _ => return Err(CodecError::corrupt("invalid null marker in byte-array key")),
            }
        } else {
            Value::Bytes(body.to_vec())
        };
        field.logical_value(stored)
    }

    /// Decodes the `range` slice of the fields out of a full key, skipping the
    /// fields before it without materialising them.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::IllegalArgument`] for invalid bounds and
    /// [`CodecError::CorruptEncoding`] for malformed input.
    pub fn decode_partial(
        &self,
        full_key: &[u8],
        range: impl RangeBounds<usize>,
    ) -> CodecResult<Vec<Value>> {
        let range = self.resolve_range(range)?;
        if self.raw_bytes {
            return self.decode(full_key);
        }
        let min = self.minimum_length(FieldRange::full(self.fields.len()));
        if full_key.len() < min {
            return Err(CodecError::corrupt(format!(
                "key needs at least {min} bytes, got {}",
                full_key.len()
            )));
        }
        let mut r = Reader::new(&full_key[self.prefix..full_key.len() - self.suffix], 0);
        for field in &self.fields[..range.start()] {
            field.skip_key(&mut r)?;
        }
        self.fields[range.indices()].iter().map(|field| field.decode_key(&mut r)).collect()
    }

    /// The smallest byte string greater than every key starting with `prefix`,
    /// or `None` if no such bound exists (empty or all-`0xFF` prefix).
    #[must_use]
    pub fn increment_prefix(prefix: &[u8]) -> Option<Vec<u8>> {
        let mut end = prefix.to_vec();
        while let Some(last) = end.pop() {
            if last < u8::MAX {
                end.push(last + 1);
                return Some(end);
            }
        }
        None
    }
}
