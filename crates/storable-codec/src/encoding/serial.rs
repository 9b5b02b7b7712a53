//! Sparse encoding of a partially populated object.
//!
//! # Layout
//!
//! ```text
//! [state bytes] [initialized field] [initialized field] ...
//! ```
//!
//! The state bytes hold two bits per property, four properties to a byte, in
//! ordinal order. Only properties whose state is initialized contribute field
//! bytes, in the compact data layout. There is no caller padding and no
//! generation tag: serial encodings are for transfer, not storage.

use std::borrow::{Borrow, Cow};
use std::sync::Arc;

use super::codec::Reader;
use super::field::Field;
use super::length::{EncodingMode, LengthCalculator};
use crate::error::{CodecError, CodecResult};
use crate::types::{PropertyStates, Value};

/// Encoder/decoder for every property of a schema, in ordinal order.
#[derive(Debug, Clone)]
pub struct SerialCodec {
    fields: Arc<[Field]>,
    lengths: LengthCalculator,
}

impl SerialCodec {
    /// Creates a codec over `fields`, which must be in ordinal order.
    #[must_use]
    pub fn new(fields: Vec<Field>) -> Self {
        let lengths = LengthCalculator::new(EncodingMode::Serial, &fields, 0, 0);
        Self { fields: fields.into(), lengths }
    }

    /// The fields, in ordinal order.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Number of state bytes every encoding starts with.
    #[must_use]
    pub fn state_len(&self) -> usize {
        PropertyStates::serial_len(self.fields.len())
    }

    /// Encodes the initialized properties of `values`, indexed by ordinal.
    ///
    /// Values of uninitialized properties are ignored and may be anything.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::IllegalArgument`] if the value count is wrong or an
    /// initialized value does not fit its field.
    pub fn encode<V: Borrow<Value>>(
        &self,
        values: &[V],
        states: &PropertyStates,
    ) -> CodecResult<Vec<u8>> {
        if values.len() != self.fields.len() {
            return Err(CodecError::illegal(format!(
                "expected {} values, got {}",
                self.fields.len(),
                values.len()
            )));
        }
        let stored = self
            .fields
            .iter()
            .zip(values)
            .enumerate()
            .map(|(ordinal, (field, value))| {
                if states.is_initialized(ordinal) {
                    field.storage_value(value.borrow()).map(Some)
                } else {
                    Ok(None)
                }
            })
            .collect::<CodecResult<Vec<Option<Cow<'_, Value>>>>>()?;

        let len = self.lengths.serial_length(&self.fields, &stored)?;
        let state_len = self.state_len();
        let mut buf = Vec::with_capacity(len);
        buf.resize(state_len, 0);
        states.write_serial_bytes(self.fields.len(), &mut buf);
        for (field, value) in self.fields.iter().zip(&stored) {
            if let Some(value) = value {
                field.encode_data(value, &mut buf)?;
            }
        }
        debug_assert_eq!(buf.len(), len, "serial length mismatch");
        Ok(buf)
    }

    /// Decodes a serial encoding into values indexed by ordinal and their states.
    ///
    /// Uninitialized properties come back as their type's zero value.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::CorruptEncoding`] if the input is malformed.
    pub fn decode(&self, bytes: &[u8]) -> CodecResult<(Vec<Value>, PropertyStates)> {
        let mut values = vec![Value::Null; self.fields.len()];
        let mut states = PropertyStates::new(self.fields.len());
        self.decode_into(bytes, &mut values, &mut states)?;
        Ok((values, states))
    }

    /// Decodes into caller-owned storage.
    ///
    /// Every slot of `values` is overwritten, and every state slot covered by
    /// the schema is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::IllegalArgument`] if `values` has the wrong length and
    /// [`CodecError::CorruptEncoding`] if the input is malformed. An adapter that
    /// cannot convert its storage zero fails the decode with its own error.
    pub fn decode_into(
        &self,
        bytes: &[u8],
        values: &mut [Value],
        states: &mut PropertyStates,
    ) -> CodecResult<()> {
        if values.len() != self.fields.len() {
            return Err(CodecError::illegal(format!(
                "expected {} value slots, got {}",
                self.fields.len(),
                values.len()
            )));
        }
        let decoded_states = PropertyStates::from_serial_bytes(bytes, self.fields.len())?;
        let mut r = Reader::new(&bytes[self.state_len()..], 0);
        let mut decoded = Vec::with_capacity(self.fields.len());
        for (ordinal, field) in self.fields.iter().enumerate() {
            decoded.push(if decoded_states.is_initialized(ordinal) {
                field.decode_data(&mut r)?
            } else {
                field.zero()?
            });
        }
        if r.remaining() != 0 {
            return Err(CodecError::corrupt(format!(
                "{} trailing bytes after serial encoding",
                r.remaining()
            )));
        }

        // Nothing is written back until the whole buffer has decoded.
        for (ordinal, (slot, value)) in values.iter_mut().zip(decoded).enumerate() {
            *slot = value;
            states.set(ordinal, decoded_states.get(ordinal));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{LogicalType, PropertyDescriptor, PropertyState};

    fn codec() -> SerialCodec {
        let fields = [
            PropertyDescriptor::new("id", LogicalType::I64),
            PropertyDescriptor::new("name", LogicalType::String),
            PropertyDescriptor::new("nick", LogicalType::String).nullable(),
            PropertyDescriptor::new("score", LogicalType::F64),
            PropertyDescriptor::new("active", LogicalType::Bool),
        ]
        .iter()
        .map(|d| Field::new(d).unwrap())
        .collect();
        SerialCodec::new(fields)
    }

    fn values() -> Vec<Value> {
        vec![
            Value::I64(7),
            Value::String("Grace".into()),
            Value::String("g".into()),
            Value::F64(9.5),
            Value::Bool(true),
        ]
    }

    #[test]
    fn only_initialized_properties_are_written() {
        let codec = codec();
        let mut states = PropertyStates::new(5);
        states.set(0, PropertyState::Dirty);
        states.set(3, PropertyState::Clean);

        let bytes = codec.encode(&values(), &states).unwrap();
        assert_eq!(bytes.len(), 2 + 8 + 8);
        assert_eq!(&bytes[..2], &[0b0100_0011, 0b0000_0000]);

        let (decoded, decoded_states) = codec.decode(&bytes).unwrap();
        assert_eq!(
            decoded,
            vec![
                Value::I64(7),
                Value::String(String::new()),
                Value::Null,
                Value::F64(9.5),
                Value::Bool(false),
            ]
        );
        assert_eq!(decoded_states, states);
    }

    #[test]
    fn uninitialized_values_are_not_validated() {
        let codec = codec();
        let mut states = PropertyStates::new(5);
        states.set(1, PropertyState::Dirty);
        let values = vec![
            Value::Null,
            Value::String("only".into()),
            Value::Null,
            Value::Null,
            Value::Null,
        ];
        let bytes = codec.encode(&values, &states).unwrap();
        assert_eq!(bytes.len(), 2 + 1 + 4);
    }

    #[test]
    fn initialized_null_in_non_nullable_fails() {
        let codec = codec();
        let mut states = PropertyStates::new(5);
        states.set(0, PropertyState::Dirty);
        let values = vec![Value::Null; 5];
        assert!(matches!(codec.encode(&values, &states), Err(CodecError::IllegalArgument(_))));
    }

    #[test]
    fn nothing_initialized() {
        let codec = codec();
        let bytes = codec.encode(&values(), &PropertyStates::new(5)).unwrap();
        assert_eq!(bytes, vec![0, 0]);
    }

    #[test]
    fn decode_into_overwrites_everything() {
        let codec = codec();
        let mut states = PropertyStates::new(5);
        states.set(4, PropertyState::Dirty);
        let bytes = codec.encode(&values(), &states).unwrap();

        let mut target = values();
        let mut target_states = PropertyStates::new(5);
        target_states.set(0, PropertyState::Dirty);
        codec.decode_into(&bytes, &mut target, &mut target_states).unwrap();
        assert_eq!(target[0], Value::I64(0));
        assert_eq!(target[4], Value::Bool(true));
        assert!(!target_states.is_initialized(0));
        assert!(target_states.is_initialized(4));
    }

    #[test]
    fn failed_decode_leaves_target_untouched() {
        let codec = codec();
        let mut states = PropertyStates::new(5);
        states.set(0, PropertyState::Dirty);
        states.set(1, PropertyState::Dirty);
        let bytes = codec.encode(&values(), &states).unwrap();

        let mut target = values();
        let mut target_states = PropertyStates::new(5);
        let err = codec.decode_into(&bytes[..bytes.len() - 1], &mut target, &mut target_states);
        assert!(err.unwrap_err().is_corrupt());
        assert_eq!(target, values());
        assert!(target_states.initialized().next().is_none());
    }

    #[test]
    fn short_state_bytes_are_corrupt() {
        assert!(codec().decode(&[0]).unwrap_err().is_corrupt());
    }
}
