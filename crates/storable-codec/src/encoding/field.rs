//! A property bound to its codec.

use std::borrow::Cow;
use std::sync::Arc;

use super::codec::{Reader, TypeCodec};
use crate::error::{CodecError, CodecResult};
use crate::types::{Adapter, Direction, LogicalType, PropertyDescriptor, Value};

/// One property as the codecs see it: its [`TypeCodec`], nullability, direction
/// and optional adapter, resolved once when a strategy is built.
#[derive(Debug, Clone)]
pub struct Field {
    name: Arc<str>,
    ordinal: usize,
    logical: LogicalType,
    codec: TypeCodec,
    nullable: bool,
    direction: Direction,
    adapter: Option<Adapter>,
}

impl Field {
    /// Resolves the codec for a property.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnsupportedPropertyType`] if the property's storage
    /// type has no native encoding.
    pub fn new(descriptor: &PropertyDescriptor) -> CodecResult<Self> {
        let storage = descriptor.storage_type();
        let codec = TypeCodec::for_type(storage)
            .ok_or_else(|| CodecError::unsupported(descriptor.name(), storage.name()))?;
        Ok(Self {
            name: descriptor.shared_name(),
            ordinal: descriptor.ordinal(),
            logical: descriptor.logical_type().clone(),
            codec,
            nullable: descriptor.is_nullable(),
            direction: descriptor.direction(),
            adapter: descriptor.adapter().cloned(),
        })
    }

    /// The property name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The property ordinal.
    #[must_use]
    pub const fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// The selected codec.
    #[must_use]
    pub const fn codec(&self) -> TypeCodec {
        self.codec
    }

    /// Whether the property accepts nulls.
    #[must_use]
    pub const fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// The key direction.
    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    /// Whether the property is stored through an adapter.
    #[must_use]
    pub const fn is_adapted(&self) -> bool {
        self.adapter.is_some()
    }

    /// The value an unloaded property resets to.
    ///
    /// A non-nullable opaque property has no zero of its own; it resets to its
    /// storage type's zero converted back through the adapter.
    ///
    /// # Errors
    ///
    /// Whatever the adapter returns for the storage zero.
    pub fn zero(&self) -> CodecResult<Value> {
        match (&self.logical, &self.adapter) {
            (LogicalType::Opaque(_), Some(adapter)) if !self.nullable => {
                adapter.from_storage(&Value::zero_for(adapter.storage_type(), false))
            }
            _ => Ok(Value::zero_for(&self.logical, self.nullable)),
        }
    }

    /// Converts `value` to its storage form and checks it against the codec.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::IllegalArgument`] for a null in a non-nullable property,
    /// a value of the wrong type, or a failed adapter conversion.
    pub fn storage_value<'v>(&self, value: &'v Value) -> CodecResult<Cow<'v, Value>> {
        let stored = match &self.adapter {
            Some(adapter) if !value.is_null() => Cow::Owned(adapter.to_storage(value)?),
            _ => Cow::Borrowed(value),
        };
        if stored.is_null() {
            if !self.nullable {
                return Err(CodecError::illegal(format!(
                    "property '{}' is not nullable but has no value",
                    self.name
                )));
            }
        } else if !self.codec.accepts(&stored) {
            return Err(CodecError::type_mismatch(
                &self.name,
                self.codec.type_name(),
                stored.type_name(),
                &*stored,
            ));
        }
        Ok(stored)
    }

    /// Converts a decoded storage value back through the adapter, if any.
    pub(crate) fn logical_value(&self, stored: Value) -> CodecResult<Value> {
        match &self.adapter {
            Some(adapter) if !stored.is_null() => adapter.from_storage(&stored),
            _ => Ok(stored),
        }
    }

    // ------------------------------------------------------------------------
    // Key layout
    // ------------------------------------------------------------------------

    pub(crate) const fn key_static_length(&self) -> Option<usize> {
        self.codec.key_static_length(self.nullable)
    }

    pub(crate) const fn key_min_length(&self) -> usize {
        self.codec.key_min_length(self.nullable)
    }

    /// `stored` must come from [`storage_value`](Self::storage_value).
    pub(crate) fn key_length(&self, stored: &Value) -> CodecResult<usize> {
        self.codec.key_length(stored, self.nullable)
    }

    pub(crate) fn encode_key(&self, stored: &Value, buf: &mut Vec<u8>) -> CodecResult<()> {
        self.codec.encode_key(stored, self.nullable, self.direction, buf)
    }

    pub(crate) fn decode_key(&self, r: &mut Reader<'_>) -> CodecResult<Value> {
        r.set_mask(self.direction.mask());
        let stored = self.codec.read_key(r, self.nullable).map_err(|e| self.context(e))?;
        self.logical_value(stored)
    }

    pub(crate) fn skip_key(&self, r: &mut Reader<'_>) -> CodecResult<()> {
        r.set_mask(self.direction.mask());
        self.codec.skip_key(r, self.nullable).map_err(|e| self.context(e))
    }

    // ------------------------------------------------------------------------
    // Data layout
    // ------------------------------------------------------------------------

    pub(crate) const fn data_static_length(&self) -> Option<usize> {
        self.codec.data_static_length(self.nullable)
    }

    pub(crate) const fn data_min_length(&self) -> usize {
        self.codec.data_min_length(self.nullable)
    }

    pub(crate) fn data_length(&self, stored: &Value) -> CodecResult<usize> {
        self.codec.data_length(stored, self.nullable)
    }

    pub(crate) fn encode_data(&self, stored: &Value, buf: &mut Vec<u8>) -> CodecResult<()> {
        self.codec.encode_data(stored, self.nullable, buf)
    }

    pub(crate) fn decode_data(&self, r: &mut Reader<'_>) -> CodecResult<Value> {
        let stored = self.codec.read_data(r, self.nullable).map_err(|e| self.context(e))?;
        self.logical_value(stored)
    }

    pub(crate) fn skip_data(&self, r: &mut Reader<'_>) -> CodecResult<()> {
        self.codec.skip_data(r, self.nullable).map_err(|e| self.context(e))
    }

    fn context(&self, err: CodecError) -> CodecError {
        match err {
            CodecError::CorruptEncoding { message, expected_generation, actual_generation } => {
                CodecError::CorruptEncoding {
                    message: format!("property '{}': {message}", self.name),
                    expected_generation,
                    actual_generation,
                }
            }
            other => other,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn celsius_adapter() -> Adapter {
        // Tenths of a degree, stored as an integer.
        Adapter::new(
            "tenths",
            LogicalType::I32,
            |v| match v {
                Value::F64(f) => Ok(Value::I32((f * 10.0).round() as i32)),
                other => Err(CodecError::illegal(format!("not a temperature: {other:?}"))),
            },
            |v| match v {
                Value::I32(i) => Ok(Value::F64(f64::from(*i) / 10.0)),
                other => Err(CodecError::corrupt(format!("not stored tenths: {other:?}"))),
            },
        )
    }

    #[test]
    fn unsupported_type_without_adapter() {
        let desc = PropertyDescriptor::new("when", LogicalType::Opaque("Instant".into()));
        let err = Field::new(&desc).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedPropertyType { .. }));
        assert!(err.is_configuration());
    }

    fn seconds_adapter() -> Adapter {
        Adapter::new(
            "seconds",
            LogicalType::U32,
            |v| match v {
                Value::U64(ms) => Ok(Value::U32((ms / 1000) as u32)),
                other => Err(CodecError::illegal(format!("not a duration: {other:?}"))),
            },
            |v| match v {
                Value::U32(s) => Ok(Value::U64(u64::from(*s) * 1000)),
                other => Err(CodecError::corrupt(format!("not seconds: {other:?}"))),
            },
        )
    }

    #[test]
    fn opaque_zero_goes_through_adapter() {
        let opaque = LogicalType::Opaque("Duration".into());
        let desc = PropertyDescriptor::new("ttl", opaque.clone()).with_adapter(seconds_adapter());
        assert_eq!(Field::new(&desc).unwrap().zero().unwrap(), Value::U64(0));

        let desc =
            PropertyDescriptor::new("ttl", opaque).nullable().with_adapter(seconds_adapter());
        assert_eq!(Field::new(&desc).unwrap().zero().unwrap(), Value::Null);

        let desc =
            PropertyDescriptor::new("temp", LogicalType::F64).with_adapter(celsius_adapter());
        assert_eq!(Field::new(&desc).unwrap().zero().unwrap(), Value::F64(0.0));
    }

    #[test]
    fn adapter_roundtrip() {
        let desc =
            PropertyDescriptor::new("temp", LogicalType::F64).with_adapter(celsius_adapter());
        let field = Field::new(&desc).unwrap();
        assert_eq!(field.codec(), TypeCodec::I32);

        let stored = field.storage_value(&Value::F64(21.5)).unwrap();
        assert_eq!(*stored, Value::I32(215));

        let mut buf = Vec::new();
        field.encode_data(&stored, &mut buf).unwrap();
        let mut r = Reader::new(&buf, 0);
        assert_eq!(field.decode_data(&mut r).unwrap(), Value::F64(21.5));
    }

    #[test]
    fn adapter_skipped_for_null() {
        let desc = PropertyDescriptor::new("temp", LogicalType::F64)
            .nullable()
            .with_adapter(celsius_adapter());
        let field = Field::new(&desc).unwrap();
        assert_eq!(*field.storage_value(&Value::Null).unwrap(), Value::Null);
    }

    #[test]
    fn storage_value_checks_type_and_nulls() {
        let field = Field::new(&PropertyDescriptor::new("id", LogicalType::I64)).unwrap();
        assert!(matches!(field.storage_value(&Value::Null), Err(CodecError::IllegalArgument(_))));
        let err = field.storage_value(&Value::String("7".into())).unwrap_err();
        assert!(err.to_string().contains("'id'"));
        assert!(matches!(field.storage_value(&Value::I64(7)).unwrap(), Cow::Borrowed(_)));
    }

    #[test]
    fn corrupt_errors_name_the_property() {
        let field = Field::new(&PropertyDescriptor::new("score", LogicalType::I64)).unwrap();
        let mut r = Reader::new(&[0x80, 0x00], 0);
        let err = field.decode_key(&mut r).unwrap_err();
        assert!(err.is_corrupt());
        assert!(err.to_string().contains("property 'score'"));
    }
}
