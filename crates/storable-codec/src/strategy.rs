//! The encoding facade.
//!
//! An [`EncodingStrategy`] binds one stored type's [`PropertySchema`] to a
//! [`KeyCodec`], a [`DataCodec`] and a [`SerialCodec`]. It is built once,
//! never changes afterwards, and can be shared freely between threads.
//!
//! The facade works on *rows*: slices of values indexed by property ordinal.
//! Key operations read and write only the key ordinals of a row, data
//! operations only the non-key ordinals, and serial operations every ordinal.
//!
//! # Example
//!
//! ```
//! use storable_codec::{EncodingStrategy, StrategyConfig, Value};
//! use storable_codec::types::{LogicalType, PropertyDescriptor, PropertySchema};
//!
//! let schema = PropertySchema::builder()
//!     .key(PropertyDescriptor::new("id", LogicalType::I64))
//!     .data(PropertyDescriptor::new("name", LogicalType::String))
//!     .build()
//!     .unwrap();
//! let strategy = EncodingStrategy::new("User", schema, StrategyConfig::new()).unwrap();
//!
//! let row = vec![Value::I64(1), Value::String("Alice".into())];
//! let key = strategy.build_key_encoding(&row, ..).unwrap();
//! let data = strategy.build_data_encoding(&row, Some(1)).unwrap();
//!
//! let mut decoded = vec![Value::Null; 2];
//! strategy.build_key_decoding(&key, &mut decoded, ..).unwrap();
//! strategy.build_data_decoding(&data, &mut decoded, Some(1), None).unwrap();
//! assert_eq!(decoded, row);
//! ```

use std::hash::{Hash, Hasher};
use std::ops::RangeBounds;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::encoding::{DataCodec, DataDecoding, Field, KeyCodec, SerialCodec, TypeCodec};
use crate::error::{CodecError, CodecResult};
use crate::types::{LogicalType, PropertySchema, PropertyStates, Value};

/// Caller padding reserved around key and data encodings.
///
/// Padding bytes are written as zeroes and skipped on decode; the caller is free
/// to overwrite them with its own framing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Bytes reserved before every full key.
    /// Default: 0
    pub key_prefix: usize,

    /// Bytes reserved after every full key.
    /// Default: 0
    pub key_suffix: usize,

    /// Bytes reserved before every data encoding.
    /// Default: 0
    pub data_prefix: usize,

    /// Bytes reserved after every data encoding.
    /// Default: 0
    pub data_suffix: usize,
}

impl StrategyConfig {
    /// Create a configuration with no padding.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the key prefix length.
    #[must_use]
    pub const fn key_prefix(mut self, len: usize) -> Self {
        self.key_prefix = len;
        self
    }

    /// Set the key suffix length.
    #[must_use]
    pub const fn key_suffix(mut self, len: usize) -> Self {
        self.key_suffix = len;
        self
    }

    /// Set the data prefix length.
    #[must_use]
    pub const fn data_prefix(mut self, len: usize) -> Self {
        self.data_prefix = len;
        self
    }

    /// Set the data suffix length.
    #[must_use]
    pub const fn data_suffix(mut self, len: usize) -> Self {
        self.data_suffix = len;
        self
    }
}

/// Handler for data written by another generation.
///
/// Called with the generation found in the buffer, the whole buffer and the row
/// to fill. It runs synchronously and must not call back into the same strategy
/// for the same row.
pub type AlternateGeneration<'a> = &'a mut dyn FnMut(u32, &[u8], &mut [Value]) -> CodecResult<()>;

/// Encoders and decoders for one stored type.
///
/// Two strategies are equal when they bind the same type name with the same
/// [`StrategyConfig`].
#[derive(Debug, Clone)]
pub struct EncodingStrategy {
    type_name: Arc<str>,
    schema: PropertySchema,
    config: StrategyConfig,
    key: KeyCodec,
    data: DataCodec,
    serial: SerialCodec,
}

impl EncodingStrategy {
    /// Builds the codecs for `schema`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnsupportedPropertyType`] if any property's storage
    /// type has no codec.
    pub fn new(
        type_name: impl Into<String>,
        schema: PropertySchema,
        config: StrategyConfig,
    ) -> CodecResult<Self> {
        let type_name: Arc<str> = Arc::from(type_name.into());
        let key_fields = schema.key_properties().map(Field::new).collect::<CodecResult<Vec<_>>>()?;
        let data_fields =
            schema.data_properties().map(Field::new).collect::<CodecResult<Vec<_>>>()?;
        let all_fields =
            schema.properties().iter().map(Field::new).collect::<CodecResult<Vec<_>>>()?;

        debug!(
            type_name = %type_name,
            key_properties = key_fields.len(),
            data_properties = data_fields.len(),
            key_prefix = config.key_prefix,
            key_suffix = config.key_suffix,
            data_prefix = config.data_prefix,
            data_suffix = config.data_suffix,
            "built encoding strategy"
        );

        Ok(Self {
            type_name,
            key: KeyCodec::new(key_fields, config.key_prefix, config.key_suffix),
            data: DataCodec::new(data_fields, config.data_prefix, config.data_suffix),
            serial: SerialCodec::new(all_fields),
            schema,
            config,
        })
    }

    /// Whether values of `storage` can be encoded without an adapter.
    #[must_use]
    pub const fn is_supported(storage: &LogicalType) -> bool {
        TypeCodec::for_type(storage).is_some()
    }

    /// The bound type's name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The bound schema.
    #[must_use]
    pub const fn schema(&self) -> &PropertySchema {
        &self.schema
    }

    /// The padding configuration.
    #[must_use]
    pub const fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// The key codec.
    #[must_use]
    pub const fn key_codec(&self) -> &KeyCodec {
        &self.key
    }

    /// The data codec.
    #[must_use]
    pub const fn data_codec(&self) -> &DataCodec {
        &self.data
    }

    /// The serial codec.
    #[must_use]
    pub const fn serial_codec(&self) -> &SerialCodec {
        &self.serial
    }

    fn check_row(&self, len: usize) -> CodecResult<()> {
        if len != self.schema.len() {
            return Err(CodecError::illegal(format!(
                "{} has {} properties, row has {len}",
                self.type_name,
                self.schema.len()
            )));
        }
        Ok(())
    }

    fn key_values<'r>(&self, row: &'r [Value]) -> Vec<&'r Value> {
        self.schema.key_ordinals().iter().map(|&o| &row[o]).collect()
    }

    fn data_values<'r>(&self, row: &'r [Value]) -> Vec<&'r Value> {
        self.schema.data_ordinals().iter().map(|&o| &row[o]).collect()
    }

    /// Encodes the `range` slice of the key properties of `row`.
    ///
    /// `range` indexes key properties in key order; `..` encodes the full key.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::IllegalArgument`] for a row of the wrong length,
    /// invalid bounds, or a value that does not fit its property.
    pub fn build_key_encoding(
        &self,
        row: &[Value],
        range: impl RangeBounds<usize>,
    ) -> CodecResult<Vec<u8>> {
        self.check_row(row.len())?;
        self.key.encode_range(&self.key_values(row), range)
    }

    /// Decodes a key produced by [`build_key_encoding`](Self::build_key_encoding)
    /// with the same bounds into the key ordinals of `row`.
    ///
    /// `row` is left untouched if decoding fails.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::IllegalArgument`] for a row of the wrong length or
    /// invalid bounds, and [`CodecError::CorruptEncoding`] for malformed input.
    pub fn build_key_decoding(
        &self,
        bytes: &[u8],
        row: &mut [Value],
        range: impl RangeBounds<usize>,
    ) -> CodecResult<()> {
        self.check_row(row.len())?;
        let range = self.key.resolve_range(range)?;
        let values = self.key.decode_fields(bytes, range).map_err(|e| self.log_corrupt(e))?;
        for (index, value) in range.indices().zip(values) {
            row[self.schema.key_ordinals()[index]] = value;
        }
        Ok(())
    }

    /// Encodes the non-key properties of `row`, tagged with `generation` if given.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::IllegalArgument`] for a row of the wrong length, a
    /// value that does not fit its property, or an out-of-range generation.
    pub fn build_data_encoding(
        &self,
        row: &[Value],
        generation: Option<u32>,
    ) -> CodecResult<Vec<u8>> {
        self.check_row(row.len())?;
        self.data.encode(&self.data_values(row), generation)
    }

    /// Decodes a data encoding into the non-key ordinals of `row`.
    ///
    /// When `expected` is given the buffer must carry that generation. A buffer
    /// from another generation is handed to `alternate` if one is supplied, and
    /// is a [`CodecError::CorruptEncoding`] carrying both generations otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::IllegalArgument`] for a row of the wrong length,
    /// [`CodecError::CorruptEncoding`] for malformed input or an unhandled
    /// generation mismatch, and whatever `alternate` returns.
    pub fn build_data_decoding(
        &self,
        bytes: &[u8],
        row: &mut [Value],
        expected: Option<u32>,
        alternate: Option<AlternateGeneration<'_>>,
    ) -> CodecResult<()> {
        self.check_row(row.len())?;
        match self.data.decode_checked(bytes, expected).map_err(|e| self.log_corrupt(e))? {
            DataDecoding::Current(values) => {
                for (&ordinal, value) in self.schema.data_ordinals().iter().zip(values) {
                    row[ordinal] = value;
                }
                Ok(())
            }
            DataDecoding::Other { generation } => {
                let expected = expected.unwrap_or_default();
                match alternate {
                    Some(handler) => {
                        warn!(
                            type_name = %self.type_name,
                            expected,
                            actual = generation,
                            "decoding data from another generation"
                        );
                        handler(generation, bytes, row)
                    }
                    None => Err(CodecError::generation_mismatch(expected, generation)),
                }
            }
        }
    }

    /// Decodes the single data property at `ordinal` without materialising the
    /// properties stored after it.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::IllegalArgument`] if `ordinal` is not a data
    /// property, and [`CodecError::CorruptEncoding`] for malformed input or a
    /// generation mismatch.
    pub fn build_data_field_decoding(
        &self,
        bytes: &[u8],
        ordinal: usize,
        expected: Option<u32>,
    ) -> CodecResult<Value> {
        let index = self
            .schema
            .data_ordinals()
            .iter()
            .position(|&o| o == ordinal)
            .ok_or_else(|| {
                CodecError::illegal(format!("ordinal {ordinal} is not a data property"))
            })?;
        self.data.decode_field(bytes, expected, index).map_err(|e| self.log_corrupt(e))
    }

    /// Encodes the initialized properties of `row`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::IllegalArgument`] for a row of the wrong length or an
    /// initialized value that does not fit its property.
    pub fn build_serial_encoding(
        &self,
        row: &[Value],
        states: &PropertyStates,
    ) -> CodecResult<Vec<u8>> {
        self.check_row(row.len())?;
        self.serial.encode(row, states)
    }

    /// Decodes a serial encoding into every ordinal of `row` and `states`.
    ///
    /// Uninitialized properties are reset to their zero value.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::IllegalArgument`] for a row of the wrong length and
    /// [`CodecError::CorruptEncoding`] for malformed input.
    pub fn build_serial_decoding(
        &self,
        bytes: &[u8],
        row: &mut [Value],
        states: &mut PropertyStates,
    ) -> CodecResult<()> {
        self.check_row(row.len())?;
        self.serial.decode_into(bytes, row, states).map_err(|e| self.log_corrupt(e))
    }

    /// Scan bounds `[start, end)` covering every full key whose first `leading`
    /// key properties equal those of `row`.
    ///
    /// `end` is `None` when the scan runs to the end of the keyspace.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::IllegalArgument`] if `leading` exceeds the key
    /// property count or a leading value does not fit its property.
    pub fn key_range_bounds(
        &self,
        row: &[Value],
        leading: usize,
    ) -> CodecResult<(Vec<u8>, Option<Vec<u8>>)> {
        self.check_row(row.len())?;
        let count = self.key.property_count();
        if leading > count {
            return Err(CodecError::illegal(format!(
                "{leading} leading properties requested, key has {count}"
            )));
        }
        if leading == 0 {
            let start = vec![0; self.key.prefix_len()];
            let end = KeyCodec::increment_prefix(&start);
            return Ok((start, end));
        }
        let start = self.build_key_encoding(row, ..leading)?;
        let end = if leading == count {
            // Only the exact key matches; its immediate successor is the bound.
            let mut end = start.clone();
            end.push(0);
            Some(end)
        } else {
            KeyCodec::increment_prefix(&start)
        };
        Ok((start, end))
    }

    fn log_corrupt(&self, err: CodecError) -> CodecError {
        if err.is_corrupt() {
            warn!(type_name = %self.type_name, error = %err, "corrupt encoding");
        }
        err
    }
}

impl PartialEq for EncodingStrategy {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name && self.config == other.config
    }
}

impl Eq for EncodingStrategy {}

impl Hash for EncodingStrategy {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_name.hash(state);
        self.config.hash(state);
    }
}
