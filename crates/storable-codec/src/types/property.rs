//! Property descriptors and the schema that orders them.
//!
//! A [`PropertySchema`] is built once from introspected type metadata and then
//! shared by reference between every encode and decode call.
//!
//! # Example
//!
//! ```
//! use storable_codec::types::{LogicalType, PropertyDescriptor, PropertySchema};
//!
//! let schema = PropertySchema::builder()
//!     .key(PropertyDescriptor::new("tenant", LogicalType::I32))
//!     .key(PropertyDescriptor::new("created", LogicalType::I64).descending())
//!     .data(PropertyDescriptor::new("name", LogicalType::String).nullable())
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(schema.len(), 3);
//! assert_eq!(schema.key_properties().count(), 2);
//! assert_eq!(schema.property("name").map(|p| p.ordinal()), Some(2));
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::Value;
use crate::error::{CodecError, CodecResult};

/// The logical type of a property, as reported by schema introspection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalType {
    /// `bool`
    Bool,
    /// `char`
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
    /// Large-object locator
    Lob,
    /// A host type with no native codec. Needs an [`Adapter`] to be stored.
    Opaque(String),
}

impl LogicalType {
    /// Human-readable type name.
    #[must_use]
    pub fn name(&self) -> &str {
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
            Self::Opaque(name) => name,
        }
    }

    /// Returns `true` if `value` is a non-null value of this type.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
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
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Sort direction of a key property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Direction {
    /// No direction was declared; treated as ascending.
    #[default]
    Unspecified,
    /// Ascending order.
    Ascending,
    /// Descending order.
    Descending,
}

impl Direction {
    /// Returns `true` for [`Direction::Descending`].
    #[inline]
    #[must_use]
    pub const fn is_descending(self) -> bool {
        matches!(self, Self::Descending)
    }

    /// The XOR mask applied to every byte of a field encoded in this direction.
    #[inline]
    #[must_use]
    pub(crate) const fn mask(self) -> u8 {
        if self.is_descending() {
            0xFF
        } else {
            0x00
        }
    }
}

type Conversion = dyn Fn(&Value) -> CodecResult<Value> + Send + Sync;

/// Converts a property between its logical type and the type it is stored as.
///
/// Adapters are supplied by the introspection layer; the codec never looks for one.
///
/// ```
/// use storable_codec::types::{Adapter, LogicalType};
/// use storable_codec::{CodecError, Value};
///
/// // Store a boolean flag as a single character.
/// let adapter = Adapter::new(
///     "yes_no",
///     LogicalType::Char,
///     |v| match v {
///         Value::Bool(b) => Ok(Value::Char(if *b { 'Y' } else { 'N' })),
///         other => Ok(other.clone()),
///     },
///     |v| match v {
///         Value::Char(c) => Ok(Value::Bool(*c == 'Y')),
///         other => Err(CodecError::illegal(format!("not a flag: {other:?}"))),
///     },
/// );
/// assert_eq!(adapter.to_storage(&Value::Bool(true)).unwrap(), Value::Char('Y'));
/// ```
#[derive(Clone)]
pub struct Adapter {
    name: Arc<str>,
    storage_type: LogicalType,
    to_storage: Arc<Conversion>,
    from_storage: Arc<Conversion>,
}

impl Adapter {
    /// Creates an adapter storing values as `storage_type`.
    pub fn new<T, F>(
        name: impl Into<String>,
        storage_type: LogicalType,
        to_storage: T,
        from_storage: F,
    ) -> Self
    where
        T: Fn(&Value) -> CodecResult<Value> + Send + Sync + 'static,
        F: Fn(&Value) -> CodecResult<Value> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            storage_type,
            to_storage: Arc::new(to_storage),
            from_storage: Arc::new(from_storage),
        }
    }

    /// The adapter's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The type values are stored as.
    #[must_use]
    pub const fn storage_type(&self) -> &LogicalType {
        &self.storage_type
    }

    /// Converts a logical value to its storage form.
    ///
    /// # Errors
    ///
    /// Whatever the supplied conversion returns.
    pub fn to_storage(&self, value: &Value) -> CodecResult<Value> {
        (self.to_storage)(value)
    }

    /// Converts a stored value back to its logical form.
    ///
    /// # Errors
    ///
    /// Whatever the supplied conversion returns.
    pub fn from_storage(&self, value: &Value) -> CodecResult<Value> {
        (self.from_storage)(value)
    }
}

impl fmt::Debug for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adapter")
            .field("name", &self.name)
            .field("storage_type", &self.storage_type)
            .finish_non_exhaustive()
    }
}

/// Describes a single property of a stored type.
#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    name: Arc<str>,
    logical_type: LogicalType,
    nullable: bool,
    ordinal: Option<usize>,
    direction: Direction,
    adapter: Option<Adapter>,
}

impl PropertyDescriptor {
    /// Creates a non-nullable property with no explicit ordinal or direction.
    #[must_use]
    pub fn new(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: Arc::from(name.into()),
            logical_type,
            nullable: false,
            ordinal: None,
            direction: Direction::Unspecified,
            adapter: None,
        }
    }

    /// Marks the property as nullable.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Sets the key direction to ascending.
    #[must_use]
    pub fn ascending(mut self) -> Self {
        self.direction = Direction::Ascending;
        self
    }

    /// Sets the key direction to descending.
    #[must_use]
    pub fn descending(mut self) -> Self {
        self.direction = Direction::Descending;
        self
    }

    /// Sets the key direction.
    #[must_use]
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Pins the property's ordinal instead of taking its declaration position.
    #[must_use]
    pub fn with_ordinal(mut self, ordinal: usize) -> Self {
        self.ordinal = Some(ordinal);
        self
    }

    /// Attaches a storage adapter.
    #[must_use]
    pub fn with_adapter(mut self, adapter: Adapter) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// The property name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn shared_name(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    /// The logical type the host sees.
    #[must_use]
    pub const fn logical_type(&self) -> &LogicalType {
        &self.logical_type
    }

    /// The type the codec stores: the adapter's storage type if there is one.
    #[must_use]
    pub fn storage_type(&self) -> &LogicalType {
        self.adapter.as_ref().map_or(&self.logical_type, Adapter::storage_type)
    }

    /// Whether the property accepts [`Value::Null`].
    #[must_use]
    pub const fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// The property's stable ordinal. Assigned by [`PropertySchema`].
    #[must_use]
    pub fn ordinal(&self) -> usize {
        self.ordinal.unwrap_or_default()
    }

    /// The declared direction.
    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    /// The storage adapter, if any.
    #[must_use]
    pub const fn adapter(&self) -> Option<&Adapter> {
        self.adapter.as_ref()
    }
}

#[derive(Debug)]
struct SchemaInner {
    /// Sorted by ordinal; ordinals are `0..len`.
    properties: Vec<PropertyDescriptor>,
    /// Ordinals of the key properties, in key order.
    key: Vec<usize>,
    /// Ordinals of the non-key properties, in ordinal order.
    data: Vec<usize>,
}

/// An ordered, immutable set of property descriptors.
///
/// Cloning is cheap; clones share the same descriptors.
#[derive(Debug, Clone)]
pub struct PropertySchema {
    inner: Arc<SchemaInner>,
}

impl PropertySchema {
    /// Starts building a schema.
    #[must_use]
    pub fn builder() -> PropertySchemaBuilder {
        PropertySchemaBuilder::default()
    }

    /// Number of properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.properties.len()
    }

    /// Returns `true` if the schema has no properties.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.properties.is_empty()
    }

    /// All properties, in ordinal order.
    #[must_use]
    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.inner.properties
    }

    /// Looks up a property by name.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.inner.properties.iter().find(|p| p.name() == name)
    }

    /// The key properties, in key order.
    pub fn key_properties(&self) -> impl ExactSizeIterator<Item = &PropertyDescriptor> + '_ {
        self.inner.key.iter().map(|&o| &self.inner.properties[o])
    }

    /// The non-key properties, in ordinal order.
    pub fn data_properties(&self) -> impl ExactSizeIterator<Item = &PropertyDescriptor> + '_ {
        self.inner.data.iter().map(|&o| &self.inner.properties[o])
    }

    /// Ordinals of the key properties, in key order.
    #[must_use]
    pub fn key_ordinals(&self) -> &[usize] {
        &self.inner.key
    }

    /// Ordinals of the non-key properties.
    #[must_use]
    pub fn data_ordinals(&self) -> &[usize] {
        &self.inner.data
    }
}

/// Builder for [`PropertySchema`].
#[derive(Debug, Default)]
pub struct PropertySchemaBuilder {
    properties: Vec<(PropertyDescriptor, bool)>,
}

impl PropertySchemaBuilder {
    /// Adds the next key property. Key order is the order of these calls.
    #[must_use]
    pub fn key(mut self, property: PropertyDescriptor) -> Self {
        self.properties.push((property, true));
        self
    }

    /// Adds a non-key property.
    #[must_use]
    pub fn data(mut self, property: PropertyDescriptor) -> Self {
        self.properties.push((property, false));
        self
    }

    /// Validates and freezes the schema.
    ///
    /// Properties without an explicit ordinal take their declaration position.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::IllegalArgument`] for duplicate names, or if the
    /// resulting ordinals are not exactly `0..len`.
    pub fn build(self) -> CodecResult<PropertySchema> {
        let count = self.properties.len();
        let mut names = HashSet::with_capacity(count);
        let mut slots: Vec<Option<PropertyDescriptor>> = vec![None; count];
        let mut key = Vec::new();

        for (position, (mut property, is_key)) in self.properties.into_iter().enumerate() {
            if !names.insert(property.shared_name()) {
                return Err(CodecError::illegal(format!(
                    "duplicate property name '{}'",
                    property.name()
                )));
            }
            let ordinal = *property.ordinal.get_or_insert(position);
            let slot = slots.get_mut(ordinal).ok_or_else(|| {
                CodecError::illegal(format!(
                    "ordinal {ordinal} of '{}' is out of range for {count} properties",
                    property.name()
                ))
            })?;
            if slot.is_some() {
                return Err(CodecError::illegal(format!(
                    "ordinal {ordinal} of '{}' is already taken",
                    property.name()
                )));
            }
            if is_key {
                key.push(ordinal);
            }
            *slot = Some(property);
        }

        // Every slot is filled: `count` properties landed on distinct ordinals below `count`.
        let properties: Vec<PropertyDescriptor> = slots.into_iter().flatten().collect();
        let data = (0..count).filter(|o| !key.contains(o)).collect();

        Ok(PropertySchema { inner: Arc::new(SchemaInner { properties, key, data }) })
    }
}
