//! Property values handed to and produced by the codecs.
//!
//! # Example
//!
//! ```
//! use storable_codec::Value;
//!
//! let id: Value = 42i32.into();
//! let name: Value = "Alice".into();
//! let missing: Value = Option::<i64>::None.into();
//!
//! assert_eq!(id.as_i64(), Some(42));
//! assert_eq!(name.as_str(), Some("Alice"));
//! assert!(missing.is_null());
//! ```

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

use super::LogicalType;

/// Opaque locator of a large object.
///
/// The codec only stores the locator; the object's bytes live elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LobLocator(u64);

impl LobLocator {
    /// Creates a locator from its raw id.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// A single property value.
///
/// | Variant | Rust Type | Logical type |
/// |---------|-----------|--------------|
/// | `Null` | - | any nullable |
/// | `Bool` | `bool` | [`LogicalType::Bool`] |
/// | `Char` | `char` | [`LogicalType::Char`] |
/// | `I8`..`U64` | fixed-width ints | [`LogicalType::I8`]..[`LogicalType::U64`] |
/// | `F32`, `F64` | floats | [`LogicalType::F32`], [`LogicalType::F64`] |
/// | `String` | `String` | [`LogicalType::String`] |
/// | `Bytes` | `Vec<u8>` | [`LogicalType::Bytes`] |
/// | `BigInt` | [`BigInt`] | [`LogicalType::BigInt`] |
/// | `Decimal` | [`BigDecimal`] | [`LogicalType::Decimal`] |
/// | `Lob` | [`LobLocator`] | [`LogicalType::Lob`] |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Missing value
    Null,
    /// Boolean value
    Bool(bool),
    /// Unicode scalar value
    Char(char),
    /// 8-bit signed integer
    I8(i8),
    /// 8-bit unsigned integer
    U8(u8),
    /// 16-bit signed integer
    I16(i16),
    /// 16-bit unsigned integer
    U16(u16),
    /// 32-bit signed integer
    I32(i32),
    /// 32-bit unsigned integer
    U32(u32),
    /// 64-bit signed integer
    I64(i64),
    /// 64-bit unsigned integer
    U64(u64),
    /// 32-bit float
    F32(f32),
    /// 64-bit float
    F64(f64),
    /// UTF-8 string
    String(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Arbitrary-precision integer
    BigInt(BigInt),
    /// Arbitrary-precision decimal
    Decimal(BigDecimal),
    /// Large-object locator
    Lob(LobLocator),
}

impl Value {
    /// Returns `true` if the value is null.
    #[inline]
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short name of the variant, used in error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Char(_) => "char",
            Self::I8(_) => "i8",
            Self::U8(_) => "u8",
            Self::I16(_) => "i16",
            Self::U16(_) => "u16",
            Self::I32(_) => "i32",
            Self::U32(_) => "u32",
            Self::I64(_) => "i64",
            Self::U64(_) => "u64",
            Self::F32(_) => "f32",
            Self::F64(_) => "f64",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::BigInt(_) => "bigint",
            Self::Decimal(_) => "decimal",
            Self::Lob(_) => "lob",
        }
    }

    /// Returns the value as a boolean if it is one.
    #[inline]
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns any signed or unsigned integer that fits in an `i64`.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::I8(v) => Some(i64::from(*v)),
            Self::U8(v) => Some(i64::from(*v)),
            Self::I16(v) => Some(i64::from(*v)),
            Self::U16(v) => Some(i64::from(*v)),
            Self::I32(v) => Some(i64::from(*v)),
            Self::U32(v) => Some(i64::from(*v)),
            Self::I64(v) => Some(*v),
            Self::U64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Returns the value as a float if it is one.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::F32(f) => Some(f64::from(*f)),
            Self::F64(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the value as a string slice if it is one.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as a byte slice if it is one.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the large-object locator if this is one.
    #[inline]
    #[must_use]
    pub const fn as_lob(&self) -> Option<LobLocator> {
        match self {
            Self::Lob(l) => Some(*l),
            _ => None,
        }
    }

    /// The value a property is reset to when it is not carried by an encoding.
    ///
    /// Nullable properties and opaque host types reset to [`Value::Null`]; everything
    /// else resets to its type's zero or empty value. A non-nullable opaque
    /// property is reset by [`Field::zero`](crate::encoding::Field::zero) through
    /// its adapter instead.
    #[must_use]
    pub fn zero_for(logical: &LogicalType, nullable: bool) -> Self {
        if nullable {
            return Self::Null;
        }
        match logical {
            LogicalType::Bool => Self::Bool(false),
            LogicalType::Char => Self::Char('\0'),
            LogicalType::I8 => Self::I8(0),
            LogicalType::U8 => Self::U8(0),
            LogicalType::I16 => Self::I16(0),
            LogicalType::U16 => Self::U16(0),
            LogicalType::I32 => Self::I32(0),
            LogicalType::U32 => Self::U32(0),
            LogicalType::I64 => Self::I64(0),
            LogicalType::U64 => Self::U64(0),
            LogicalType::F32 => Self::F32(0.0),
            LogicalType::F64 => Self::F64(0.0),
            LogicalType::String => Self::String(String::new()),
            LogicalType::Bytes => Self::Bytes(Vec::new()),
            LogicalType::BigInt => Self::BigInt(BigInt::zero()),
            LogicalType::Decimal => Self::Decimal(BigDecimal::zero()),
            LogicalType::Lob => Self::Lob(LobLocator::new(0)),
            LogicalType::Opaque(_) => Self::Null,
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                #[inline]
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    char => Char,
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    String => String,
    Vec<u8> => Bytes,
    BigInt => BigInt,
    BigDecimal => Decimal,
    LobLocator => Lob,
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Self::Bytes(b.to_vec())
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}
