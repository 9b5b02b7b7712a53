//! Storable Codec
//!
//! This crate turns typed property tuples into byte sequences and back, under
//! three contracts:
//!
//! - **Key encoding**: byte-wise comparison of two encoded keys matches the
//!   order of the tuples they encode, per-property ascending or descending, so
//!   keys can be used directly in an ordered store. Any contiguous slice of a
//!   composite key can be encoded on its own to build range-scan bounds.
//! - **Data encoding**: compact, with an optional schema generation tag checked
//!   on decode.
//! - **Serial encoding**: only the initialized properties of an object, behind a
//!   2-bit-per-property state bitmap.
//!
//! # Example
//!
//! ```
//! use storable_codec::types::{LogicalType, PropertyDescriptor, PropertySchema};
//! use storable_codec::{EncodingStrategy, StrategyConfig, Value};
//!
//! let schema = PropertySchema::builder()
//!     .key(PropertyDescriptor::new("tenant", LogicalType::String))
//!     .key(PropertyDescriptor::new("seq", LogicalType::I64).descending())
//!     .data(PropertyDescriptor::new("body", LogicalType::Bytes).nullable())
//!     .build()
//!     .unwrap();
//! let strategy = EncodingStrategy::new("Message", schema, StrategyConfig::new()).unwrap();
//!
//! let older = vec![Value::from("acme"), Value::I64(1), Value::Null];
//! let newer = vec![Value::from("acme"), Value::I64(2), Value::Null];
//!
//! // Descending: the newer message sorts first.
//! let older_key = strategy.build_key_encoding(&older, ..).unwrap();
//! let newer_key = strategy.build_key_encoding(&newer, ..).unwrap();
//! assert!(newer_key < older_key);
//!
//! // Every key of tenant "acme" falls inside these bounds.
//! let (start, end) = strategy.key_range_bounds(&older, 1).unwrap();
//! assert!(start <= newer_key && newer_key < end.unwrap());
//! ```
//!
//! # Modules
//!
//! - [`types`] - Schema and value types ([`Value`], [`PropertySchema`](types::PropertySchema))
//! - [`encoding`] - Per-type primitives and the key, data and serial codecs
//! - [`strategy`] - The [`EncodingStrategy`] facade over one schema
//! - [`binding`] - Accessor-closure binding of host types ([`StorableBinding`])
//! - [`cache`] - Shared strategy cache ([`StrategyCache`])
//! - [`error`] - Error types ([`CodecError`])

// Deny unwrap in library code to ensure proper error handling
#![deny(clippy::unwrap_used)]

pub mod binding;
pub mod cache;
pub mod encoding;
pub mod error;
pub mod strategy;
pub mod types;

// Re-export commonly used types
pub use binding::{StorableBinding, StorableBindingBuilder};
pub use cache::StrategyCache;
pub use error::{CodecError, CodecResult};
pub use strategy::{AlternateGeneration, EncodingStrategy, StrategyConfig};
pub use types::{
    Adapter, Direction, LogicalType, PropertyDescriptor, PropertySchema, PropertyState,
    PropertyStates, Value,
};
