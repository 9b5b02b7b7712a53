//! Binary encodings of property tuples.
//!
//! Three layouts are built from the same per-type primitives:
//!
//! - [`KeyCodec`] writes order-preserving keys that sort byte-wise like the
//!   tuples they encode, optionally only a `[start, end)` slice of the key.
//! - [`DataCodec`] writes compact values with an optional [`GenerationTag`].
//! - [`SerialCodec`] writes only the initialized properties of an object,
//!   behind a 2-bit-per-property state bitmap.
//!
//! Every encoder computes its exact output length with a [`LengthCalculator`]
//! before allocating, so output buffers never grow.
//!
//! # Example
//!
//! ```
//! use storable_codec::encoding::{Field, KeyCodec};
//! use storable_codec::types::{LogicalType, PropertyDescriptor};
//! use storable_codec::Value;
//!
//! let fields = vec![
//!     Field::new(&PropertyDescriptor::new("id", LogicalType::I32)).unwrap(),
//! ];
//! let codec = KeyCodec::new(fields, 0, 0);
//!
//! let minus_one = codec.encode(&[Value::I32(-1)]).unwrap();
//! let zero = codec.encode(&[Value::I32(0)]).unwrap();
//! assert!(minus_one < zero);
//! ```

pub mod codec;
pub mod data;
pub mod field;
pub mod generation;
pub mod key;
pub mod length;
pub mod serial;


pub use codec::{Reader, TypeCodec};
pub use data::{DataCodec, DataDecoding};
pub use field::Field;
pub use generation::{GenerationTag, MAX_GENERATION};
pub use key::KeyCodec;
pub use length::{EncodingMode, FieldRange, LengthCalculator};
pub use serial::SerialCodec;
