//! Error types for the codec crate.

use thiserror::Error;

/// Maximum length for value display in error messages.
const MAX_VALUE_DISPLAY_LEN: usize = 100;

/// Result alias used throughout the crate.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while building a strategy or encoding/decoding a tuple.
///
/// The variants split into two families:
///
/// - configuration errors ([`UnsupportedPropertyType`](Self::UnsupportedPropertyType),
///   [`IllegalArgument`](Self::IllegalArgument)) signal a schema or caller bug and
///   are never worth retrying;
/// - data errors ([`CorruptEncoding`](Self::CorruptEncoding)) are raised while
///   decoding and are left to the caller to classify.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A property's storage type has no codec, even after its adapter is applied.
    #[error("unsupported property type for '{property}': {type_name}")]
    UnsupportedPropertyType {
        /// The offending property.
        property: String,
        /// Name of the storage type that could not be encoded.
        type_name: String,
    },

    /// The call contract was violated.
    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    /// The bytes being decoded are malformed or belong to another generation.
    #[error(
        "corrupt encoding: {message}{}",
        generation_detail(expected_generation, actual_generation)
    )]
    CorruptEncoding {
        /// What was wrong with the input.
        message: String,
        /// The generation the caller expected, if a generation check failed.
        expected_generation: Option<u32>,
        /// The generation found in the buffer, if a generation check failed.
        actual_generation: Option<u32>,
    },
}

fn generation_detail(expected: &Option<u32>, actual: &Option<u32>) -> String {
    match (expected, actual) {
        (Some(e), Some(a)) => format!(" (expected generation {e}, actual {a})"),
        _ => String::new(),
    }
}

impl CodecError {
    /// Creates an [`IllegalArgument`](Self::IllegalArgument) error.
    #[must_use]
    pub fn illegal(message: impl Into<String>) -> Self {
        Self::IllegalArgument(message.into())
    }

    /// Creates a [`CorruptEncoding`](Self::CorruptEncoding) error with no generation info.
    #[must_use]
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::CorruptEncoding {
            message: message.into(),
            expected_generation: None,
            actual_generation: None,
        }
    }

    /// Creates the error raised when a data encoding carries the wrong generation.
    #[must_use]
    pub fn generation_mismatch(expected: u32, actual: u32) -> Self {
        Self::CorruptEncoding {
            message: "generation mismatch".to_owned(),
            expected_generation: Some(expected),
            actual_generation: Some(actual),
        }
    }

    /// Creates an unsupported type error.
    #[must_use]
    pub fn unsupported(property: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::UnsupportedPropertyType { property: property.into(), type_name: type_name.into() }
    }

    /// Creates a type mismatch error for a value handed to the wrong codec.
    ///
    /// The value is truncated to 100 characters for display.
    #[must_use]
    pub fn type_mismatch(
        property: &str,
        expected: &str,
        actual: &str,
        value: impl std::fmt::Debug,
    ) -> Self {
        let value_str = format!("{value:?}");
        let truncated = if value_str.len() > MAX_VALUE_DISPLAY_LEN {
            let mut end = MAX_VALUE_DISPLAY_LEN;
            while !value_str.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &value_str[..end])
        } else {
            value_str
        };
        Self::IllegalArgument(format!(
            "property '{property}' expects {expected}, got {actual} (value: {truncated})"
        ))
    }

    /// Returns `true` for decode-time data errors.
    #[must_use]
    pub const fn is_corrupt(&self) -> bool {
        matches!(self, Self::CorruptEncoding { .. })
    }

    /// Returns `true` for errors caused by a schema or caller bug.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::UnsupportedPropertyType { .. } | Self::IllegalArgument(_))
    }

    /// The expected and actual generations, when this is a generation mismatch.
    #[must_use]
    pub const fn generations(&self) -> Option<(u32, u32)> {
        match self {
            Self::CorruptEncoding {
                expected_generation: Some(expected),
                actual_generation: Some(actual),
                ..
            } => Some((*expected, *actual)),
            _ => None,
        }
    }
}
