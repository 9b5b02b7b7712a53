//! Exact output sizing.
//!
//! Every encoder sizes its buffer before writing a byte, so the buffer is
//! allocated once and never grows. Fixed-width fields contribute a length
//! known when the strategy is built; variable-width fields are measured with
//! the same length functions the encoders use.

use std::borrow::Cow;
use std::ops::{Bound, Range, RangeBounds};

use super::field::Field;
use crate::error::{CodecError, CodecResult};
use crate::types::{PropertyStates, Value};

/// Which layout a calculator sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncodingMode {
    /// Order-preserving keys.
    Key,
    /// Compact, generation-tagged values.
    Data,
    /// Sparse properties behind a state bitmap.
    Serial,
}

/// A resolved `[start, end)` slice of a codec's fields.
///
/// Caller padding belongs to the true ends of the field list only: the prefix
/// is present when the range starts at 0, the suffix when it ends at the last
/// field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRange {
    start: usize,
    end: usize,
    count: usize,
}

impl FieldRange {
    /// The range covering all `count` fields.
    #[must_use]
    pub const fn full(count: usize) -> Self {
        Self { start: 0, end: count, count }
    }

    /// Resolves caller bounds against `count` fields.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::IllegalArgument`] if a given start is not below
    /// `count`, a given end exceeds `count`, or start is past end.
    pub fn resolve(bounds: impl RangeBounds<usize>, count: usize) -> CodecResult<Self> {
        let start = match bounds.start_bound() {
            Bound::Included(&s) => Some(s),
            Bound::Excluded(&s) => Some(s.saturating_add(1)),
            Bound::Unbounded => None,
        };
        let end = match bounds.end_bound() {
            Bound::Included(&e) => Some(e.saturating_add(1)),
            Bound::Excluded(&e) => Some(e),
            Bound::Unbounded => None,
        };
        if let Some(s) = start {
            if s >= count {
                return Err(CodecError::illegal(format!(
                    "range start {s} must be less than the property count {count}"
                )));
            }
        }
        if let Some(e) = end {
            if e > count {
                return Err(CodecError::illegal(format!(
                    "range end {e} exceeds the property count {count}"
                )));
            }
        }
        let (start, end) = (start.unwrap_or(0), end.unwrap_or(count));
        if start > end {
            return Err(CodecError::illegal(format!("range start {start} is past end {end}")));
        }
        Ok(Self { start, end, count })
    }

    /// First field index.
    #[must_use]
    pub const fn start(&self) -> usize {
        self.start
    }

    /// One past the last field index.
    #[must_use]
    pub const fn end(&self) -> usize {
        self.end
    }

    /// Number of fields covered.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    /// Returns `true` if no fields are covered.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether the caller prefix belongs to this range.
    #[must_use]
    pub const fn has_prefix(&self) -> bool {
        self.start == 0
    }

    /// Whether the caller suffix belongs to this range.
    #[must_use]
    pub const fn has_suffix(&self) -> bool {
        self.end == self.count
    }

    /// The covered indices.
    #[must_use]
    pub const fn indices(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Computes exact buffer sizes for one codec.
#[derive(Debug, Clone)]
pub struct LengthCalculator {
    mode: EncodingMode,
    prefix: usize,
    suffix: usize,
    statics: Vec<Option<usize>>,
    minimums: Vec<usize>,
}

impl LengthCalculator {
    /// Precomputes the per-field static and minimum lengths.
    #[must_use]
    pub fn new(mode: EncodingMode, fields: &[Field], prefix: usize, suffix: usize) -> Self {
        let (statics, minimums) = match mode {
            EncodingMode::Key => fields
                .iter()
                .map(|f| (f.key_static_length(), f.key_min_length()))
                .unzip(),
            EncodingMode::Data | EncodingMode::Serial => fields
                .iter()
                .map(|f| (f.data_static_length(), f.data_min_length()))
                .unzip(),
        };
        Self { mode, prefix, suffix, statics, minimums }
    }

    /// The layout this calculator sizes.
    #[must_use]
    pub const fn mode(&self) -> EncodingMode {
        self.mode
    }

    fn padding(&self, range: FieldRange) -> usize {
        let prefix = if range.has_prefix() { self.prefix } else { 0 };
        let suffix = if range.has_suffix() { self.suffix } else { 0 };
        prefix + suffix
    }

    /// The encoded length of `range` if every field in it has a static length.
    #[must_use]
    pub fn static_length(&self, range: FieldRange) -> Option<usize> {
        self.statics[range.indices()]
            .iter()
            .try_fold(self.padding(range), |acc, len| len.map(|l| acc + l))
    }

    /// The shortest buffer that can hold `range`, padding included.
    #[must_use]
    pub fn minimum_length(&self, range: FieldRange) -> usize {
        self.padding(range) + self.minimums[range.indices()].iter().sum::<usize>()
    }

    /// Exact length of `range` encoded from `values`, plus `header` bytes
    /// (generation tag or state bitmap) and the padding the range owns.
    ///
    /// `values[i]` is the storage value of field `range.start() + i`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::IllegalArgument`] if a value does not fit its field.
    pub fn encoded_length(
        &self,
        fields: &[Field],
        values: &[Cow<'_, Value>],
        range: FieldRange,
        header: usize,
    ) -> CodecResult<usize> {
        let mut total = self.padding(range) + header;
        for ((index, field), value) in fields[range.indices()].iter().enumerate().zip(values) {
            total += match self.statics[range.start() + index] {
                Some(len) => len,
                None => self.measure(field, value)?,
            };
        }
        Ok(total)
    }

    /// Exact length of a serial encoding: the state bitmap followed by the
    /// initialized fields only.
    ///
    /// `values[i]` is `Some` exactly for the initialized fields.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::IllegalArgument`] if a value does not fit its field.
    pub fn serial_length(
        &self,
        fields: &[Field],
        values: &[Option<Cow<'_, Value>>],
    ) -> CodecResult<usize> {
        let mut total = PropertyStates::serial_len(fields.len());
        for ((index, field), value) in fields.iter().enumerate().zip(values) {
            if let Some(value) = value {
                total += match self.statics[index] {
                    Some(len) => len,
                    None => self.measure(field, value)?,
                };
            }
        }
        Ok(total)
    }

    fn measure(&self, field: &Field, value: &Value) -> CodecResult<usize> {
        match self.mode {
            EncodingMode::Key => field.key_length(value),
            EncodingMode::Data | EncodingMode::Serial => field.data_length(value),
        }
    }
}
