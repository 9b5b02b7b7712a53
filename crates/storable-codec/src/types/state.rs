//! Per-property initialization state.
//!
//! Each property owns a 2-bit slot addressed by its ordinal. Slots are packed
//! sixteen to a `u32` word while held by an object, and four to a byte when
//! written into a serial encoding.

use serde::{Deserialize, Serialize};

use crate::error::{CodecError, CodecResult};

/// Number of 2-bit state slots per word.
pub const STATES_PER_WORD: usize = 16;

/// Number of 2-bit state slots per serialized byte.
pub const STATES_PER_BYTE: usize = 4;

const STATE_MASK: u8 = 0b11;

/// The state of one property.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PropertyState {
    /// Never assigned.
    #[default]
    Uninitialized = 0b00,
    /// Loaded from storage and not modified since.
    Clean = 0b01,
    /// Assigned by the application.
    Dirty = 0b11,
}

impl PropertyState {
    /// Decodes a 2-bit slot value.
    ///
    /// `0b10` is not assigned a meaning; it is read back as [`PropertyState::Dirty`]
    /// since its initialized bit is set.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        match bits & STATE_MASK {
            0b00 => Self::Uninitialized,
            0b01 => Self::Clean,
            _ => Self::Dirty,
        }
    }

    /// The 2-bit slot value.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u8 {
        self as u8
    }

    /// Whether the property holds a value.
    #[inline]
    #[must_use]
    pub const fn is_initialized(self) -> bool {
        self.bits() & STATE_MASK != 0
    }
}

/// An externally owned bitmap of property states.
///
/// # Example
///
/// ```
/// use storable_codec::types::{PropertyState, PropertyStates};
///
/// let mut states = PropertyStates::new(5);
/// states.set(0, PropertyState::Dirty);
/// states.set(3, PropertyState::Clean);
///
/// assert!(states.is_initialized(3));
/// assert!(!states.is_initialized(1));
/// assert_eq!(states.to_serial_bytes().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PropertyStates {
    words: Vec<u32>,
    len: usize,
}

impl PropertyStates {
    /// Creates an all-uninitialized bitmap for `len` properties.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self { words: vec![0; len.div_ceil(STATES_PER_WORD)], len }
    }

    /// Number of property slots.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if there are no slots.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The raw state words.
    #[must_use]
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Reads a slot. Out-of-range ordinals read as uninitialized.
    #[must_use]
    pub fn get(&self, ordinal: usize) -> PropertyState {
        if ordinal >= self.len {
            return PropertyState::Uninitialized;
        }
        let word = self.words[ordinal / STATES_PER_WORD];
        let shift = (ordinal % STATES_PER_WORD) * 2;
        PropertyState::from_bits((word >> shift) as u8)
    }

    /// Writes a slot, growing the bitmap if needed.
    pub fn set(&mut self, ordinal: usize, state: PropertyState) {
        if ordinal >= self.len {
            self.len = ordinal + 1;
            self.words.resize(self.len.div_ceil(STATES_PER_WORD), 0);
        }
        let word = &mut self.words[ordinal / STATES_PER_WORD];
        let shift = (ordinal % STATES_PER_WORD) * 2;
        *word = (*word & !(u32::from(STATE_MASK) << shift)) | (u32::from(state.bits()) << shift);
    }

    /// Shorthand for `get(ordinal).is_initialized()`.
    #[must_use]
    pub fn is_initialized(&self, ordinal: usize) -> bool {
        self.get(ordinal).is_initialized()
    }

    /// Ordinals of all initialized slots.
    pub fn initialized(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(|&o| self.is_initialized(o))
    }

    /// Turns every dirty slot clean, leaving uninitialized slots alone.
    pub fn mark_all_clean(&mut self) {
        for ordinal in 0..self.len {
            if self.get(ordinal) == PropertyState::Dirty {
                self.set(ordinal, PropertyState::Clean);
            }
        }
    }

    /// Resets every slot to uninitialized.
    pub fn clear(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }

    /// Number of bytes [`to_serial_bytes`](Self::to_serial_bytes) produces.
    #[must_use]
    pub const fn serial_len(len: usize) -> usize {
        len.div_ceil(STATES_PER_BYTE)
    }

    /// Packs the slots four to a byte; ordinal `i` lands in bits `(i % 4) * 2` of byte `i / 4`.
    #[must_use]
    pub fn to_serial_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; Self::serial_len(self.len)];
        self.write_serial_bytes(self.len, &mut out);
        out
    }

    /// Packs the first `len` slots into `out`, which must hold `serial_len(len)` zeroed bytes.
    pub(crate) fn write_serial_bytes(&self, len: usize, out: &mut [u8]) {
        for (ordinal, slot) in (0..len).map(|o| (o, self.get(o))) {
            out[ordinal / STATES_PER_BYTE] |= slot.bits() << ((ordinal % STATES_PER_BYTE) * 2);
        }
    }

    /// Unpacks `len` slots from serialized state bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::CorruptEncoding`] if `bytes` is too short for `len` slots.
    pub fn from_serial_bytes(bytes: &[u8], len: usize) -> CodecResult<Self> {
        let needed = Self::serial_len(len);
        if bytes.len() < needed {
            return Err(CodecError::corrupt(format!(
                "state bitmap needs {needed} bytes, got {}",
                bytes.len()
            )));
        }
        let mut states = Self::new(len);
        for ordinal in 0..len {
            let bits = bytes[ordinal / STATES_PER_BYTE] >> ((ordinal % STATES_PER_BYTE) * 2);
            states.set(ordinal, PropertyState::from_bits(bits));
        }
        Ok(states)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get_across_words() {
        let mut states = PropertyStates::new(40);
        states.set(0, PropertyState::Dirty);
        states.set(15, PropertyState::Clean);
        states.set(16, PropertyState::Dirty);
        states.set(39, PropertyState::Clean);

        assert_eq!(states.words().len(), 3);
        assert_eq!(states.get(0), PropertyState::Dirty);
        assert_eq!(states.get(15), PropertyState::Clean);
        assert_eq!(states.get(16), PropertyState::Dirty);
        assert_eq!(states.get(17), PropertyState::Uninitialized);
        assert_eq!(states.get(39), PropertyState::Clean);
        assert_eq!(states.initialized().collect::<Vec<_>>(), vec![0, 15, 16, 39]);
    }

    #[test]
    fn overwrite_slot() {
        let mut states = PropertyStates::new(2);
        states.set(1, PropertyState::Dirty);
        states.set(1, PropertyState::Clean);
        assert_eq!(states.get(1), PropertyState::Clean);
        states.set(1, PropertyState::Uninitialized);
        assert!(!states.is_initialized(1));
    }

    #[test]
    fn set_grows() {
        let mut states = PropertyStates::new(0);
        states.set(20, PropertyState::Dirty);
        assert_eq!(states.len(), 21);
        assert!(states.is_initialized(20));
    }

    #[test]
    fn mark_all_clean_keeps_uninitialized() {
        let mut states = PropertyStates::new(3);
        states.set(0, PropertyState::Dirty);
        states.set(2, PropertyState::Clean);
        states.mark_all_clean();
        assert_eq!(states.get(0), PropertyState::Clean);
        assert_eq!(states.get(1), PropertyState::Uninitialized);
        assert_eq!(states.get(2), PropertyState::Clean);
    }

    #[test]
    fn serial_byte_layout() {
        let mut states = PropertyStates::new(5);
        states.set(0, PropertyState::Dirty);
        states.set(3, PropertyState::Clean);
        states.set(4, PropertyState::Clean);

        let bytes = states.to_serial_bytes();
        assert_eq!(bytes, vec![0b0100_0011, 0b0000_0001]);
        assert_eq!(PropertyStates::from_serial_bytes(&bytes, 5).unwrap(), states);
    }

    #[test]
    fn serial_bytes_too_short() {
        assert!(PropertyStates::from_serial_bytes(&[0], 5).unwrap_err().is_corrupt());
    }
}
