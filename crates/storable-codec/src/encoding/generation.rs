//! Generation tags on data encodings.
//!
//! A generation identifies the schema version a data encoding was written with.
//! Small generations cost one byte:
//!
//! - `0..=0x7F`: one byte, high bit clear
//! - `0x80..=0x7FFF_FFFF`: four bytes big-endian, high bit set

use super::codec::Reader;
use crate::error::{CodecError, CodecResult};

/// Largest encodable generation.
pub const MAX_GENERATION: u32 = 0x7FFF_FFFF;

const WIDE_FLAG: u32 = 0x8000_0000;
const NARROW_MAX: u32 = 0x7F;

/// A validated generation number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GenerationTag(u32);

impl GenerationTag {
    /// Validates a generation.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::IllegalArgument`] if `generation` exceeds [`MAX_GENERATION`].
    pub fn new(generation: u32) -> CodecResult<Self> {
        if generation > MAX_GENERATION {
            return Err(CodecError::illegal(format!(
                "generation {generation} exceeds maximum {MAX_GENERATION}"
            )));
        }
        Ok(Self(generation))
    }

    /// The generation number.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Encoded size: 1 or 4 bytes.
    #[must_use]
    pub const fn encoded_len(self) -> usize {
        if self.0 <= NARROW_MAX {
            1
        } else {
            4
        }
    }

    /// Appends the tag to `buf`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn write(self, buf: &mut Vec<u8>) {
        if self.0 <= NARROW_MAX {
            buf.push(self.0 as u8);
        } else {
            buf.extend_from_slice(&(self.0 | WIDE_FLAG).to_be_bytes());
        }
    }

    /// Reads a tag.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::CorruptEncoding`] if the input ends inside the tag.
    pub fn read(r: &mut Reader<'_>) -> CodecResult<Self> {
        let first = r.read_u8("generation")?;
        if first & 0x80 == 0 {
            return Ok(Self(u32::from(first)));
        }
        let [b1, b2, b3] = r.read_array("generation")?;
        Ok(Self(u32::from_be_bytes([first, b1, b2, b3]) & !WIDE_FLAG))
    }
}
