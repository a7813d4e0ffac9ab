//! Speculative decoding of length-delimited payloads as embedded messages.

use super::{decode_level, DecodedField, Framing};
use crate::MAX_FIELD_NUMBER;
use tracing::trace;

/// Decides whether a length-delimited payload is an embedded message.
///
/// A payload is accepted when it parses completely in strict mode, yields at
/// least one field, and every field number is in range. Parse failures are
/// the normal "not a message" answer and never leave the prober.
#[derive(Debug, Clone, Copy)]
pub struct NestedMessageProber {
    max_depth: usize,
}

impl NestedMessageProber {
    /// Creates a prober that stops descending below `max_depth` levels
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Maximum nesting level this prober descends to
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Try to decode `bytes`, found in a message at nesting level `depth`,
    /// as an embedded message one level deeper.
    pub fn probe<'a>(&self, bytes: &'a [u8], depth: usize) -> Option<Vec<DecodedField<'a>>> {
        let level = depth + 1;
        if level > self.max_depth {
            trace!("Depth limit {} reached, not probing {} bytes", self.max_depth, bytes.len());
            return None;
        }

        let fields = match decode_level(bytes, level, Framing::Strict, self) {
            Ok(fields) => fields,
            Err(e) => {
                trace!("Not an embedded message at level {}: {}", level, e);
                return None;
            }
        };

        if fields.is_empty() {
            return None;
        }
        if fields
            .iter()
            .any(|f| f.number == 0 || f.number > MAX_FIELD_NUMBER)
        {
            return None;
        }

        Some(fields)
    }
}
