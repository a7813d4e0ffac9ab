//! Schema-less decoding.
//!
//! This module turns an arbitrary protobuf-encoded buffer into a tree of
//! [`DecodedField`]s, each annotated with every plausible reading of its
//! payload.
//!
//! ## Architecture
//!
//! Decoding is handled by [`Decoder`], which:
//!
//! 1. Splits the buffer into raw fields with the wire reader
//! 2. Probes each length-delimited payload as an embedded message
//!    ([`NestedMessageProber`]), recursing up to [`DecoderConfig::max_depth`]
//! 3. Attaches ranked interpretations ([`interpret`]) to every field
//!
//! The resulting tree borrows from the input buffer.

mod interpret;
mod nested;

use crate::error::Result;
use crate::wire::{RawValue, WireReader, WireType};
use tracing::debug;

pub use interpret::{
    interpret, is_likely_utf8_string, Confidence, Interpretation, InterpretationKind,
    InterpretedValue, MAX_SAFE_INTEGER,
};
pub use nested::NestedMessageProber;

/// Default maximum nesting depth for embedded-message probing
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Configuration for schema-less decoding
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Deepest nesting level probed for embedded messages
    pub max_depth: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl DecoderConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum nesting depth
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}

/// A wire field together with its candidate interpretations
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedField<'a> {
    /// Field number
    pub number: u32,
    /// Offset of the tag within the enclosing message buffer
    pub offset: usize,
    /// Raw payload
    pub value: RawValue<'a>,
    /// Candidate readings in priority order
    pub interpretations: Vec<Interpretation<'a>>,
    /// Fields of the embedded message, if the payload parsed as one
    pub nested: Option<Vec<DecodedField<'a>>>,
}

impl<'a> DecodedField<'a> {
    /// Wire type of the field
    pub fn wire_type(&self) -> WireType {
        self.value.wire_type()
    }

    /// The selected interpretation: highest confidence, earliest on ties
    pub fn primary(&self) -> Option<&Interpretation<'a>> {
        self.interpretations.iter().fold(None, |best, candidate| match best {
            Some(b) if b.confidence >= candidate.confidence => Some(b),
            _ => Some(candidate),
        })
    }

    /// Returns the interpretation of the given kind, if one was produced
    pub fn interpretation(&self, kind: InterpretationKind) -> Option<&Interpretation<'a>> {
        self.interpretations.iter().find(|i| i.kind == kind)
    }

    /// Returns true if the payload decoded as an embedded message
    pub fn is_message(&self) -> bool {
        self.nested.is_some()
    }
}

/// Whether the wire reader tolerates a truncated tail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Framing {
    Lenient,
    Strict,
}

/// Decode one message level.
pub(crate) fn decode_level<'a>(
    data: &'a [u8],
    depth: usize,
    framing: Framing,
    prober: &NestedMessageProber,
) -> Result<Vec<DecodedField<'a>>> {
    let reader = match framing {
        Framing::Lenient => WireReader::new(data),
        Framing::Strict => WireReader::strict(data),
    };

    let mut fields = Vec::new();
    for raw in reader {
        let raw = raw?;
        let nested = match raw.value {
            RawValue::Bytes(bytes) => prober.probe(bytes, depth),
            _ => None,
        };
        let interpretations = interpret(&raw.value, nested.as_ref().map(Vec::len));

        fields.push(DecodedField {
            number: raw.number,
            offset: raw.offset,
            value: raw.value,
            interpretations,
            nested,
        });
    }

    Ok(fields)
}

/// Schema-less protobuf decoder
#[derive(Debug, Clone, Default)]
pub struct Decoder {
    config: DecoderConfig,
}

impl Decoder {
    /// Creates a new decoder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new decoder with custom configuration
    pub fn with_config(config: DecoderConfig) -> Self {
        Self { config }
    }

    /// Returns the decoder configuration
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Decode `data` into an annotated field tree.
    ///
    /// Empty input yields an empty list. A zero field number or input ending
    /// mid-varint ends the message quietly; truncated fixed-width or
    /// length-delimited values, group wire types and out-of-range field
    /// numbers are errors.
    pub fn decode<'a>(&self, data: &'a [u8]) -> Result<Vec<DecodedField<'a>>> {
        debug!("Decoding {} bytes", data.len());
        let prober = NestedMessageProber::new(self.config.max_depth);
        let fields = decode_level(data, 0, Framing::Lenient, &prober)?;
        debug!("Decoded {} top-level fields", fields.len());
        Ok(fields)
    }
}

/// Decode `data` with the default configuration.
pub fn decode(data: &[u8]) -> Result<Vec<DecodedField<'_>>> {
    Decoder::new().decode(data)
}
