//! Typed interpretations of raw wire payloads.
//!
//! Without a schema a payload is ambiguous: a varint may be unsigned, zig-zag
//! signed or a bool; eight fixed bytes may be an integer or a double; a
//! length-delimited span may be text, an embedded message or opaque bytes.
//! Every plausible reading is kept, tagged with a [`Confidence`], in a fixed
//! priority order per wire type.

use crate::wire::{decode_zigzag, RawValue};
use std::fmt;

/// Largest integer a JSON/IEEE-754 double consumer can hold exactly (2^53 - 1)
pub const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;

/// Share of scanned characters that must be valid text
const MIN_VALID_RATIO_PERCENT: usize = 70;

/// Maximum share of control characters in a text payload
const MAX_CONTROL_RATIO_PERCENT: usize = 10;

/// How plausible an interpretation is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Confidence {
    /// Possible but unlikely, or a catch-all fallback
    Low,
    /// Plausible alternative reading
    Medium,
    /// The natural reading for the wire type
    High,
}

impl Confidence {
    /// Lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a payload was read as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterpretationKind {
    /// Unsigned varint
    Uint64,
    /// Zig-zag signed varint
    Sint64,
    /// Varint 0 or 1
    Bool,
    /// Unsigned 64-bit fixed
    Fixed64,
    /// IEEE-754 double
    Double,
    /// Two's-complement 64-bit fixed
    Sfixed64,
    /// Unsigned 32-bit fixed
    Fixed32,
    /// IEEE-754 single
    Float,
    /// Two's-complement 32-bit fixed
    Sfixed32,
    /// UTF-8 text
    String,
    /// Embedded message
    Message,
    /// Opaque bytes
    Bytes,
}

impl InterpretationKind {
    /// Label matching the protobuf scalar type name
    pub fn label(self) -> &'static str {
        match self {
            InterpretationKind::Uint64 => "uint64",
            InterpretationKind::Sint64 => "sint64",
            InterpretationKind::Bool => "bool",
            InterpretationKind::Fixed64 => "fixed64",
            InterpretationKind::Double => "double",
            InterpretationKind::Sfixed64 => "sfixed64",
            InterpretationKind::Fixed32 => "fixed32",
            InterpretationKind::Float => "float",
            InterpretationKind::Sfixed32 => "sfixed32",
            InterpretationKind::String => "string",
            InterpretationKind::Message => "message",
            InterpretationKind::Bytes => "bytes",
        }
    }
}

impl fmt::Display for InterpretationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Value carried by an interpretation
#[derive(Debug, Clone, PartialEq)]
pub enum InterpretedValue<'a> {
    /// Unsigned value within [`MAX_SAFE_INTEGER`]
    Unsigned(u64),
    /// Unsigned value too large for a double, as decimal digits
    Decimal(String),
    /// Signed value
    Signed(i64),
    /// Floating point value (always finite)
    Float(f64),
    /// Boolean value
    Bool(bool),
    /// Text borrowed from the buffer
    Text(&'a str),
    /// Embedded message with this many top-level fields
    Message {
        /// Number of decoded fields
        fields: usize,
    },
    /// Bytes borrowed from the buffer
    Bytes(&'a [u8]),
}

impl InterpretedValue<'_> {
    fn unsigned(value: u64) -> Self {
        if value <= MAX_SAFE_INTEGER {
            InterpretedValue::Unsigned(value)
        } else {
            InterpretedValue::Decimal(value.to_string())
        }
    }
}

impl fmt::Display for InterpretedValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterpretedValue::Unsigned(v) => write!(f, "{}", v),
            InterpretedValue::Decimal(s) => f.write_str(s),
            InterpretedValue::Signed(v) => write!(f, "{}", v),
            InterpretedValue::Float(v) => write!(f, "{}", v),
            InterpretedValue::Bool(v) => write!(f, "{}", v),
            InterpretedValue::Text(s) => write!(f, "{:?}", s),
            InterpretedValue::Message { fields } => write!(f, "<message: {} fields>", fields),
            InterpretedValue::Bytes(b) => f.write_str(&hex::encode(b)),
        }
    }
}

/// One candidate reading of a payload
#[derive(Debug, Clone, PartialEq)]
pub struct Interpretation<'a> {
    /// What the payload was read as
    pub kind: InterpretationKind,
    /// The resulting value
    pub value: InterpretedValue<'a>,
    /// How plausible the reading is
    pub confidence: Confidence,
}

impl<'a> Interpretation<'a> {
    fn new(kind: InterpretationKind, value: InterpretedValue<'a>, confidence: Confidence) -> Self {
        Self {
            kind,
            value,
            confidence,
        }
    }
}

/// Produce the interpretations of a payload in priority order.
///
/// `nested_fields` is the field count of a successful embedded-message probe
/// of a length-delimited payload; it is ignored for other wire types.
pub fn interpret<'a>(value: &RawValue<'a>, nested_fields: Option<usize>) -> Vec<Interpretation<'a>> {
    use Confidence::*;
    use InterpretationKind as K;

    let mut out = Vec::with_capacity(3);

    match *value {
        RawValue::Varint(raw) => {
            out.push(Interpretation::new(K::Uint64, InterpretedValue::unsigned(raw), High));
            out.push(Interpretation::new(
                K::Sint64,
                InterpretedValue::Signed(decode_zigzag(raw)),
                Medium,
            ));
            if raw <= 1 {
                out.push(Interpretation::new(K::Bool, InterpretedValue::Bool(raw == 1), Medium));
            }
        }
        RawValue::Fixed64(raw) => {
            out.push(Interpretation::new(K::Fixed64, InterpretedValue::unsigned(raw), High));
            let double = f64::from_bits(raw);
            if double.is_finite() {
                out.push(Interpretation::new(K::Double, InterpretedValue::Float(double), Medium));
            }
            out.push(Interpretation::new(
                K::Sfixed64,
                InterpretedValue::Signed(raw as i64),
                Low,
            ));
        }
        RawValue::Fixed32(raw) => {
            out.push(Interpretation::new(
                K::Fixed32,
                InterpretedValue::Unsigned(raw as u64),
                High,
            ));
            let float = f32::from_bits(raw);
            if float.is_finite() {
                out.push(Interpretation::new(
                    K::Float,
                    InterpretedValue::Float(float as f64),
                    Medium,
                ));
            }
            out.push(Interpretation::new(
                K::Sfixed32,
                InterpretedValue::Signed(raw as i32 as i64),
                Low,
            ));
        }
        RawValue::Bytes(bytes) => {
            if is_likely_utf8_string(bytes) {
                if let Ok(text) = std::str::from_utf8(bytes) {
                    out.push(Interpretation::new(K::String, InterpretedValue::Text(text), High));
                }
            }
            if let Some(fields) = nested_fields.filter(|&n| n > 0) {
                out.push(Interpretation::new(
                    K::Message,
                    InterpretedValue::Message { fields },
                    Medium,
                ));
            }
            out.push(Interpretation::new(K::Bytes, InterpretedValue::Bytes(bytes), Low));
        }
    }

    out
}

/// Decide whether a byte span reads as text.
///
/// Printable ASCII, TAB, LF and CR count as valid characters, as does every
/// well-formed UTF-8 multi-byte sequence. A disallowed lead byte or a sequence
/// running past the end rejects the span outright. Control characters may make
/// up at most 10% of the span and at least 70% of the scanned characters must
/// be valid. The empty span is accepted.
pub fn is_likely_utf8_string(bytes: &[u8]) -> bool {
    if bytes.is_empty() {
        return true;
    }

    let mut i = 0;
    let mut scanned = 0usize;
    let mut valid = 0usize;
    let mut control = 0usize;

    while i < bytes.len() {
        let byte = bytes[i];
        scanned += 1;

        match byte {
            0x20..=0x7E | b'\t' | b'\n' | b'\r' => {
                valid += 1;
                i += 1;
            }
            0x00..=0x1F | 0x7F => {
                control += 1;
                i += 1;
            }
            _ => {
                let width = match byte {
                    0xC2..=0xDF => 2,
                    0xE0..=0xEF => 3,
                    0xF0..=0xF4 => 4,
                    _ => return false,
                };
                if i + width > bytes.len() {
                    return false;
                }
                if bytes[i + 1..i + width].iter().all(|&b| b & 0xC0 == 0x80) {
                    valid += 1;
                    i += width;
                } else {
                    i += 1;
                }
            }
        }
    }

    if control * 100 > bytes.len() * MAX_CONTROL_RATIO_PERCENT {
        return false;
    }

    valid * 100 >= scanned * MIN_VALID_RATIO_PERCENT
}
