//! Low-level protobuf wire format reading.
//!
//! ## Wire Format Overview
//!
//! Each protobuf field is encoded as:
//! - A varint "tag" containing the field number and wire type
//! - The field data (format depends on wire type)
//!
//! Wire types:
//! - 0: VARINT (int32, int64, uint32, uint64, sint32, sint64, bool, enum)
//! - 1: I64 (fixed64, sfixed64, double)
//! - 2: LEN (string, bytes, embedded messages, packed repeated fields)
//! - 5: I32 (fixed32, sfixed32, float)
//!
//! Wire types 3 and 4 (groups) are deprecated and rejected.

pub mod varint;

use crate::error::{Error, Result};
use crate::MAX_FIELD_NUMBER;
use std::fmt;

pub use varint::{
    decode_zigzag, encode_varint, encode_zigzag, encoded_len, read_varint, write_varint,
    write_zigzag, MAX_VARINT_LEN,
};

/// Protobuf wire types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WireType {
    /// Variable-length integer
    Varint = 0,
    /// 64-bit little-endian
    Fixed64 = 1,
    /// Length-prefixed bytes (strings, bytes, embedded messages)
    LengthDelimited = 2,
    /// 32-bit little-endian
    Fixed32 = 5,
}

impl WireType {
    /// Returns the wire type as used in the tag
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Human-readable name
    pub fn as_str(self) -> &'static str {
        match self {
            WireType::Varint => "varint",
            WireType::Fixed64 => "fixed64",
            WireType::LengthDelimited => "len",
            WireType::Fixed32 => "fixed32",
        }
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for WireType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::Fixed64),
            2 => Ok(WireType::LengthDelimited),
            5 => Ok(WireType::Fixed32),
            _ => Err(Error::unsupported_wire_type(0, value)),
        }
    }
}

/// A field tag: field number plus wire type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    /// Field number
    pub number: u32,
    /// Wire type
    pub wire_type: WireType,
}

impl Tag {
    /// Creates a tag, validating the field number
    pub fn new(number: u32, wire_type: WireType) -> Result<Self> {
        if number == 0 || number > MAX_FIELD_NUMBER {
            return Err(Error::invalid_field_number(number as u64));
        }
        Ok(Self { number, wire_type })
    }

    /// Packs the tag into its varint value
    pub fn pack(self) -> u64 {
        ((self.number as u64) << 3) | self.wire_type.as_u8() as u64
    }

    /// Splits a raw tag value into its field number and wire type.
    ///
    /// The field number is returned unvalidated so callers can decide how to
    /// treat zero.
    pub fn unpack(raw: u64) -> (u64, u8) {
        (raw >> 3, (raw & 0x07) as u8)
    }
}

/// Payload of a single wire field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawValue<'a> {
    /// Varint magnitude as read
    Varint(u64),
    /// Little-endian 64-bit value
    Fixed64(u64),
    /// Little-endian 32-bit value
    Fixed32(u32),
    /// View into the parent buffer
    Bytes(&'a [u8]),
}

impl RawValue<'_> {
    /// Wire type this payload was framed with
    pub fn wire_type(&self) -> WireType {
        match self {
            RawValue::Varint(_) => WireType::Varint,
            RawValue::Fixed64(_) => WireType::Fixed64,
            RawValue::Fixed32(_) => WireType::Fixed32,
            RawValue::Bytes(_) => WireType::LengthDelimited,
        }
    }
}

/// A single field as read off the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawField<'a> {
    /// Field number
    pub number: u32,
    /// Offset of the tag in the buffer the field was read from
    pub offset: usize,
    /// Field payload
    pub value: RawValue<'a>,
}

impl<'a> RawField<'a> {
    /// Wire type of the field
    pub fn wire_type(&self) -> WireType {
        self.value.wire_type()
    }
}

/// Iterator over the fields of a message buffer.
///
/// In the default (lenient) mode the reader stops quietly at a zero field
/// number or when the input runs out in the middle of a varint. In strict
/// mode both conditions are errors. After the first error the iterator is
/// exhausted.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    data: &'a [u8],
    position: usize,
    strict: bool,
    done: bool,
}

impl<'a> WireReader<'a> {
    /// Creates a lenient reader over `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            position: 0,
            strict: false,
            done: false,
        }
    }

    /// Creates a strict reader over `data`
    pub fn strict(data: &'a [u8]) -> Self {
        Self {
            strict: true,
            ..Self::new(data)
        }
    }

    /// Offset of the next unread byte
    pub fn offset(&self) -> usize {
        self.position
    }

    fn read_varint_at(&self, offset: usize) -> Result<Option<(u64, usize)>> {
        match read_varint(self.data, offset) {
            Some(v) => Ok(Some(v)),
            None if self.strict => Err(Error::unexpected_eof(
                offset,
                self.data.len() - offset + 1,
                self.data.len() - offset,
            )),
            None => Ok(None),
        }
    }

    fn slice_at(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        let available = self.data.len() - offset;
        if len > available {
            return Err(Error::unexpected_eof(offset, len, available));
        }
        Ok(&self.data[offset..offset + len])
    }

    fn read_field(&mut self) -> Result<Option<RawField<'a>>> {
        let start = self.position;

        let Some((tag, tag_len)) = self.read_varint_at(start)? else {
            return Ok(None);
        };
        let (number, wire_type) = Tag::unpack(tag);

        if number == 0 {
            if self.strict {
                return Err(Error::invalid_field_number(0));
            }
            return Ok(None);
        }
        if number > MAX_FIELD_NUMBER as u64 {
            return Err(Error::invalid_field_number(number));
        }

        let wire_type = WireType::try_from(wire_type)
            .map_err(|_| Error::unsupported_wire_type(start, wire_type))?;
        let mut cursor = start + tag_len;

        let value = match wire_type {
            WireType::Varint => {
                let Some((value, len)) = self.read_varint_at(cursor)? else {
                    return Ok(None);
                };
                cursor += len;
                RawValue::Varint(value)
            }
            WireType::Fixed64 => {
                let bytes = self.slice_at(cursor, 8)?;
                cursor += 8;
                let mut le = [0u8; 8];
                le.copy_from_slice(bytes);
                RawValue::Fixed64(u64::from_le_bytes(le))
            }
            WireType::Fixed32 => {
                let bytes = self.slice_at(cursor, 4)?;
                cursor += 4;
                let mut le = [0u8; 4];
                le.copy_from_slice(bytes);
                RawValue::Fixed32(u32::from_le_bytes(le))
            }
            WireType::LengthDelimited => {
                let Some((length, len)) = self.read_varint_at(cursor)? else {
                    return Ok(None);
                };
                cursor += len;
                let available = self.data.len() - cursor;
                let length = usize::try_from(length)
                    .map_err(|_| Error::unexpected_eof(cursor, usize::MAX, available))?;
                let bytes = self.slice_at(cursor, length)?;
                cursor += length;
                RawValue::Bytes(bytes)
            }
        };

        self.position = cursor;
        Ok(Some(RawField {
            number: number as u32,
            offset: start,
            value,
        }))
    }
}

impl<'a> Iterator for WireReader<'a> {
    type Item = Result<RawField<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.position >= self.data.len() {
            return None;
        }

        match self.read_field() {
            Ok(Some(field)) => Some(Ok(field)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Read every field of a message buffer in document order.
pub fn read_fields(data: &[u8]) -> Result<Vec<RawField<'_>>> {
    WireReader::new(data).collect()
}

/// Read every field, treating truncation and zero field numbers as errors.
pub fn read_fields_strict(data: &[u8]) -> Result<Vec<RawField<'_>>> {
    WireReader::strict(data).collect()
}

/// Append a field tag.
pub fn write_tag(number: u32, wire_type: WireType, buf: &mut impl bytes::BufMut) -> Result<()> {
    write_varint(Tag::new(number, wire_type)?.pack(), buf);
    Ok(())
}
