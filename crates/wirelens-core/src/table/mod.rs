//! Deterministic encoding and decoding against an explicit field table.
//!
//! A field table is a caller-supplied list of [`SimpleFieldDefinition`]s
//! mapping field numbers to names and scalar types. Unlike the schema-less
//! decoder there is no ambiguity: the declared type always decides how a
//! payload is framed and converted, and any value that does not fit its
//! declared type is an error.
//!
//! Structured values are [`serde_json::Value`] objects. Field tables
//! deserialize from JSON:
//!
//! ```
//! use wirelens_core::table::{ScalarType, SimpleFieldDefinition};
//!
//! let table: Vec<SimpleFieldDefinition> = serde_json::from_str(
//!     r#"[{"number": 1, "name": "name", "type": "string"},
//!         {"number": 2, "name": "tags", "type": "string", "repeated": true}]"#,
//! )?;
//! assert_eq!(table[0].field_type, ScalarType::String);
//! assert!(table[1].repeated);
//! # Ok::<(), serde_json::Error>(())
//! ```

mod decode;
mod encode;

use crate::wire::WireType;
use prost_types::field_descriptor_proto::Type;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use decode::decode_with_field_table;
pub use encode::encode_with_field_table;

/// Protobuf scalar types usable in a field table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    /// 64-bit float
    Double,
    /// 32-bit float
    Float,
    /// Varint, sign-extended when negative
    Int32,
    /// Varint, two's complement
    Int64,
    /// Varint
    Uint32,
    /// Varint
    Uint64,
    /// Zig-zag varint
    Sint32,
    /// Zig-zag varint
    Sint64,
    /// 4-byte little-endian unsigned
    Fixed32,
    /// 8-byte little-endian unsigned
    Fixed64,
    /// 4-byte little-endian signed
    Sfixed32,
    /// 8-byte little-endian signed
    Sfixed64,
    /// Varint 0/1
    Bool,
    /// Length-prefixed UTF-8
    String,
    /// Length-prefixed raw bytes
    Bytes,
    /// Enum value number, encoded like int32
    Enum,
}

impl ScalarType {
    /// Protobuf type name
    pub fn as_str(self) -> &'static str {
        match self {
            ScalarType::Double => "double",
            ScalarType::Float => "float",
            ScalarType::Int32 => "int32",
            ScalarType::Int64 => "int64",
            ScalarType::Uint32 => "uint32",
            ScalarType::Uint64 => "uint64",
            ScalarType::Sint32 => "sint32",
            ScalarType::Sint64 => "sint64",
            ScalarType::Fixed32 => "fixed32",
            ScalarType::Fixed64 => "fixed64",
            ScalarType::Sfixed32 => "sfixed32",
            ScalarType::Sfixed64 => "sfixed64",
            ScalarType::Bool => "bool",
            ScalarType::String => "string",
            ScalarType::Bytes => "bytes",
            ScalarType::Enum => "enum",
        }
    }

    /// Wire type a value of this type is framed with
    pub fn wire_type(self) -> WireType {
        match self {
            ScalarType::Int32
            | ScalarType::Int64
            | ScalarType::Uint32
            | ScalarType::Uint64
            | ScalarType::Sint32
            | ScalarType::Sint64
            | ScalarType::Bool
            | ScalarType::Enum => WireType::Varint,
            ScalarType::Fixed64 | ScalarType::Sfixed64 | ScalarType::Double => WireType::Fixed64,
            ScalarType::Fixed32 | ScalarType::Sfixed32 | ScalarType::Float => WireType::Fixed32,
            ScalarType::String | ScalarType::Bytes => WireType::LengthDelimited,
        }
    }

    /// Returns true if repeated values of this type may be packed
    pub fn is_packable(self) -> bool {
        self.wire_type() != WireType::LengthDelimited
    }

    /// Descriptor type used when rendering a schema.
    ///
    /// Field tables carry no enum definitions, so `enum` is declared as
    /// `int32`, which shares its encoding.
    pub fn proto_type(self) -> Type {
        match self {
            ScalarType::Double => Type::Double,
            ScalarType::Float => Type::Float,
            ScalarType::Int32 | ScalarType::Enum => Type::Int32,
            ScalarType::Int64 => Type::Int64,
            ScalarType::Uint32 => Type::Uint32,
            ScalarType::Uint64 => Type::Uint64,
            ScalarType::Sint32 => Type::Sint32,
            ScalarType::Sint64 => Type::Sint64,
            ScalarType::Fixed32 => Type::Fixed32,
            ScalarType::Fixed64 => Type::Fixed64,
            ScalarType::Sfixed32 => Type::Sfixed32,
            ScalarType::Sfixed64 => Type::Sfixed64,
            ScalarType::Bool => Type::Bool,
            ScalarType::String => Type::String,
            ScalarType::Bytes => Type::Bytes,
        }
    }

    /// Type used for undeclared fields, chosen by wire type
    pub(crate) fn fallback_for(wire_type: WireType) -> Self {
        match wire_type {
            WireType::Varint => ScalarType::Uint64,
            WireType::Fixed64 => ScalarType::Fixed64,
            WireType::Fixed32 => ScalarType::Fixed32,
            WireType::LengthDelimited => ScalarType::Bytes,
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a field table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleFieldDefinition {
    /// Field number
    pub number: u32,
    /// Member name in the structured object
    pub name: String,
    /// Declared scalar type
    #[serde(rename = "type")]
    pub field_type: ScalarType,
    /// Whether the field holds an array of values
    #[serde(default)]
    pub repeated: bool,
}

impl SimpleFieldDefinition {
    /// Creates a singular field definition
    pub fn new(number: u32, name: impl Into<String>, field_type: ScalarType) -> Self {
        Self {
            number,
            name: name.into(),
            field_type,
            repeated: false,
        }
    }

    /// Marks the field as repeated
    pub fn repeated(mut self) -> Self {
        self.repeated = true;
        self
    }
}
