//! # wirelens-core
//!
//! A library for inspecting Protocol Buffer payloads without their schema.
//!
//! This crate provides the core functionality for:
//! - Reading the raw wire format (tags, varints, fixed-width and
//!   length-delimited values)
//! - Decoding a payload into a tree of fields annotated with every plausible
//!   typed reading, including speculative embedded messages
//! - Inferring a `.proto` schema from a decoded payload or a structured object
//! - Deterministic encoding and decoding against an explicit field table
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`wire`]: Varint codec and the wire reader
//! - [`decode`]: Schema-less decoding and interpretation ranking
//! - [`schema`]: Schema inference and `.proto` rendering
//! - [`table`]: Field-table encode/decode
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```
//! use wirelens_core::{decode, generate_proto_from_decoded_fields, InterpretedValue};
//!
//! // Field 1 = 150, field 2 = "Hello"
//! let data = [0x08, 0x96, 0x01, 0x12, 0x05, b'H', b'e', b'l', b'l', b'o'];
//!
//! let fields = decode(&data)?;
//! assert_eq!(fields[0].primary().unwrap().value, InterpretedValue::Unsigned(150));
//! assert_eq!(fields[1].primary().unwrap().value, InterpretedValue::Text("Hello"));
//!
//! let schema = generate_proto_from_decoded_fields(&fields);
//! assert!(schema.contains("int64 field_1 = 1;"));
//! assert!(schema.contains("string field_2 = 2;"));
//! # Ok::<(), wirelens_core::Error>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod decode;
pub mod error;
pub mod schema;
pub mod table;
pub mod wire;

// Re-export primary types for convenience
pub use decode::{
    decode, Confidence, DecodedField, Decoder, DecoderConfig, Interpretation, InterpretationKind,
    InterpretedValue, NestedMessageProber, MAX_SAFE_INTEGER,
};
pub use error::{Error, Result};
pub use schema::{
    generate_proto_from_decoded_fields, generate_proto_from_object, FieldDescriptor,
    InferredType, SchemaConfig, SchemaInferencer,
};
pub use table::{decode_with_field_table, encode_with_field_table, ScalarType, SimpleFieldDefinition};
pub use wire::{RawField, RawValue, WireReader, WireType};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum valid protobuf field number (2^29 - 1)
pub const MAX_FIELD_NUMBER: u32 = 536_870_911;
