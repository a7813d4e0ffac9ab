//! Error types for the wirelens-core library.
//!
//! Wire-format failures (`UnexpectedEof`, `UnsupportedWireType`,
//! `InvalidFieldNumber`) are fatal to a top-level decode but recoverable for
//! speculative nested parsing. Field-table failures are always surfaced.

use crate::table::ScalarType;
use thiserror::Error;

/// Result type alias for wirelens operations
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for all wirelens operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A declared length or fixed-width value runs past the end of the buffer
    #[error("unexpected end of input at offset {offset}: need {needed} bytes, have {available}")]
    UnexpectedEof {
        /// Byte offset where the value starts
        offset: usize,
        /// Number of bytes the value requires
        needed: usize,
        /// Number of bytes left in the buffer
        available: usize,
    },

    /// Group wire types (3/4) and the undefined values 6/7
    #[error("unsupported wire type {wire_type} at offset {offset}")]
    UnsupportedWireType {
        /// Byte offset of the tag
        offset: usize,
        /// The raw 3-bit wire type
        wire_type: u8,
    },

    /// Field number zero or above the protobuf maximum
    #[error("invalid field number {number}: must be between 1 and {max}")]
    InvalidFieldNumber {
        /// The invalid field number
        number: u64,
        /// Maximum valid field number
        max: u32,
    },

    /// A field-table value could not be converted to or from its declared type
    #[error("field '{field}' ({expected}): {details}")]
    FieldConversion {
        /// Field name from the field table
        field: String,
        /// The declared scalar type
        expected: ScalarType,
        /// What went wrong
        details: String,
    },

    /// Input had the wrong overall shape (e.g. encode input not an object)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Generated schema failed to resolve with prost-reflect
    #[error("failed to build file descriptor: {0}")]
    DescriptorBuild(String),
}

impl Error {
    /// Creates a new end-of-input error
    pub fn unexpected_eof(offset: usize, needed: usize, available: usize) -> Self {
        Self::UnexpectedEof {
            offset,
            needed,
            available,
        }
    }

    /// Creates a new unsupported wire type error
    pub fn unsupported_wire_type(offset: usize, wire_type: u8) -> Self {
        Self::UnsupportedWireType { offset, wire_type }
    }

    /// Creates a new invalid field number error
    pub fn invalid_field_number(number: u64) -> Self {
        Self::InvalidFieldNumber {
            number,
            max: crate::MAX_FIELD_NUMBER,
        }
    }

    /// Creates a new field conversion error
    pub fn field_conversion(
        field: impl Into<String>,
        expected: ScalarType,
        details: impl Into<String>,
    ) -> Self {
        Self::FieldConversion {
            field: field.into(),
            expected,
            details: details.into(),
        }
    }

    /// Creates a new invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Creates a new descriptor build error
    pub fn descriptor_build(msg: impl Into<String>) -> Self {
        Self::DescriptorBuild(msg.into())
    }

    /// Returns true for malformed wire data, which callers may skip
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::UnexpectedEof { .. }
                | Self::UnsupportedWireType { .. }
                | Self::InvalidFieldNumber { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::unexpected_eof(4, 8, 3);
        assert_eq!(
            err.to_string(),
            "unexpected end of input at offset 4: need 8 bytes, have 3"
        );

        let err = Error::field_conversion("age", ScalarType::Int32, "expected an integer");
        assert_eq!(err.to_string(), "field 'age' (int32): expected an integer");
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::unsupported_wire_type(0, 3).is_recoverable());
        assert!(Error::invalid_field_number(0).is_recoverable());
        assert!(!Error::invalid_input("not an object").is_recoverable());
        assert!(!Error::field_conversion("x", ScalarType::Bool, "bad").is_recoverable());
    }
}
