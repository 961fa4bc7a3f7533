//! Error types for the revpb-core library.
//!
//! Every structural failure the decoder can hit while walking wire data is a
//! variant here, carrying the byte offset (relative to the root input) where
//! it was detected. Running out of input at a field boundary is not an error:
//! the wire readers report it as `Ok(None)`.

use crate::wire::WireType;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for revpb operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all revpb operations
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// Input ended while the continuation bit of a varint was still set
    #[error("malformed varint at offset {offset}: input ended mid-varint")]
    MalformedVarint {
        /// Byte offset where the varint started
        offset: usize,
    },

    /// A varint longer than ten bytes, or whose value exceeds 64 bits
    #[error("malformed varint at offset {offset}: value overflows 64 bits")]
    VarintOverflow {
        /// Byte offset where the varint started
        offset: usize,
    },

    /// A fixed-width value was cut short
    #[error("truncated fixed{bits} value at offset {offset}: {available} of {width} bytes available", bits = .width * 8)]
    TruncatedFixed {
        /// Byte offset where the value started
        offset: usize,
        /// Expected width in bytes (4 or 8)
        width: usize,
        /// Bytes actually available
        available: usize,
    },

    /// A length prefix claims more bytes than remain in the region
    #[error("truncated length-delimited value at offset {offset}: declared {declared} bytes, {available} available")]
    TruncatedLengthDelimited {
        /// Byte offset of the length prefix
        offset: usize,
        /// Declared length
        declared: u64,
        /// Bytes actually available after the prefix
        available: usize,
    },

    /// Wire type 6 or 7
    #[error("unknown wire type {value} at offset {offset}")]
    UnknownWireType {
        /// Byte offset of the field identifier
        offset: usize,
        /// The raw wire type bits
        value: u8,
    },

    /// An end-group marker with no open group to close
    #[error("unexpected end group for field {field_no} at offset {offset}")]
    UnexpectedEndGroup {
        /// Byte offset of the marker
        offset: usize,
        /// Field number carried by the marker
        field_no: u64,
    },

    /// Region ended (or a foreign end marker appeared) before the group closed
    #[error("group for field {field_no} was not ended (offset {offset})")]
    UnterminatedGroup {
        /// Byte offset where the problem was detected
        offset: usize,
        /// Field number of the open group
        field_no: u64,
    },

    /// Declared type expects a different wire type than the one observed
    #[error("field {field_no}: found wire type {observed}, declared type '{declared}' wants {expected}")]
    WireTypeMismatch {
        /// Field number
        field_no: u64,
        /// Declared type name from the hint
        declared: String,
        /// Wire type the declared type is encoded with
        expected: WireType,
        /// Wire type found in the input
        observed: WireType,
    },

    /// Enum hint has no label for the decoded value
    #[error("unknown value {value} for enum '{enum_type}'")]
    UnknownEnumValue {
        /// Enum type name
        enum_type: String,
        /// Decoded integer value
        value: i64,
    },

    /// A declared type name the hint registry does not know
    #[error("unknown message type '{type_name}'")]
    UndeclaredMessageType {
        /// The unresolved type name
        type_name: String,
    },

    /// Value does not fit the declared integer type
    #[error("value {value} out of range for type '{type_name}'")]
    ValueOutOfRange {
        /// Declared type name
        type_name: String,
        /// Raw varint magnitude
        value: u64,
    },

    /// Declared string is not UTF-8
    #[error("invalid UTF-8 in string at offset {offset}")]
    InvalidUtf8 {
        /// Byte offset of the chunk payload
        offset: usize,
    },

    /// Nesting exceeds the configured maximum depth
    #[error("message nesting depth {depth} exceeds maximum {max}")]
    NestingTooDeep {
        /// Depth that was attempted
        depth: usize,
        /// Configured limit
        max: usize,
    },


    /// Failed to build a hint registry from descriptors
    #[error("failed to build type hints from descriptors: {0}")]
    DescriptorBuild(String),

    /// Dump sink failed to persist a chunk
    #[error("failed to dump chunk to '{path}': {reason}")]
    DumpWrite {
        /// Target resource
        path: PathBuf,
        /// Underlying failure, rendered
        reason: String,
    },
}

impl Error {
    /// Creates a new malformed varint error
    pub fn malformed_varint(offset: usize) -> Self {
        Self::MalformedVarint { offset }
    }

    /// Creates a new varint overflow error
    pub fn varint_overflow(offset: usize) -> Self {
        Self::VarintOverflow { offset }
    }

    /// Creates a new truncated fixed-width error
    pub fn truncated_fixed(offset: usize, width: usize, available: usize) -> Self {
        Self::TruncatedFixed {
            offset,
            width,
            available,
        }
    }

    /// Creates a new truncated length-delimited error
    pub fn truncated_length_delimited(offset: usize, declared: u64, available: usize) -> Self {
        Self::TruncatedLengthDelimited {
            offset,
            declared,
            available,
        }
    }

    /// Creates a new undeclared message type error
    pub fn undeclared_message_type(type_name: impl Into<String>) -> Self {
        Self::UndeclaredMessageType {
            type_name: type_name.into(),
        }
    }

    /// Creates a new value range error
    pub fn value_out_of_range(type_name: impl Into<String>, value: u64) -> Self {
        Self::ValueOutOfRange {
            type_name: type_name.into(),
            value,
        }
    }

    /// Creates a new descriptor build error
    pub fn descriptor_build(msg: impl Into<String>) -> Self {
        Self::DescriptorBuild(msg.into())
    }

    /// Creates a new dump write error
    pub fn dump_write(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::DumpWrite {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Byte offset where the error was detected, when it is tied to one
    pub fn offset(&self) -> Option<usize> {
        match self {
            Self::MalformedVarint { offset }
            | Self::VarintOverflow { offset }
            | Self::TruncatedFixed { offset, .. }
            | Self::TruncatedLengthDelimited { offset, .. }
            | Self::UnknownWireType { offset, .. }
            | Self::UnexpectedEndGroup { offset, .. }
            | Self::UnterminatedGroup { offset, .. }
            | Self::InvalidUtf8 { offset } => Some(*offset),
            _ => None,
        }
    }
}
