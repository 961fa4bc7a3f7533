//! Low-level protobuf wire format reading.
//!
//! Every reader works on a [`ByteCursor`] and distinguishes three outcomes:
//!
//! - `Ok(Some(value))`: a complete value was read
//! - `Ok(None)`: the cursor was already exhausted (clean end of region)
//! - `Err(_)`: the value started but the bytes do not complete it
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
//! - 3/4: SGROUP/EGROUP (deprecated group delimiters)
//! - 5: I32 (fixed32, sfixed32, float)

mod cursor;

use crate::error::{Error, Result};
use bytes::Bytes;
use std::fmt;

pub use cursor::ByteCursor;

/// Longest encoding of a 64-bit varint
pub const MAX_VARINT_LEN: usize = 10;

/// Protobuf wire types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum WireType {
    /// Variable-length integer
    Varint = 0,
    /// 64-bit fixed-width
    Fixed64 = 1,
    /// Length-delimited (strings, bytes, embedded messages, packed fields)
    LengthDelimited = 2,
    /// Start group (deprecated)
    StartGroup = 3,
    /// End group (deprecated)
    EndGroup = 4,
    /// 32-bit fixed-width
    Fixed32 = 5,
}

impl WireType {
    /// Width in bytes for the fixed-width wire types
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            WireType::Fixed32 => Some(4),
            WireType::Fixed64 => Some(8),
            _ => None,
        }
    }

    /// Name used in rendered output
    pub fn as_str(self) -> &'static str {
        match self {
            WireType::Varint => "varint",
            WireType::Fixed64 => "fixed64",
            WireType::LengthDelimited => "length-delimited",
            WireType::StartGroup => "start-group",
            WireType::EndGroup => "end-group",
            WireType::Fixed32 => "fixed32",
        }
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), *self as u8)
    }
}

impl TryFrom<u8> for WireType {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, u8> {
        match value {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::Fixed64),
            2 => Ok(WireType::LengthDelimited),
            3 => Ok(WireType::StartGroup),
            4 => Ok(WireType::EndGroup),
            5 => Ok(WireType::Fixed32),
            other => Err(other),
        }
    }
}

/// A field identifier as read off the wire, before wire-type validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawTag {
    /// Field number (`tag >> 3`)
    pub field_no: u64,
    /// Low three bits of the tag, possibly 6 or 7
    pub wire_type: u8,
}

/// A validated field number and wire type pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProtoId {
    /// Field number
    pub field_no: u64,
    /// Wire type
    pub wire_type: WireType,
}

impl ProtoId {
    /// Creates a new identifier
    pub fn new(field_no: u64, wire_type: WireType) -> Self {
        Self {
            field_no,
            wire_type,
        }
    }

    /// Validates a raw tag read at `offset`, rejecting wire types 6 and 7
    pub fn from_raw(raw: RawTag, offset: usize) -> Result<Self> {
        let wire_type = WireType::try_from(raw.wire_type)
            .map_err(|value| Error::UnknownWireType { offset, value })?;
        Ok(Self::new(raw.field_no, wire_type))
    }
}

/// A complete scalar or chunk payload
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// Varint magnitude
    Varint(u64),
    /// Eight little-endian bytes
    Fixed64([u8; 8]),
    /// Length-delimited payload, without its length prefix
    LengthDelimited(Bytes),
    /// Four little-endian bytes
    Fixed32([u8; 4]),
}

impl RawValue {
    /// Wire type this payload was read with
    pub fn wire_type(&self) -> WireType {
        match self {
            RawValue::Varint(_) => WireType::Varint,
            RawValue::Fixed64(_) => WireType::Fixed64,
            RawValue::LengthDelimited(_) => WireType::LengthDelimited,
            RawValue::Fixed32(_) => WireType::Fixed32,
        }
    }
}

/// Decode a base-128 varint.
///
/// A lone `0x00` is the value zero. Input that ends while the continuation
/// bit is still set is malformed; one that runs past [`MAX_VARINT_LEN`]
/// bytes or does not fit 64 bits overflows.
pub fn read_varint(cursor: &mut ByteCursor) -> Result<Option<u64>> {
    let start = cursor.offset();
    let mut result: u64 = 0;
    let mut shift = 0u32;

    let Some(mut byte) = cursor.read_byte() else {
        return Ok(None);
    };

    for _ in 0..MAX_VARINT_LEN {
        // The tenth byte only has room for bit 63
        if shift == 63 && byte > 0x01 {
            return Err(Error::varint_overflow(start));
        }
        result |= u64::from(byte & 0x7F) << shift;
        shift += 7;

        if byte & 0x80 == 0 {
            return Ok(Some(result));
        }

        byte = match cursor.read_byte() {
            Some(next) => next,
            None => return Err(Error::malformed_varint(start)),
        };
    }

    Err(Error::varint_overflow(start))
}

/// Decode a field identifier.
///
/// Wire types 6 and 7 pass through; see [`ProtoId::from_raw`].
pub fn read_identifier(cursor: &mut ByteCursor) -> Result<Option<RawTag>> {
    Ok(read_varint(cursor)?.map(|tag| RawTag {
        field_no: tag >> 3,
        wire_type: (tag & 0b111) as u8,
    }))
}

/// Read exactly `width` bytes.
///
/// An exhausted cursor is a clean end; a partial value is `TruncatedFixed`.
pub fn read_fixed(cursor: &mut ByteCursor, width: usize) -> Result<Option<Bytes>> {
    let available = cursor.remaining();
    if available == 0 {
        return Ok(None);
    }
    match cursor.take(width) {
        Some(chunk) => Ok(Some(chunk)),
        None => Err(Error::truncated_fixed(cursor.offset(), width, available)),
    }
}

/// Read four little-endian bytes
pub fn read_fixed32(cursor: &mut ByteCursor) -> Result<Option<[u8; 4]>> {
    Ok(read_fixed(cursor, 4)?.map(|chunk| {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&chunk);
        raw
    }))
}

/// Read eight little-endian bytes
pub fn read_fixed64(cursor: &mut ByteCursor) -> Result<Option<[u8; 8]>> {
    Ok(read_fixed(cursor, 8)?.map(|chunk| {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&chunk);
        raw
    }))
}

/// Read a varint length followed by exactly that many bytes.
///
/// Never returns a short read: a declared length past the end of the region
/// is `TruncatedLengthDelimited`.
pub fn read_length_delimited(cursor: &mut ByteCursor) -> Result<Option<Bytes>> {
    let prefix_offset = cursor.offset();
    let Some(length) = read_varint(cursor)? else {
        return Ok(None);
    };

    let available = cursor.remaining();
    usize::try_from(length)
        .ok()
        .and_then(|len| cursor.take(len))
        .map(Some)
        .ok_or_else(|| Error::truncated_length_delimited(prefix_offset, length, available))
}

/// Read the payload for `wire_type`.
///
/// Group markers carry no payload and yield `Ok(None)`.
pub fn read_value(cursor: &mut ByteCursor, wire_type: WireType) -> Result<Option<RawValue>> {
    Ok(match wire_type {
        WireType::Varint => read_varint(cursor)?.map(RawValue::Varint),
        WireType::Fixed64 => read_fixed64(cursor)?.map(RawValue::Fixed64),
        WireType::LengthDelimited => read_length_delimited(cursor)?.map(RawValue::LengthDelimited),
        WireType::Fixed32 => read_fixed32(cursor)?.map(RawValue::Fixed32),
        WireType::StartGroup | WireType::EndGroup => None,
    })
}

/// Zig-zag decode a varint magnitude into a signed value
pub fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}
