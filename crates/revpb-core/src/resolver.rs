//! Maps declared type names and observed wire types to decode routines.
//!
//! Native types form a closed set ([`NativeType`]) looked up through one
//! static name table. Anything else a hint names must be an enum (the hint
//! carries its labels) or a message type the registry knows.

use crate::error::{Error, Result};
use crate::hints::{EnumTable, FieldHint, TypeHints};
use crate::value::{Fixed32Value, Fixed64Value, TypedData, TypedValue, Value, VarintValue};
use crate::wire::{zigzag_decode, RawValue, WireType};

/// Built-in decode routines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeType {
    /// Generic varint (default for wire type 0)
    Varint,
    /// `sint32`
    Sint32,
    /// `sint64`
    Sint64,
    /// `int32`
    Int32,
    /// `int64`
    Int64,
    /// `uint32`
    Uint32,
    /// `uint64`
    Uint64,
    /// `enum`
    Enum,
    /// `bool`
    Bool,
    /// Generic 64-bit value (default for wire type 1)
    Bits64,
    /// `sfixed64`
    Sfixed64,
    /// `fixed64`
    Fixed64,
    /// `double`
    Double,
    /// Generic chunk, resolved by guessing (default for wire type 2)
    Chunk,
    /// `bytes`
    Bytes,
    /// `string`
    String,
    /// Nested message of unknown type
    Message,
    /// Packed repeated scalars of unknown element type
    Packed,
    /// Persist the payload through the dump sink
    Dump,
    /// Generic 32-bit value (default for wire type 5)
    Bits32,
    /// `sfixed32`
    Sfixed32,
    /// `fixed32`
    Fixed32,
    /// `float`
    Float,
}

/// Native type names, grouped by the wire type they are encoded with
const NATIVE_TYPES: &[(&str, NativeType)] = &[
    ("varint", NativeType::Varint),
    ("sint32", NativeType::Sint32),
    ("sint64", NativeType::Sint64),
    ("int32", NativeType::Int32),
    ("int64", NativeType::Int64),
    ("uint32", NativeType::Uint32),
    ("uint64", NativeType::Uint64),
    ("enum", NativeType::Enum),
    ("bool", NativeType::Bool),
    ("64bit", NativeType::Bits64),
    ("sfixed64", NativeType::Sfixed64),
    ("fixed64", NativeType::Fixed64),
    ("double", NativeType::Double),
    ("chunk", NativeType::Chunk),
    ("bytes", NativeType::Bytes),
    ("string", NativeType::String),
    ("message", NativeType::Message),
    ("packed", NativeType::Packed),
    ("dump", NativeType::Dump),
    ("32bit", NativeType::Bits32),
    ("sfixed32", NativeType::Sfixed32),
    ("fixed32", NativeType::Fixed32),
    ("float", NativeType::Float),
];

/// Element types tried, in order, when a packed field's element type is unknown
pub const PACKED_TRIAL_ORDER: [NativeType; 3] =
    [NativeType::Varint, NativeType::Bits64, NativeType::Bits32];

impl NativeType {
    /// Looks up a native type by its declared name
    pub fn from_name(name: &str) -> Option<Self> {
        NATIVE_TYPES
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, ty)| *ty)
    }

    /// Declared name of this type
    pub fn name(self) -> &'static str {
        NATIVE_TYPES
            .iter()
            .find(|(_, ty)| *ty == self)
            .map(|(name, _)| *name)
            .unwrap_or("unknown")
    }

    /// Wire type values of this type are encoded with
    pub fn wire_type(self) -> WireType {
        use NativeType::*;
        match self {
            Varint | Sint32 | Sint64 | Int32 | Int64 | Uint32 | Uint64 | Enum | Bool => {
                WireType::Varint
            }
            Bits64 | Sfixed64 | Fixed64 | Double => WireType::Fixed64,
            Chunk | Bytes | String | Message | Packed | Dump => WireType::LengthDelimited,
            Bits32 | Sfixed32 | Fixed32 | Float => WireType::Fixed32,
        }
    }

    /// Generic routine for a wire type with no declared type.
    ///
    /// Groups have no scalar routine; an untyped group decodes as [`NativeType::Message`].
    pub fn default_for(wire_type: WireType) -> Option<Self> {
        match wire_type {
            WireType::Varint => Some(NativeType::Varint),
            WireType::Fixed64 => Some(NativeType::Bits64),
            WireType::LengthDelimited => Some(NativeType::Chunk),
            WireType::Fixed32 => Some(NativeType::Bits32),
            WireType::StartGroup | WireType::EndGroup => None,
        }
    }

    /// Returns true if values of this type can appear inside a packed field
    pub fn is_packable(self) -> bool {
        !matches!(self.wire_type(), WireType::LengthDelimited) && self != NativeType::Enum
    }

    /// Decodes a varint or fixed-width payload with this routine.
    ///
    /// Chunk-family types are handled by the decoder, which owns recursion and
    /// the dump sink; passing one here is a wire type mismatch.
    pub fn decode_scalar(self, raw: &RawValue) -> Result<Value> {
        use NativeType::*;

        let typed = |data: TypedData| -> Result<Value> {
            Ok(Value::Typed(TypedValue::new(self.name(), data)))
        };

        match (self, raw) {
            (Varint, RawValue::Varint(v)) => Ok(Value::Varint(VarintValue::new(*v))),
            (Sint32, RawValue::Varint(v)) => {
                let v = checked_range(self, *v, u32::MAX as u64)?;
                typed(TypedData::Signed(zigzag_decode(v)))
            }
            (Sint64, RawValue::Varint(v)) => typed(TypedData::Signed(zigzag_decode(*v))),
            (Int32, RawValue::Varint(v)) => {
                let signed = *v as i64;
                if i32::try_from(signed).is_err() {
                    return Err(Error::value_out_of_range(self.name(), *v));
                }
                typed(TypedData::Signed(signed))
            }
            (Int64, RawValue::Varint(v)) => typed(TypedData::Signed(*v as i64)),
            (Uint32, RawValue::Varint(v)) => {
                typed(TypedData::Unsigned(checked_range(self, *v, u32::MAX as u64)?))
            }
            (Uint64, RawValue::Varint(v)) => typed(TypedData::Unsigned(*v)),
            (Bool, RawValue::Varint(v)) => typed(TypedData::Bool(checked_range(self, *v, 1)? == 1)),

            (Bits64, RawValue::Fixed64(b)) => Ok(Value::Fixed64(Fixed64Value::new(*b))),
            (Sfixed64, RawValue::Fixed64(b)) => typed(TypedData::Signed(i64::from_le_bytes(*b))),
            (Fixed64, RawValue::Fixed64(b)) => typed(TypedData::Unsigned(u64::from_le_bytes(*b))),
            (Double, RawValue::Fixed64(b)) => typed(TypedData::Double(f64::from_le_bytes(*b))),

            (Bits32, RawValue::Fixed32(b)) => Ok(Value::Fixed32(Fixed32Value::new(*b))),
            (Sfixed32, RawValue::Fixed32(b)) => {
                typed(TypedData::Signed(i64::from(i32::from_le_bytes(*b))))
            }
            (Fixed32, RawValue::Fixed32(b)) => {
                typed(TypedData::Unsigned(u64::from(u32::from_le_bytes(*b))))
            }
            (Float, RawValue::Fixed32(b)) => typed(TypedData::Float(f32::from_le_bytes(*b))),

            _ => Err(Error::WireTypeMismatch {
                field_no: 0,
                declared: self.name().to_string(),
                expected: self.wire_type(),
                observed: raw.wire_type(),
            }),
        }
    }
}

fn checked_range(ty: NativeType, value: u64, max: u64) -> Result<u64> {
    if value > max {
        return Err(Error::value_out_of_range(ty.name(), value));
    }
    Ok(value)
}

/// The routine a field resolved to
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolved<'h> {
    /// A built-in routine
    Native(NativeType),
    /// Packed repeated scalars of a known element type
    Packed(NativeType),
    /// An enum with its labels
    Enum {
        /// Enum type name
        type_name: &'h str,
        /// Known labels
        table: &'h EnumTable,
    },
    /// A message type known to the hint registry
    Message(&'h str),
}

impl Resolved<'_> {
    /// Wire type the routine expects
    pub fn wire_type(&self) -> WireType {
        match self {
            Resolved::Native(ty) => ty.wire_type(),
            Resolved::Packed(_) | Resolved::Message(_) => WireType::LengthDelimited,
            Resolved::Enum { .. } => WireType::Varint,
        }
    }

    /// Name shown for values decoded by this routine
    pub fn type_name(&self) -> String {
        match self {
            Resolved::Native(ty) => ty.name().to_string(),
            Resolved::Packed(ty) => format!("packed {}", ty.name()),
            Resolved::Enum { type_name, .. } | Resolved::Message(type_name) => {
                type_name.to_string()
            }
        }
    }
}

/// Outcome of resolving one field occurrence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution<'h> {
    /// Routine to decode with
    pub target: Resolved<'h>,
    /// True when the declared routine expects another wire type than observed
    pub mismatch: bool,
}

/// Resolves a field to a routine.
///
/// A declared type wins over the observed wire type; disagreement is flagged
/// in [`Resolution::mismatch`] rather than rejected. Without a hint, the
/// observed wire type picks the generic routine.
pub fn resolve<'h>(
    hint: Option<FieldHint<'h>>,
    hints: &dyn TypeHints,
    observed: WireType,
) -> Result<Resolution<'h>> {
    let Some(hint) = hint else {
        let target = Resolved::Native(
            NativeType::default_for(observed).unwrap_or(NativeType::Message),
        );
        return Ok(Resolution {
            target,
            mismatch: false,
        });
    };

    let target = match resolve_declared(hint, hints)? {
        // Repeated scalars may also arrive one element per field
        Resolved::Packed(element) if element.wire_type() == observed => Resolved::Native(element),
        target => target,
    };
    Ok(Resolution {
        target,
        mismatch: target.wire_type() != observed,
    })
}

fn resolve_declared<'h>(hint: FieldHint<'h>, hints: &dyn TypeHints) -> Result<Resolved<'h>> {
    let name = hint.type_name;

    if let Some(table) = hint.enum_table {
        return Ok(Resolved::Enum {
            type_name: name,
            table,
        });
    }

    if let Some(element) = name.strip_prefix("packed ") {
        return match NativeType::from_name(element.trim()) {
            Some(ty) if ty.is_packable() => Ok(Resolved::Packed(ty)),
            _ => Err(Error::undeclared_message_type(name)),
        };
    }

    match NativeType::from_name(name) {
        // An enum needs its labels, which only a hint can carry
        Some(NativeType::Enum) => Err(Error::undeclared_message_type(name)),
        Some(ty) => Ok(Resolved::Native(ty)),
        None if hints.has_message(name) => Ok(Resolved::Message(name)),
        None => Err(Error::undeclared_message_type(name)),
    }
}
