//! Decoded representations.
//!
//! A decode pass produces a tree: a [`Message`] owns its [`Field`]s in the
//! order they appeared on the wire, each field pairs a [`FieldDescriptor`]
//! with a [`Value`], and nested messages hang off chunk, group and typed
//! values. Every node is immutable once built.
//!
//! Renderers walk the tree through [`Value::get_fields`], which projects each
//! value into `(label, Projection)` pairs. A nested message is always
//! labelled `"sub-msg"`.

use crate::decoder::Decoder;
use crate::diagnostics::Diagnostic;
use crate::error::Result;
use crate::resolver::NativeType;
use crate::wire::{read_identifier, zigzag_decode, ByteCursor, ProtoId, WireType};
use bytes::Bytes;
use std::cell::OnceCell;

/// Label under which nested messages are projected
pub const SUB_MESSAGE_LABEL: &str = "sub-msg";

/// Smallest magnitude shown as a small negative number by the generic varint view
const SMALL_NEGATIVE_FLOOR: u64 = u64::MAX - 19_999;

/// One labelled facet of a value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection<'a> {
    /// Signed integer
    Signed(i64),
    /// Unsigned integer
    Unsigned(u64),
    /// Floating point
    Float(f64),
    /// Boolean
    Bool(bool),
    /// Text
    Text(&'a str),
    /// Raw bytes
    Bytes(&'a [u8]),
    /// Nested message
    Message(&'a Message),
    /// Repeated elements
    Values(&'a [Value]),
    /// A recorded failure
    Diagnostic(&'a Diagnostic),
    /// The facet has no valid reading
    Absent,
}

/// A varint payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarintValue {
    raw: u64,
}

impl VarintValue {
    /// Wraps a varint magnitude
    pub fn new(raw: u64) -> Self {
        Self { raw }
    }

    /// Unsigned view
    pub fn unsigned(&self) -> u64 {
        self.raw
    }

    /// Zig-zag decoded view
    pub fn signed(&self) -> i64 {
        zigzag_decode(self.raw)
    }

    /// The two's-complement reading when it is a small negative number
    pub fn small_negative(&self) -> Option<i64> {
        (self.raw >= SMALL_NEGATIVE_FLOOR).then_some(self.raw as i64)
    }

    /// Labelled facets: zig-zag and unsigned
    pub fn get_fields(&self) -> Vec<(&'static str, Projection<'static>)> {
        vec![
            ("sint", Projection::Signed(self.signed())),
            ("uint", Projection::Unsigned(self.unsigned())),
        ]
    }
}

/// A 32-bit fixed-width payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fixed32Value {
    raw: [u8; 4],
}

impl Fixed32Value {
    /// Wraps four little-endian bytes
    pub fn new(raw: [u8; 4]) -> Self {
        Self { raw }
    }

    /// The raw bytes
    pub fn raw(&self) -> [u8; 4] {
        self.raw
    }

    /// Signed view
    pub fn signed(&self) -> i32 {
        i32::from_le_bytes(self.raw)
    }

    /// Unsigned view
    pub fn unsigned(&self) -> u32 {
        u32::from_le_bytes(self.raw)
    }

    /// IEEE-754 single precision view
    pub fn float(&self) -> f32 {
        f32::from_le_bytes(self.raw)
    }

    /// Labelled facets: signed, unsigned, float
    pub fn get_fields(&self) -> Vec<(&'static str, Projection<'static>)> {
        vec![
            ("sint", Projection::Signed(i64::from(self.signed()))),
            ("uint", Projection::Unsigned(u64::from(self.unsigned()))),
            ("float", Projection::Float(f64::from(self.float()))),
        ]
    }
}

/// A 64-bit fixed-width payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fixed64Value {
    raw: [u8; 8],
}

impl Fixed64Value {
    /// Wraps eight little-endian bytes
    pub fn new(raw: [u8; 8]) -> Self {
        Self { raw }
    }

    /// The raw bytes
    pub fn raw(&self) -> [u8; 8] {
        self.raw
    }

    /// Signed view
    pub fn signed(&self) -> i64 {
        i64::from_le_bytes(self.raw)
    }

    /// Unsigned view
    pub fn unsigned(&self) -> u64 {
        u64::from_le_bytes(self.raw)
    }

    /// IEEE-754 double precision view
    pub fn float(&self) -> f64 {
        f64::from_le_bytes(self.raw)
    }

    /// Labelled facets: signed, unsigned, float
    pub fn get_fields(&self) -> Vec<(&'static str, Projection<'static>)> {
        vec![
            ("sint", Projection::Signed(self.signed())),
            ("uint", Projection::Unsigned(self.unsigned())),
            ("float", Projection::Float(self.float())),
        ]
    }
}

/// Back-to-back scalars packed into one chunk
#[derive(Debug, Clone, PartialEq)]
pub struct PackedValue {
    /// Element routine
    pub element: NativeType,
    /// Decoded elements in wire order
    pub values: Vec<Value>,
}

/// Interpretation the guessing chain settled on for a chunk
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkKind {
    /// Nested message, see [`ChunkValue::message`]
    Message,
    /// Packed repeated scalars
    Packed(PackedValue),
    /// Probable text, see [`ChunkValue::as_str`]
    Text,
    /// None of the above
    Bytes,
}

/// A length-delimited payload with its candidate interpretations.
///
/// The string candidate and the nested message candidate are derived once and
/// memoized.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkValue {
    raw: Bytes,
    offset: usize,
    kind: ChunkKind,
    text: OnceCell<Option<String>>,
    message: OnceCell<Option<Message>>,
}

impl ChunkValue {
    /// Classifies a standalone chunk with a default [`Decoder`]
    pub fn new(raw: impl Into<Bytes>) -> Self {
        Decoder::new().guess_chunk(raw)
    }

    /// Assembles a chunk whose candidates have already been derived
    pub(crate) fn from_parts(
        raw: Bytes,
        offset: usize,
        kind: ChunkKind,
        text: Option<String>,
        message: Option<Message>,
    ) -> Self {
        Self {
            raw,
            offset,
            kind,
            text: OnceCell::from(text),
            message: OnceCell::from(message),
        }
    }

    /// The payload bytes
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// Absolute offset of the payload in the root input
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Payload length
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Returns true for a zero-length chunk
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// The interpretation chosen by the guessing chain
    pub fn kind(&self) -> &ChunkKind {
        &self.kind
    }

    /// UTF-8 candidate; only present when every character is printable
    pub fn as_str(&self) -> Option<&str> {
        self.text.get_or_init(|| printable_text(&self.raw)).as_deref()
    }

    /// Nested message candidate; absent when the bytes are not a message
    pub fn message(&self) -> Option<&Message> {
        self.message
            .get_or_init(|| {
                Decoder::new()
                    .try_decode_region(self.raw.clone(), self.offset)
                    .ok()
            })
            .as_ref()
    }

    /// Packed elements, when the chunk was classified as packed
    pub fn packed(&self) -> Option<&PackedValue> {
        match &self.kind {
            ChunkKind::Packed(packed) => Some(packed),
            _ => None,
        }
    }

    /// Labelled facets: raw bytes, string candidate, message candidate and,
    /// for packed chunks, the elements
    pub fn get_fields(&self) -> Vec<(&'static str, Projection<'_>)> {
        let mut fields = vec![
            ("chunk", Projection::Bytes(&self.raw)),
            ("str", self.as_str().map_or(Projection::Absent, Projection::Text)),
            (
                SUB_MESSAGE_LABEL,
                self.message().map_or(Projection::Absent, Projection::Message),
            ),
        ];
        if let Some(packed) = self.packed() {
            fields.push(("packed", Projection::Values(&packed.values)));
        }
        fields
    }
}

/// UTF-8 decoding of `raw` when every character is printable ASCII or whitespace
pub fn printable_text(raw: &[u8]) -> Option<String> {
    std::str::from_utf8(raw)
        .ok()
        .filter(|text| text.chars().all(is_printable))
        .map(str::to_string)
}

fn is_printable(c: char) -> bool {
    c.is_ascii_graphic() || matches!(c, ' ' | '\t' | '\n' | '\r' | '\x0b' | '\x0c')
}

/// Payload decoded by a declared (hinted) type
#[derive(Debug, Clone, PartialEq)]
pub enum TypedData {
    /// Signed integer types
    Signed(i64),
    /// Unsigned integer types
    Unsigned(u64),
    /// `bool`
    Bool(bool),
    /// `float`
    Float(f32),
    /// `double`
    Double(f64),
    /// Enum value with its label
    Enum {
        /// Integer value
        value: i32,
        /// Label from the enum table
        label: String,
    },
    /// `string`
    Text(String),
    /// `bytes`
    Bytes(Bytes),
    /// Nested message of a declared type
    Message(Message),
    /// Packed repeated scalars
    Packed(PackedValue),
    /// Confirmation returned by the dump sink
    Dumped(String),
}

/// A value decoded with a declared type
#[derive(Debug, Clone, PartialEq)]
pub struct TypedValue {
    /// Declared type name
    pub type_name: String,
    /// Decoded payload
    pub data: TypedData,
}

impl TypedValue {
    /// Creates a typed value
    pub fn new(type_name: impl Into<String>, data: TypedData) -> Self {
        Self {
            type_name: type_name.into(),
            data,
        }
    }

    /// Labelled facets
    pub fn get_fields(&self) -> Vec<(&'static str, Projection<'_>)> {
        let projection = match &self.data {
            TypedData::Signed(v) => Projection::Signed(*v),
            TypedData::Unsigned(v) => Projection::Unsigned(*v),
            TypedData::Bool(v) => Projection::Bool(*v),
            TypedData::Float(v) => Projection::Float(f64::from(*v)),
            TypedData::Double(v) => Projection::Float(*v),
            TypedData::Enum { value, label } => {
                return vec![
                    ("value", Projection::Signed(i64::from(*value))),
                    ("label", Projection::Text(label)),
                ]
            }
            TypedData::Text(text) | TypedData::Dumped(text) => Projection::Text(text),
            TypedData::Bytes(bytes) => Projection::Bytes(bytes),
            TypedData::Message(message) => {
                return vec![(SUB_MESSAGE_LABEL, Projection::Message(message))]
            }
            TypedData::Packed(packed) => Projection::Values(&packed.values),
        };
        vec![("value", projection)]
    }
}

/// Any decoded value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Generic varint
    Varint(VarintValue),
    /// Generic 32-bit value
    Fixed32(Fixed32Value),
    /// Generic 64-bit value
    Fixed64(Fixed64Value),
    /// Generic chunk, classified by guessing
    Chunk(ChunkValue),
    /// Group delimited by start/end markers
    Group(Message),
    /// Value decoded with a declared type
    Typed(TypedValue),
    /// Substitute for a value that failed to decode
    Invalid(Diagnostic),
}

impl Value {
    /// Labelled facets of this value
    pub fn get_fields(&self) -> Vec<(&'static str, Projection<'_>)> {
        match self {
            Value::Varint(v) => v.get_fields(),
            Value::Fixed32(v) => v.get_fields(),
            Value::Fixed64(v) => v.get_fields(),
            Value::Chunk(v) => v.get_fields(),
            Value::Group(message) => vec![(SUB_MESSAGE_LABEL, Projection::Message(message))],
            Value::Typed(v) => v.get_fields(),
            Value::Invalid(diagnostic) => vec![("error", Projection::Diagnostic(diagnostic))],
        }
    }

    /// The generic varint, if this is one
    pub fn as_varint(&self) -> Option<&VarintValue> {
        match self {
            Value::Varint(v) => Some(v),
            _ => None,
        }
    }

    /// The chunk, if this is one
    pub fn as_chunk(&self) -> Option<&ChunkValue> {
        match self {
            Value::Chunk(v) => Some(v),
            _ => None,
        }
    }

    /// The typed value, if this is one
    pub fn as_typed(&self) -> Option<&TypedValue> {
        match self {
            Value::Typed(v) => Some(v),
            _ => None,
        }
    }

    /// The diagnostic, if decoding this value failed
    pub fn as_invalid(&self) -> Option<&Diagnostic> {
        match self {
            Value::Invalid(d) => Some(d),
            _ => None,
        }
    }

    /// The nested message this value resolved to, if any
    pub fn as_message(&self) -> Option<&Message> {
        match self {
            Value::Chunk(chunk) if chunk.kind == ChunkKind::Message => chunk.message(),
            Value::Group(message) => Some(message),
            Value::Typed(TypedValue {
                data: TypedData::Message(message),
                ..
            }) => Some(message),
            _ => None,
        }
    }

    /// The text this value resolved to, if any
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Chunk(chunk) if chunk.kind == ChunkKind::Text => chunk.as_str(),
            Value::Typed(TypedValue {
                data: TypedData::Text(text),
                ..
            }) => Some(text),
            _ => None,
        }
    }
}

/// A field number and wire type, as read at a known offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    id: ProtoId,
    offset: usize,
}

impl FieldDescriptor {
    /// Creates a descriptor
    pub fn new(id: ProtoId, offset: usize) -> Self {
        Self { id, offset }
    }

    /// Reads the next field identifier.
    ///
    /// `Ok(None)` means the region ended cleanly; a malformed varint or wire
    /// type 6/7 is an error.
    pub fn read(cursor: &mut ByteCursor) -> Result<Option<Self>> {
        let offset = cursor.offset();
        let Some(raw) = read_identifier(cursor)? else {
            return Ok(None);
        };
        Ok(Some(Self::new(ProtoId::from_raw(raw, offset)?, offset)))
    }

    /// Field number
    pub fn field_no(&self) -> u64 {
        self.id.field_no
    }

    /// Wire type
    pub fn wire_type(&self) -> WireType {
        self.id.wire_type
    }

    /// The identifier pair
    pub fn id(&self) -> ProtoId {
        self.id
    }

    /// Absolute offset of the identifier in the root input
    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// One field occurrence
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Where and how the field was encoded
    pub descriptor: FieldDescriptor,
    /// Field name from a schema hint
    pub name: Option<String>,
    /// Decoded value
    pub value: Value,
}

impl Field {
    /// Creates an unnamed field
    pub fn new(descriptor: FieldDescriptor, value: Value) -> Self {
        Self {
            descriptor,
            name: None,
            value,
        }
    }

    /// Field number
    pub fn field_no(&self) -> u64 {
        self.descriptor.field_no()
    }

    /// Wire type
    pub fn wire_type(&self) -> WireType {
        self.descriptor.wire_type()
    }
}

/// Decoded message: fields in wire order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Message {
    /// Declared message type, when decoded with hints
    pub type_name: Option<String>,
    /// Fields in the order they were encountered
    pub fields: Vec<Field>,
    /// A field number appeared with more than one wire type, or a declared
    /// type disagreed with the wire
    pub wire_types_not_matching: bool,
    /// Set when decoding of this region stopped early; `fields` holds what
    /// was decoded before the failure
    pub error: Option<Diagnostic>,
}

impl Message {
    /// Creates an empty message
    pub fn new(type_name: Option<&str>) -> Self {
        Self {
            type_name: type_name.map(str::to_string),
            ..Self::default()
        }
    }

    /// Number of field occurrences
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the message has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Every occurrence of `field_no`, in wire order
    pub fn get(&self, field_no: u64) -> impl Iterator<Item = &Field> + '_ {
        self.fields.iter().filter(move |f| f.field_no() == field_no)
    }

    /// Value of the first occurrence of `field_no`
    pub fn first(&self, field_no: u64) -> Option<&Value> {
        self.get(field_no).next().map(|f| &f.value)
    }

    /// Returns true if the whole region decoded without a region-level failure
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}
