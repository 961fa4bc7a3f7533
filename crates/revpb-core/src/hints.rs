//! Optional schema knowledge used to override the heuristics.
//!
//! The decoder only needs the [`TypeHints`] lookup: given the enclosing
//! message type and a field number, what type was the field declared with.
//! [`HintRegistry`] is an in-memory implementation that can be filled by hand
//! or built from compiled descriptors via `prost-reflect`.

use crate::error::{Error, Result};
use prost_reflect::{DescriptorPool, Kind};
use prost_types::FileDescriptorSet;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Enum value to label mapping
pub type EnumTable = BTreeMap<i32, String>;

/// What a schema says about one field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldHint<'a> {
    /// Declared type: a native name (`sint32`, `packed fixed32`, ...), an enum
    /// type name or a message type name
    pub type_name: &'a str,
    /// Field name from the schema, for display
    pub field_name: Option<&'a str>,
    /// Value labels when the declared type is an enum
    pub enum_table: Option<&'a EnumTable>,
}

/// Lookup capability over schema hints.
///
/// Absence of a hint is the normal case and never an error.
pub trait TypeHints {
    /// Declared type of `field_no` inside `message_type`
    fn lookup(&self, message_type: &str, field_no: u64) -> Option<FieldHint<'_>>;

    /// Returns true if `message_type` names a known message
    fn has_message(&self, message_type: &str) -> bool;
}

impl<T: TypeHints + ?Sized> TypeHints for Arc<T> {
    fn lookup(&self, message_type: &str, field_no: u64) -> Option<FieldHint<'_>> {
        (**self).lookup(message_type, field_no)
    }

    fn has_message(&self, message_type: &str) -> bool {
        (**self).has_message(message_type)
    }
}

/// Hint source that knows nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHints;

impl TypeHints for NoHints {
    fn lookup(&self, _message_type: &str, _field_no: u64) -> Option<FieldHint<'_>> {
        None
    }

    fn has_message(&self, _message_type: &str) -> bool {
        false
    }
}

#[derive(Debug, Clone, PartialEq)]
struct FieldEntry {
    type_name: String,
    field_name: Option<String>,
}

/// In-memory hint registry
#[derive(Debug, Clone, Default)]
pub struct HintRegistry {
    messages: HashMap<String, BTreeMap<u64, FieldEntry>>,
    enums: HashMap<String, EnumTable>,
}

impl HintRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a message type with no known fields
    pub fn with_message(mut self, message_type: impl Into<String>) -> Self {
        self.messages.entry(message_type.into()).or_default();
        self
    }

    /// Declares the type of one field, registering the message if needed
    pub fn with_field(
        mut self,
        message_type: impl Into<String>,
        field_no: u64,
        type_name: impl Into<String>,
        field_name: Option<&str>,
    ) -> Self {
        self.insert_field(message_type.into(), field_no, type_name.into(), field_name);
        self
    }

    /// Declares an enum type and its labels
    pub fn with_enum<L: Into<String>>(
        mut self,
        enum_type: impl Into<String>,
        values: impl IntoIterator<Item = (i32, L)>,
    ) -> Self {
        let table = values.into_iter().map(|(v, l)| (v, l.into())).collect();
        self.enums.insert(enum_type.into(), table);
        self
    }

    fn insert_field(
        &mut self,
        message_type: String,
        field_no: u64,
        type_name: String,
        field_name: Option<&str>,
    ) {
        self.messages.entry(message_type).or_default().insert(
            field_no,
            FieldEntry {
                type_name,
                field_name: field_name.map(str::to_string),
            },
        );
    }

    /// Number of known message types
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Number of known enum types
    pub fn enum_count(&self) -> usize {
        self.enums.len()
    }

    /// Labels of a known enum type
    pub fn enum_table(&self, enum_type: &str) -> Option<&EnumTable> {
        self.enums.get(enum_type)
    }

    /// Builds a registry from every message and enum in a descriptor pool.
    ///
    /// Types are keyed by their full names (`package.Message`).
    pub fn from_descriptor_pool(pool: &DescriptorPool) -> Self {
        let mut registry = Self::new();

        for message in pool.all_messages() {
            let message_type = message.full_name().to_string();
            registry.messages.entry(message_type.clone()).or_default();

            for field in message.fields() {
                let kind = field.kind();
                let type_name = if field.is_packed() {
                    format!("packed {}", packed_element_name(&kind))
                } else {
                    kind_type_name(&kind)
                };
                registry.insert_field(
                    message_type.clone(),
                    u64::from(field.number()),
                    type_name,
                    Some(field.name()),
                );
            }
        }

        for enum_type in pool.all_enums() {
            let table = enum_type
                .values()
                .map(|value| (value.number(), value.name().to_string()))
                .collect();
            registry.enums.insert(enum_type.full_name().to_string(), table);
        }

        debug!(
            "Built hint registry: {} messages, {} enums",
            registry.message_count(),
            registry.enum_count()
        );
        registry
    }

    /// Builds a registry from a decoded `FileDescriptorSet`
    pub fn from_file_descriptor_set(set: FileDescriptorSet) -> Result<Self> {
        let pool = DescriptorPool::from_file_descriptor_set(set)
            .map_err(|e| Error::descriptor_build(e.to_string()))?;
        Ok(Self::from_descriptor_pool(&pool))
    }

    /// Builds a registry from an encoded `FileDescriptorSet` (as written by
    /// `protoc --descriptor_set_out`)
    pub fn from_file_descriptor_set_bytes(data: &[u8]) -> Result<Self> {
        let pool =
            DescriptorPool::decode(data).map_err(|e| Error::descriptor_build(e.to_string()))?;
        Ok(Self::from_descriptor_pool(&pool))
    }
}

impl TypeHints for HintRegistry {
    fn lookup(&self, message_type: &str, field_no: u64) -> Option<FieldHint<'_>> {
        let entry = self.messages.get(message_type)?.get(&field_no)?;
        Some(FieldHint {
            type_name: &entry.type_name,
            field_name: entry.field_name.as_deref(),
            enum_table: self.enums.get(&entry.type_name),
        })
    }

    fn has_message(&self, message_type: &str) -> bool {
        self.messages.contains_key(message_type)
    }
}

/// Declared type name for a descriptor field kind
fn kind_type_name(kind: &Kind) -> String {
    match kind {
        Kind::Message(message) => message.full_name().to_string(),
        Kind::Enum(enum_type) => enum_type.full_name().to_string(),
        scalar => scalar_name(scalar).to_string(),
    }
}

/// Element name inside a packed field; enums pack as plain int32
fn packed_element_name(kind: &Kind) -> &'static str {
    match kind {
        Kind::Enum(_) => "int32",
        scalar => scalar_name(scalar),
    }
}

fn scalar_name(kind: &Kind) -> &'static str {
    match kind {
        Kind::Double => "double",
        Kind::Float => "float",
        Kind::Int32 => "int32",
        Kind::Int64 => "int64",
        Kind::Uint32 => "uint32",
        Kind::Uint64 => "uint64",
        Kind::Sint32 => "sint32",
        Kind::Sint64 => "sint64",
        Kind::Fixed32 => "fixed32",
        Kind::Fixed64 => "fixed64",
        Kind::Sfixed32 => "sfixed32",
        Kind::Sfixed64 => "sfixed64",
        Kind::Bool => "bool",
        Kind::String => "string",
        Kind::Bytes => "bytes",
        Kind::Message(_) => "message",
        Kind::Enum(_) => "enum",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost_types::field_descriptor_proto::{Label, Type};
    use prost_types::{
        DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
        FileDescriptorProto,
    };

    fn field(name: &str, number: i32, ty: Type, label: Label, type_name: Option<&str>) -> FieldDescriptorProto {
        FieldDescriptorProto {
            name: Some(name.to_string()),
            number: Some(number),
            label: Some(label as i32),
            r#type: Some(ty as i32),
            type_name: type_name.map(str::to_string),
            json_name: Some(name.to_string()),
            ..Default::default()
        }
    }

    fn book_descriptor_set() -> FileDescriptorSet {
        let person = DescriptorProto {
            name: Some("Person".to_string()),
            field: vec![
                field("name", 1, Type::String, Label::Optional, None),
                field("kind", 2, Type::Enum, Label::Optional, Some(".book.Kind")),
            ],
            ..Default::default()
        };
        let book = DescriptorProto {
            name: Some("Book".to_string()),
            field: vec![
                field("id", 1, Type::Int32, Label::Optional, None),
                field("title", 2, Type::String, Label::Optional, None),
                field("people", 4, Type::Message, Label::Repeated, Some(".book.Person")),
                field("scores", 5, Type::Sint32, Label::Repeated, None),
            ],
            ..Default::default()
        };
        let kind = EnumDescriptorProto {
            name: Some("Kind".to_string()),
            value: vec![
                EnumValueDescriptorProto {
                    name: Some("UNKNOWN".to_string()),
                    number: Some(0),
                    ..Default::default()
                },
                EnumValueDescriptorProto {
                    name: Some("FRIEND".to_string()),
                    number: Some(1),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        FileDescriptorSet {
            file: vec![FileDescriptorProto {
                name: Some("book.proto".to_string()),
                package: Some("book".to_string()),
                syntax: Some("proto3".to_string()),
                message_type: vec![person, book],
                enum_type: vec![kind],
                ..Default::default()
            }],
        }
    }

    #[test]
    fn test_no_hints() {
        assert!(NoHints.lookup("anything", 1).is_none());
        assert!(!NoHints.has_message("anything"));
    }

    #[test]
    fn test_manual_registry() {
        let registry = HintRegistry::new()
            .with_field("Root", 1, "sint64", Some("delta"))
            .with_field("Root", 2, "Color", None)
            .with_enum("Color", [(0, "RED"), (1, "GREEN")]);

        let hint = registry.lookup("Root", 1).unwrap();
        assert_eq!(hint.type_name, "sint64");
        assert_eq!(hint.field_name, Some("delta"));
        assert!(hint.enum_table.is_none());

        let hint = registry.lookup("Root", 2).unwrap();
        assert_eq!(hint.enum_table.unwrap().get(&1).map(String::as_str), Some("GREEN"));

        assert!(registry.lookup("Root", 3).is_none());
        assert!(registry.lookup("Other", 1).is_none());
        assert!(registry.has_message("Root"));
    }

    #[test]
    fn test_from_file_descriptor_set() {
        let registry = HintRegistry::from_file_descriptor_set(book_descriptor_set()).unwrap();

        assert!(registry.has_message("book.Book"));
        assert!(registry.has_message("book.Person"));
        assert_eq!(registry.enum_count(), 1);

        assert_eq!(registry.lookup("book.Book", 1).unwrap().type_name, "int32");
        assert_eq!(registry.lookup("book.Book", 4).unwrap().type_name, "book.Person");
        assert_eq!(
            registry.lookup("book.Book", 5).unwrap().type_name,
            "packed sint32"
        );

        let kind = registry.lookup("book.Person", 2).unwrap();
        assert_eq!(kind.type_name, "book.Kind");
        assert_eq!(kind.field_name, Some("kind"));
        assert_eq!(kind.enum_table.unwrap().get(&1).map(String::as_str), Some("FRIEND"));
    }

    #[test]
    fn test_from_invalid_descriptor_bytes() {
        let err = HintRegistry::from_file_descriptor_set_bytes(&[0xFF]).unwrap_err();
        assert!(matches!(err, Error::DescriptorBuild(_)));
    }
}
