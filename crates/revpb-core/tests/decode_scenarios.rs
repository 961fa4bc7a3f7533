//! End-to-end decoding scenarios over the public API.

use pretty_assertions::assert_eq;
use prost::Message as _;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FileDescriptorProto, FileDescriptorSet,
};
use revpb_core::{
    ChunkKind, Decoder, DecoderConfig, Error, HintRegistry, Message, TypedData, Value, WireType,
};

fn hex(s: &str) -> Vec<u8> {
    s.split_whitespace()
        .map(|byte| u8::from_str_radix(byte, 16).unwrap())
        .collect()
}

fn varint(message: &Message, field_no: u64) -> Option<u64> {
    message.first(field_no)?.as_varint().map(|v| v.unsigned())
}

fn typed(message: &Message, field_no: u64) -> Option<&TypedData> {
    message.first(field_no)?.as_typed().map(|t| &t.data)
}

const PHONE_BOOK: &str = "08 96 01 12 0A 50 68 6F 6E 65 20 42 6F 6F 6B 18 01 \
    22 0F 0A 0B 41 6C 65 78 20 49 76 61 6E 6F 76 10 01 \
    22 0F 0A 0B 56 6F 76 61 20 50 65 74 72 6F 76 10 02";

#[test]
fn phone_book_scenario() {
    let mut decoder = Decoder::new();
    let message = decoder.decode(hex(PHONE_BOOK));

    assert!(message.is_complete());
    assert!(decoder.errors().is_empty());
    assert!(!message.wire_types_not_matching);

    let numbers: Vec<(u64, WireType)> = message
        .fields
        .iter()
        .map(|f| (f.field_no(), f.wire_type()))
        .collect();
    assert_eq!(
        numbers,
        vec![
            (1, WireType::Varint),
            (2, WireType::LengthDelimited),
            (3, WireType::Varint),
            (4, WireType::LengthDelimited),
            (4, WireType::LengthDelimited),
        ]
    );

    assert_eq!(varint(&message, 1), Some(150));
    assert_eq!(message.first(2).and_then(Value::as_str), Some("Phone Book"));
    assert_eq!(varint(&message, 3), Some(1));

    let people: Vec<(&str, u64)> = message
        .get(4)
        .map(|field| {
            let person = field.value.as_message().expect("nested message");
            (
                person.first(1).and_then(Value::as_str).expect("name"),
                varint(person, 2).expect("kind"),
            )
        })
        .collect();
    assert_eq!(people, vec![("Alex Ivanov", 1), ("Vova Petrov", 2)]);
}

#[test]
fn guessing_chain_order() {
    let mut decoder = Decoder::new();

    let text = decoder.guess_chunk(hex("68 67"));
    assert_eq!(text.kind(), &ChunkKind::Text);
    assert_eq!(text.as_str(), Some("hg"));

    let nested = decoder.guess_chunk(hex("08 96 01"));
    assert_eq!(nested.kind(), &ChunkKind::Message);
    assert_eq!(nested.message().and_then(|m| varint(m, 1)), Some(150));

    // Not text, not a message, long enough to be packed
    let packed = decoder.guess_chunk(hex("96 01 02 03 04"));
    let values: Vec<u64> = packed
        .packed()
        .expect("packed")
        .values
        .iter()
        .filter_map(Value::as_varint)
        .map(|v| v.unsigned())
        .collect();
    assert_eq!(values, vec![150, 2, 3, 4]);

    let bytes = decoder.guess_chunk(hex("FF FF"));
    assert_eq!(bytes.kind(), &ChunkKind::Bytes);
    assert!(decoder.errors().is_empty());
}

#[test]
fn group_decodes_like_sub_message() {
    let mut decoder = Decoder::new();
    // 1: group { 1: 150, 2: "hg" }, 2: chunk with the same content
    let message = decoder.decode(hex("0B 08 96 01 12 02 68 67 0C 12 07 08 96 01 12 02 68 67"));

    assert!(message.is_complete());
    assert!(decoder.groups_observed());

    let group = message.first(1).and_then(Value::as_message).expect("group");
    let chunk = message.first(2).and_then(Value::as_message).expect("chunk");
    assert_eq!(group.len(), 2);
    assert_eq!(varint(group, 1), varint(chunk, 1));
    assert_eq!(
        group.first(2).and_then(Value::as_str),
        chunk.first(2).and_then(Value::as_str)
    );
}

#[test]
fn nested_groups_balance() {
    // 1: group { 2: group { 3: 1 } }
    let message = Decoder::new().decode(hex("0B 13 18 01 14 0C"));
    let outer = message.first(1).and_then(Value::as_message).unwrap();
    let inner = outer.first(2).and_then(Value::as_message).unwrap();
    assert_eq!(varint(inner, 3), Some(1));
}

#[test]
fn unbalanced_groups_are_reported() {
    let cases = [
        (
            "0B 08 01",
            Error::UnterminatedGroup {
                offset: 3,
                field_no: 1,
            },
        ),
        (
            "0B 08 01 14",
            Error::UnterminatedGroup {
                offset: 3,
                field_no: 1,
            },
        ),
        (
            "08 01 0C",
            Error::UnexpectedEndGroup {
                offset: 2,
                field_no: 1,
            },
        ),
    ];

    for (input, expected) in cases {
        let mut decoder = Decoder::new();
        let message = decoder.decode(hex(input));
        assert_eq!(message.error.map(|d| d.error), Some(expected), "input {input}");
        assert_eq!(decoder.errors().len(), 1);
    }
}

#[test]
fn unknown_wire_type_stops_region() {
    let mut decoder = Decoder::new();
    let message = decoder.decode(hex("08 01 0E 00"));

    assert_eq!(varint(&message, 1), Some(1));
    assert_eq!(
        message.error.map(|d| d.error),
        Some(Error::UnknownWireType {
            offset: 2,
            value: 6,
        })
    );
    assert_eq!(decoder.errors().len(), 1);
}

#[test]
fn unknown_wire_type_in_chunk_falls_back() {
    let mut decoder = Decoder::new();
    // 1: chunk holding a wire type 7 identifier, 2: 5
    let message = decoder.decode(hex("0A 02 0F 01 10 05"));

    assert!(message.is_complete());
    let chunk = message.first(1).and_then(Value::as_chunk).expect("chunk");
    assert_eq!(chunk.kind(), &ChunkKind::Bytes);
    assert!(chunk.message().is_none());
    assert_eq!(varint(&message, 2), Some(5));
    assert!(decoder.errors().is_empty());
}

#[test]
fn corrupt_chunk_is_contained() {
    let mut decoder = Decoder::new();
    // 1: chunk that claims a 9-byte field inside 3 bytes, 2: 7
    let message = decoder.decode(hex("0A 03 12 09 01 10 07"));

    assert!(message.is_complete());
    assert_eq!(message.first(1).and_then(Value::as_chunk).map(|c| c.kind()), Some(&ChunkKind::Bytes));
    assert_eq!(varint(&message, 2), Some(7));
    assert!(decoder.errors().is_empty());
}

#[test]
fn corrupt_tail_keeps_decoded_prefix() {
    let mut decoder = Decoder::new();
    let message = decoder.decode(hex("08 01 10 02 1D 00 00"));

    assert_eq!(message.len(), 2);
    let diagnostic = message.error.as_ref().expect("region error");
    assert_eq!(diagnostic.error, Error::truncated_fixed(5, 4, 2));
    assert!(diagnostic.hex_dump(24).to_string().ends_with("<-- 0005"));
    assert_eq!(decoder.errors().entries(), &[diagnostic.clone()]);
}

#[test]
fn nesting_depth_is_bounded() {
    let mut data = Vec::new();
    for _ in 0..150 {
        let mut layer = vec![0x0A];
        prost::encoding::encode_varint(data.len() as u64, &mut layer);
        layer.extend_from_slice(&data);
        data = layer;
    }

    let mut decoder = Decoder::new();
    let message = decoder.decode(data);
    assert!(message.is_complete());

    let mut levels = 0;
    let mut current = &message;
    while let Some(nested) = current.first(1).and_then(Value::as_message) {
        levels += 1;
        current = nested;
    }
    assert_eq!(levels, 100);
    assert!(decoder.errors().is_empty());
}

#[test]
fn declared_message_past_depth_limit_is_diagnosed() {
    let hints = HintRegistry::new().with_field("Node", 1, "Node", Some("child"));
    let mut decoder = Decoder::new()
        .with_hints(hints)
        .with_config(DecoderConfig::new().max_depth(2));

    let message = decoder.decode_as(hex("0A 04 0A 02 0A 00"), "Node");

    let child = message.first(1).and_then(Value::as_message).unwrap();
    let grandchild = child.first(1).and_then(Value::as_message).unwrap();
    let too_deep = grandchild.first(1).and_then(Value::as_message).unwrap();
    assert_eq!(
        too_deep.error.as_ref().map(|d| &d.error),
        Some(&Error::NestingTooDeep { depth: 3, max: 2 })
    );
    assert_eq!(decoder.errors().len(), 1);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
enum Kind {
    Unknown = 0,
    Friend = 1,
}

#[derive(Clone, PartialEq, prost::Message)]
struct Person {
    #[prost(string, tag = "1")]
    name: String,
    #[prost(enumeration = "Kind", tag = "2")]
    kind: i32,
    #[prost(sint32, repeated, tag = "3")]
    scores: Vec<i32>,
}

#[derive(Clone, PartialEq, prost::Message)]
struct Book {
    #[prost(string, tag = "1")]
    title: String,
    #[prost(message, repeated, tag = "2")]
    people: Vec<Person>,
}

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

fn book_descriptors() -> Vec<u8> {
    let person = DescriptorProto {
        name: Some("Person".to_string()),
        field: vec![
            field("name", 1, Type::String, Label::Optional, None),
            field("kind", 2, Type::Enum, Label::Optional, Some(".book.Kind")),
            field("scores", 3, Type::Sint32, Label::Repeated, None),
        ],
        ..Default::default()
    };
    let book = DescriptorProto {
        name: Some("Book".to_string()),
        field: vec![
            field("title", 1, Type::String, Label::Optional, None),
            field("people", 2, Type::Message, Label::Repeated, Some(".book.Person")),
        ],
        ..Default::default()
    };
    let kind = EnumDescriptorProto {
        name: Some("Kind".to_string()),
        value: ["UNKNOWN", "FRIEND"]
            .iter()
            .zip(0..)
            .map(|(name, number)| EnumValueDescriptorProto {
                name: Some(name.to_string()),
                number: Some(number),
                ..Default::default()
            })
            .collect(),
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
    .encode_to_vec()
}

#[test]
fn hinted_decode_of_prost_encoded_message() {
    let book = Book {
        title: "Phone Book".to_string(),
        people: vec![Person {
            name: "Alex Ivanov".to_string(),
            kind: Kind::Friend as i32,
            scores: vec![-1, 2, -3],
        }],
    };

    let hints = HintRegistry::from_file_descriptor_set_bytes(&book_descriptors()).unwrap();
    let mut decoder = Decoder::new().with_hints(hints);
    let message = decoder.decode_as(book.encode_to_vec(), "book.Book");

    assert!(decoder.errors().is_empty());
    assert!(!decoder.wire_types_not_matching());
    assert_eq!(message.fields[0].name.as_deref(), Some("title"));
    assert_eq!(typed(&message, 1), Some(&TypedData::Text("Phone Book".to_string())));

    let person = message.first(2).and_then(Value::as_message).unwrap();
    assert_eq!(person.type_name.as_deref(), Some("book.Person"));
    assert_eq!(typed(person, 1), Some(&TypedData::Text("Alex Ivanov".to_string())));
    assert_eq!(
        typed(person, 2),
        Some(&TypedData::Enum {
            value: 1,
            label: "FRIEND".to_string()
        })
    );

    let Some(TypedData::Packed(scores)) = typed(person, 3) else {
        panic!("scores should decode as packed sint32");
    };
    let scores: Vec<&TypedData> = scores
        .values
        .iter()
        .filter_map(Value::as_typed)
        .map(|t| &t.data)
        .collect();
    assert_eq!(
        scores,
        vec![
            &TypedData::Signed(-1),
            &TypedData::Signed(2),
            &TypedData::Signed(-3)
        ]
    );
}

#[test]
fn declared_type_disagreeing_with_wire_is_flagged() {
    let hints = HintRegistry::new()
        .with_field("Root", 1, "string", None)
        .with_field("Root", 2, "uint64", None);
    let mut decoder = Decoder::new().with_hints(hints);
    // 1 arrives as a varint, 2 arrives as a chunk holding a varint
    let message = decoder.decode_as(hex("08 96 01 12 01 2A"), "Root");

    assert!(message.wire_types_not_matching);
    assert!(decoder.wire_types_not_matching());
    assert_eq!(typed(&message, 2), Some(&TypedData::Unsigned(42)));
    assert!(message.first(1).and_then(Value::as_invalid).is_some());
}
