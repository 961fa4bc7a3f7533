//! Recursive message decoder.
//!
//! The decoder walks a region field by field. Each field is resolved to a
//! decode routine (a schema hint if one exists, otherwise the generic routine
//! for its wire type) and decoded. Generic length-delimited payloads go
//! through a guessing chain:
//!
//! 1. nested message, unless the bytes are probable text
//! 2. packed repeated scalars, for chunks of at least
//!    [`DecoderConfig::min_packed_len`] bytes that are not probable text
//! 3. probable UTF-8 text
//! 4. raw bytes
//!
//! Errors inside a field become [`Value::Invalid`] diagnostics. A region that
//! cannot be walked at all (malformed identifier, truncated value, unbalanced
//! group) fails as a whole: a guessed candidate is rejected, while a root or
//! declared message keeps the fields decoded before the failure.
//!
//! ## Example
//!
//! ```
//! use revpb_core::Decoder;
//!
//! let mut decoder = Decoder::new();
//! let message = decoder.decode(vec![0x08, 0x96, 0x01, 0x12, 0x02, b'h', b'g']);
//!
//! assert_eq!(message.len(), 2);
//! assert_eq!(message.first(2).and_then(|v| v.as_str()), Some("hg"));
//! assert!(decoder.errors().is_empty());
//! ```

mod chunk;
mod config;

pub use config::DecoderConfig;

use crate::diagnostics::{Diagnostic, ErrorLog};
use crate::dump::{DumpSink, NullDumpSink};
use crate::error::{Error, Result};
use crate::hints::{EnumTable, NoHints, TypeHints};
use crate::resolver::{resolve, NativeType, Resolved};
use crate::value::{ChunkValue, Field, FieldDescriptor, Message, TypedData, TypedValue, Value};
use crate::wire::{read_value, ByteCursor, RawValue, WireType};
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// What closes the region being parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminator {
    /// The bytes run out
    EndOfRegion,
    /// An end-group marker for this field number
    EndGroup(u64),
}

/// Decoder state that speculative attempts must restore on rejection
#[derive(Debug, Clone, Copy)]
struct Checkpoint {
    errors: usize,
    wire_types_not_matching: bool,
    groups_observed: bool,
}

/// Schema-less protobuf decoder.
///
/// One decoder accumulates an error log and observation flags across every
/// call; create a fresh one per input when they should not mix.
pub struct Decoder<'s> {
    config: DecoderConfig,
    hints: Arc<dyn TypeHints>,
    dump: Box<dyn DumpSink + 's>,
    errors: ErrorLog,
    wire_types_not_matching: bool,
    groups_observed: bool,
}

impl Default for Decoder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Decoder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decoder")
            .field("config", &self.config)
            .field("errors", &self.errors.len())
            .field("wire_types_not_matching", &self.wire_types_not_matching)
            .field("groups_observed", &self.groups_observed)
            .finish_non_exhaustive()
    }
}

impl<'s> Decoder<'s> {
    /// Creates a decoder with default settings, no hints and no dump sink
    pub fn new() -> Self {
        Self {
            config: DecoderConfig::default(),
            hints: Arc::new(NoHints),
            dump: Box::new(NullDumpSink),
            errors: ErrorLog::new(),
            wire_types_not_matching: false,
            groups_observed: false,
        }
    }

    /// Replaces the configuration
    pub fn with_config(mut self, config: DecoderConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses `hints` to resolve declared field types
    pub fn with_hints(mut self, hints: impl TypeHints + 'static) -> Self {
        self.hints = Arc::new(hints);
        self
    }

    /// Sends `dump`-typed fields to `sink`
    pub fn with_dump_sink(mut self, sink: impl DumpSink + 's) -> Self {
        self.dump = Box::new(sink);
        self
    }

    /// Returns the decoder configuration
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Decodes `data` as a message of unknown type.
    ///
    /// Never fails: if the region breaks off, the returned message holds the
    /// fields decoded so far and [`Message::error`] describes the failure.
    pub fn decode(&mut self, data: impl Into<Bytes>) -> Message {
        self.decode_region(data.into(), 0, None, 0)
    }

    /// Decodes `data` as a message of the named type so hints apply from the root
    pub fn decode_as(&mut self, data: impl Into<Bytes>, type_name: &str) -> Message {
        if !self.hints.has_message(type_name) {
            warn!("Root type '{}' is not known to the type hints", type_name);
        }
        self.decode_region(data.into(), 0, Some(type_name), 0)
    }

    /// Decodes `data` as a message, failing if the region is not entirely valid
    pub fn try_decode(&mut self, data: impl Into<Bytes>) -> Result<Message> {
        self.try_decode_region(data.into(), 0)
    }

    /// Runs the guessing chain over a standalone chunk
    pub fn guess_chunk(&mut self, chunk: impl Into<Bytes>) -> ChunkValue {
        self.guess_chunk_at(chunk.into(), 0, 0)
    }

    /// Strict decode of a region located at `base` in the root input
    pub(crate) fn try_decode_region(&mut self, data: Bytes, base: usize) -> Result<Message> {
        self.try_region(data, base, 0)
    }

    /// Every diagnostic recorded so far
    pub fn errors(&self) -> &ErrorLog {
        &self.errors
    }

    /// Drains the error log
    pub fn take_errors(&mut self) -> Vec<Diagnostic> {
        self.errors.take()
    }

    /// Returns true if any accepted message mixed wire types for a field
    /// number, or a declared type disagreed with the wire
    pub fn wire_types_not_matching(&self) -> bool {
        self.wire_types_not_matching
    }

    /// Returns true if any accepted message contained a group
    pub fn groups_observed(&self) -> bool {
        self.groups_observed
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            errors: self.errors.len(),
            wire_types_not_matching: self.wire_types_not_matching,
            groups_observed: self.groups_observed,
        }
    }

    fn rollback(&mut self, checkpoint: Checkpoint) {
        self.errors.truncate(checkpoint.errors);
        self.wire_types_not_matching = checkpoint.wire_types_not_matching;
        self.groups_observed = checkpoint.groups_observed;
    }

    /// Best-effort decode: a failure is attached to the message and logged
    fn decode_region(
        &mut self,
        data: Bytes,
        base: usize,
        type_name: Option<&str>,
        depth: usize,
    ) -> Message {
        let mut message = Message::new(type_name);
        let mut cursor = ByteCursor::with_base(data.clone(), base);

        if let Err(error) =
            self.parse_message(&mut cursor, &mut message, type_name, Terminator::EndOfRegion, depth)
        {
            debug!(
                "Region at offset {} failed after {} fields: {}",
                base,
                message.len(),
                error
            );
            let context = match type_name {
                Some(name) => format!("message {name}"),
                None => "message".to_string(),
            };
            let diagnostic = Diagnostic::new(error, data, base).with_context(context);
            self.errors.push(diagnostic.clone());
            message.error = Some(diagnostic);
        }

        message
    }

    /// All-or-nothing decode of an untyped region
    fn try_region(&mut self, data: Bytes, base: usize, depth: usize) -> Result<Message> {
        let mut message = Message::new(None);
        let mut cursor = ByteCursor::with_base(data, base);
        self.parse_message(&mut cursor, &mut message, None, Terminator::EndOfRegion, depth)?;
        Ok(message)
    }

    fn parse_message(
        &mut self,
        cursor: &mut ByteCursor,
        message: &mut Message,
        type_name: Option<&str>,
        terminator: Terminator,
        depth: usize,
    ) -> Result<()> {
        if depth > self.config.max_depth {
            return Err(Error::NestingTooDeep {
                depth,
                max: self.config.max_depth,
            });
        }

        let mut seen: HashMap<u64, WireType> = HashMap::new();

        loop {
            let Some(descriptor) = FieldDescriptor::read(cursor)? else {
                return match terminator {
                    Terminator::EndOfRegion => Ok(()),
                    Terminator::EndGroup(field_no) => Err(Error::UnterminatedGroup {
                        offset: cursor.offset(),
                        field_no,
                    }),
                };
            };
            let field_no = descriptor.field_no();
            let wire_type = descriptor.wire_type();

            if wire_type == WireType::EndGroup {
                return match terminator {
                    Terminator::EndGroup(open) if open == field_no => Ok(()),
                    Terminator::EndGroup(open) => Err(Error::UnterminatedGroup {
                        offset: descriptor.offset(),
                        field_no: open,
                    }),
                    Terminator::EndOfRegion => Err(Error::UnexpectedEndGroup {
                        offset: descriptor.offset(),
                        field_no,
                    }),
                };
            }

            if let Some(previous) = seen.insert(field_no, wire_type) {
                if previous != wire_type {
                    trace!(
                        "Field {} seen as both {} and {}",
                        field_no,
                        previous.as_str(),
                        wire_type.as_str()
                    );
                    message.wire_types_not_matching = true;
                    self.wire_types_not_matching = true;
                }
            }

            let field = if wire_type == WireType::StartGroup {
                self.parse_group(cursor, descriptor, message, type_name, depth)?
            } else {
                self.parse_field(cursor, descriptor, message, type_name, depth)?
            };
            message.fields.push(field);
        }
    }

    fn parse_group(
        &mut self,
        cursor: &mut ByteCursor,
        descriptor: FieldDescriptor,
        message: &mut Message,
        type_name: Option<&str>,
        depth: usize,
    ) -> Result<Field> {
        let field_no = descriptor.field_no();
        self.groups_observed = true;

        let hints = Arc::clone(&self.hints);
        let hint = type_name.and_then(|name| hints.lookup(name, field_no));
        let group_type = hint
            .map(|hint| hint.type_name)
            .filter(|name| hints.has_message(name));

        if let Some(hint) = hint {
            let untyped = NativeType::from_name(hint.type_name) == Some(NativeType::Message);
            if group_type.is_none() && !untyped {
                warn!(
                    "Field {} declared as '{}' arrived as {}",
                    field_no,
                    hint.type_name,
                    WireType::StartGroup
                );
                message.wire_types_not_matching = true;
                self.wire_types_not_matching = true;
            }
        }

        let mut group = Message::new(group_type);
        self.parse_message(
            cursor,
            &mut group,
            group_type,
            Terminator::EndGroup(field_no),
            depth + 1,
        )?;
        trace!("Field {}: group with {} fields", field_no, group.len());

        Ok(Field {
            descriptor,
            name: hint.and_then(|hint| hint.field_name).map(str::to_string),
            value: Value::Group(group),
        })
    }

    fn parse_field(
        &mut self,
        cursor: &mut ByteCursor,
        descriptor: FieldDescriptor,
        message: &mut Message,
        type_name: Option<&str>,
        depth: usize,
    ) -> Result<Field> {
        let field_no = descriptor.field_no();
        let observed = descriptor.wire_type();

        let value_start = cursor.position();
        let raw = read_value(cursor, observed)?
            .ok_or_else(|| missing_value(observed, cursor.offset()))?;
        let (payload, payload_offset) = match &raw {
            RawValue::LengthDelimited(chunk) => (chunk.clone(), cursor.offset() - chunk.len()),
            _ => (
                cursor.slice_between(value_start, cursor.position()),
                cursor.base() + value_start,
            ),
        };

        let hints = Arc::clone(&self.hints);
        let hint = type_name.and_then(|name| hints.lookup(name, field_no));
        let name = hint.and_then(|hint| hint.field_name).map(str::to_string);
        let context = format!("field {field_no}");

        let value = match resolve(hint, &*hints, observed) {
            Ok(resolution) => {
                if resolution.mismatch {
                    warn!(
                        "Field {} declared as '{}' arrived as {}",
                        field_no,
                        resolution.target.type_name(),
                        observed
                    );
                    message.wire_types_not_matching = true;
                    self.wire_types_not_matching = true;
                }
                self.safe_call(payload.clone(), payload_offset, context, |decoder| {
                    let raw = if resolution.mismatch {
                        coerce(&payload, payload_offset, field_no, &resolution.target, observed)?
                    } else {
                        raw
                    };
                    decoder.decode_value(resolution.target, raw, payload_offset, field_no, depth)
                })
            }
            Err(error) => self.invalid(error, payload, payload_offset, context),
        };

        trace!("Field {} ({}) at offset {}", field_no, observed.as_str(), descriptor.offset());
        Ok(Field {
            descriptor,
            name,
            value,
        })
    }

    fn decode_value(
        &mut self,
        target: Resolved<'_>,
        raw: RawValue,
        offset: usize,
        field_no: u64,
        depth: usize,
    ) -> Result<Value> {
        match (target, raw) {
            (Resolved::Enum { type_name, table }, RawValue::Varint(value)) => {
                decode_enum(type_name, table, value)
            }
            (Resolved::Native(ty), raw) if ty.wire_type() != WireType::LengthDelimited => {
                ty.decode_scalar(&raw)
            }
            (target, RawValue::LengthDelimited(chunk)) => {
                self.decode_chunk(target, chunk, offset, field_no, depth)
            }
            (target, raw) => Err(mismatch(field_no, &target, raw.wire_type())),
        }
    }

    /// Runs `decode`, turning a failure into a logged inline diagnostic
    fn safe_call<F>(&mut self, region: Bytes, region_offset: usize, context: String, decode: F) -> Value
    where
        F: FnOnce(&mut Self) -> Result<Value>,
    {
        match decode(self) {
            Ok(value) => value,
            Err(error) => self.invalid(error, region, region_offset, context),
        }
    }

    fn invalid(&mut self, error: Error, region: Bytes, region_offset: usize, context: String) -> Value {
        debug!("{}: {}", context, error);
        let diagnostic = Diagnostic::new(error, region, region_offset).with_context(context);
        self.errors.push(diagnostic.clone());
        Value::Invalid(diagnostic)
    }
}

fn missing_value(wire_type: WireType, offset: usize) -> Error {
    match wire_type.fixed_width() {
        Some(width) => Error::truncated_fixed(offset, width, 0),
        None => Error::malformed_varint(offset),
    }
}

fn mismatch(field_no: u64, target: &Resolved<'_>, observed: WireType) -> Error {
    Error::WireTypeMismatch {
        field_no,
        declared: target.type_name(),
        expected: target.wire_type(),
        observed,
    }
}

/// Re-reads a payload in the wire encoding the declared type expects.
///
/// The payload must be consumed exactly.
fn coerce(
    payload: &Bytes,
    offset: usize,
    field_no: u64,
    target: &Resolved<'_>,
    observed: WireType,
) -> Result<RawValue> {
    let mut cursor = ByteCursor::with_base(payload.clone(), offset);
    let raw = match target.wire_type() {
        WireType::LengthDelimited => RawValue::LengthDelimited(cursor.take_rest()),
        expected => read_value(&mut cursor, expected)
            .ok()
            .flatten()
            .ok_or_else(|| mismatch(field_no, target, observed))?,
    };

    if !cursor.is_exhausted() {
        return Err(mismatch(field_no, target, observed));
    }
    Ok(raw)
}

fn decode_enum(type_name: &str, table: &EnumTable, raw: u64) -> Result<Value> {
    let value = raw as i64;
    let entry = i32::try_from(value)
        .ok()
        .and_then(|number| table.get(&number).map(|label| (number, label)));

    match entry {
        Some((number, label)) => Ok(Value::Typed(TypedValue::new(
            type_name,
            TypedData::Enum {
                value: number,
                label: label.clone(),
            },
        ))),
        None => Err(Error::UnknownEnumValue {
            enum_type: type_name.to_string(),
            value,
        }),
    }
}
