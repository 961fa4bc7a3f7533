//! Length-delimited payloads: the guessing chain and declared chunk types.

use super::{mismatch, Decoder};
use crate::error::{Error, Result};
use crate::resolver::{NativeType, Resolved, PACKED_TRIAL_ORDER};
use crate::value::{
    printable_text, ChunkKind, ChunkValue, PackedValue, TypedData, TypedValue, Value,
};
use crate::wire::{read_value, ByteCursor, WireType};
use bytes::Bytes;
use tracing::{debug, trace};

impl Decoder<'_> {
    /// Classifies a generic chunk found at `depth`.
    ///
    /// Whatever the outcome, the string and message candidates are kept on
    /// the returned value.
    pub(super) fn guess_chunk_at(&mut self, raw: Bytes, offset: usize, depth: usize) -> ChunkValue {
        let checkpoint = self.checkpoint();

        let message = match self.try_region(raw.clone(), offset, depth + 1) {
            Ok(message) => Some(message),
            Err(error) => {
                trace!("Chunk at offset {} is not a message: {}", offset, error);
                None
            }
        };
        let text = printable_text(&raw);
        let probable_text = text
            .as_deref()
            .is_some_and(|text| self.config.is_probable_string(text));

        let kind = if message.is_some() && !probable_text {
            debug!("Chunk at offset {} ({} bytes) is a message", offset, raw.len());
            ChunkKind::Message
        } else {
            self.rollback(checkpoint);
            match self.guess_packed(&raw, offset, probable_text) {
                Some(packed) => {
                    debug!(
                        "Chunk at offset {} is packed {} x{}",
                        offset,
                        packed.element.name(),
                        packed.values.len()
                    );
                    ChunkKind::Packed(packed)
                }
                None if probable_text => ChunkKind::Text,
                None => ChunkKind::Bytes,
            }
        };

        ChunkValue::from_parts(raw, offset, kind, text, message)
    }

    fn guess_packed(&mut self, raw: &Bytes, offset: usize, probable_text: bool) -> Option<PackedValue> {
        if probable_text || raw.len() < self.config.min_packed_len {
            return None;
        }
        let checkpoint = self.checkpoint();
        let packed = self.decode_packed_any(raw, offset).ok();
        if packed.is_none() {
            self.rollback(checkpoint);
        }
        packed
    }

    /// Decodes a chunk with a declared length-delimited routine
    pub(super) fn decode_chunk(
        &mut self,
        target: Resolved<'_>,
        chunk: Bytes,
        offset: usize,
        field_no: u64,
        depth: usize,
    ) -> Result<Value> {
        let data = match target {
            Resolved::Native(NativeType::Chunk) => {
                return Ok(Value::Chunk(self.guess_chunk_at(chunk, offset, depth)));
            }
            Resolved::Native(NativeType::Bytes) => TypedData::Bytes(chunk),
            Resolved::Native(NativeType::String) => {
                let text = String::from_utf8(chunk.to_vec()).map_err(|e| Error::InvalidUtf8 {
                    offset: offset + e.utf8_error().valid_up_to(),
                })?;
                TypedData::Text(text)
            }
            Resolved::Native(NativeType::Message) => {
                TypedData::Message(self.decode_region(chunk, offset, None, depth + 1))
            }
            Resolved::Message(name) => {
                TypedData::Message(self.decode_region(chunk, offset, Some(name), depth + 1))
            }
            Resolved::Native(NativeType::Packed) => {
                TypedData::Packed(self.decode_packed_any(&chunk, offset)?)
            }
            Resolved::Packed(element) => TypedData::Packed(self.decode_packed(&chunk, offset, element)?),
            Resolved::Native(NativeType::Dump) => TypedData::Dumped(self.dump.dump(&chunk)?),
            other => return Err(mismatch(field_no, &other, WireType::LengthDelimited)),
        };

        Ok(Value::Typed(TypedValue::new(target.type_name(), data)))
    }

    /// Packed scalars of unknown element type: first element type in the
    /// trial order that consumes the chunk exactly
    fn decode_packed_any(&mut self, raw: &Bytes, offset: usize) -> Result<PackedValue> {
        let [first, rest @ ..] = PACKED_TRIAL_ORDER;
        let mut result = self.decode_packed(raw, offset, first);
        for element in rest {
            if result.is_ok() {
                break;
            }
            result = self.decode_packed(raw, offset, element);
        }
        result
    }

    /// Packed scalars of a known element type.
    ///
    /// Leftover bytes fail the whole chunk; an element the routine rejects
    /// becomes an inline diagnostic.
    fn decode_packed(&mut self, raw: &Bytes, offset: usize, element: NativeType) -> Result<PackedValue> {
        let wire_type = element.wire_type();
        let mut cursor = ByteCursor::with_base(raw.clone(), offset);
        let mut values = Vec::new();

        loop {
            let start = cursor.position();
            let Some(item) = read_value(&mut cursor, wire_type)? else {
                break;
            };
            let value = match element.decode_scalar(&item) {
                Ok(value) => value,
                Err(error) => {
                    let region = cursor.slice_between(start, cursor.position());
                    let context = format!("packed {} element {}", element.name(), values.len());
                    self.invalid(error, region, offset + start, context)
                }
            };
            values.push(value);
        }

        Ok(PackedValue { element, values })
    }
}
