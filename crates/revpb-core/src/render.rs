//! Plain-text tree rendering of decoded messages.
//!
//! The renderer only uses the public model: it walks [`Message::fields`] and
//! asks each value for its [`Value::get_fields`] projection, descending into
//! whatever is labelled `sub-msg`.
//!
//! ```text
//! 1 varint: sint 75, uint 150
//! 2 length-delimited: "Phone Book"
//! 4 length-delimited: message
//!   1 length-delimited: "Alex Ivanov"
//!   2 varint: sint -1, uint 1
//! ```

use crate::diagnostics::{Diagnostic, HexDump, DEFAULT_HEX_WIDTH};
use crate::value::{ChunkKind, ChunkValue, Message, Projection, TypedData, TypedValue, Value};
use std::fmt::{self, Write as FmtWrite};

/// Configuration for the renderer
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Indentation string per nesting level (default: 2 spaces)
    pub indent_str: String,
    /// Bytes per hex dump line
    pub hex_dump_width: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            indent_str: "  ".to_string(),
            hex_dump_width: DEFAULT_HEX_WIDTH,
        }
    }
}

impl RenderConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the indentation string
    pub fn indent_str(mut self, s: impl Into<String>) -> Self {
        self.indent_str = s.into();
        self
    }

    /// Sets the hex dump line width
    pub fn hex_dump_width(mut self, width: usize) -> Self {
        self.hex_dump_width = width.max(1);
        self
    }
}

/// A message paired with a render config, displayed as a text tree
#[derive(Debug, Clone, Copy)]
pub struct MessageTree<'a> {
    message: &'a Message,
    config: &'a RenderConfig,
}

impl<'a> MessageTree<'a> {
    /// Wraps `message` for display with `config`
    pub fn new(message: &'a Message, config: &'a RenderConfig) -> Self {
        Self { message, config }
    }
}

impl fmt::Display for MessageTree<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_message(f, self.message, self.config)
    }
}

/// Renders `message` as an indented text tree
pub fn render_message(message: &Message, config: &RenderConfig) -> String {
    MessageTree::new(message, config).to_string()
}

/// Writes `message` as an indented text tree
pub fn write_message(w: &mut impl FmtWrite, message: &Message, config: &RenderConfig) -> fmt::Result {
    TreeWriter::new(w, config).write_message(message)
}

struct TreeWriter<'a, W: FmtWrite> {
    writer: &'a mut W,
    config: &'a RenderConfig,
    indent_level: usize,
}

impl<'a, W: FmtWrite> TreeWriter<'a, W> {
    fn new(writer: &'a mut W, config: &'a RenderConfig) -> Self {
        Self {
            writer,
            config,
            indent_level: 0,
        }
    }

    fn indent(&mut self) {
        self.indent_level += 1;
    }

    fn dedent(&mut self) {
        self.indent_level = self.indent_level.saturating_sub(1);
    }

    fn write_indent(&mut self) -> fmt::Result {
        for _ in 0..self.indent_level {
            write!(self.writer, "{}", self.config.indent_str)?;
        }
        Ok(())
    }

    fn writeln(&mut self, s: &str) -> fmt::Result {
        self.write_indent()?;
        writeln!(self.writer, "{}", s)
    }

    fn write_message(&mut self, message: &Message) -> fmt::Result {
        if let Some(type_name) = &message.type_name {
            self.writeln(&format!("[{type_name}]"))?;
        }
        if message.wire_types_not_matching {
            self.writeln("[wire types not matching]")?;
        }

        for field in &message.fields {
            let mut head = format!("{} {}", field.field_no(), field.wire_type().as_str());
            if let Some(name) = &field.name {
                write!(head, " {name}")?;
            }
            self.write_value(&head, &field.value)?;
        }

        if let Some(diagnostic) = &message.error {
            self.write_diagnostic("stopped", diagnostic)?;
        }
        Ok(())
    }

    fn write_value(&mut self, head: &str, value: &Value) -> fmt::Result {
        match value {
            Value::Varint(varint) => {
                let mut line = format!("{head}: {}", projections(&value.get_fields()));
                if let Some(negative) = varint.small_negative() {
                    write!(line, " ({negative})")?;
                }
                self.writeln(&line)
            }
            Value::Fixed32(_) | Value::Fixed64(_) => {
                self.writeln(&format!("{head}: {}", projections(&value.get_fields())))
            }
            Value::Chunk(chunk) => self.write_chunk(head, chunk),
            Value::Group(group) => self.write_nested(&format!("{head}: group"), group),
            Value::Typed(typed) => self.write_typed(head, typed),
            Value::Invalid(diagnostic) => self.write_diagnostic(head, diagnostic),
        }
    }

    fn write_chunk(&mut self, head: &str, chunk: &ChunkValue) -> fmt::Result {
        match chunk.kind() {
            ChunkKind::Message => match chunk.message() {
                Some(message) => self.write_nested(&format!("{head}: message"), message),
                None => self.write_bytes(head, chunk.raw()),
            },
            ChunkKind::Packed(packed) => self.writeln(&format!(
                "{head}: packed {} {}",
                packed.element.name(),
                list(&packed.values)
            )),
            ChunkKind::Text => match chunk.as_str() {
                Some(text) => self.writeln(&format!("{head}: {text:?}")),
                None => self.write_bytes(head, chunk.raw()),
            },
            ChunkKind::Bytes => self.write_bytes(head, chunk.raw()),
        }
    }

    fn write_typed(&mut self, head: &str, typed: &TypedValue) -> fmt::Result {
        let head = format!("{head} <{}>", typed.type_name);
        match &typed.data {
            TypedData::Message(message) => self.write_nested(&head, message),
            TypedData::Bytes(bytes) => self.write_bytes(&head, bytes),
            TypedData::Enum { value, label } => self.writeln(&format!("{head}: {label} ({value})")),
            TypedData::Packed(packed) => self.writeln(&format!("{head}: {}", list(&packed.values))),
            _ => self.writeln(&format!("{head}: {}", projections(&typed.get_fields()))),
        }
    }

    fn write_nested(&mut self, head: &str, message: &Message) -> fmt::Result {
        if message.is_empty() && message.error.is_none() {
            return self.writeln(&format!("{head} (empty)"));
        }
        self.writeln(head)?;
        self.indent();
        self.write_message(message)?;
        self.dedent();
        Ok(())
    }

    fn write_bytes(&mut self, head: &str, bytes: &[u8]) -> fmt::Result {
        self.writeln(&format!("{head}: {} bytes", bytes.len()))?;
        self.indent();
        let dump = HexDump::new(bytes, 0)
            .width(self.config.hex_dump_width)
            .to_string();
        for line in dump.lines() {
            self.writeln(line)?;
        }
        self.dedent();
        Ok(())
    }

    fn write_diagnostic(&mut self, head: &str, diagnostic: &Diagnostic) -> fmt::Result {
        self.writeln(&format!("{head}: ERROR {diagnostic}"))?;
        self.indent();
        let dump = diagnostic.hex_dump(self.config.hex_dump_width).to_string();
        for line in dump.lines() {
            self.writeln(line)?;
        }
        self.dedent();
        Ok(())
    }
}

/// `label value` pairs for every facet that has a scalar reading
fn projections(fields: &[(&str, Projection<'_>)]) -> String {
    fields
        .iter()
        .filter_map(|(label, projection)| {
            let text = scalar(projection)?;
            Some(if *label == "value" {
                text
            } else {
                format!("{label} {text}")
            })
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn scalar(projection: &Projection<'_>) -> Option<String> {
    match projection {
        Projection::Signed(v) => Some(v.to_string()),
        Projection::Unsigned(v) => Some(v.to_string()),
        Projection::Float(v) => Some(v.to_string()),
        Projection::Bool(v) => Some(v.to_string()),
        Projection::Text(text) => Some(format!("{text:?}")),
        Projection::Bytes(bytes) => Some(
            bytes
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect::<Vec<_>>()
                .join(" "),
        ),
        Projection::Values(values) => Some(list(values)),
        Projection::Message(_) | Projection::Diagnostic(_) | Projection::Absent => None,
    }
}

/// Compact one-line form of repeated elements
fn list(values: &[Value]) -> String {
    let items: Vec<String> = values
        .iter()
        .map(|value| match value {
            Value::Varint(v) => v.unsigned().to_string(),
            Value::Fixed32(v) => v.unsigned().to_string(),
            Value::Fixed64(v) => v.unsigned().to_string(),
            Value::Invalid(d) => format!("<{}>", d.error),
            other => projections(&other.get_fields()),
        })
        .collect();
    format!("[{}]", items.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::Decoder;
    use crate::hints::HintRegistry;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_render_nested_tree() {
        let message = Decoder::new().decode(vec![
            0x08, 0x96, 0x01, // 1: 150
            0x12, 0x02, b'h', b'g', // 2: "hg"
            0x1A, 0x03, 0x08, 0x96, 0x01, // 3: {1: 150}
        ]);

        let expected = "\
1 varint: sint 75, uint 150
2 length-delimited: \"hg\"
3 length-delimited: message
  1 varint: sint 75, uint 150
";
        assert_eq!(render_message(&message, &RenderConfig::default()), expected);

        let config = RenderConfig::default();
        assert_eq!(format!("{}", MessageTree::new(&message, &config)), expected);
    }

    #[test]
    fn test_render_small_negative_varint() {
        let message = Decoder::new().decode(vec![
            0x08, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01,
        ]);
        let rendered = render_message(&message, &RenderConfig::default());
        assert_eq!(
            rendered,
            "1 varint: sint -9223372036854775808, uint 18446744073709551615 (-1)\n"
        );
    }

    #[test]
    fn test_render_typed_and_errors() {
        let hints = HintRegistry::new()
            .with_field("Root", 1, "Color", Some("color"))
            .with_field("Root", 2, "bool", Some("flag"))
            .with_enum("Color", [(1, "GREEN")]);
        let message = Decoder::new()
            .with_hints(hints)
            .decode_as(vec![0x08, 0x01, 0x10, 0x02, 0x18], "Root");

        let rendered = render_message(&message, &RenderConfig::new().hex_dump_width(4));
        let expected = "\
[Root]
1 varint color <Color>: GREEN (1)
2 varint flag: ERROR field 2: value 2 out of range for type 'bool'
  0003 02          .
stopped: ERROR message Root: malformed varint at offset 5: input ended mid-varint
  0000 08 01 10 02 ....
  0004 18          . <-- 0005
";
        assert_eq!(rendered, expected);
    }

    #[test]
    fn test_render_bytes_chunk() {
        let message = Decoder::new().decode(vec![0x0A, 0x02, 0x01, 0xFF]);
        let rendered = render_message(&message, &RenderConfig::new().hex_dump_width(4));
        assert_eq!(
            rendered,
            "1 length-delimited: 2 bytes\n  0000 01 ff       ..\n"
        );
    }
}
