//! Recorded decode failures.
//!
//! A failed decode attempt is turned into a [`Diagnostic`]: the error plus the
//! exact byte region it concerns. The decoder keeps an ordered [`ErrorLog`] of
//! them and places the same diagnostic inline in the decoded tree, so one bad
//! region never costs the rest of the document.

use crate::error::Error;
use bytes::Bytes;
use std::fmt;

/// Default number of bytes per hex dump line
pub const DEFAULT_HEX_WIDTH: usize = 24;

/// A decode failure tied to the region of input it concerns
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    /// What went wrong
    pub error: Error,
    /// The bytes of the region that failed
    pub region: Bytes,
    /// Absolute offset of `region[0]` in the root input
    pub region_offset: usize,
    /// Field path or routine the failure happened in, when known
    pub context: Option<String>,
}

impl Diagnostic {
    /// Creates a diagnostic for `region`, whose first byte sits at `region_offset`
    pub fn new(error: Error, region: Bytes, region_offset: usize) -> Self {
        Self {
            error,
            region,
            region_offset,
            context: None,
        }
    }

    /// Attaches a context label
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Absolute offset where the failure was detected, if known
    pub fn mark(&self) -> Option<usize> {
        self.error.offset()
    }

    /// Hex dump of the failing region with the failure point marked
    pub fn hex_dump(&self, width: usize) -> HexDump<'_> {
        HexDump::new(&self.region, self.region_offset)
            .width(width)
            .mark(self.mark())
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(context) => write!(f, "{}: {}", context, self.error),
            None => write!(f, "{}", self.error),
        }
    }
}

/// Hex dump view over a byte region.
///
/// Each line is `offset hex-bytes ascii`: the absolute offset as at least four
/// hex digits, `width` space-separated byte slots (two spaces for slots past
/// the end of the data), and a column with non-printable bytes shown as `.`.
/// The line holding the marked offset ends with `<-- xxxx`.
#[derive(Debug, Clone, Copy)]
pub struct HexDump<'a> {
    data: &'a [u8],
    base: usize,
    width: usize,
    mark: Option<usize>,
}

impl<'a> HexDump<'a> {
    /// Creates a dump of `data`, whose first byte sits at `base`
    pub fn new(data: &'a [u8], base: usize) -> Self {
        Self {
            data,
            base,
            width: DEFAULT_HEX_WIDTH,
            mark: None,
        }
    }

    /// Sets bytes per line
    pub fn width(mut self, width: usize) -> Self {
        self.width = width.max(1);
        self
    }

    /// Sets the absolute offset to mark
    pub fn mark(mut self, mark: Option<usize>) -> Self {
        self.mark = mark;
        self
    }

    fn marked_line(&self) -> Option<usize> {
        let mark = self.mark?.checked_sub(self.base)?;
        let last_line = self.data.len().saturating_sub(1) / self.width;
        // A mark at or past the end belongs to the last line
        Some((mark / self.width).min(last_line))
    }
}

impl fmt::Display for HexDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marked_line = self.marked_line();

        for (line_no, line) in self.data.chunks(self.width).enumerate() {
            if line_no > 0 {
                writeln!(f)?;
            }
            write!(f, "{:04x} ", self.base + line_no * self.width)?;

            for slot in 0..self.width {
                if slot > 0 {
                    f.write_str(" ")?;
                }
                match line.get(slot) {
                    Some(byte) => write!(f, "{:02x}", byte)?,
                    None => f.write_str("  ")?,
                }
            }

            f.write_str(" ")?;
            for &byte in line {
                let c = if (0x20..0x7F).contains(&byte) {
                    byte as char
                } else {
                    '.'
                };
                write!(f, "{}", c)?;
            }

            if marked_line == Some(line_no) {
                if let Some(mark) = self.mark {
                    write!(f, " <-- {:04x}", mark)?;
                }
            }
        }
        Ok(())
    }
}

/// Ordered record of every diagnostic produced by one decoder
#[derive(Debug, Clone, Default)]
pub struct ErrorLog {
    entries: Vec<Diagnostic>,
}

impl ErrorLog {
    /// Creates an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a diagnostic
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    /// Number of recorded diagnostics
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Recorded diagnostics in the order they happened
    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Drops every entry recorded after the first `len`
    pub(crate) fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
    }

    /// Empties the log, returning what it held
    pub fn take(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.entries)
    }
}

impl<'a> IntoIterator for &'a ErrorLog {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
