//! Side channel for persisting chunk payloads.
//!
//! Fields declared with the `dump` type are handed to a [`DumpSink`] instead
//! of being rendered inline. The decoder only sees the trait, so tests and
//! library users never touch the filesystem unless they plug in a sink that
//! does.

use crate::error::Result;
use bytes::Bytes;

/// Default name prefix for dumped chunks
pub const DEFAULT_DUMP_PREFIX: &str = "dump.";

/// Destination for dumped chunk payloads.
///
/// # Example
///
/// ```
/// use revpb_core::{DumpSink, Result};
///
/// struct CountingSink(usize);
///
/// impl DumpSink for CountingSink {
///     fn dump(&mut self, chunk: &[u8]) -> Result<String> {
///         self.0 += chunk.len();
///         Ok(format!("{} bytes counted", chunk.len()))
///     }
/// }
/// ```
pub trait DumpSink {
    /// Persists `chunk`, returning a human-readable confirmation
    fn dump(&mut self, chunk: &[u8]) -> Result<String>;
}

impl<T: DumpSink + ?Sized> DumpSink for &mut T {
    fn dump(&mut self, chunk: &[u8]) -> Result<String> {
        (**self).dump(chunk)
    }
}

/// A sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDumpSink;

impl DumpSink for NullDumpSink {
    fn dump(&mut self, chunk: &[u8]) -> Result<String> {
        Ok(format!("{} bytes discarded (no dump sink)", chunk.len()))
    }
}

/// A sink that keeps dumps in memory under sequential names
#[derive(Debug, Clone)]
pub struct MemoryDumpSink {
    prefix: String,
    /// Dumped chunks with the names they were given
    pub dumps: Vec<(String, Bytes)>,
}

impl Default for MemoryDumpSink {
    fn default() -> Self {
        Self::new(DEFAULT_DUMP_PREFIX)
    }
}

impl MemoryDumpSink {
    /// Creates a sink naming dumps `{prefix}{index}`
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            dumps: Vec::new(),
        }
    }
}

impl DumpSink for MemoryDumpSink {
    fn dump(&mut self, chunk: &[u8]) -> Result<String> {
        let name = format!("{}{}", self.prefix, self.dumps.len());
        let confirmation = format!("{} bytes written to {}", chunk.len(), name);
        self.dumps.push((name, Bytes::copy_from_slice(chunk)));
        Ok(confirmation)
    }
}
