//! Bounded read position over shared input bytes.

use bytes::Bytes;

/// An exclusively owned read position over an immutable byte region.
///
/// The region is a cheap [`Bytes`] handle, so nested chunks are zero-copy
/// sub-slices of the root input. `base` is the absolute offset of the
/// region's first byte in the root input and is only used for diagnostics.
#[derive(Debug, Clone)]
pub struct ByteCursor {
    data: Bytes,
    pos: usize,
    base: usize,
}

impl ByteCursor {
    /// Creates a cursor over a whole root buffer
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self::with_base(data.into(), 0)
    }

    /// Creates a cursor over a region whose first byte sits at `base` in the root input
    pub fn with_base(data: Bytes, base: usize) -> Self {
        Self { data, pos: 0, base }
    }

    /// Position relative to the start of this region
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Absolute offset of the next byte in the root input
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    /// Absolute offset of this region's first byte
    pub fn base(&self) -> usize {
        self.base
    }

    /// Bytes left to read
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Returns true when every byte has been consumed
    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Reads one byte, or `None` when exhausted
    pub fn read_byte(&mut self) -> Option<u8> {
        let byte = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(byte)
    }

    /// Takes exactly `len` bytes as a zero-copy slice.
    ///
    /// Returns `None` without moving when fewer than `len` bytes remain.
    pub fn take(&mut self, len: usize) -> Option<Bytes> {
        if len > self.remaining() {
            return None;
        }
        let chunk = self.data.slice(self.pos..self.pos + len);
        self.pos += len;
        Some(chunk)
    }

    /// Takes everything left in the region
    pub fn take_rest(&mut self) -> Bytes {
        let rest = self.data.slice(self.pos..);
        self.pos = self.data.len();
        rest
    }

    /// Slice of the region between two relative positions already walked
    pub fn slice_between(&self, start: usize, end: usize) -> Bytes {
        self.data.slice(start..end)
    }
}
