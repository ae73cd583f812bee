use std::ops::Deref;

use bytes::{Buf, Bytes, BytesMut};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Growable buffer holding every not-yet-consumed byte of one stream.
///
/// Bytes leave the accumulator only through [`consume`](Self::consume) or
/// [`split_to`](Self::split_to), so nothing already handed out as part of a
/// unit can be seen again.
#[derive(Debug, Default)]
pub struct Accumulator {
    buf: BytesMut,
}

impl Accumulator {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Append a freshly received chunk.
    pub fn append(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Drop the first `n` bytes (clamped to the buffered length).
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.buf.len());
        self.buf.advance(n);
    }

    /// Remove and return the first `n` bytes without copying.
    ///
    /// Panics if fewer than `n` bytes are buffered; decoders check lengths first.
    pub fn split_to(&mut self, n: usize) -> Bytes {
        self.buf.split_to(n).freeze()
    }

    /// Drop everything, returning how many bytes were discarded.
    pub fn clear(&mut self) -> usize {
        let n = self.buf.len();
        self.buf.clear();
        n
    }

    /// Discard everything except a trailing byte equal to `keep_if_last`.
    ///
    /// Used by scanners whose marker may be split across chunks. Returns the
    /// number of bytes dropped.
    pub(crate) fn discard_keeping_last(&mut self, keep_if_last: u8) -> usize {
        let keep = usize::from(self.buf.last() == Some(&keep_if_last));
        let drop = self.buf.len() - keep;
        self.buf.advance(drop);
        drop
    }

    /// Position of the first occurrence of `pattern` at or after `from`.
    pub fn find(&self, pattern: &[u8], from: usize) -> Option<usize> {
        find(&self.buf, pattern, from)
    }
}

impl Deref for Accumulator {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

pub(crate) fn find(haystack: &[u8], pattern: &[u8], from: usize) -> Option<usize> {
    if pattern.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(pattern.len())
        .position(|window| window == pattern)
        .map(|pos| pos + from)
}
