//! Segmented byte buffer.
//!
//! A [`TypedBuffer`] stores its content as an ordered list of byte segments
//! that are never concatenated eagerly. Appends push a new segment, in-place
//! overwrites are split across whatever segments the target range touches,
//! and the segments are merged into one only when a contiguous view is
//! requested.
//!
//! ## Invariants
//!
//! - `len() == sum of segment lengths`
//! - `read_cursor() <= len()` and `write_cursor() <= len()`
//! - no segment is empty

use crate::convert::WireValue;
use crate::error::{CodecError, CodecResult};

/// A piece of one segment that a logical range maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    /// Index into the segment list.
    segment: usize,
    /// Offset inside that segment.
    start: usize,
    /// Number of bytes.
    len: usize,
}

/// A growable, segmented byte store with independent read and write cursors.
///
/// # Example
///
/// ```
/// use dirsync_codec::TypedBuffer;
///
/// let mut buffer = TypedBuffer::new();
/// buffer.write_value(&42i32);
/// buffer.write_value(&"hello".to_string());
///
/// assert_eq!(buffer.read_value::<i32>().unwrap(), 42);
/// assert_eq!(buffer.read_value::<String>().unwrap(), "hello");
/// ```
#[derive(Debug, Clone, Default)]
pub struct TypedBuffer {
    segments: Vec<Vec<u8>>,
    size: usize,
    read_cursor: usize,
    write_cursor: usize,
}

impl TypedBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a buffer holding `bytes` as a single segment.
    ///
    /// The read cursor starts at 0 and the write cursor at the end.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        let size = bytes.len();
        let segments = if bytes.is_empty() {
            Vec::new()
        } else {
            vec![bytes]
        };
        Self {
            segments,
            size,
            read_cursor: 0,
            write_cursor: size,
        }
    }

    /// Returns the logical size in bytes.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Returns true if the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Returns the number of internal segments.
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Returns the read cursor position.
    pub fn read_cursor(&self) -> usize {
        self.read_cursor
    }

    /// Returns the write cursor position.
    pub fn write_cursor(&self) -> usize {
        self.write_cursor
    }

    /// Returns the number of bytes between the read cursor and the end.
    pub fn remaining(&self) -> usize {
        self.size - self.read_cursor
    }

    /// Moves the read cursor.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` if `position > len()`.
    pub fn set_read_cursor(&mut self, position: usize) -> CodecResult<()> {
        if position > self.size {
            return Err(CodecError::out_of_range(position, 0, self.size));
        }
        self.read_cursor = position;
        Ok(())
    }

    /// Moves the write cursor.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` if `position > len()`.
    pub fn set_write_cursor(&mut self, position: usize) -> CodecResult<()> {
        if position > self.size {
            return Err(CodecError::out_of_range(position, 0, self.size));
        }
        self.write_cursor = position;
        Ok(())
    }

    /// Writes one byte at the write cursor and advances it.
    pub fn write_byte(&mut self, byte: u8) {
        self.write(&[byte]);
    }

    /// Writes `bytes` at the write cursor and advances it.
    ///
    /// Bytes that land inside existing data overwrite it; the rest is
    /// appended as a new segment.
    pub fn write(&mut self, bytes: &[u8]) {
        let offset = self.write_cursor;
        self.write_spans(bytes, offset);
        self.write_cursor += bytes.len();
    }

    /// Writes `bytes` at `offset` without moving either cursor.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` if `offset > len()`.
    pub fn write_at(&mut self, bytes: &[u8], offset: usize) -> CodecResult<()> {
        if offset > self.size {
            return Err(CodecError::out_of_range(offset, bytes.len(), self.size));
        }
        self.write_spans(bytes, offset);
        Ok(())
    }

    /// Reads `length` bytes starting at `offset`. Cursors are not moved.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` if the span exceeds `len()`.
    pub fn read_at(&self, offset: usize, length: usize) -> CodecResult<Vec<u8>> {
        self.check_range(offset, length)?;
        Ok(self.copy_out(offset, length))
    }

    /// Reads `length` bytes at the read cursor and advances it.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` if fewer than `length` bytes remain.
    pub fn read(&mut self, length: usize) -> CodecResult<Vec<u8>> {
        let bytes = self.read_at(self.read_cursor, length)?;
        self.read_cursor += length;
        Ok(bytes)
    }

    /// Reads one byte at the read cursor and advances it.
    pub fn read_byte(&mut self) -> CodecResult<u8> {
        let byte = self.peek_byte()?;
        self.read_cursor += 1;
        Ok(byte)
    }

    /// Returns the byte at the read cursor without advancing.
    pub fn peek_byte(&self) -> CodecResult<u8> {
        self.check_range(self.read_cursor, 1)?;
        let span = self.locate(self.read_cursor, 1)[0];
        Ok(self.segments[span.segment][span.start])
    }

    /// Reads everything from the read cursor to the end.
    pub fn read_to_end(&mut self) -> Vec<u8> {
        let length = self.remaining();
        let bytes = self.copy_out(self.read_cursor, length);
        self.read_cursor = self.size;
        bytes
    }

    /// Encodes `value` at the write cursor.
    pub fn write_value<T: WireValue>(&mut self, value: &T) {
        value.write_to(self);
    }

    /// Decodes a `T` at the read cursor.
    pub fn read_value<T: WireValue>(&mut self) -> CodecResult<T> {
        T::read_from(self)
    }

    /// Removes `length` bytes at `offset` and returns them as a new buffer.
    ///
    /// The prefix and suffix around the removed range stay in place. Cursors
    /// past the removed range shift left; cursors inside it move to `offset`.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` if `offset + length > len()`.
    pub fn splice(&mut self, offset: usize, length: usize) -> CodecResult<TypedBuffer> {
        self.check_range(offset, length)?;
        if length == 0 {
            return Ok(TypedBuffer::new());
        }

        let removed = self.copy_out(offset, length);
        let end = offset + length;
        let mut kept = Vec::with_capacity(self.segments.len() + 1);
        let mut base = 0;
        for segment in self.segments.drain(..) {
            let segment_end = base + segment.len();
            if segment_end <= offset || base >= end {
                kept.push(segment);
            } else {
                if base < offset {
                    kept.push(segment[..offset - base].to_vec());
                }
                if segment_end > end {
                    kept.push(segment[end - base..].to_vec());
                }
            }
            base = segment_end;
        }

        self.segments = kept;
        self.size -= length;
        self.read_cursor = shift_cursor(self.read_cursor, offset, length);
        self.write_cursor = shift_cursor(self.write_cursor, offset, length);

        Ok(TypedBuffer::from_bytes(removed))
    }

    /// Discards all content and resets both cursors.
    pub fn clear(&mut self) {
        self.segments.clear();
        self.size = 0;
        self.read_cursor = 0;
        self.write_cursor = 0;
    }

    /// Returns the whole content as one slice, merging segments if needed.
    pub fn as_contiguous(&mut self) -> &[u8] {
        if self.segments.len() > 1 {
            let merged = self.segments.concat();
            self.segments = vec![merged];
        }
        self.segments.first().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns a copy of the whole content.
    pub fn to_vec(&self) -> Vec<u8> {
        self.segments.concat()
    }

    /// Consumes the buffer and returns its content.
    pub fn into_bytes(mut self) -> Vec<u8> {
        match self.segments.len() {
            0 => Vec::new(),
            1 => self.segments.pop().unwrap_or_default(),
            _ => self.segments.concat(),
        }
    }

    /// Maps the logical range `offset..offset + length` onto existing
    /// segments, left to right. The part of the range past `len()` is not
    /// covered by any span.
    fn locate(&self, offset: usize, length: usize) -> Vec<Span> {
        let end = (offset + length).min(self.size);
        let mut spans = Vec::new();
        let mut base = 0;
        for (index, segment) in self.segments.iter().enumerate() {
            let segment_end = base + segment.len();
            if segment_end > offset && base < end {
                let start = offset.max(base);
                let stop = end.min(segment_end);
                spans.push(Span {
                    segment: index,
                    start: start - base,
                    len: stop - start,
                });
            }
            if segment_end >= end {
                break;
            }
            base = segment_end;
        }
        spans
    }

    /// Overwrites the covered part of the range and appends the remainder
    /// as a new trailing segment. Caller guarantees `offset <= size`.
    fn write_spans(&mut self, bytes: &[u8], offset: usize) {
        if bytes.is_empty() {
            return;
        }
        let mut consumed = 0;
        for span in self.locate(offset, bytes.len()) {
            let target = &mut self.segments[span.segment][span.start..span.start + span.len];
            target.copy_from_slice(&bytes[consumed..consumed + span.len]);
            consumed += span.len;
        }
        if consumed < bytes.len() {
            self.segments.push(bytes[consumed..].to_vec());
            self.size += bytes.len() - consumed;
        }
    }

    fn copy_out(&self, offset: usize, length: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(length);
        for span in self.locate(offset, length) {
            out.extend_from_slice(&self.segments[span.segment][span.start..span.start + span.len]);
        }
        out
    }

    fn check_range(&self, offset: usize, length: usize) -> CodecResult<()> {
        match offset.checked_add(length) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(CodecError::out_of_range(offset, length, self.size)),
        }
    }
}

impl From<Vec<u8>> for TypedBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_bytes(bytes)
    }
}

fn shift_cursor(cursor: usize, offset: usize, length: usize) -> usize {
    if cursor >= offset + length {
        cursor - length
    } else if cursor > offset {
        offset
    } else {
        cursor
    }
}
