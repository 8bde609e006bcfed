//! Converters between Rust values and their wire form.
//!
//! Fixed-width values are written raw and big-endian; the reader must know
//! the type in advance. Variable-length values carry a one-byte tag and a
//! four-byte big-endian length in front of the payload. The tag is checked
//! on read but never used to pick the type.
//!
//! | Type | Encoding |
//! |------|----------|
//! | `i32` | 4 bytes |
//! | `i64` | 8 bytes |
//! | `bool` | 1 byte, nonzero is true |
//! | `Uuid` | 16 bytes, high half then low half |
//! | `String` | `'S'`, u32 length, UTF-8 bytes |
//! | `Vec<u8>` | `'B'`, u32 length, raw bytes |

use crate::buffer::TypedBuffer;
use crate::error::{CodecError, CodecResult};
use bytes::{Buf, BufMut};
use uuid::Uuid;

/// Tag byte in front of an encoded string.
pub const STRING_TAG: u8 = b'S';

/// Tag byte in front of an encoded byte array.
pub const BYTES_TAG: u8 = b'B';

/// A type with a fixed wire representation inside a [`TypedBuffer`].
///
/// Implementations exist for the primitive types listed in the module docs;
/// downstream crates implement it for their own enums.
pub trait WireValue: Sized {
    /// Name used in type-mismatch errors.
    const TYPE_NAME: &'static str;

    /// Appends the encoded value at the buffer's write cursor.
    fn write_to(&self, buffer: &mut TypedBuffer);

    /// Decodes a value at the buffer's read cursor.
    fn read_from(buffer: &mut TypedBuffer) -> CodecResult<Self>;
}

fn read_array<const N: usize>(buffer: &mut TypedBuffer) -> CodecResult<[u8; N]> {
    let raw = buffer.read(N)?;
    let mut out = [0u8; N];
    out.copy_from_slice(&raw);
    Ok(out)
}

impl WireValue for i32 {
    const TYPE_NAME: &'static str = "i32";

    fn write_to(&self, buffer: &mut TypedBuffer) {
        let mut scratch = Vec::with_capacity(4);
        scratch.put_i32(*self);
        buffer.write(&scratch);
    }

    fn read_from(buffer: &mut TypedBuffer) -> CodecResult<Self> {
        let raw = read_array::<4>(buffer)?;
        Ok((&raw[..]).get_i32())
    }
}

impl WireValue for i64 {
    const TYPE_NAME: &'static str = "i64";

    fn write_to(&self, buffer: &mut TypedBuffer) {
        let mut scratch = Vec::with_capacity(8);
        scratch.put_i64(*self);
        buffer.write(&scratch);
    }

    fn read_from(buffer: &mut TypedBuffer) -> CodecResult<Self> {
        let raw = read_array::<8>(buffer)?;
        Ok((&raw[..]).get_i64())
    }
}

impl WireValue for bool {
    const TYPE_NAME: &'static str = "bool";

    fn write_to(&self, buffer: &mut TypedBuffer) {
        buffer.write_byte(u8::from(*self));
    }

    fn read_from(buffer: &mut TypedBuffer) -> CodecResult<Self> {
        Ok(buffer.read_byte()? != 0)
    }
}

impl WireValue for Uuid {
    const TYPE_NAME: &'static str = "uuid";

    fn write_to(&self, buffer: &mut TypedBuffer) {
        let (high, low) = self.as_u64_pair();
        let mut scratch = Vec::with_capacity(16);
        scratch.put_u64(high);
        scratch.put_u64(low);
        buffer.write(&scratch);
    }

    fn read_from(buffer: &mut TypedBuffer) -> CodecResult<Self> {
        let raw = read_array::<16>(buffer)?;
        let mut cursor = &raw[..];
        let high = cursor.get_u64();
        let low = cursor.get_u64();
        Ok(Uuid::from_u64_pair(high, low))
    }
}

impl WireValue for String {
    const TYPE_NAME: &'static str = "string";

    fn write_to(&self, buffer: &mut TypedBuffer) {
        write_tagged(buffer, STRING_TAG, self.as_bytes());
    }

    fn read_from(buffer: &mut TypedBuffer) -> CodecResult<Self> {
        let payload = read_tagged(buffer, STRING_TAG, Self::TYPE_NAME)?;
        String::from_utf8(payload).map_err(|_| CodecError::InvalidUtf8)
    }
}

impl WireValue for Vec<u8> {
    const TYPE_NAME: &'static str = "bytes";

    fn write_to(&self, buffer: &mut TypedBuffer) {
        write_tagged(buffer, BYTES_TAG, self);
    }

    fn read_from(buffer: &mut TypedBuffer) -> CodecResult<Self> {
        read_tagged(buffer, BYTES_TAG, Self::TYPE_NAME)
    }
}

/// Writes a two-character ASCII code.
pub fn write_code(buffer: &mut TypedBuffer, code: &[u8; 2]) {
    buffer.write(code);
}

/// Reads a two-character ASCII code.
pub fn read_code(buffer: &mut TypedBuffer) -> CodecResult<[u8; 2]> {
    read_array::<2>(buffer)
}

#[allow(clippy::cast_possible_truncation)]
fn write_tagged(buffer: &mut TypedBuffer, tag: u8, payload: &[u8]) {
    let mut header = Vec::with_capacity(5);
    header.put_u8(tag);
    header.put_u32(payload.len() as u32);
    buffer.write(&header);
    buffer.write(payload);
}

fn read_tagged(buffer: &mut TypedBuffer, tag: u8, type_name: &str) -> CodecResult<Vec<u8>> {
    let found = buffer.peek_byte()?;
    if found != tag {
        return Err(CodecError::type_mismatch(
            type_name,
            format!("tag {:?}", char::from(found)),
        ));
    }
    let start = buffer.read_cursor();
    buffer.read_byte()?;
    let raw = read_array::<4>(buffer)?;
    let length = (&raw[..]).get_u32() as usize;
    match buffer.read(length) {
        Ok(payload) => Ok(payload),
        Err(err) => {
            // Leave the cursor on the tag so the caller sees a consistent position.
            buffer.set_read_cursor(start)?;
            Err(err)
        }
    }
}
