//! # dirsync Codec
//!
//! Byte buffer and typed converters for the dirsync wire protocol.
//!
//! This crate provides:
//! - [`TypedBuffer`], a segmented byte store with independent read and
//!   write cursors, in-place overwrite across segment boundaries and splice
//! - [`WireValue`], the converter trait for primitives, strings and byte
//!   arrays
//!
//! ## Encoding Rules
//!
//! - Integers, longs, UUIDs and booleans are fixed width, big-endian, untagged
//! - Strings and byte arrays are `[tag][u32 length][payload]`
//! - Tags are verified on read; a wrong tag is a type mismatch
//! - Reads and writes never wrap or truncate; bad ranges are errors
//!
//! ## Usage
//!
//! ```
//! use dirsync_codec::TypedBuffer;
//!
//! let mut buffer = TypedBuffer::new();
//! buffer.write_value(&"report.pdf".to_string());
//! buffer.write_value(&1024i64);
//!
//! let bytes = buffer.into_bytes();
//! let mut reader = TypedBuffer::from_bytes(bytes);
//! assert_eq!(reader.read_value::<String>().unwrap(), "report.pdf");
//! assert_eq!(reader.read_value::<i64>().unwrap(), 1024);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod buffer;
mod convert;
mod error;

pub use buffer::TypedBuffer;
pub use convert::{read_code, write_code, WireValue, BYTES_TAG, STRING_TAG};
pub use error::{CodecError, CodecResult};
