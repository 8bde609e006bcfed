//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while reading or writing a [`TypedBuffer`](crate::TypedBuffer).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A read, write, splice or cursor move addressed bytes past the end of the buffer.
    #[error("out of range: offset {offset} + length {length} exceeds size {size}")]
    OutOfRange {
        /// Requested start offset.
        offset: usize,
        /// Requested length.
        length: usize,
        /// Logical size of the buffer at the time of the request.
        size: usize,
    },

    /// The value found in the buffer is not the type the caller asked for.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Type the caller asked for.
        expected: String,
        /// What was actually found.
        found: String,
    },

    /// Invalid UTF-8 string.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// A two-character code could not be mapped to a known value.
    #[error("unknown code {code:?} for {type_name}")]
    UnknownCode {
        /// Type the code was read for.
        type_name: &'static str,
        /// The raw code.
        code: String,
    },

    /// Generic decoding failure.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },
}

impl CodecError {
    /// Create an out-of-range error.
    pub fn out_of_range(offset: usize, length: usize, size: usize) -> Self {
        Self::OutOfRange {
            offset,
            length,
            size,
        }
    }

    /// Create a type mismatch error.
    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create an unknown code error.
    pub fn unknown_code(type_name: &'static str, code: &[u8]) -> Self {
        Self::UnknownCode {
            type_name,
            code: String::from_utf8_lossy(code).into_owned(),
        }
    }

    /// Create a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }
}
