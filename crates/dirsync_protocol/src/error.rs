//! Error types for the protocol crate.

use dirsync_codec::CodecError;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding, decoding or framing protocol data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A field could not be decoded from the buffer.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The two-character type code is not in the message table.
    #[error("unknown message type: {code:?}")]
    UnknownMessageType {
        /// The code as received.
        code: String,
    },

    /// Two message types claim the same code.
    #[error("duplicate message code: {code:?}")]
    DuplicateCode {
        /// The contested code.
        code: String,
    },

    /// The frame header or body is malformed.
    #[error("invalid frame: {message}")]
    InvalidFrame {
        /// Description of the problem.
        message: String,
    },

    /// The frame header announces more bytes than the session accepts.
    #[error("frame of {length} bytes exceeds limit of {max} bytes")]
    FrameTooLarge {
        /// Announced length.
        length: usize,
        /// Configured limit.
        max: usize,
    },

    /// A text line (file list or operation log) is malformed.
    #[error("invalid line: {message}")]
    InvalidLine {
        /// Description of the problem.
        message: String,
    },

    /// A timestamp does not match `yyyy-MM-dd HH:mm:ss`.
    #[error("invalid timestamp: {value:?}")]
    InvalidTimestamp {
        /// The offending text.
        value: String,
    },
}

impl ProtocolError {
    /// Create an invalid frame error.
    pub fn invalid_frame(message: impl Into<String>) -> Self {
        Self::InvalidFrame {
            message: message.into(),
        }
    }

    /// Create an invalid line error.
    pub fn invalid_line(message: impl Into<String>) -> Self {
        Self::InvalidLine {
            message: message.into(),
        }
    }
}
