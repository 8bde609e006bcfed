//! Error types for the sync engine.

use dirsync_protocol::{error_codes, MessageType, ProtocolError};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Filesystem or socket error.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// Malformed frame, message or text line.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The peer closed the connection between frames.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// A blocking read or write hit the configured timeout.
    #[error("operation timed out")]
    Timeout,

    /// The peer reported an error message.
    #[error("remote error {code}: {message}")]
    Remote {
        /// Wire error code (`ERR_*`).
        code: String,
        /// Message text.
        message: String,
    },

    /// The peer sent a message that does not fit the current step.
    #[error("unexpected message: expected {expected}, got {found}")]
    UnexpectedMessage {
        /// What the flow was waiting for.
        expected: String,
        /// What arrived.
        found: MessageType,
    },

    /// The server refused the session.
    #[error("connection rejected: {0}")]
    Rejected(String),

    /// A file could not be stored on the other side.
    #[error("transfer of {path} failed: {message}")]
    Transfer {
        /// Relative path of the file.
        path: String,
        /// Reason given by the receiver.
        message: String,
    },

    /// A relative path received from a peer is unusable.
    #[error("invalid path: {path:?}")]
    InvalidPath {
        /// The path as received.
        path: String,
    },

    /// Another process holds the root's lock file.
    #[error("sync root is locked: {}", root.display())]
    RootLocked {
        /// The locked root.
        root: PathBuf,
    },

    /// A line of an operation log could not be parsed.
    #[error("corrupt operation log {}: line {line}: {source}", path.display())]
    CorruptLog {
        /// Log file.
        path: PathBuf,
        /// One-based line number.
        line: usize,
        /// Parse failure.
        source: ProtocolError,
    },
}

impl SyncError {
    /// Creates an unexpected message error.
    pub fn unexpected(expected: impl Into<String>, found: MessageType) -> Self {
        Self::UnexpectedMessage {
            expected: expected.into(),
            found,
        }
    }

    /// Creates a transfer error.
    pub fn transfer(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transfer {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns true if reconnecting later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Remote { code, .. } => code == error_codes::BUSY,
            SyncError::Timeout | SyncError::RootLocked { .. } => true,
            SyncError::Io(err) => matches!(
                err.kind(),
                io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

/// Maps socket timeouts onto [`SyncError::Timeout`].
pub(crate) fn from_io(err: io::Error) -> SyncError {
    match err.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => SyncError::Timeout,
        _ => SyncError::Io(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        let busy = SyncError::Remote {
            code: error_codes::BUSY.into(),
            message: "folder in use".into(),
        };
        assert!(busy.is_retryable());

        let auth = SyncError::Remote {
            code: error_codes::AUTH.into(),
            message: "bad password".into(),
        };
        assert!(!auth.is_retryable());

        assert!(SyncError::Timeout.is_retryable());
        assert!(SyncError::Io(io::ErrorKind::ConnectionRefused.into()).is_retryable());
        assert!(!SyncError::ConnectionClosed.is_retryable());
        assert!(!SyncError::Rejected("no".into()).is_retryable());
    }

    #[test]
    fn timeouts_are_mapped() {
        assert!(matches!(
            from_io(io::ErrorKind::WouldBlock.into()),
            SyncError::Timeout
        ));
        assert!(matches!(
            from_io(io::ErrorKind::NotFound.into()),
            SyncError::Io(_)
        ));
    }

    #[test]
    fn error_display() {
        let err = SyncError::unexpected("FileDataAck", MessageType::SyncEnd);
        assert_eq!(
            err.to_string(),
            "unexpected message: expected FileDataAck, got SE"
        );
        assert_eq!(
            SyncError::ConnectionClosed.to_string(),
            "connection closed by peer"
        );
    }
}
