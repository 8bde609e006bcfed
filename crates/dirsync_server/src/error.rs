//! Error types for the sync server.

use dirsync_engine::SyncError;
use dirsync_protocol::{error_codes, BackupType};
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request or message order.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Unknown user or wrong password.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The user may not use the requested folder.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Another session is working on the same folder.
    #[error("folder busy: {0}")]
    FolderBusy(String),

    /// The folder's backup type does not allow the requested operation.
    #[error("unsupported backup type: {0}")]
    UnsupportedBackupType(BackupType),

    /// Settings file could not be used.
    #[error("invalid settings: {0}")]
    Settings(String),

    /// Settings file is not valid JSON.
    #[error("settings json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Transfer, transport or change tracking failure.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Wire error code reported to the client.
    pub fn wire_code(&self) -> &'static str {
        match self {
            ServerError::InvalidRequest(_) => error_codes::PROTOCOL,
            ServerError::AuthenticationFailed(_) => error_codes::AUTH,
            ServerError::AccessDenied(_) => error_codes::ACCESS,
            ServerError::FolderBusy(_) => error_codes::BUSY,
            ServerError::UnsupportedBackupType(_) => error_codes::BACKUP_TYPE,
            ServerError::Sync(err) => match err {
                SyncError::Protocol(_)
                | SyncError::UnexpectedMessage { .. }
                | SyncError::InvalidPath { .. } => error_codes::PROTOCOL,
                SyncError::Transfer { .. } => error_codes::TRANSFER,
                SyncError::RootLocked { .. } => error_codes::BUSY,
                _ => error_codes::INTERNAL,
            },
            ServerError::Settings(_)
            | ServerError::Json(_)
            | ServerError::Internal(_)
            | ServerError::Io(_) => error_codes::INTERNAL,
        }
    }

    /// Returns true if the client caused this error.
    pub fn is_client_error(&self) -> bool {
        match self {
            ServerError::InvalidRequest(_)
            | ServerError::AuthenticationFailed(_)
            | ServerError::AccessDenied(_)
            | ServerError::FolderBusy(_)
            | ServerError::UnsupportedBackupType(_) => true,
            ServerError::Sync(err) => matches!(
                err,
                SyncError::Protocol(_)
                    | SyncError::UnexpectedMessage { .. }
                    | SyncError::InvalidPath { .. }
            ),
            _ => false,
        }
    }

    /// Returns true if this is a server-side failure.
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }

    /// Returns true if the connection is already gone and no error message
    /// can be delivered.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            ServerError::Sync(SyncError::ConnectionClosed | SyncError::Timeout)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirsync_protocol::MessageType;

    #[test]
    fn error_classification() {
        assert!(ServerError::InvalidRequest("bad".into()).is_client_error());
        assert!(ServerError::Internal("oops".into()).is_server_error());
        assert!(!ServerError::InvalidRequest("bad".into()).is_server_error());
        assert!(
            ServerError::Sync(SyncError::unexpected("FileList", MessageType::KeepAlive))
                .is_client_error()
        );
        assert!(ServerError::Sync(SyncError::ConnectionClosed).is_disconnect());
    }

    #[test]
    fn wire_codes() {
        assert_eq!(
            ServerError::AuthenticationFailed("alice".into()).wire_code(),
            error_codes::AUTH
        );
        assert_eq!(
            ServerError::FolderBusy("docs".into()).wire_code(),
            error_codes::BUSY
        );
        assert_eq!(
            ServerError::UnsupportedBackupType(BackupType::None).wire_code(),
            error_codes::BACKUP_TYPE
        );
        assert_eq!(
            ServerError::Sync(SyncError::transfer("a.txt", "disk full")).wire_code(),
            error_codes::TRANSFER
        );
        assert_eq!(
            ServerError::Io(std::io::ErrorKind::Other.into()).wire_code(),
            error_codes::INTERNAL
        );
    }

    #[test]
    fn error_display() {
        let err = ServerError::UnsupportedBackupType(BackupType::None);
        assert_eq!(err.to_string(), "unsupported backup type: none");
        let err = ServerError::from(SyncError::ConnectionClosed);
        assert_eq!(err.to_string(), "connection closed by peer");
    }
}
