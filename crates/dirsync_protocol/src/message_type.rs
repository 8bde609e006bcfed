//! Two-character message type codes.

use crate::error::{ProtocolError, ProtocolResult};
use dirsync_codec::{read_code, write_code, CodecError, CodecResult, TypedBuffer, WireValue};
use std::collections::HashSet;
use std::fmt;

/// Identifies the variant of a [`WireMessage`](crate::WireMessage).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// `CN`
    Connect,
    /// `CR`
    ConnectResponse,
    /// `FL`
    FileList,
    /// `FR`
    FileListResponse,
    /// `FD`
    FileDescriptor,
    /// `FA`
    FileDescriptorAck,
    /// `FT`
    FileData,
    /// `DA`
    FileDataAck,
    /// `FE`
    FileEnd,
    /// `EA`
    FileEndAck,
    /// `FS`
    FileSync,
    /// `FY`
    FileSyncAck,
    /// `SE`
    SyncEnd,
    /// `SA`
    SyncEndAck,
    /// `ER`
    Error,
    /// `KA`
    KeepAlive,
    /// `RS`
    StartRestore,
    /// `RA`
    StartRestoreAck,
}

impl MessageType {
    /// Every message type, in code-table order.
    pub const ALL: [MessageType; 18] = [
        Self::Connect,
        Self::ConnectResponse,
        Self::FileList,
        Self::FileListResponse,
        Self::FileDescriptor,
        Self::FileDescriptorAck,
        Self::FileData,
        Self::FileDataAck,
        Self::FileEnd,
        Self::FileEndAck,
        Self::FileSync,
        Self::FileSyncAck,
        Self::SyncEnd,
        Self::SyncEndAck,
        Self::Error,
        Self::KeepAlive,
        Self::StartRestore,
        Self::StartRestoreAck,
    ];

    /// Two-byte wire code.
    pub fn code(self) -> &'static [u8; 2] {
        match self {
            Self::Connect => b"CN",
            Self::ConnectResponse => b"CR",
            Self::FileList => b"FL",
            Self::FileListResponse => b"FR",
            Self::FileDescriptor => b"FD",
            Self::FileDescriptorAck => b"FA",
            Self::FileData => b"FT",
            Self::FileDataAck => b"DA",
            Self::FileEnd => b"FE",
            Self::FileEndAck => b"EA",
            Self::FileSync => b"FS",
            Self::FileSyncAck => b"FY",
            Self::SyncEnd => b"SE",
            Self::SyncEndAck => b"SA",
            Self::Error => b"ER",
            Self::KeepAlive => b"KA",
            Self::StartRestore => b"RS",
            Self::StartRestoreAck => b"RA",
        }
    }

    /// Looks up a wire code.
    pub fn from_code(code: &[u8; 2]) -> ProtocolResult<Self> {
        Self::ALL
            .into_iter()
            .find(|ty| ty.code() == code)
            .ok_or_else(|| ProtocolError::UnknownMessageType {
                code: String::from_utf8_lossy(code).into_owned(),
            })
    }

    /// Checks that no two message types share a code.
    ///
    /// Called once at startup by servers and clients.
    pub fn verify_registry() -> ProtocolResult<()> {
        let mut seen = HashSet::new();
        for ty in Self::ALL {
            if !seen.insert(ty.code()) {
                return Err(ProtocolError::DuplicateCode {
                    code: String::from_utf8_lossy(ty.code()).into_owned(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.code()))
    }
}

impl WireValue for MessageType {
    const TYPE_NAME: &'static str = "MessageType";

    fn write_to(&self, buffer: &mut TypedBuffer) {
        write_code(buffer, self.code());
    }

    fn read_from(buffer: &mut TypedBuffer) -> CodecResult<Self> {
        let code = read_code(buffer)?;
        Self::from_code(&code).map_err(|_| CodecError::unknown_code(Self::TYPE_NAME, &code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_is_consistent() {
        MessageType::verify_registry().unwrap();
        for ty in MessageType::ALL {
            assert_eq!(MessageType::from_code(ty.code()).unwrap(), ty);
        }
    }

    #[test]
    fn unknown_code() {
        let err = MessageType::from_code(b"??").unwrap_err();
        assert_eq!(
            err,
            ProtocolError::UnknownMessageType {
                code: "??".to_string()
            }
        );
    }

    #[test]
    fn display_is_code() {
        assert_eq!(MessageType::FileData.to_string(), "FT");
        assert_eq!(MessageType::SyncEndAck.to_string(), "SA");
    }
}
