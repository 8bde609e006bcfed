//! Protocol messages.
//!
//! Every message is written as its two-character [`MessageType`] code
//! followed by its fields in a fixed order. Optional strings travel as empty
//! strings; file lists and change sets travel as newline-joined text lines.

use crate::backup_type::BackupType;
use crate::error::{ProtocolError, ProtocolResult};
use crate::file_info::FileInfo;
use crate::log_entry::LogEntry;
use crate::message_type::MessageType;
use dirsync_codec::TypedBuffer;

/// Error codes carried by [`ErrorMessage`].
pub mod error_codes {
    /// Unknown user or wrong password.
    pub const AUTH: &str = "ERR_AUTH";
    /// User may not use the requested folder.
    pub const ACCESS: &str = "ERR_ACCESS";
    /// Folder is in use by another session; retry later.
    pub const BUSY: &str = "ERR_BUSY";
    /// Unexpected or malformed message.
    pub const PROTOCOL: &str = "ERR_PROTOCOL";
    /// Folder's backup type does not allow the request.
    pub const BACKUP_TYPE: &str = "ERR_BACKUP_TYPE";
    /// A file could not be read or written.
    pub const TRANSFER: &str = "ERR_TRANSFER";
    /// Anything else.
    pub const INTERNAL: &str = "ERR_INTERNAL";
}

fn put_str(buffer: &mut TypedBuffer, value: &str) {
    buffer.write_value(&value.to_string());
}

fn get_str(buffer: &mut TypedBuffer) -> ProtocolResult<String> {
    Ok(buffer.read_value::<String>()?)
}

fn put_opt(buffer: &mut TypedBuffer, value: &Option<String>) {
    put_str(buffer, value.as_deref().unwrap_or(""));
}

fn get_opt(buffer: &mut TypedBuffer) -> ProtocolResult<Option<String>> {
    let value = get_str(buffer)?;
    Ok((!value.is_empty()).then_some(value))
}

fn split_paths(text: &str) -> Vec<String> {
    text.lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Opens a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectMessage {
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
    /// Virtual folder on the server.
    pub target_folder: String,
    /// Largest data block the client will send or accept.
    pub max_packet_size: i32,
    /// Parallel connections the client would like to use.
    pub max_connections: i32,
    /// Backup type the client expects.
    pub backup_type: BackupType,
    /// Acknowledge everything, write nothing.
    pub dry_run: bool,
}

impl ConnectMessage {
    /// Creates a connect request with default limits.
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        target_folder: impl Into<String>,
        backup_type: BackupType,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            target_folder: target_folder.into(),
            max_packet_size: crate::DEFAULT_MAX_PACKET_SIZE,
            max_connections: 1,
            backup_type,
            dry_run: false,
        }
    }

    fn write_fields(&self, buffer: &mut TypedBuffer) {
        put_str(buffer, &self.username);
        put_str(buffer, &self.password);
        put_str(buffer, &self.target_folder);
        buffer.write_value(&self.max_packet_size);
        buffer.write_value(&self.max_connections);
        buffer.write_value(&self.backup_type);
        buffer.write_value(&self.dry_run);
    }

    fn read_fields(buffer: &mut TypedBuffer) -> ProtocolResult<Self> {
        Ok(Self {
            username: get_str(buffer)?,
            password: get_str(buffer)?,
            target_folder: get_str(buffer)?,
            max_packet_size: buffer.read_value()?,
            max_connections: buffer.read_value()?,
            backup_type: buffer.read_value()?,
            dry_run: buffer.read_value()?,
        })
    }
}

/// Server's answer to [`ConnectMessage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectResponseMessage {
    /// Whether the session was opened.
    pub accepted: bool,
    /// Reason for refusal.
    pub error_message: Option<String>,
    /// Negotiated block size.
    pub max_packet_size: i32,
    /// Negotiated connection count.
    pub max_connections: i32,
    /// Backup type of the folder.
    pub backup_type: BackupType,
}

impl ConnectResponseMessage {
    /// Creates an accepting response.
    pub fn accepted(max_packet_size: i32, max_connections: i32, backup_type: BackupType) -> Self {
        Self {
            accepted: true,
            error_message: None,
            max_packet_size,
            max_connections,
            backup_type,
        }
    }

    fn write_fields(&self, buffer: &mut TypedBuffer) {
        buffer.write_value(&self.accepted);
        put_opt(buffer, &self.error_message);
        buffer.write_value(&self.max_packet_size);
        buffer.write_value(&self.max_connections);
        buffer.write_value(&self.backup_type);
    }

    fn read_fields(buffer: &mut TypedBuffer) -> ProtocolResult<Self> {
        Ok(Self {
            accepted: buffer.read_value()?,
            error_message: get_opt(buffer)?,
            max_packet_size: buffer.read_value()?,
            max_connections: buffer.read_value()?,
            backup_type: buffer.read_value()?,
        })
    }
}

/// One part of a catalogue of source files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileListMessage {
    /// Files in this part.
    pub files: Vec<FileInfo>,
    /// `true` for backup, `false` for restore.
    pub is_backup: bool,
    /// One-based part number.
    pub part_number: i32,
    /// Number of parts.
    pub total_parts: i32,
}

impl FileListMessage {
    /// Creates a single-part list.
    pub fn single(files: Vec<FileInfo>, is_backup: bool) -> Self {
        Self {
            files,
            is_backup,
            part_number: 1,
            total_parts: 1,
        }
    }

    fn write_fields(&self, buffer: &mut TypedBuffer) {
        put_str(buffer, &FileInfo::join_lines(&self.files));
        buffer.write_value(&self.is_backup);
        buffer.write_value(&self.part_number);
        buffer.write_value(&self.total_parts);
    }

    fn read_fields(buffer: &mut TypedBuffer) -> ProtocolResult<Self> {
        Ok(Self {
            files: FileInfo::parse_lines(&get_str(buffer)?)?,
            is_backup: buffer.read_value()?,
            part_number: buffer.read_value()?,
            total_parts: buffer.read_value()?,
        })
    }
}

/// Which files must move and which must go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileListResponseMessage {
    /// Files the receiver of this message must send.
    pub files_to_transfer: Vec<FileInfo>,
    /// Relative paths to delete.
    pub files_to_delete: Vec<String>,
    /// Echo of the request direction.
    pub is_backup: bool,
    /// One-based part number.
    pub part_number: i32,
    /// Number of parts.
    pub total_parts: i32,
}

impl FileListResponseMessage {
    fn write_fields(&self, buffer: &mut TypedBuffer) {
        put_str(buffer, &FileInfo::join_lines(&self.files_to_transfer));
        put_str(buffer, &self.files_to_delete.join("\n"));
        buffer.write_value(&self.is_backup);
        buffer.write_value(&self.part_number);
        buffer.write_value(&self.total_parts);
    }

    fn read_fields(buffer: &mut TypedBuffer) -> ProtocolResult<Self> {
        Ok(Self {
            files_to_transfer: FileInfo::parse_lines(&get_str(buffer)?)?,
            files_to_delete: split_paths(&get_str(buffer)?),
            is_backup: buffer.read_value()?,
            part_number: buffer.read_value()?,
            total_parts: buffer.read_value()?,
        })
    }
}

/// Announces a file about to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptorMessage {
    /// File metadata.
    pub file: FileInfo,
}

impl FileDescriptorMessage {
    fn write_fields(&self, buffer: &mut TypedBuffer) {
        put_str(buffer, &self.file.to_line());
    }

    fn read_fields(buffer: &mut TypedBuffer) -> ProtocolResult<Self> {
        Ok(Self {
            file: FileInfo::from_line(&get_str(buffer)?)?,
        })
    }
}

/// Receiver is (or is not) ready for a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptorAckMessage {
    /// File the ack refers to.
    pub relative_path: String,
    /// Whether data may follow.
    pub ready: bool,
    /// Reason for refusal.
    pub error_message: Option<String>,
}

impl FileDescriptorAckMessage {
    /// Ready to receive.
    pub fn ready(relative_path: impl Into<String>) -> Self {
        Self {
            relative_path: relative_path.into(),
            ready: true,
            error_message: None,
        }
    }

    /// Refuses the file.
    pub fn refused(relative_path: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            relative_path: relative_path.into(),
            ready: false,
            error_message: Some(error.into()),
        }
    }

    fn write_fields(&self, buffer: &mut TypedBuffer) {
        put_str(buffer, &self.relative_path);
        buffer.write_value(&self.ready);
        put_opt(buffer, &self.error_message);
    }

    fn read_fields(buffer: &mut TypedBuffer) -> ProtocolResult<Self> {
        Ok(Self {
            relative_path: get_str(buffer)?,
            ready: buffer.read_value()?,
            error_message: get_opt(buffer)?,
        })
    }
}

/// One block of file content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDataMessage {
    /// File the block belongs to.
    pub relative_path: String,
    /// Zero-based block index.
    pub block_number: i32,
    /// Number of blocks in the file (at least 1).
    pub total_blocks: i32,
    /// Block content.
    pub data: Vec<u8>,
}

impl FileDataMessage {
    fn write_fields(&self, buffer: &mut TypedBuffer) {
        put_str(buffer, &self.relative_path);
        buffer.write_value(&self.block_number);
        buffer.write_value(&self.total_blocks);
        buffer.write_value(&self.data);
    }

    fn read_fields(buffer: &mut TypedBuffer) -> ProtocolResult<Self> {
        Ok(Self {
            relative_path: get_str(buffer)?,
            block_number: buffer.read_value()?,
            total_blocks: buffer.read_value()?,
            data: buffer.read_value()?,
        })
    }
}

/// Closes a file transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEndMessage {
    /// File being closed.
    pub relative_path: String,
    /// Final metadata, used to restore timestamps.
    pub file: Option<FileInfo>,
}

impl FileEndMessage {
    fn write_fields(&self, buffer: &mut TypedBuffer) {
        put_str(buffer, &self.relative_path);
        put_str(
            buffer,
            &self.file.as_ref().map(FileInfo::to_line).unwrap_or_default(),
        );
    }

    fn read_fields(buffer: &mut TypedBuffer) -> ProtocolResult<Self> {
        let relative_path = get_str(buffer)?;
        let file = match get_opt(buffer)? {
            Some(line) => Some(FileInfo::from_line(&line)?),
            None => None,
        };
        Ok(Self {
            relative_path,
            file,
        })
    }
}

/// Outcome of writing one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEndAckMessage {
    /// File the ack refers to.
    pub relative_path: String,
    /// Whether the file was stored.
    pub success: bool,
    /// Failure reason.
    pub error_message: Option<String>,
}

impl FileEndAckMessage {
    /// Successful store.
    pub fn ok(relative_path: impl Into<String>) -> Self {
        Self {
            relative_path: relative_path.into(),
            success: true,
            error_message: None,
        }
    }

    /// Failed store.
    pub fn failed(relative_path: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            relative_path: relative_path.into(),
            success: false,
            error_message: Some(error.into()),
        }
    }

    fn write_fields(&self, buffer: &mut TypedBuffer) {
        put_str(buffer, &self.relative_path);
        buffer.write_value(&self.success);
        put_opt(buffer, &self.error_message);
    }

    fn read_fields(buffer: &mut TypedBuffer) -> ProtocolResult<Self> {
        Ok(Self {
            relative_path: get_str(buffer)?,
            success: buffer.read_value()?,
            error_message: get_opt(buffer)?,
        })
    }
}

/// A set of operation log entries for two-way sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSyncMessage {
    /// Latest entry per path.
    pub changes: Vec<LogEntry>,
    /// One-based part number.
    pub part_number: i32,
    /// Number of parts.
    pub total_parts: i32,
}

impl FileSyncMessage {
    /// Creates a single-part change set.
    pub fn single(changes: Vec<LogEntry>) -> Self {
        Self {
            changes,
            part_number: 1,
            total_parts: 1,
        }
    }

    fn write_fields(&self, buffer: &mut TypedBuffer) {
        put_str(buffer, &LogEntry::join_lines(&self.changes));
        buffer.write_value(&self.part_number);
        buffer.write_value(&self.total_parts);
    }

    fn read_fields(buffer: &mut TypedBuffer) -> ProtocolResult<Self> {
        Ok(Self {
            changes: LogEntry::parse_lines(&get_str(buffer)?)?,
            part_number: buffer.read_value()?,
            total_parts: buffer.read_value()?,
        })
    }
}

/// Generic success/failure acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusAck {
    /// Whether the step succeeded.
    pub success: bool,
    /// Failure reason.
    pub error_message: Option<String>,
}

impl StatusAck {
    /// Success.
    pub fn ok() -> Self {
        Self {
            success: true,
            error_message: None,
        }
    }

    /// Failure.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: Some(error.into()),
        }
    }

    fn write_fields(&self, buffer: &mut TypedBuffer) {
        buffer.write_value(&self.success);
        put_opt(buffer, &self.error_message);
    }

    fn read_fields(buffer: &mut TypedBuffer) -> ProtocolResult<Self> {
        Ok(Self {
            success: buffer.read_value()?,
            error_message: get_opt(buffer)?,
        })
    }
}

/// End of a backup, restore or sync pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEndMessage {
    /// Direction of the pass.
    pub is_backup: bool,
    /// Files sent.
    pub files_transferred: i32,
    /// Files deleted.
    pub files_deleted: i32,
}

impl SyncEndMessage {
    fn write_fields(&self, buffer: &mut TypedBuffer) {
        buffer.write_value(&self.is_backup);
        buffer.write_value(&self.files_transferred);
        buffer.write_value(&self.files_deleted);
    }

    fn read_fields(buffer: &mut TypedBuffer) -> ProtocolResult<Self> {
        Ok(Self {
            is_backup: buffer.read_value()?,
            files_transferred: buffer.read_value()?,
            files_deleted: buffer.read_value()?,
        })
    }
}

/// Error report; usually ends the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMessage {
    /// One of [`error_codes`].
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Extra detail.
    pub details: Option<String>,
}

impl ErrorMessage {
    /// Creates an error report.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Adds detail text.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    fn write_fields(&self, buffer: &mut TypedBuffer) {
        put_str(buffer, &self.code);
        put_str(buffer, &self.message);
        put_opt(buffer, &self.details);
    }

    fn read_fields(buffer: &mut TypedBuffer) -> ProtocolResult<Self> {
        Ok(Self {
            code: get_str(buffer)?,
            message: get_str(buffer)?,
            details: get_opt(buffer)?,
        })
    }
}

/// A protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    /// `CN`
    Connect(ConnectMessage),
    /// `CR`
    ConnectResponse(ConnectResponseMessage),
    /// `FL`
    FileList(FileListMessage),
    /// `FR`
    FileListResponse(FileListResponseMessage),
    /// `FD`
    FileDescriptor(FileDescriptorMessage),
    /// `FA`
    FileDescriptorAck(FileDescriptorAckMessage),
    /// `FT`
    FileData(FileDataMessage),
    /// `DA`
    FileDataAck,
    /// `FE`
    FileEnd(FileEndMessage),
    /// `EA`
    FileEndAck(FileEndAckMessage),
    /// `FS`
    FileSync(FileSyncMessage),
    /// `FY`
    FileSyncAck(StatusAck),
    /// `SE`
    SyncEnd(SyncEndMessage),
    /// `SA`
    SyncEndAck(StatusAck),
    /// `ER`
    Error(ErrorMessage),
    /// `KA`
    KeepAlive,
    /// `RS`
    StartRestore,
    /// `RA`
    StartRestoreAck,
}

impl WireMessage {
    /// Returns the message type.
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Connect(_) => MessageType::Connect,
            Self::ConnectResponse(_) => MessageType::ConnectResponse,
            Self::FileList(_) => MessageType::FileList,
            Self::FileListResponse(_) => MessageType::FileListResponse,
            Self::FileDescriptor(_) => MessageType::FileDescriptor,
            Self::FileDescriptorAck(_) => MessageType::FileDescriptorAck,
            Self::FileData(_) => MessageType::FileData,
            Self::FileDataAck => MessageType::FileDataAck,
            Self::FileEnd(_) => MessageType::FileEnd,
            Self::FileEndAck(_) => MessageType::FileEndAck,
            Self::FileSync(_) => MessageType::FileSync,
            Self::FileSyncAck(_) => MessageType::FileSyncAck,
            Self::SyncEnd(_) => MessageType::SyncEnd,
            Self::SyncEndAck(_) => MessageType::SyncEndAck,
            Self::Error(_) => MessageType::Error,
            Self::KeepAlive => MessageType::KeepAlive,
            Self::StartRestore => MessageType::StartRestore,
            Self::StartRestoreAck => MessageType::StartRestoreAck,
        }
    }

    /// Writes the type code and fields at the buffer's write cursor.
    pub fn write_to(&self, buffer: &mut TypedBuffer) {
        buffer.write_value(&self.message_type());
        match self {
            Self::Connect(m) => m.write_fields(buffer),
            Self::ConnectResponse(m) => m.write_fields(buffer),
            Self::FileList(m) => m.write_fields(buffer),
            Self::FileListResponse(m) => m.write_fields(buffer),
            Self::FileDescriptor(m) => m.write_fields(buffer),
            Self::FileDescriptorAck(m) => m.write_fields(buffer),
            Self::FileData(m) => m.write_fields(buffer),
            Self::FileEnd(m) => m.write_fields(buffer),
            Self::FileEndAck(m) => m.write_fields(buffer),
            Self::FileSync(m) => m.write_fields(buffer),
            Self::FileSyncAck(m) | Self::SyncEndAck(m) => m.write_fields(buffer),
            Self::SyncEnd(m) => m.write_fields(buffer),
            Self::Error(m) => m.write_fields(buffer),
            Self::FileDataAck | Self::KeepAlive | Self::StartRestore | Self::StartRestoreAck => {}
        }
    }

    /// Reads one message at the buffer's read cursor.
    pub fn read_from(buffer: &mut TypedBuffer) -> ProtocolResult<Self> {
        let code = dirsync_codec::read_code(buffer)?;
        let message = match MessageType::from_code(&code)? {
            MessageType::Connect => Self::Connect(ConnectMessage::read_fields(buffer)?),
            MessageType::ConnectResponse => {
                Self::ConnectResponse(ConnectResponseMessage::read_fields(buffer)?)
            }
            MessageType::FileList => Self::FileList(FileListMessage::read_fields(buffer)?),
            MessageType::FileListResponse => {
                Self::FileListResponse(FileListResponseMessage::read_fields(buffer)?)
            }
            MessageType::FileDescriptor => {
                Self::FileDescriptor(FileDescriptorMessage::read_fields(buffer)?)
            }
            MessageType::FileDescriptorAck => {
                Self::FileDescriptorAck(FileDescriptorAckMessage::read_fields(buffer)?)
            }
            MessageType::FileData => Self::FileData(FileDataMessage::read_fields(buffer)?),
            MessageType::FileDataAck => Self::FileDataAck,
            MessageType::FileEnd => Self::FileEnd(FileEndMessage::read_fields(buffer)?),
            MessageType::FileEndAck => Self::FileEndAck(FileEndAckMessage::read_fields(buffer)?),
            MessageType::FileSync => Self::FileSync(FileSyncMessage::read_fields(buffer)?),
            MessageType::FileSyncAck => Self::FileSyncAck(StatusAck::read_fields(buffer)?),
            MessageType::SyncEnd => Self::SyncEnd(SyncEndMessage::read_fields(buffer)?),
            MessageType::SyncEndAck => Self::SyncEndAck(StatusAck::read_fields(buffer)?),
            MessageType::Error => Self::Error(ErrorMessage::read_fields(buffer)?),
            MessageType::KeepAlive => Self::KeepAlive,
            MessageType::StartRestore => Self::StartRestore,
            MessageType::StartRestoreAck => Self::StartRestoreAck,
        };
        Ok(message)
    }

    /// Encodes to bytes (type code and fields, no frame header).
    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = TypedBuffer::new();
        self.write_to(&mut buffer);
        buffer.into_bytes()
    }

    /// Decodes from bytes. Trailing bytes are an error.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        let mut buffer = TypedBuffer::from_bytes(bytes.to_vec());
        let message = Self::read_from(&mut buffer)?;
        if buffer.remaining() != 0 {
            return Err(ProtocolError::invalid_frame(format!(
                "{} trailing bytes after {} message",
                buffer.remaining(),
                message.message_type()
            )));
        }
        Ok(message)
    }

    /// Creates an error message.
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::Error(ErrorMessage::new(code, message))
    }
}

macro_rules! impl_from {
    ($($payload:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$payload> for WireMessage {
                fn from(message: $payload) -> Self {
                    Self::$variant(message)
                }
            }
        )*
    };
}

impl_from! {
    ConnectMessage => Connect,
    ConnectResponseMessage => ConnectResponse,
    FileListMessage => FileList,
    FileListResponseMessage => FileListResponse,
    FileDescriptorMessage => FileDescriptor,
    FileDescriptorAckMessage => FileDescriptorAck,
    FileDataMessage => FileData,
    FileEndMessage => FileEnd,
    FileEndAckMessage => FileEndAck,
    FileSyncMessage => FileSync,
    SyncEndMessage => SyncEnd,
    ErrorMessage => Error,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_entry::Operation;
    use chrono::{TimeZone, Utc};

    fn file(path: &str, size: u64) -> FileInfo {
        FileInfo::new(
            path,
            size,
            Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    fn change(op: Operation, path: &str) -> LogEntry {
        let t = Utc.with_ymd_and_hms(2024, 6, 1, 8, 30, 0).unwrap();
        LogEntry {
            run_start: t,
            op_time: t,
            file_time: t,
            size: 10,
            operation: op,
            relative_path: path.to_string(),
        }
    }

    fn roundtrip(message: &WireMessage) -> WireMessage {
        let decoded = WireMessage::decode(&message.encode()).unwrap();
        assert_eq!(decoded.message_type(), message.message_type());
        decoded
    }

    fn assert_same_files(a: &[FileInfo], b: &[FileInfo]) {
        let lines = |files: &[FileInfo]| files.iter().map(FileInfo::to_line).collect::<Vec<_>>();
        assert_eq!(lines(a), lines(b));
    }

    fn samples() -> Vec<WireMessage> {
        let mut connect = ConnectMessage::new("alice", "secret", "photos", BackupType::Mirror);
        connect.dry_run = true;
        vec![
            connect.into(),
            ConnectResponseMessage::accepted(65_536, 4, BackupType::Preserve).into(),
            ConnectResponseMessage {
                accepted: false,
                error_message: Some("nope".into()),
                max_packet_size: 0,
                max_connections: 0,
                backup_type: BackupType::None,
            }
            .into(),
            FileListMessage::single(vec![file("a.txt", 5), file("dir/b.bin", 0)], true).into(),
            FileListMessage::single(Vec::new(), false).into(),
            FileListResponseMessage {
                files_to_transfer: vec![file("a.txt", 5)],
                files_to_delete: vec!["old.txt".into(), "dir/gone".into()],
                is_backup: true,
                part_number: 2,
                total_parts: 3,
            }
            .into(),
            FileDescriptorMessage {
                file: file("a.txt", 5),
            }
            .into(),
            FileDescriptorAckMessage::ready("a.txt").into(),
            FileDescriptorAckMessage::refused("a.txt", "disk full").into(),
            FileDataMessage {
                relative_path: "a.txt".into(),
                block_number: 0,
                total_blocks: 1,
                data: b"hello".to_vec(),
            }
            .into(),
            FileDataMessage {
                relative_path: "empty".into(),
                block_number: 0,
                total_blocks: 1,
                data: Vec::new(),
            }
            .into(),
            WireMessage::FileDataAck,
            FileEndMessage {
                relative_path: "a.txt".into(),
                file: Some(file("a.txt", 5)),
            }
            .into(),
            FileEndMessage {
                relative_path: "a.txt".into(),
                file: None,
            }
            .into(),
            FileEndAckMessage::ok("a.txt").into(),
            FileEndAckMessage::failed("a.txt", "io").into(),
            FileSyncMessage::single(vec![
                change(Operation::Created, "a"),
                change(Operation::Deleted, "b"),
            ])
            .into(),
            FileSyncMessage::single(Vec::new()).into(),
            WireMessage::FileSyncAck(StatusAck::ok()),
            SyncEndMessage {
                is_backup: false,
                files_transferred: 12,
                files_deleted: 3,
            }
            .into(),
            WireMessage::SyncEndAck(StatusAck::failed("partial")),
            ErrorMessage::new(error_codes::BUSY, "folder in use")
                .with_details("photos")
                .into(),
            WireMessage::KeepAlive,
            WireMessage::StartRestore,
            WireMessage::StartRestoreAck,
        ]
    }

    #[test]
    fn every_variant_roundtrips() {
        let samples = samples();
        for ty in MessageType::ALL {
            assert!(
                samples.iter().any(|m| m.message_type() == ty),
                "no sample for {ty}"
            );
        }
        for message in &samples {
            let decoded = roundtrip(message);
            assert_eq!(&decoded, message);
        }
    }

    #[test]
    fn file_lists_keep_all_fields() {
        let original = FileListMessage::single(vec![file("a.txt", 5), file("dir/b.bin", 7)], true);
        let WireMessage::FileList(decoded) = roundtrip(&original.clone().into()) else {
            panic!("wrong variant");
        };
        assert_same_files(&decoded.files, &original.files);
    }

    #[test]
    fn empty_file_data_roundtrips() {
        let message: WireMessage = FileDataMessage {
            relative_path: "zero".into(),
            block_number: 0,
            total_blocks: 1,
            data: Vec::new(),
        }
        .into();
        let WireMessage::FileData(decoded) = roundtrip(&message) else {
            panic!("wrong variant");
        };
        assert!(decoded.data.is_empty());
    }

    #[test]
    fn empty_file_sync_roundtrips() {
        let WireMessage::FileSync(decoded) = roundtrip(&FileSyncMessage::single(Vec::new()).into())
        else {
            panic!("wrong variant");
        };
        assert!(decoded.changes.is_empty());
        assert_eq!(decoded.total_parts, 1);
    }

    #[test]
    fn encoding_starts_with_code() {
        let bytes = WireMessage::KeepAlive.encode();
        assert_eq!(bytes, b"KA".to_vec());

        let bytes = WireMessage::from(SyncEndMessage {
            is_backup: true,
            files_transferred: 1,
            files_deleted: 0,
        })
        .encode();
        assert_eq!(&bytes[..2], b"SE");
        assert_eq!(bytes.len(), 2 + 1 + 4 + 4);
    }

    #[test]
    fn unknown_code_is_protocol_error() {
        assert!(matches!(
            WireMessage::decode(b"ZZ"),
            Err(ProtocolError::UnknownMessageType { .. })
        ));
    }

    #[test]
    fn truncated_payload_fails() {
        let bytes = WireMessage::from(FileEndAckMessage::ok("a.txt")).encode();
        assert!(WireMessage::decode(&bytes[..bytes.len() - 3]).is_err());
    }

    #[test]
    fn trailing_bytes_fail() {
        let mut bytes = WireMessage::StartRestore.encode();
        bytes.push(0);
        assert!(matches!(
            WireMessage::decode(&bytes),
            Err(ProtocolError::InvalidFrame { .. })
        ));
    }

    #[test]
    fn bad_file_line_fails() {
        let mut buffer = TypedBuffer::new();
        buffer.write_value(&MessageType::FileDescriptor);
        buffer.write_value(&"not a file line".to_string());
        assert!(matches!(
            WireMessage::decode(&buffer.into_bytes()),
            Err(ProtocolError::InvalidLine { .. })
        ));
    }
}
