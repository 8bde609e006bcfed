//! # dirsync Protocol
//!
//! Wire messages and text records for dirsync.
//!
//! This crate provides:
//! - [`WireMessage`], the closed set of protocol messages, keyed by
//!   two-character [`MessageType`] codes
//! - Length-prefixed framing ([`encode_frame`], [`decode_frame`])
//! - [`FileInfo`] catalogue lines and [`LogEntry`] operation log lines
//! - [`BackupType`] policy codes
//!
//! This is a pure protocol crate with no network I/O.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backup_type;
mod error;
mod file_info;
mod frame;
mod log_entry;
mod message_type;
mod messages;
mod time;

pub use backup_type::BackupType;
pub use error::{ProtocolError, ProtocolResult};
pub use file_info::{relative_path, uniform_path, FileInfo};
pub use frame::{
    decode_frame, encode_frame, frame_length, max_frame_len, FRAME_HEADER_LEN, FRAME_OVERHEAD,
    MIN_FRAME_LEN,
};
pub use log_entry::{LogEntry, Operation};
pub use message_type::MessageType;
pub use messages::{
    error_codes, ConnectMessage, ConnectResponseMessage, ErrorMessage, FileDataMessage,
    FileDescriptorAckMessage, FileDescriptorMessage, FileEndAckMessage, FileEndMessage,
    FileListMessage, FileListResponseMessage, FileSyncMessage, StatusAck, SyncEndMessage,
    WireMessage,
};
pub use time::{
    format_timestamp, from_system_time, now, parse_timestamp, to_system_time, Timestamp,
    TIMESTAMP_FORMAT,
};

/// Default data block size: 1 MiB.
pub const DEFAULT_MAX_PACKET_SIZE: i32 = 1024 * 1024;
