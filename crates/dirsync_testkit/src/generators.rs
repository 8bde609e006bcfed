//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data
//! that maintains required invariants.

use chrono::{TimeZone, Utc};
use dirsync_protocol::{
    BackupType, FileDataMessage, FileInfo, FileSyncMessage, LogEntry, Operation, Timestamp,
    WireMessage,
};
use proptest::prelude::*;

/// Strategy for timestamps between 2000 and 2100, whole seconds.
pub fn timestamp_strategy() -> impl Strategy<Value = Timestamp> {
    (946_684_800i64..4_102_444_800i64).prop_map(|secs| {
        Utc.timestamp_opt(secs, 0)
            .single()
            .expect("timestamp in range")
    })
}

/// Strategy for normalised relative paths (`a/b/c.txt`).
///
/// Segments never start with a dot, so generated paths never collide with
/// state files.
pub fn relative_path_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop::string::string_regex("[a-zA-Z0-9_][a-zA-Z0-9_ .-]{0,11}").expect("Invalid regex"),
        1..4,
    )
    .prop_map(|segments| segments.join("/"))
}

/// Strategy for operation codes.
pub fn operation_strategy() -> impl Strategy<Value = Operation> {
    prop_oneof![
        Just(Operation::Created),
        Just(Operation::Modified),
        Just(Operation::Deleted),
    ]
}

/// Strategy for backup types.
pub fn backup_type_strategy() -> impl Strategy<Value = BackupType> {
    prop::sample::select(BackupType::ALL.to_vec())
}

/// Strategy for file records.
pub fn file_info_strategy() -> impl Strategy<Value = FileInfo> {
    (
        relative_path_strategy(),
        0u64..(1 << 40),
        timestamp_strategy(),
        timestamp_strategy(),
        any::<bool>(),
    )
        .prop_map(|(path, size, created, modified, is_directory)| {
            let mut info = FileInfo::new(path, size, created, modified);
            info.is_directory = is_directory;
            info
        })
}

/// Strategy for operation log entries.
pub fn log_entry_strategy() -> impl Strategy<Value = LogEntry> {
    (
        timestamp_strategy(),
        timestamp_strategy(),
        timestamp_strategy(),
        0u64..(1 << 40),
        operation_strategy(),
        relative_path_strategy(),
    )
        .prop_map(
            |(run_start, op_time, file_time, size, operation, relative_path)| LogEntry {
                run_start,
                op_time,
                file_time,
                size,
                operation,
                relative_path,
            },
        )
}

/// Strategy for a few representative wire messages.
pub fn wire_message_strategy() -> impl Strategy<Value = WireMessage> {
    prop_oneof![
        (relative_path_strategy(), 0i32..1000, prop::collection::vec(any::<u8>(), 0..256)).prop_map(
            |(relative_path, block_number, data)| {
                WireMessage::FileData(FileDataMessage {
                    relative_path,
                    block_number,
                    total_blocks: block_number + 1,
                    data,
                })
            }
        ),
        prop::collection::vec(log_entry_strategy(), 0..8)
            .prop_map(|changes| WireMessage::FileSync(FileSyncMessage::single(changes))),
        Just(WireMessage::KeepAlive),
        Just(WireMessage::StartRestore),
    ]
}
