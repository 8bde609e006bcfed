//! Multi-part file lists and change sets.
//!
//! A list whose text would not fit in one frame is split into numbered
//! parts. The sender writes every part back to back; the receiver collects
//! them all before answering.

use crate::error::{SyncError, SyncResult};
use crate::transport::MessageTransport;
use dirsync_protocol::{
    FileInfo, FileListMessage, FileListResponseMessage, FileSyncMessage, LogEntry, WireMessage,
};

/// Splits `items` into chunks whose summed sizes stay within `max_bytes`.
///
/// Always returns at least one (possibly empty) chunk; an item larger than
/// the limit gets a chunk of its own.
pub fn split_by_size<T>(
    items: Vec<T>,
    max_bytes: usize,
    size_of: impl Fn(&T) -> usize,
) -> Vec<Vec<T>> {
    let mut chunks = vec![Vec::new()];
    let mut used = 0;
    for item in items {
        let size = size_of(&item) + 1;
        let current = chunks.last().map_or(0, Vec::len);
        if current > 0 && used + size > max_bytes {
            chunks.push(Vec::new());
            used = 0;
        }
        used += size;
        if let Some(chunk) = chunks.last_mut() {
            chunk.push(item);
        }
    }
    chunks
}

fn part_count(parts: usize) -> i32 {
    i32::try_from(parts).unwrap_or(i32::MAX)
}

fn file_line_len(file: &FileInfo) -> usize {
    file.to_line().len()
}

/// Sends a file catalogue in as many parts as needed.
pub fn send_file_list<T: MessageTransport + ?Sized>(
    transport: &mut T,
    files: Vec<FileInfo>,
    is_backup: bool,
    max_bytes: usize,
) -> SyncResult<()> {
    let chunks = split_by_size(files, max_bytes, file_line_len);
    let total_parts = part_count(chunks.len());
    for (index, files) in chunks.into_iter().enumerate() {
        transport.send_message(
            &FileListMessage {
                files,
                is_backup,
                part_number: part_count(index + 1),
                total_parts,
            }
            .into(),
        )?;
    }
    Ok(())
}

/// Collects the remaining parts of a file catalogue.
pub fn collect_file_list<T: MessageTransport + ?Sized>(
    transport: &mut T,
    first: FileListMessage,
) -> SyncResult<FileListMessage> {
    let mut list = first;
    let mut part = list.part_number;
    while part < list.total_parts {
        match transport.receive_reply()? {
            WireMessage::FileList(next) if next.part_number == part + 1 => {
                part = next.part_number;
                list.files.extend(next.files);
            }
            other => return Err(SyncError::unexpected("next FileList part", other.message_type())),
        }
    }
    list.part_number = list.total_parts;
    Ok(list)
}

/// Sends a transfer/delete answer in as many parts as needed.
pub fn send_file_list_response<T: MessageTransport + ?Sized>(
    transport: &mut T,
    files_to_transfer: Vec<FileInfo>,
    files_to_delete: Vec<String>,
    is_backup: bool,
    max_bytes: usize,
) -> SyncResult<()> {
    let mut transfers = split_by_size(files_to_transfer, max_bytes / 2, file_line_len).into_iter();
    let mut deletes = split_by_size(files_to_delete, max_bytes / 2, String::len).into_iter();
    let total = transfers.len().max(deletes.len());
    let total_parts = part_count(total);
    for index in 0..total {
        transport.send_message(
            &FileListResponseMessage {
                files_to_transfer: transfers.next().unwrap_or_default(),
                files_to_delete: deletes.next().unwrap_or_default(),
                is_backup,
                part_number: part_count(index + 1),
                total_parts,
            }
            .into(),
        )?;
    }
    Ok(())
}

/// Receives every part of a transfer/delete answer.
pub fn receive_file_list_response<T: MessageTransport + ?Sized>(
    transport: &mut T,
) -> SyncResult<FileListResponseMessage> {
    let mut response = match transport.receive_reply()? {
        WireMessage::FileListResponse(response) => response,
        other => return Err(SyncError::unexpected("FileListResponse", other.message_type())),
    };
    let mut part = response.part_number;
    while part < response.total_parts {
        match transport.receive_reply()? {
            WireMessage::FileListResponse(next) if next.part_number == part + 1 => {
                part = next.part_number;
                response.files_to_transfer.extend(next.files_to_transfer);
                response.files_to_delete.extend(next.files_to_delete);
            }
            other => {
                return Err(SyncError::unexpected(
                    "next FileListResponse part",
                    other.message_type(),
                ))
            }
        }
    }
    response.part_number = response.total_parts;
    Ok(response)
}

/// Sends log entries in as many parts as needed.
pub fn send_changes<T: MessageTransport + ?Sized>(
    transport: &mut T,
    changes: Vec<LogEntry>,
    max_bytes: usize,
) -> SyncResult<()> {
    let chunks = split_by_size(changes, max_bytes, |entry| entry.to_line().len());
    let total_parts = part_count(chunks.len());
    for (index, changes) in chunks.into_iter().enumerate() {
        transport.send_message(
            &FileSyncMessage {
                changes,
                part_number: part_count(index + 1),
                total_parts,
            }
            .into(),
        )?;
    }
    Ok(())
}

/// Collects the remaining parts of a change set.
pub fn collect_changes<T: MessageTransport + ?Sized>(
    transport: &mut T,
    first: FileSyncMessage,
) -> SyncResult<Vec<LogEntry>> {
    let mut part = first.part_number;
    let total = first.total_parts;
    let mut changes = first.changes;
    while part < total {
        match transport.receive_reply()? {
            WireMessage::FileSync(next) if next.part_number == part + 1 => {
                part = next.part_number;
                changes.extend(next.changes);
            }
            other => return Err(SyncError::unexpected("next FileSync part", other.message_type())),
        }
    }
    Ok(changes)
}

/// Receives a complete change set.
pub fn receive_changes<T: MessageTransport + ?Sized>(transport: &mut T) -> SyncResult<Vec<LogEntry>> {
    match transport.receive_reply()? {
        WireMessage::FileSync(first) => collect_changes(transport, first),
        other => Err(SyncError::unexpected("FileSync", other.message_type())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use dirsync_protocol::now;

    fn files(count: usize) -> Vec<FileInfo> {
        let t = now();
        (0..count)
            .map(|i| FileInfo::new(format!("dir/file-{i:04}.dat"), i as u64, t, t))
            .collect()
    }

    #[test]
    fn split_respects_limit() {
        let chunks = split_by_size(vec!["aaaa", "bbbb", "cccc"], 10, |s| s.len());
        assert_eq!(chunks, vec![vec!["aaaa", "bbbb"], vec!["cccc"]]);
    }

    #[test]
    fn split_empty_gives_one_chunk() {
        let chunks = split_by_size(Vec::<String>::new(), 10, String::len);
        assert_eq!(chunks, vec![Vec::<String>::new()]);
    }

    #[test]
    fn oversized_item_gets_own_chunk() {
        let chunks = split_by_size(vec!["x", "a-very-long-item", "y"], 4, |s| s.len());
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1], vec!["a-very-long-item"]);
    }

    #[test]
    fn file_list_parts_reassemble() {
        let mut sender = MockTransport::new();
        send_file_list(&mut sender, files(50), true, 400).unwrap();
        assert!(sender.sent().len() > 1);

        let mut receiver = MockTransport::with_script(sender.sent().iter().skip(1).cloned());
        let WireMessage::FileList(first) = sender.sent()[0].clone() else {
            panic!("expected FileList");
        };
        let list = collect_file_list(&mut receiver, first).unwrap();
        assert_eq!(list.files.len(), 50);
        assert_eq!(list.files[49].relative_path, "dir/file-0049.dat");
        assert!(list.is_backup);
    }

    #[test]
    fn response_parts_reassemble() {
        let deletes: Vec<String> = (0..30).map(|i| format!("old/{i}")).collect();
        let mut sender = MockTransport::new();
        send_file_list_response(&mut sender, files(20), deletes, false, 300).unwrap();

        let mut receiver = MockTransport::with_script(sender.sent().iter().cloned());
        let response = receive_file_list_response(&mut receiver).unwrap();
        assert_eq!(response.files_to_transfer.len(), 20);
        assert_eq!(response.files_to_delete.len(), 30);
        assert!(!response.is_backup);
    }

    #[test]
    fn empty_change_set_is_one_part() {
        let mut sender = MockTransport::new();
        send_changes(&mut sender, Vec::new(), 1024).unwrap();
        assert_eq!(sender.sent().len(), 1);

        let mut receiver = MockTransport::with_script(sender.sent().iter().cloned());
        assert!(receive_changes(&mut receiver).unwrap().is_empty());
    }

    #[test]
    fn out_of_order_part_is_rejected() {
        let first = FileSyncMessage {
            changes: Vec::new(),
            part_number: 1,
            total_parts: 3,
        };
        let mut receiver = MockTransport::with_script([WireMessage::FileSync(FileSyncMessage {
            changes: Vec::new(),
            part_number: 3,
            total_parts: 3,
        })]);
        assert!(matches!(
            collect_changes(&mut receiver, first),
            Err(SyncError::UnexpectedMessage { .. })
        ));
    }
}
