//! Server side of backup, restore and two-way sync, once a session is open.

use crate::error::ServerResult;
use crate::policy::{plan_backup, plan_restore, BackupPolicy};
use dirsync_engine::{
    collect_changes, decline_file, delete_file, finish_as_sender, paths, receive_file, resolve_path,
    send_changes, send_file, send_file_list_response, FileLister, MessageTransport,
    ReceiveTarget, StatusAnalyzer, SyncError, TransferStats, WalkDirLister,
};
use dirsync_protocol::{FileInfo, FileListMessage, LogEntry, StatusAck, WireMessage};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// An accepted session bound to one folder.
#[derive(Debug, Clone)]
pub struct Session {
    /// Folder root on the server.
    pub root: PathBuf,
    /// Data block size agreed with the client.
    pub block_size: usize,
    /// Acknowledge everything, change nothing.
    pub dry_run: bool,
}

impl Session {
    fn list_root(&self) -> ServerResult<Vec<FileInfo>> {
        if self.root.is_dir() {
            Ok(WalkDirLister::new().list(&self.root)?)
        } else {
            Ok(Vec::new())
        }
    }

    fn ensure_root(&self) -> ServerResult<()> {
        if !self.dry_run {
            fs::create_dir_all(&self.root)?;
        }
        Ok(())
    }
}

/// Receives uploads for a backup, then applies the policy's deletions.
pub fn run_backup<T: MessageTransport + ?Sized>(
    transport: &mut T,
    session: &Session,
    policy: &dyn BackupPolicy,
    list: FileListMessage,
) -> ServerResult<TransferStats> {
    session.ensure_root()?;
    let plan = plan_backup(policy, &list.files, session.list_root()?);
    info!(
        root = %session.root.display(),
        offered = list.files.len(),
        transfer = plan.files_to_transfer.len(),
        delete = plan.files_to_delete.len(),
        "backup planned"
    );
    let requested = requested_paths(&plan.files_to_transfer);
    send_file_list_response(
        transport,
        plan.files_to_transfer,
        plan.files_to_delete.clone(),
        true,
        session.block_size,
    )?;

    let mut stats = TransferStats::default();
    loop {
        match transport.receive_reply()? {
            WireMessage::FileDescriptor(descriptor) => {
                let file = descriptor.file;
                let stored = policy.storage_path(&file);
                let target = upload_target(transport, &session.root, &file, &stored, &requested)?;
                let Some(target) = target else {
                    continue;
                };
                if receive_one(transport, &file, target, session.dry_run)?.is_some() {
                    stats.files_transferred += 1;
                }
            }
            WireMessage::SyncEnd(_) => {
                for path in &plan.files_to_delete {
                    if delete_file(&session.root, path, session.dry_run)? {
                        stats.files_deleted += 1;
                    }
                }
                transport.send_message(&WireMessage::SyncEndAck(StatusAck::ok()))?;
                return Ok(stats);
            }
            other => {
                return Err(
                    SyncError::unexpected("FileDescriptor or SyncEnd", other.message_type()).into(),
                )
            }
        }
    }
}

/// Tells the client what to fetch and delete, then sends the files.
pub fn run_restore<T: MessageTransport + ?Sized>(
    transport: &mut T,
    session: &Session,
    policy: &dyn BackupPolicy,
    list: FileListMessage,
) -> ServerResult<TransferStats> {
    let (plan, catalog) = plan_restore(policy, &list.files, session.list_root()?);
    info!(
        root = %session.root.display(),
        transfer = plan.files_to_transfer.len(),
        delete = plan.files_to_delete.len(),
        "restore planned"
    );
    let outgoing: Vec<(String, FileInfo)> = plan
        .files_to_transfer
        .iter()
        .filter_map(|f| catalog.get(&f.relative_path))
        .map(|stored| (stored.stored_path.clone(), stored.info.clone()))
        .collect();
    let deleted = plan.files_to_delete.len();
    send_file_list_response(
        transport,
        plan.files_to_transfer,
        plan.files_to_delete,
        false,
        session.block_size,
    )?;

    let mut stats = TransferStats {
        files_deleted: deleted,
        ..TransferStats::default()
    };
    stats.files_transferred = send_files(transport, session, outgoing, &stats)?;
    Ok(stats)
}

/// Reconciles the folder's change log with the client's.
///
/// The server is the local side of the comparison: it applies remote
/// deletions, receives the client's newer files, then announces and sends
/// its own.
pub fn run_two_way<T: MessageTransport + ?Sized>(
    transport: &mut T,
    session: &Session,
) -> ServerResult<TransferStats> {
    let first = match transport.receive_reply()? {
        WireMessage::FileSync(first) => first,
        other => return Err(SyncError::unexpected("FileSync", other.message_type()).into()),
    };
    let remote: BTreeMap<String, LogEntry> = collect_changes(transport, first)?
        .into_iter()
        .map(|entry| (entry.relative_path.clone(), entry))
        .collect();

    session.ensure_root()?;
    let analyzer = StatusAnalyzer::new(&session.root);
    analyzer.analyze()?;
    let actions = analyzer.compare_entries(&remote)?;
    info!(
        root = %session.root.display(),
        send = actions.files_to_send.len(),
        update = actions.files_to_update.len(),
        delete = actions.files_to_delete.len(),
        delete_remote = actions.files_to_delete_remote.len(),
        conflicts = actions.conflicts.len(),
        "two-way sync planned"
    );

    let mut stats = TransferStats {
        conflicts: actions.conflicts.len(),
        ..TransferStats::default()
    };
    let mut adopted = Vec::new();
    for item in &actions.files_to_delete {
        if delete_file(&session.root, &item.relative_path, session.dry_run)? {
            stats.files_deleted += 1;
        }
        adopted.push(item.entry.clone());
    }
    if !session.dry_run {
        analyzer.write_conflicts(&actions.conflicts)?;
    }

    let uploads: Vec<FileInfo> = actions
        .files_to_update
        .iter()
        .map(|item| {
            FileInfo::new(
                item.relative_path.clone(),
                item.entry.size,
                item.entry.file_time,
                item.entry.file_time,
            )
        })
        .collect();
    let remote_deletes: Vec<String> = paths(&actions.files_to_delete_remote)
        .into_iter()
        .map(str::to_string)
        .collect();
    stats.files_deleted += remote_deletes.len();
    let requested = requested_paths(&uploads);
    send_file_list_response(transport, uploads, remote_deletes, false, session.block_size)?;

    loop {
        match transport.receive_reply()? {
            WireMessage::FileDescriptor(descriptor) => {
                let file = descriptor.file;
                let path = file.relative_path.clone();
                let target = upload_target(transport, &session.root, &file, &path, &requested)?;
                let Some(target) = target else {
                    continue;
                };
                let Some(stored) = receive_one(transport, &file, target, session.dry_run)? else {
                    continue;
                };
                stats.files_transferred += 1;
                if let Some(entry) = remote.get(&file.relative_path) {
                    let mut entry = entry.clone();
                    entry.file_time = stored.modification_time;
                    entry.size = stored.size;
                    adopted.push(entry);
                }
            }
            WireMessage::FileSyncAck(ack) => {
                if !ack.success {
                    warn!(
                        error = ack.error_message.as_deref().unwrap_or(""),
                        "client reported upload failure"
                    );
                }
                break;
            }
            other => {
                return Err(SyncError::unexpected(
                    "FileDescriptor or FileSyncAck",
                    other.message_type(),
                )
                .into())
            }
        }
    }
    if !session.dry_run {
        analyzer.record(&adopted)?;
    }

    let mut announced: Vec<LogEntry> = actions
        .files_to_send
        .iter()
        .chain(&actions.files_to_delete_remote)
        .map(|item| item.entry.clone())
        .chain(actions.conflicts.iter().map(|c| c.local.clone()))
        .collect();
    announced.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    send_changes(transport, announced, session.block_size)?;

    let mut outgoing = Vec::with_capacity(actions.files_to_send.len());
    for item in &actions.files_to_send {
        let path = resolve_path(&session.root, &item.relative_path)?;
        match fs::metadata(&path).and_then(|m| FileInfo::from_metadata(&item.relative_path, &m)) {
            Ok(info) => outgoing.push((item.relative_path.clone(), info)),
            Err(err) => warn!(path = %item.relative_path, error = %err, "file vanished before send"),
        }
    }
    stats.files_transferred += send_files(transport, session, outgoing, &stats)?;
    Ok(stats)
}

fn requested_paths(files: &[FileInfo]) -> HashSet<String> {
    files.iter().map(|f| f.relative_path.clone()).collect()
}

/// Where an upload is stored, or `None` after declining it. Only files the
/// server asked for are accepted.
fn upload_target<T: MessageTransport + ?Sized>(
    transport: &mut T,
    root: &Path,
    file: &FileInfo,
    stored_path: &str,
    requested: &HashSet<String>,
) -> ServerResult<Option<PathBuf>> {
    if !requested.contains(&file.relative_path) {
        decline_file(transport, &file.relative_path, "file was not requested")?;
        return Ok(None);
    }
    match resolve_path(root, stored_path) {
        Ok(target) => Ok(Some(target)),
        Err(err) => {
            decline_file(transport, &file.relative_path, &err.to_string())?;
            Ok(None)
        }
    }
}

/// Stores one upload. Failures the client was told about are logged, not
/// returned.
fn receive_one<T: MessageTransport + ?Sized>(
    transport: &mut T,
    file: &FileInfo,
    target: PathBuf,
    dry_run: bool,
) -> ServerResult<Option<FileInfo>> {
    match receive_file(transport, file, &ReceiveTarget::new(target).with_dry_run(dry_run)) {
        Ok(stored) => Ok(stored),
        Err(SyncError::Transfer { path, message }) => {
            warn!(path = %path, error = %message, "upload not stored");
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

/// Waits for `StartRestore`, sends each `(stored path, info)` pair and ends
/// with `SyncEnd`. Returns the number of files the client accepted.
fn send_files<T: MessageTransport + ?Sized>(
    transport: &mut T,
    session: &Session,
    files: Vec<(String, FileInfo)>,
    stats: &TransferStats,
) -> ServerResult<usize> {
    match transport.receive_reply()? {
        WireMessage::StartRestore => {}
        other => return Err(SyncError::unexpected("StartRestore", other.message_type()).into()),
    }
    transport.send_message(&WireMessage::StartRestoreAck)?;

    let mut sent = 0;
    for (stored_path, info) in files {
        let source = resolve_path(&session.root, &stored_path)?;
        if !source.is_file() {
            warn!(path = %stored_path, "file vanished before send");
            continue;
        }
        match send_file(transport, &source, &info, session.block_size) {
            Ok(true) => sent += 1,
            Ok(false) => {}
            Err(SyncError::Transfer { path, message }) => {
                warn!(path = %path, error = %message, "client could not store file");
            }
            Err(err) => return Err(err.into()),
        }
    }
    debug!(sent, "files sent");

    let summary = TransferStats {
        files_transferred: sent,
        ..*stats
    };
    finish_as_sender(transport, false, &summary)?;
    Ok(sent)
}
