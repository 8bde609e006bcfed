//! Client side of backup, restore and two-way sync.

use crate::actions::ConflictItem;
use crate::analyzer::StatusAnalyzer;
use crate::batch::{
    receive_changes, receive_file_list_response, send_changes, send_file_list,
};
use crate::config::ClientConfig;
use crate::error::{SyncError, SyncResult};
use crate::scan::{FileLister, WalkDirLister};
use crate::transfer::{
    decline_file, delete_file, receive_file, resolve_path, send_file, ReceiveTarget,
};
use crate::transport::{MessageTransport, TcpSession};
use dirsync_protocol::{
    ConnectMessage, ConnectResponseMessage, FileInfo, LogEntry, MessageType, StatusAck,
    SyncEndMessage, WireMessage,
};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, info, warn};

/// Counts reported by a finished pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// Files sent or received.
    pub files_transferred: usize,
    /// Files deleted on either side.
    pub files_deleted: usize,
    /// Paths left in conflict.
    pub conflicts: usize,
}

/// Limits agreed in the connect exchange.
#[derive(Debug, Clone)]
pub struct Negotiated {
    /// Data block size.
    pub max_packet_size: usize,
    /// Connection count.
    pub max_connections: usize,
    /// Backup type of the folder.
    pub response: ConnectResponseMessage,
}

/// Runs backup, restore and sync passes against a server.
#[derive(Debug, Clone)]
pub struct SyncClient {
    config: ClientConfig,
}

impl SyncClient {
    /// Creates a client.
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    /// The client's configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Opens a session, retrying while the server reports the folder busy.
    pub fn connect(&self) -> SyncResult<(TcpSession, Negotiated)> {
        MessageType::verify_registry()?;
        let retry = &self.config.retry;
        let mut attempt = 0;
        loop {
            let result = TcpSession::connect(&self.config.server_addr, &self.config.session_config())
                .and_then(|mut session| {
                    let negotiated = self.handshake(&mut session)?;
                    session.set_max_packet_size(negotiated.max_packet_size);
                    Ok((session, negotiated))
                });
            match result {
                Err(err) if err.is_retryable() && attempt + 1 < retry.max_attempts => {
                    attempt += 1;
                    let delay = retry.delay_for_attempt(attempt);
                    warn!(error = %err, attempt, delay_ms = delay.as_millis() as u64, "retrying connect");
                    std::thread::sleep(delay);
                }
                other => return other,
            }
        }
    }

    /// Sends `Connect` and checks the answer.
    pub fn handshake<T: MessageTransport + ?Sized>(&self, transport: &mut T) -> SyncResult<Negotiated> {
        let config = &self.config;
        let mut connect = ConnectMessage::new(
            &config.username,
            &config.password,
            &config.target_folder,
            config.backup_type,
        );
        connect.max_packet_size = config.max_packet_size;
        connect.max_connections = config.max_connections;
        connect.dry_run = config.dry_run;
        transport.send_message(&connect.into())?;

        let response = match transport.receive_reply()? {
            WireMessage::ConnectResponse(response) => response,
            other => return Err(SyncError::unexpected("ConnectResponse", other.message_type())),
        };
        if !response.accepted {
            return Err(SyncError::Rejected(
                response.error_message.unwrap_or_else(|| "no reason given".into()),
            ));
        }
        info!(
            folder = %config.target_folder,
            backup_type = %response.backup_type,
            packet = response.max_packet_size,
            "connected"
        );
        Ok(Negotiated {
            max_packet_size: usize::try_from(response.max_packet_size.max(1)).unwrap_or(1),
            max_connections: usize::try_from(response.max_connections.max(1)).unwrap_or(1),
            response,
        })
    }

    /// Connects and uploads `source` to the server folder.
    pub fn backup(&self, source: &Path) -> SyncResult<TransferStats> {
        let (mut session, negotiated) = self.connect()?;
        self.run_backup(&mut session, &negotiated, source)
    }

    /// Connects and downloads the server folder into `target`.
    pub fn restore(&self, target: &Path) -> SyncResult<TransferStats> {
        let (mut session, negotiated) = self.connect()?;
        self.run_restore(&mut session, &negotiated, target)
    }

    /// Connects and reconciles `root` with the server folder both ways.
    pub fn sync(&self, root: &Path) -> SyncResult<TransferStats> {
        let (mut session, negotiated) = self.connect()?;
        self.run_sync(&mut session, &negotiated, root)
    }

    /// Backup over an already open transport, handshake included.
    pub fn backup_with<T: MessageTransport + ?Sized>(
        &self,
        transport: &mut T,
        source: &Path,
    ) -> SyncResult<TransferStats> {
        let negotiated = self.handshake(transport)?;
        self.run_backup(transport, &negotiated, source)
    }

    /// Restore over an already open transport, handshake included.
    pub fn restore_with<T: MessageTransport + ?Sized>(
        &self,
        transport: &mut T,
        target: &Path,
    ) -> SyncResult<TransferStats> {
        let negotiated = self.handshake(transport)?;
        self.run_restore(transport, &negotiated, target)
    }

    /// Two-way sync over an already open transport, handshake included.
    pub fn sync_with<T: MessageTransport + ?Sized>(
        &self,
        transport: &mut T,
        root: &Path,
    ) -> SyncResult<TransferStats> {
        let negotiated = self.handshake(transport)?;
        self.run_sync(transport, &negotiated, root)
    }

    fn run_backup<T: MessageTransport + ?Sized>(
        &self,
        transport: &mut T,
        negotiated: &Negotiated,
        source: &Path,
    ) -> SyncResult<TransferStats> {
        if !source.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("source folder {} does not exist", source.display()),
            )
            .into());
        }
        let files = WalkDirLister::new().list(source)?;
        info!(source = %source.display(), files = files.len(), "starting backup");
        send_file_list(transport, files, true, negotiated.max_packet_size)?;
        let response = receive_file_list_response(transport)?;

        let mut stats = TransferStats {
            files_deleted: response.files_to_delete.len(),
            ..TransferStats::default()
        };
        for file in &response.files_to_transfer {
            let path = resolve_path(source, &file.relative_path)?;
            if send_file(transport, &path, file, negotiated.max_packet_size)? {
                stats.files_transferred += 1;
            }
        }

        finish_as_sender(transport, true, &stats)?;
        info!(
            transferred = stats.files_transferred,
            deleted = stats.files_deleted,
            "backup finished"
        );
        Ok(stats)
    }

    fn run_restore<T: MessageTransport + ?Sized>(
        &self,
        transport: &mut T,
        negotiated: &Negotiated,
        target: &Path,
    ) -> SyncResult<TransferStats> {
        let dry_run = self.config.dry_run;
        if !dry_run {
            fs::create_dir_all(target)?;
        }
        let files = if target.is_dir() {
            WalkDirLister::new().list(target)?
        } else {
            Vec::new()
        };
        info!(target = %target.display(), files = files.len(), "starting restore");
        send_file_list(transport, files, false, negotiated.max_packet_size)?;
        let response = receive_file_list_response(transport)?;

        let mut stats = TransferStats::default();
        for relative in &response.files_to_delete {
            if delete_file(target, relative, dry_run)? {
                stats.files_deleted += 1;
            }
        }

        let received = receive_files(transport, target, dry_run)?;
        stats.files_transferred = received.len();
        info!(
            transferred = stats.files_transferred,
            deleted = stats.files_deleted,
            "restore finished"
        );
        Ok(stats)
    }

    fn run_sync<T: MessageTransport + ?Sized>(
        &self,
        transport: &mut T,
        negotiated: &Negotiated,
        root: &Path,
    ) -> SyncResult<TransferStats> {
        let dry_run = self.config.dry_run;
        if !dry_run {
            fs::create_dir_all(root)?;
        }
        let analyzer = StatusAnalyzer::new(root);
        let appended = analyzer.analyze()?;
        let local = analyzer.latest_entries()?;
        debug!(root = %root.display(), appended = appended.len(), known = local.len(), "local changes");

        send_changes(transport, local.values().cloned().collect(), negotiated.max_packet_size)?;
        let plan = receive_file_list_response(transport)?;

        let mut stats = TransferStats::default();
        let mut deleted = HashSet::new();
        for relative in &plan.files_to_delete {
            if delete_file(root, relative, dry_run)? {
                stats.files_deleted += 1;
            }
            deleted.insert(relative.clone());
        }
        for file in &plan.files_to_transfer {
            let path = resolve_path(root, &file.relative_path)?;
            if send_file(transport, &path, file, negotiated.max_packet_size)? {
                stats.files_transferred += 1;
            }
        }
        transport.send_message(&WireMessage::FileSyncAck(StatusAck::ok()))?;

        // Server entries for files coming down, files just deleted here and
        // paths in conflict.
        let remote: BTreeMap<String, LogEntry> = receive_changes(transport)?
            .into_iter()
            .map(|entry| (entry.relative_path.clone(), entry))
            .collect();

        let received = receive_files(transport, root, dry_run)?;
        stats.files_transferred += received.len();

        let mut adopted = Vec::new();
        let mut conflicts = Vec::new();
        for (path, entry) in &remote {
            if let Some(info) = received.get(path) {
                let mut entry = entry.clone();
                entry.file_time = info.modification_time;
                entry.size = info.size;
                adopted.push(entry);
            } else if deleted.contains(path) && !entry.operation.is_live() {
                adopted.push(entry.clone());
            } else {
                stats.conflicts += 1;
                warn!(path = %path, "conflict left unresolved");
                if let Some(mine) = local.get(path) {
                    conflicts.push(ConflictItem {
                        relative_path: path.clone(),
                        local: mine.clone(),
                        remote: entry.clone(),
                    });
                }
            }
        }
        if !dry_run {
            analyzer.record(&adopted)?;
            analyzer.write_conflicts(&conflicts)?;
        }
        info!(
            transferred = stats.files_transferred,
            deleted = stats.files_deleted,
            conflicts = stats.conflicts,
            "sync finished"
        );
        Ok(stats)
    }
}

/// Sends `SyncEnd` and waits for a successful `SyncEndAck`.
pub fn finish_as_sender<T: MessageTransport + ?Sized>(
    transport: &mut T,
    is_backup: bool,
    stats: &TransferStats,
) -> SyncResult<()> {
    transport.send_message(
        &SyncEndMessage {
            is_backup,
            files_transferred: i32::try_from(stats.files_transferred).unwrap_or(i32::MAX),
            files_deleted: i32::try_from(stats.files_deleted).unwrap_or(i32::MAX),
        }
        .into(),
    )?;
    match transport.receive_reply()? {
        WireMessage::SyncEndAck(ack) if ack.success => Ok(()),
        WireMessage::SyncEndAck(ack) => Err(SyncError::Rejected(
            ack.error_message.unwrap_or_else(|| "sync end refused".into()),
        )),
        other => Err(SyncError::unexpected("SyncEndAck", other.message_type())),
    }
}

/// Asks the server to start sending, then stores files until `SyncEnd`.
///
/// Returns the stored files by relative path.
fn receive_files<T: MessageTransport + ?Sized>(
    transport: &mut T,
    root: &Path,
    dry_run: bool,
) -> SyncResult<BTreeMap<String, FileInfo>> {
    transport.send_message(&WireMessage::StartRestore)?;
    match transport.receive_reply()? {
        WireMessage::StartRestoreAck => {}
        other => return Err(SyncError::unexpected("StartRestoreAck", other.message_type())),
    }

    let mut received = BTreeMap::new();
    loop {
        match transport.receive_reply()? {
            WireMessage::FileDescriptor(descriptor) => {
                let file = descriptor.file;
                let target = match resolve_path(root, &file.relative_path) {
                    Ok(path) => ReceiveTarget::new(path).with_dry_run(dry_run),
                    Err(err) => {
                        decline_file(transport, &file.relative_path, &err.to_string())?;
                        continue;
                    }
                };
                match receive_file(transport, &file, &target) {
                    Ok(Some(info)) => {
                        received.insert(file.relative_path.clone(), info);
                    }
                    Ok(None) => {}
                    Err(SyncError::Transfer { path, message }) => {
                        warn!(path = %path, error = %message, "file not stored");
                    }
                    Err(err) => return Err(err),
                }
            }
            WireMessage::SyncEnd(end) => {
                debug!(
                    transferred = end.files_transferred,
                    deleted = end.files_deleted,
                    "server finished sending"
                );
                transport.send_message(&WireMessage::SyncEndAck(StatusAck::ok()))?;
                return Ok(received);
            }
            other => {
                return Err(SyncError::unexpected(
                    "FileDescriptor or SyncEnd",
                    other.message_type(),
                ))
            }
        }
    }
}
