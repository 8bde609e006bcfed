//! Connection handling: authentication, folder claims and dispatch.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::policy::policy_for;
use crate::session::{run_backup, run_restore, run_two_way, Session};
use crate::settings::{BackupFolder, SettingsProvider};
use dirsync_engine::{collect_file_list, MessageTransport, SyncError, TransferStats};
use dirsync_protocol::{
    now, BackupType, ConnectMessage, ConnectResponseMessage, Timestamp, WireMessage,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// A session currently working on a folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSession {
    /// Authenticated user.
    pub username: String,
    /// Virtual folder name.
    pub folder: String,
    /// Folder backup type.
    pub backup_type: BackupType,
    /// When the session was accepted.
    pub started: Timestamp,
}

/// State shared by all connections.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    settings: Arc<dyn SettingsProvider>,
    /// Folder root -> session working on it.
    running: Mutex<HashMap<PathBuf, ActiveSession>>,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, settings: Arc<dyn SettingsProvider>) -> Self {
        Self {
            config,
            settings,
            running: Mutex::new(HashMap::new()),
        }
    }

    /// Sessions currently holding a folder.
    pub fn active_sessions(&self) -> Vec<ActiveSession> {
        self.running.lock().values().cloned().collect()
    }

    /// Claims a folder root for one session. `None` if another session
    /// holds it.
    fn claim(&self, root: PathBuf, session: ActiveSession) -> Option<FolderClaim<'_>> {
        let mut running = self.running.lock();
        if running.contains_key(&root) {
            return None;
        }
        running.insert(root.clone(), session);
        Some(FolderClaim {
            running: &self.running,
            root,
        })
    }
}

/// Releases a folder root when dropped.
struct FolderClaim<'a> {
    running: &'a Mutex<HashMap<PathBuf, ActiveSession>>,
    root: PathBuf,
}

impl Drop for FolderClaim<'_> {
    fn drop(&mut self) {
        self.running.lock().remove(&self.root);
    }
}

/// Runs sessions against the shared context.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Runs one session to completion.
    ///
    /// Failures are reported to the client as an `Error` message before
    /// being returned, unless the connection is already gone.
    pub fn handle<T: MessageTransport + ?Sized>(&self, transport: &mut T) -> ServerResult<TransferStats> {
        let result = self.run(transport);
        if let Err(err) = &result {
            warn!(error = %err, code = err.wire_code(), "session failed");
            if !err.is_disconnect() {
                let report = WireMessage::error(err.wire_code(), err.to_string());
                if let Err(send_err) = transport.send_message(&report) {
                    warn!(error = %send_err, "could not report failure to client");
                }
            }
        }
        result
    }

    fn run<T: MessageTransport + ?Sized>(&self, transport: &mut T) -> ServerResult<TransferStats> {
        let connect = match transport.receive_message()? {
            WireMessage::Connect(connect) => connect,
            other => {
                return Err(ServerError::InvalidRequest(format!(
                    "expected Connect, got {}",
                    other.message_type()
                )))
            }
        };
        let folder = self.authorize(&connect)?;
        let _claim = self
            .context
            .claim(
                folder.real_path.clone(),
                ActiveSession {
                    username: connect.username.clone(),
                    folder: folder.virtual_name.clone(),
                    backup_type: folder.backup_type,
                    started: now(),
                },
            )
            .ok_or_else(|| ServerError::FolderBusy(folder.virtual_name.clone()))?;

        let config = &self.context.config;
        let packet_size = config.negotiate_packet_size(connect.max_packet_size);
        let response = ConnectResponseMessage::accepted(
            packet_size,
            config.negotiate_connections(connect.max_connections),
            folder.backup_type,
        );
        transport.send_message(&response.into())?;

        let session = Session {
            root: folder.real_path.clone(),
            block_size: usize::try_from(packet_size).unwrap_or(1).max(1),
            dry_run: config.dry_run || connect.dry_run,
        };
        info!(
            user = %connect.username,
            folder = %folder.virtual_name,
            backup_type = %folder.backup_type,
            dry_run = session.dry_run,
            "session accepted"
        );

        let stats = if folder.backup_type == BackupType::TwoWaySync {
            run_two_way(transport, &session)?
        } else {
            let policy = policy_for(folder.backup_type)?;
            let list = match transport.receive_reply()? {
                WireMessage::FileList(first) => collect_file_list(transport, first)?,
                other => return Err(SyncError::unexpected("FileList", other.message_type()).into()),
            };
            if list.is_backup {
                run_backup(transport, &session, policy.as_ref(), list)?
            } else {
                run_restore(transport, &session, policy.as_ref(), list)?
            }
        };
        info!(
            folder = %folder.virtual_name,
            transferred = stats.files_transferred,
            deleted = stats.files_deleted,
            conflicts = stats.conflicts,
            "session finished"
        );
        Ok(stats)
    }

    /// Checks credentials, folder access and backup type.
    fn authorize(&self, connect: &ConnectMessage) -> ServerResult<BackupFolder> {
        let settings = &self.context.settings;
        let user = settings
            .authenticate(&connect.username, &connect.password)
            .ok_or_else(|| ServerError::AuthenticationFailed(connect.username.clone()))?;
        let folder = settings
            .user_folder(user.id, &connect.target_folder)
            .ok_or_else(|| ServerError::AccessDenied(connect.target_folder.clone()))?;

        if folder.backup_type == BackupType::None {
            return Err(ServerError::UnsupportedBackupType(BackupType::None));
        }
        let wants_two_way = connect.backup_type == BackupType::TwoWaySync;
        let is_two_way = folder.backup_type == BackupType::TwoWaySync;
        if connect.backup_type != BackupType::None && wants_two_way != is_two_way {
            return Err(ServerError::UnsupportedBackupType(connect.backup_type));
        }
        Ok(folder)
    }
}
