//! Backup, restore and sync commands.

use dirsync_engine::{ClientConfig, SyncClient, TransferStats};
use dirsync_protocol::BackupType;
use std::path::Path;

/// Connection options shared by the client commands.
#[derive(Debug, Clone)]
pub struct Remote {
    /// Server address, `host:port`.
    pub server: String,
    /// User name.
    pub user: String,
    /// Password.
    pub password: String,
    /// Virtual folder on the server.
    pub folder: String,
    /// Acknowledge everything, write nothing.
    pub dry_run: bool,
}

impl Remote {
    fn client(&self, backup_type: BackupType) -> SyncClient {
        SyncClient::new(
            ClientConfig::new(&self.server, &self.user, &self.password, &self.folder)
                .with_backup_type(backup_type)
                .with_dry_run(self.dry_run),
        )
    }
}

/// Uploads `source` into the remote folder.
pub fn backup(remote: &Remote, source: &Path) -> Result<(), Box<dyn std::error::Error>> {
    // The server applies the folder's own policy.
    let stats = remote.client(BackupType::None).backup(source)?;
    report("Backup", remote, &stats);
    Ok(())
}

/// Downloads the remote folder into `target`.
pub fn restore(remote: &Remote, target: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let stats = remote.client(BackupType::None).restore(target)?;
    report("Restore", remote, &stats);
    Ok(())
}

/// Reconciles `root` with a two-way folder.
pub fn sync(remote: &Remote, root: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let stats = remote.client(BackupType::TwoWaySync).sync(root)?;
    report("Sync", remote, &stats);
    if stats.conflicts > 0 {
        println!("  See {} for details", root.join(dirsync_engine::CONFLICTS).display());
    }
    Ok(())
}

fn report(what: &str, remote: &Remote, stats: &TransferStats) {
    if remote.dry_run {
        println!("{what} of '{}' (dry run, nothing written):", remote.folder);
    } else {
        println!("{what} of '{}':", remote.folder);
    }
    println!("  Files transferred: {}", stats.files_transferred);
    println!("  Files deleted:     {}", stats.files_deleted);
    println!("  Conflicts:         {}", stats.conflicts);
}
