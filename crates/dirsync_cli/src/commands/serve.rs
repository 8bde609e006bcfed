//! Serve command implementation.

use dirsync_server::{ServerConfig, ServerSettings, SyncServer};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Loads the settings file and serves until the process is stopped.
///
/// A missing settings file is created with default values.
pub fn run(settings_path: &Path, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    let settings = ServerSettings::load(settings_path)?;
    settings.validate()?;
    info!(
        settings = %settings_path.display(),
        users = settings.users.len(),
        folders = settings.backup_folders.len(),
        "settings loaded"
    );
    for folder in &settings.backup_folders {
        println!(
            "  {:<20} {:<14} {}",
            folder.virtual_name,
            folder.backup_type.to_string(),
            folder.real_path.display()
        );
    }

    let config = ServerConfig::from_settings(&settings).with_dry_run(dry_run);
    let server = SyncServer::bind(config, Arc::new(settings))?;
    println!("Listening on {}", server.local_addr());
    server.serve()?;
    Ok(())
}
