//! A real server on a loopback port, for end-to-end tests.

use crate::fixtures::TestTree;
use dirsync_engine::{ClientConfig, RetryConfig, SyncClient};
use dirsync_protocol::BackupType;
use dirsync_server::{BackupFolder, ServerConfig, ServerResult, ServerSettings, SyncServer};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// User every loopback server knows.
pub const TEST_USER: &str = "tester";
/// Password of [`TEST_USER`].
pub const TEST_PASSWORD: &str = "secret";

/// A server bound to `127.0.0.1:0`, serving folders under a temporary
/// directory. Stops and joins its accept thread when dropped.
pub struct LoopbackServer {
    server: Arc<SyncServer>,
    runner: Option<JoinHandle<ServerResult<()>>>,
    storage: TestTree,
}

impl LoopbackServer {
    /// Starts a server exposing one folder per `(name, backup type)` pair.
    ///
    /// Folder `name` lives at `storage/name` and only [`TEST_USER`] may use
    /// it.
    pub fn start(folders: &[(&str, BackupType)]) -> Self {
        Self::start_with(folders, |config| config)
    }

    /// Like [`start`](Self::start), with a chance to adjust the server
    /// configuration.
    pub fn start_with(
        folders: &[(&str, BackupType)],
        configure: impl FnOnce(ServerConfig) -> ServerConfig,
    ) -> Self {
        let storage = TestTree::new();
        let mut settings = ServerSettings::empty();
        let user = settings.add_user(TEST_USER, TEST_PASSWORD);
        for (name, backup_type) in folders {
            settings.add_folder(
                BackupFolder::new(*name, storage.join(name), *backup_type).with_user(user),
            );
        }

        let config = configure(
            ServerConfig::new("127.0.0.1:0".parse().expect("Invalid address"))
                .with_io_timeout(Some(Duration::from_secs(10))),
        );
        let server =
            Arc::new(SyncServer::bind(config, Arc::new(settings)).expect("Failed to bind server"));
        let runner = {
            let server = Arc::clone(&server);
            thread::spawn(move || server.serve())
        };
        Self {
            server,
            runner: Some(runner),
            storage,
        }
    }

    /// Address clients connect to.
    pub fn addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    /// The running server.
    pub fn server(&self) -> &SyncServer {
        &self.server
    }

    /// Directory backing folder `name`.
    pub fn folder_path(&self, name: &str) -> PathBuf {
        self.storage.join(name)
    }

    /// Client configuration for folder `name`, without retries.
    pub fn client_config(&self, name: &str, backup_type: BackupType) -> ClientConfig {
        ClientConfig::new(self.addr().to_string(), TEST_USER, TEST_PASSWORD, name)
            .with_backup_type(backup_type)
            .with_timeout(Some(Duration::from_secs(10)))
            .with_retry(RetryConfig::no_retry())
    }

    /// Client for folder `name`.
    pub fn client(&self, name: &str, backup_type: BackupType) -> SyncClient {
        SyncClient::new(self.client_config(name, backup_type))
    }
}

impl Drop for LoopbackServer {
    fn drop(&mut self) {
        self.server.shutdown();
        if let Some(runner) = self.runner.take() {
            let _ = runner.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_and_stops() {
        let server = LoopbackServer::start(&[("docs", BackupType::Preserve)]);
        assert_eq!(server.addr().ip().to_string(), "127.0.0.1");
        assert_ne!(server.addr().port(), 0);
        assert!(server.server().active_sessions().is_empty());
        assert!(server.folder_path("docs").ends_with("docs"));
    }
}
