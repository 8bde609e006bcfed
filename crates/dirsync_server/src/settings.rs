//! Persistent server settings: users and the folders they may use.
//!
//! Settings live in a JSON file. Loading a missing file creates default
//! settings with a single `admin` user and writes them back.

use crate::error::{ServerError, ServerResult};
use dirsync_protocol::{BackupType, DEFAULT_MAX_PACKET_SIZE};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 8090;

/// Default number of connections per session.
pub const DEFAULT_MAX_CONNECTIONS: i32 = 5;

/// A user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Stable identifier referenced by folders.
    pub id: Uuid,
    /// Login name.
    pub username: String,
    /// Login password.
    pub password: String,
    /// Whether the user administers the server.
    #[serde(default)]
    pub admin: bool,
}

impl User {
    /// Creates a user with a fresh id.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            password: password.into(),
            admin: false,
        }
    }

    /// Marks the user as administrator.
    pub fn with_admin(mut self, admin: bool) -> Self {
        self.admin = admin;
        self
    }
}

/// A folder exposed to clients under a virtual name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupFolder {
    /// Name clients ask for.
    pub virtual_name: String,
    /// Directory on the server.
    pub real_path: PathBuf,
    /// How the folder is kept.
    pub backup_type: BackupType,
    /// Ids of users allowed to use the folder.
    #[serde(default)]
    pub allowed_users: Vec<Uuid>,
}

impl BackupFolder {
    /// Creates a folder nobody may use yet.
    pub fn new(
        virtual_name: impl Into<String>,
        real_path: impl Into<PathBuf>,
        backup_type: BackupType,
    ) -> Self {
        Self {
            virtual_name: virtual_name.into(),
            real_path: real_path.into(),
            backup_type,
            allowed_users: Vec::new(),
        }
    }

    /// Grants a user access.
    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.allowed_users.push(user_id);
        self
    }
}

/// Resolves credentials and virtual folders for incoming sessions.
pub trait SettingsProvider: Send + Sync {
    /// Returns the user matching the credentials.
    fn authenticate(&self, username: &str, password: &str) -> Option<User>;

    /// Returns the folder named `virtual_name` if `user_id` may use it.
    fn user_folder(&self, user_id: Uuid, virtual_name: &str) -> Option<BackupFolder>;
}

/// Contents of the settings file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Listening port.
    pub port: u16,
    /// Largest data block, in bytes.
    pub max_packet_size: i32,
    /// Connections allowed per session.
    pub max_connections: i32,
    /// Accounts.
    #[serde(default)]
    pub users: Vec<User>,
    /// Exposed folders.
    #[serde(default)]
    pub backup_folders: Vec<BackupFolder>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            users: vec![User::new("admin", "admin").with_admin(true)],
            backup_folders: Vec::new(),
        }
    }
}

impl ServerSettings {
    /// Settings with no users and no folders.
    pub fn empty() -> Self {
        Self {
            users: Vec::new(),
            ..Self::default()
        }
    }

    /// Loads settings, creating and saving defaults if the file is missing.
    pub fn load(path: &Path) -> ServerResult<Self> {
        if !path.exists() {
            let settings = Self::default();
            settings.save(path)?;
            info!(path = %path.display(), "created default settings");
            return Ok(settings);
        }
        let text = fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Writes the settings as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> ServerResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Adds a user and returns its id.
    pub fn add_user(&mut self, username: impl Into<String>, password: impl Into<String>) -> Uuid {
        let user = User::new(username, password);
        let id = user.id;
        self.users.push(user);
        id
    }

    /// Adds a folder.
    pub fn add_folder(&mut self, folder: BackupFolder) {
        self.backup_folders.push(folder);
    }

    /// Checks that names are unique and sizes positive.
    pub fn validate(&self) -> ServerResult<()> {
        if self.max_packet_size <= 0 {
            return Err(ServerError::Settings(format!(
                "max_packet_size must be positive, got {}",
                self.max_packet_size
            )));
        }
        if self.max_connections <= 0 {
            return Err(ServerError::Settings(format!(
                "max_connections must be positive, got {}",
                self.max_connections
            )));
        }
        for (index, folder) in self.backup_folders.iter().enumerate() {
            if self.backup_folders[..index]
                .iter()
                .any(|f| f.virtual_name == folder.virtual_name)
            {
                return Err(ServerError::Settings(format!(
                    "duplicate folder name {:?}",
                    folder.virtual_name
                )));
            }
        }
        for (index, user) in self.users.iter().enumerate() {
            if self.users[..index].iter().any(|u| u.username == user.username) {
                return Err(ServerError::Settings(format!(
                    "duplicate user name {:?}",
                    user.username
                )));
            }
        }
        Ok(())
    }
}

impl SettingsProvider for ServerSettings {
    fn authenticate(&self, username: &str, password: &str) -> Option<User> {
        self.users
            .iter()
            .find(|u| u.username == username && u.password == password)
            .cloned()
    }

    fn user_folder(&self, user_id: Uuid, virtual_name: &str) -> Option<BackupFolder> {
        self.backup_folders
            .iter()
            .find(|f| f.virtual_name == virtual_name && f.allowed_users.contains(&user_id))
            .cloned()
    }
}
