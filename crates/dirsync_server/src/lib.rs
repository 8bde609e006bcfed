//! # dirsync Server
//!
//! Backup and two-way sync server for dirsync.
//!
//! This crate provides:
//! - [`ServerSettings`]: users and virtual folders, stored as JSON
//! - Backup policies (mirror, preserve, date-separated)
//! - Per-connection session handling for backup, restore and two-way sync
//! - A blocking TCP accept loop with one thread per connection
//!
//! # Sessions
//!
//! Every connection starts with `Connect`. The server checks the
//! credentials, the user's access to the requested folder and the folder's
//! backup type, then claims the folder: a second session on the same folder
//! is refused with `ERR_BUSY` until the first one ends.
//!
//! A backup folder then expects a `FileList`; a two-way folder expects the
//! client's `FileSync`.

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod policy;
mod server;
mod session;
mod settings;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{ActiveSession, HandlerContext, RequestHandler};
pub use policy::{
    needs_transfer, plan_backup, plan_restore, policy_for, BackupPolicy, DateSeparatedPolicy,
    MirrorPolicy, PreservePolicy, StoredFile, TransferPlan,
};
pub use server::{ShutdownHandle, SyncServer};
pub use session::{run_backup, run_restore, run_two_way, Session};
pub use settings::{
    BackupFolder, ServerSettings, SettingsProvider, User, DEFAULT_MAX_CONNECTIONS, DEFAULT_PORT,
};
