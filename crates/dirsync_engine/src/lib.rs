//! # dirsync Engine
//!
//! Change tracking and transfer machinery shared by the dirsync client and
//! server.
//!
//! This crate provides:
//! - [`StatusAnalyzer`], which records what changed under a sync root in an
//!   append-only operation log and compacts it
//! - [`SyncActions`], the comparison of two logs into sends, updates,
//!   deletions and conflicts
//! - Block-wise file transfer over any [`MessageTransport`]
//! - [`SyncClient`] with backup, restore and two-way sync flows
//!
//! ## Operation log
//!
//! Each root keeps `.operation.log` with one line per change:
//!
//! ```text
//! run_start|op_time|file_time|size|CR|MO|DE|relative/path
//! ```
//!
//! The latest entry for a path wins. A two-way sync compares the latest
//! entries of both sides and records what it adopted, so a second pass
//! over unchanged trees does nothing.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod actions;
mod analyzer;
mod batch;
mod changelog;
mod client;
mod config;
mod error;
mod scan;
mod transfer;
mod transport;

pub use actions::{paths, resolve, ConflictItem, Resolution, SyncActions, SyncItem};
pub use analyzer::StatusAnalyzer;
pub use batch::{
    collect_changes, collect_file_list, receive_changes, receive_file_list_response,
    send_changes, send_file_list, send_file_list_response, split_by_size,
};
pub use changelog::{
    is_state_file, read_marker, reduce_latest, write_marker, ChangeLog, CONFLICTS, LAST_COMPACT,
    LAST_UPDATE, LOCK_FILE, OPERATION_LOG,
};
pub use client::{finish_as_sender, Negotiated, SyncClient, TransferStats};
pub use config::{ClientConfig, RetryConfig, SessionConfig};
pub use error::{SyncError, SyncResult};
pub use scan::{has_line_break, FileLister, WalkDirLister};
pub use transfer::{
    decline_file, delete_file, receive_file, resolve_path, send_file, ReceiveTarget,
    PARTIAL_SUFFIX,
};
pub use transport::{MessageTransport, MockTransport, TcpSession};
