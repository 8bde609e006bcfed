//! # dirsync testkit
//!
//! Test utilities for dirsync.
//!
//! This crate provides:
//! - Temporary directory trees with snapshot helpers
//! - Property-based test generators using proptest
//! - A loopback server for end-to-end sessions
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dirsync_testkit::prelude::*;
//!
//! #[test]
//! fn mirror_backup() {
//!     let server = LoopbackServer::start(&[("docs", BackupType::Mirror)]);
//!     let source = TestTree::with_files([("a.txt", "alpha")]);
//!     server.client("docs", BackupType::Mirror).backup(source.path()).unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod loopback;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::loopback::*;
    pub use dirsync_protocol::BackupType;
}

pub use fixtures::*;
pub use generators::*;
pub use loopback::*;
