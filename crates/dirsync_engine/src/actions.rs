//! Reconciliation of two operation logs.
//!
//! Each side is reduced to its latest [`LogEntry`] per path. For every path
//! present on either side, [`resolve`] picks one [`Resolution`]:
//!
//! | Local | Remote | Result |
//! |-------|--------|--------|
//! | CR/MO | absent | send |
//! | absent | CR/MO | update |
//! | DE | CR/MO older | delete remote |
//! | DE | CR/MO same time | conflict |
//! | DE | CR/MO newer | update |
//! | CR/MO older | DE | delete local |
//! | CR/MO same time | DE | conflict |
//! | CR/MO newer | DE | send |
//! | CR/MO | CR/MO | newer operation wins, then newer file; same file time with a different size is a conflict |
//! | DE or absent | DE or absent | nothing |

use dirsync_protocol::LogEntry;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// A path and the entry that decided its action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncItem {
    /// Relative path.
    pub relative_path: String,
    /// Winning entry.
    pub entry: LogEntry,
}

/// A path changed on both sides without a time order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictItem {
    /// Relative path.
    pub relative_path: String,
    /// Local entry.
    pub local: LogEntry,
    /// Remote entry.
    pub remote: LogEntry,
}

/// Outcome for one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Copy local to remote.
    Send,
    /// Copy remote to local.
    Update,
    /// Delete the local copy.
    DeleteLocal,
    /// Delete the remote copy.
    DeleteRemote,
    /// Both changed; leave both alone.
    Conflict,
    /// Already in agreement.
    Nothing,
}

/// Decides what to do with one path.
pub fn resolve(local: Option<&LogEntry>, remote: Option<&LogEntry>) -> Resolution {
    let local = local.filter(|e| e.operation.is_live()).map_or(Side::Gone(local), Side::Live);
    let remote = remote.filter(|e| e.operation.is_live()).map_or(Side::Gone(remote), Side::Live);

    match (local, remote) {
        (Side::Live(_), Side::Gone(None)) => Resolution::Send,
        (Side::Gone(None), Side::Live(_)) => Resolution::Update,
        (Side::Gone(_), Side::Gone(_)) => Resolution::Nothing,
        (Side::Gone(Some(deleted)), Side::Live(edited)) => {
            match deleted.op_time.cmp(&edited.op_time) {
                Ordering::Greater => Resolution::DeleteRemote,
                Ordering::Equal => Resolution::Conflict,
                Ordering::Less => Resolution::Update,
            }
        }
        (Side::Live(edited), Side::Gone(Some(deleted))) => {
            match edited.op_time.cmp(&deleted.op_time) {
                Ordering::Less => Resolution::DeleteLocal,
                Ordering::Equal => Resolution::Conflict,
                Ordering::Greater => Resolution::Send,
            }
        }
        (Side::Live(l), Side::Live(r)) => match l.op_time.cmp(&r.op_time) {
            Ordering::Greater => Resolution::Send,
            Ordering::Less => Resolution::Update,
            Ordering::Equal => match l.file_time.cmp(&r.file_time) {
                Ordering::Greater => Resolution::Send,
                Ordering::Less => Resolution::Update,
                Ordering::Equal if l.size != r.size => Resolution::Conflict,
                Ordering::Equal => Resolution::Nothing,
            },
        },
    }
}

enum Side<'a> {
    Live(&'a LogEntry),
    Gone(Option<&'a LogEntry>),
}

/// The five action sets produced by comparing two logs.
///
/// Every set is sorted by path and no path appears in more than one set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncActions {
    /// Local files to copy to the remote side.
    pub files_to_send: Vec<SyncItem>,
    /// Remote files to copy to the local side.
    pub files_to_update: Vec<SyncItem>,
    /// Local files to delete (entry is the remote deletion).
    pub files_to_delete: Vec<SyncItem>,
    /// Remote files to delete (entry is the local deletion).
    pub files_to_delete_remote: Vec<SyncItem>,
    /// Paths needing outside resolution.
    pub conflicts: Vec<ConflictItem>,
}

impl SyncActions {
    /// Compares two reduced logs.
    pub fn between(
        local: &BTreeMap<String, LogEntry>,
        remote: &BTreeMap<String, LogEntry>,
    ) -> Self {
        let paths: BTreeSet<&String> = local.keys().chain(remote.keys()).collect();
        let mut actions = Self::default();

        for path in paths {
            let l = local.get(path);
            let r = remote.get(path);
            let item = |entry: Option<&LogEntry>| {
                entry.map(|entry| SyncItem {
                    relative_path: path.clone(),
                    entry: entry.clone(),
                })
            };
            match resolve(l, r) {
                Resolution::Send => actions.files_to_send.extend(item(l)),
                Resolution::Update => actions.files_to_update.extend(item(r)),
                Resolution::DeleteLocal => actions.files_to_delete.extend(item(r)),
                Resolution::DeleteRemote => actions.files_to_delete_remote.extend(item(l)),
                Resolution::Conflict => {
                    if let (Some(local), Some(remote)) = (l, r) {
                        actions.conflicts.push(ConflictItem {
                            relative_path: path.clone(),
                            local: local.clone(),
                            remote: remote.clone(),
                        });
                    }
                }
                Resolution::Nothing => {}
            }
        }
        actions
    }

    /// Whether nothing needs to happen.
    pub fn is_empty(&self) -> bool {
        self.files_to_send.is_empty()
            && self.files_to_update.is_empty()
            && self.files_to_delete.is_empty()
            && self.files_to_delete_remote.is_empty()
            && self.conflicts.is_empty()
    }

    /// Number of paths with an action or conflict.
    pub fn len(&self) -> usize {
        self.files_to_send.len()
            + self.files_to_update.len()
            + self.files_to_delete.len()
            + self.files_to_delete_remote.len()
            + self.conflicts.len()
    }
}

/// Relative paths of a set of items.
pub fn paths(items: &[SyncItem]) -> Vec<&str> {
    items.iter().map(|item| item.relative_path.as_str()).collect()
}
