//! Backup policies: where uploaded files are stored and what gets deleted.
//!
//! - [`MirrorPolicy`] keeps the server folder identical to the client on
//!   backup, and the client identical to the server on restore
//! - [`PreservePolicy`] never deletes
//! - [`DateSeparatedPolicy`] stores each file under a `YYYY-MM-DD/`
//!   directory named after its modification date and never deletes
//!
//! Two-way folders are handled by the change log instead of a policy.

use crate::error::{ServerError, ServerResult};
use chrono::NaiveDate;
use dirsync_protocol::{BackupType, FileInfo};
use std::collections::{BTreeMap, HashSet};

/// A server file as seen by a restoring client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Metadata under the client's relative path.
    pub info: FileInfo,
    /// Location under the folder root.
    pub stored_path: String,
}

/// Files to move and files to delete for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferPlan {
    /// Files the sender must transfer.
    pub files_to_transfer: Vec<FileInfo>,
    /// Paths the receiver must delete.
    pub files_to_delete: Vec<String>,
}

/// Storage rules for one [`BackupType`].
pub trait BackupPolicy: Send + Sync {
    /// The type this policy implements.
    fn backup_type(&self) -> BackupType;

    /// Relative location of an uploaded file under the folder root.
    fn storage_path(&self, file: &FileInfo) -> String {
        file.relative_path.clone()
    }

    /// Maps the folder's files to the paths a client restores them to.
    fn catalog(&self, stored: Vec<FileInfo>) -> BTreeMap<String, StoredFile> {
        stored
            .into_iter()
            .filter(|f| !f.is_directory)
            .map(|info| {
                let stored_path = info.relative_path.clone();
                (stored_path.clone(), StoredFile { info, stored_path })
            })
            .collect()
    }

    /// Whether backup removes server files the client no longer has.
    fn deletes_on_backup(&self) -> bool {
        false
    }

    /// Whether restore removes client files the server does not have.
    fn deletes_on_restore(&self) -> bool {
        false
    }
}

/// Exact copy in both directions.
#[derive(Debug, Clone, Copy, Default)]
pub struct MirrorPolicy;

impl BackupPolicy for MirrorPolicy {
    fn backup_type(&self) -> BackupType {
        BackupType::Mirror
    }

    fn deletes_on_backup(&self) -> bool {
        true
    }

    fn deletes_on_restore(&self) -> bool {
        true
    }
}

/// Adds and updates, never deletes.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreservePolicy;

impl BackupPolicy for PreservePolicy {
    fn backup_type(&self) -> BackupType {
        BackupType::Preserve
    }
}

/// Buckets uploads by modification date.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateSeparatedPolicy;

impl DateSeparatedPolicy {
    const DATE_FORMAT: &'static str = "%Y-%m-%d";

    /// Splits `YYYY-MM-DD/rest` into the rest, if the prefix is a date.
    fn strip_date(path: &str) -> Option<&str> {
        let (first, rest) = path.split_once('/')?;
        NaiveDate::parse_from_str(first, Self::DATE_FORMAT).ok()?;
        (!rest.is_empty()).then_some(rest)
    }
}

impl BackupPolicy for DateSeparatedPolicy {
    fn backup_type(&self) -> BackupType {
        BackupType::DateSeparated
    }

    fn storage_path(&self, file: &FileInfo) -> String {
        format!(
            "{}/{}",
            file.modification_time.format(Self::DATE_FORMAT),
            file.relative_path
        )
    }

    fn catalog(&self, stored: Vec<FileInfo>) -> BTreeMap<String, StoredFile> {
        let mut catalog: BTreeMap<String, StoredFile> = BTreeMap::new();
        for info in stored.into_iter().filter(|f| !f.is_directory) {
            let stored_path = info.relative_path.clone();
            let client_path = Self::strip_date(&stored_path)
                .unwrap_or(&stored_path)
                .to_string();
            let newer = catalog
                .get(&client_path)
                .map_or(true, |existing| info.modification_time > existing.info.modification_time);
            if newer {
                let mut info = info;
                info.relative_path = client_path.clone();
                catalog.insert(client_path, StoredFile { info, stored_path });
            }
        }
        catalog
    }
}

/// Returns the policy for a backup-only folder.
pub fn policy_for(backup_type: BackupType) -> ServerResult<Box<dyn BackupPolicy>> {
    match backup_type {
        BackupType::Mirror => Ok(Box::new(MirrorPolicy)),
        BackupType::Preserve => Ok(Box::new(PreservePolicy)),
        BackupType::DateSeparated => Ok(Box::new(DateSeparatedPolicy)),
        BackupType::None | BackupType::TwoWaySync => {
            Err(ServerError::UnsupportedBackupType(backup_type))
        }
    }
}

/// True when `target` is missing, differs in size or is older than `source`.
pub fn needs_transfer(source: &FileInfo, target: Option<&FileInfo>) -> bool {
    match target {
        None => true,
        Some(target) => {
            target.size != source.size || source.modification_time > target.modification_time
        }
    }
}

/// Decides what a backup uploads and removes.
///
/// `client_files` is the client's catalogue, `server_files` the folder
/// listing with paths relative to the folder root.
pub fn plan_backup(
    policy: &dyn BackupPolicy,
    client_files: &[FileInfo],
    server_files: Vec<FileInfo>,
) -> TransferPlan {
    let server: BTreeMap<String, FileInfo> = server_files
        .into_iter()
        .filter(|f| !f.is_directory)
        .map(|f| (f.relative_path.clone(), f))
        .collect();

    let mut plan = TransferPlan::default();
    let mut kept = HashSet::new();
    for file in client_files.iter().filter(|f| !f.is_directory) {
        let stored = policy.storage_path(file);
        if needs_transfer(file, server.get(&stored)) {
            plan.files_to_transfer.push(file.clone());
        }
        kept.insert(stored);
    }
    if policy.deletes_on_backup() {
        plan.files_to_delete = server
            .into_keys()
            .filter(|path| !kept.contains(path))
            .collect();
    }
    plan
}

/// Decides what a restore downloads and what the client removes.
///
/// Returns the plan and the catalogue used to locate the files to send.
pub fn plan_restore(
    policy: &dyn BackupPolicy,
    client_files: &[FileInfo],
    server_files: Vec<FileInfo>,
) -> (TransferPlan, BTreeMap<String, StoredFile>) {
    let catalog = policy.catalog(server_files);
    let client: BTreeMap<&str, &FileInfo> = client_files
        .iter()
        .filter(|f| !f.is_directory)
        .map(|f| (f.relative_path.as_str(), f))
        .collect();

    let mut plan = TransferPlan::default();
    for (path, stored) in &catalog {
        if needs_transfer(&stored.info, client.get(path.as_str()).copied()) {
            plan.files_to_transfer.push(stored.info.clone());
        }
    }
    if policy.deletes_on_restore() {
        plan.files_to_delete = client
            .keys()
            .filter(|path| !catalog.contains_key(**path))
            .map(|path| path.to_string())
            .collect();
    }
    (plan, catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use dirsync_protocol::Timestamp;

    fn at(day: u32, secs: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 5, day, 12, 0, secs).unwrap()
    }

    fn file(path: &str, size: u64, modified: Timestamp) -> FileInfo {
        FileInfo::new(path, size, modified, modified)
    }

    fn names(files: &[FileInfo]) -> Vec<&str> {
        files.iter().map(|f| f.relative_path.as_str()).collect()
    }

    #[test]
    fn transfer_rules() {
        let source = file("a", 10, at(1, 5));
        assert!(needs_transfer(&source, None));
        assert!(needs_transfer(&source, Some(&file("a", 11, at(1, 5)))));
        assert!(needs_transfer(&source, Some(&file("a", 10, at(1, 4)))));
        assert!(!needs_transfer(&source, Some(&file("a", 10, at(1, 5)))));
        assert!(!needs_transfer(&source, Some(&file("a", 10, at(1, 6)))));
    }

    #[test]
    fn mirror_backup_deletes_extra_server_files() {
        let client = vec![file("keep.txt", 1, at(1, 0)), file("new.txt", 2, at(1, 0))];
        let server = vec![file("keep.txt", 1, at(1, 0)), file("gone.txt", 3, at(1, 0))];
        let plan = plan_backup(&MirrorPolicy, &client, server);
        assert_eq!(names(&plan.files_to_transfer), vec!["new.txt"]);
        assert_eq!(plan.files_to_delete, vec!["gone.txt"]);
    }

    #[test]
    fn preserve_backup_never_deletes() {
        let client = vec![file("new.txt", 2, at(1, 0))];
        let server = vec![file("gone.txt", 3, at(1, 0))];
        let plan = plan_backup(&PreservePolicy, &client, server);
        assert_eq!(names(&plan.files_to_transfer), vec!["new.txt"]);
        assert!(plan.files_to_delete.is_empty());
    }

    #[test]
    fn mirror_restore_deletes_extra_client_files() {
        let client = vec![file("local-only.txt", 1, at(1, 0)), file("same.txt", 4, at(1, 0))];
        let server = vec![file("same.txt", 4, at(1, 0)), file("remote.txt", 5, at(1, 0))];
        let (plan, catalog) = plan_restore(&MirrorPolicy, &client, server);
        assert_eq!(names(&plan.files_to_transfer), vec!["remote.txt"]);
        assert_eq!(plan.files_to_delete, vec!["local-only.txt"]);
        assert_eq!(catalog["remote.txt"].stored_path, "remote.txt");
    }

    #[test]
    fn date_separated_storage() {
        let policy = DateSeparatedPolicy;
        let photo = file("pics/cat.jpg", 9, at(3, 0));
        assert_eq!(policy.storage_path(&photo), "2024-05-03/pics/cat.jpg");

        let plan = plan_backup(
            &policy,
            &[photo.clone()],
            vec![file("2024-05-03/pics/cat.jpg", 9, at(3, 0))],
        );
        assert!(plan.files_to_transfer.is_empty());

        let plan = plan_backup(&policy, &[photo], vec![file("pics/cat.jpg", 9, at(3, 0))]);
        assert_eq!(names(&plan.files_to_transfer), vec!["pics/cat.jpg"]);
        assert!(plan.files_to_delete.is_empty());
    }

    #[test]
    fn date_separated_restore_flattens_newest() {
        let server = vec![
            file("2024-05-01/notes.txt", 1, at(1, 0)),
            file("2024-05-02/notes.txt", 2, at(2, 0)),
            file("plain.txt", 3, at(1, 0)),
            file("not-a-date/x.txt", 4, at(1, 0)),
        ];
        let (plan, catalog) = plan_restore(&DateSeparatedPolicy, &[], server);
        assert_eq!(
            names(&plan.files_to_transfer),
            vec!["not-a-date/x.txt", "notes.txt", "plain.txt"]
        );
        assert_eq!(catalog["notes.txt"].stored_path, "2024-05-02/notes.txt");
        assert_eq!(catalog["notes.txt"].info.size, 2);
    }

    #[test]
    fn policy_lookup() {
        assert_eq!(
            policy_for(BackupType::Mirror).unwrap().backup_type(),
            BackupType::Mirror
        );
        assert!(matches!(
            policy_for(BackupType::None),
            Err(ServerError::UnsupportedBackupType(BackupType::None))
        ));
        assert!(policy_for(BackupType::TwoWaySync).is_err());
    }
}
