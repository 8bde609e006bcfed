//! Change detection and reconciliation for one sync root.

use crate::actions::{ConflictItem, SyncActions};
use crate::changelog::{
    read_marker, reduce_latest, write_marker, ChangeLog, CONFLICTS, LAST_COMPACT, LAST_UPDATE,
    LOCK_FILE,
};
use crate::error::{SyncError, SyncResult};
use crate::scan::{FileLister, WalkDirLister};
use dirsync_protocol::{now, LogEntry, Operation, Timestamp};
use fs2::FileExt;
use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Tracks changes under one root directory through its operation log.
///
/// `analyze`, `compact` and `record` hold an advisory lock on the root's
/// lock file while they run; a second process gets [`SyncError::RootLocked`].
#[derive(Debug)]
pub struct StatusAnalyzer<L = WalkDirLister> {
    root: PathBuf,
    log: ChangeLog,
    lister: L,
}

impl StatusAnalyzer<WalkDirLister> {
    /// Creates an analyzer for `root` that walks the filesystem.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_lister(root, WalkDirLister::new())
    }
}

impl<L: FileLister> StatusAnalyzer<L> {
    /// Creates an analyzer with a custom file lister.
    ///
    /// # Example
    ///
    /// ```
    /// use dirsync_engine::{FileLister, StatusAnalyzer, SyncResult};
    /// use dirsync_protocol::FileInfo;
    /// use std::path::Path;
    ///
    /// struct Nothing;
    ///
    /// impl FileLister for Nothing {
    ///     fn list(&self, _root: &Path) -> SyncResult<Vec<FileInfo>> {
    ///         Ok(Vec::new())
    ///     }
    /// }
    ///
    /// let dir = tempfile::tempdir()?;
    /// let analyzer = StatusAnalyzer::with_lister(dir.path(), Nothing);
    /// assert!(analyzer.analyze()?.is_empty());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn with_lister(root: impl Into<PathBuf>, lister: L) -> Self {
        let root = root.into();
        Self {
            log: ChangeLog::in_root(&root),
            root,
            lister,
        }
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The root's operation log.
    pub fn log(&self) -> &ChangeLog {
        &self.log
    }

    /// Scans the root and appends one entry per created, modified or
    /// deleted file. Returns the appended entries, sorted by path.
    ///
    /// A missing root is a no-op. The last-update marker is written on every
    /// other call, even when nothing changed.
    pub fn analyze(&self) -> SyncResult<Vec<LogEntry>> {
        if !self.root.is_dir() {
            debug!(root = %self.root.display(), "root missing, nothing to analyze");
            return Ok(Vec::new());
        }
        let _lock = self.lock()?;
        let run_start = now();
        let known = self.log.latest_entries()?;
        let files = self.lister.list(&self.root)?;

        let mut changes = Vec::new();
        let mut seen = HashSet::with_capacity(files.len());
        for file in files.iter().filter(|f| !f.is_directory) {
            seen.insert(file.relative_path.as_str());
            let operation = match known.get(&file.relative_path) {
                Some(last) if last.operation.is_live() => {
                    if last.file_time == file.modification_time && last.size == file.size {
                        continue;
                    }
                    Operation::Modified
                }
                _ => Operation::Created,
            };
            changes.push(LogEntry {
                run_start,
                op_time: now(),
                file_time: file.modification_time,
                size: file.size,
                operation,
                relative_path: file.relative_path.clone(),
            });
        }

        for (path, last) in &known {
            if last.operation.is_live() && !seen.contains(path.as_str()) {
                let observed = now();
                changes.push(LogEntry {
                    run_start,
                    op_time: observed,
                    file_time: observed,
                    size: 0,
                    operation: Operation::Deleted,
                    relative_path: path.clone(),
                });
            }
        }
        changes.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

        self.log.append(&changes)?;
        write_marker(&self.root.join(LAST_UPDATE), &run_start)?;
        info!(root = %self.root.display(), changes = changes.len(), "analyzed");
        Ok(changes)
    }

    /// Rewrites the log keeping only the latest entry per path.
    ///
    /// Deletions stay as tombstones so peers still see them. Returns the
    /// number of entries kept. The compaction marker is always written.
    pub fn compact(&self) -> SyncResult<usize> {
        if !self.root.is_dir() {
            debug!(root = %self.root.display(), "root missing, nothing to compact");
            return Ok(0);
        }
        let _lock = self.lock()?;
        let started = now();

        let retained = if self.log.exists() {
            let entries = self.log.read_all()?;
            let before = entries.len();
            let order: BTreeMap<String, usize> = entries
                .iter()
                .enumerate()
                .map(|(index, entry)| (entry.relative_path.clone(), index))
                .collect();
            let mut latest: Vec<LogEntry> = reduce_latest(entries).into_values().collect();
            latest.sort_by(|a, b| {
                (a.run_start, a.op_time, order.get(&a.relative_path))
                    .cmp(&(b.run_start, b.op_time, order.get(&b.relative_path)))
            });
            self.log.rewrite(&latest)?;
            info!(root = %self.root.display(), before, after = latest.len(), "compacted");
            latest.len()
        } else {
            0
        };

        write_marker(&self.root.join(LAST_COMPACT), &started)?;
        Ok(retained)
    }

    /// Latest entry per path in this root's log.
    pub fn latest_entries(&self) -> SyncResult<BTreeMap<String, LogEntry>> {
        self.log.latest_entries()
    }

    /// Compares this root's log against another log file.
    ///
    /// A missing other log counts as empty.
    pub fn compare(&self, other_log: &Path) -> SyncResult<SyncActions> {
        let remote = ChangeLog::new(other_log).latest_entries()?;
        self.compare_entries(&remote)
    }

    /// Compares this root's log against a peer's latest entries.
    pub fn compare_entries(&self, remote: &BTreeMap<String, LogEntry>) -> SyncResult<SyncActions> {
        let local = self.log.latest_entries()?;
        let actions = SyncActions::between(&local, remote);
        debug!(
            send = actions.files_to_send.len(),
            update = actions.files_to_update.len(),
            delete = actions.files_to_delete.len(),
            delete_remote = actions.files_to_delete_remote.len(),
            conflicts = actions.conflicts.len(),
            "compared"
        );
        Ok(actions)
    }

    /// Adopts entries from a peer after their effect was applied here.
    ///
    /// Operation and file times are kept so both logs agree; the run start
    /// becomes the adoption time so the entries supersede local history.
    pub fn record(&self, entries: &[LogEntry]) -> SyncResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let _lock = self.lock()?;
        let adopted = now();
        let entries: Vec<LogEntry> = entries
            .iter()
            .cloned()
            .map(|mut entry| {
                entry.run_start = entry.run_start.max(adopted);
                entry
            })
            .collect();
        self.log.append(&entries)?;
        debug!(root = %self.root.display(), count = entries.len(), "recorded peer entries");
        Ok(())
    }

    /// Writes the conflict report, one path per line. An empty set removes it.
    pub fn write_conflicts(&self, conflicts: &[ConflictItem]) -> SyncResult<()> {
        let path = self.root.join(CONFLICTS);
        if conflicts.is_empty() {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
            return Ok(());
        }
        let text: String = conflicts
            .iter()
            .map(|c| format!("{}\n", c.relative_path))
            .collect();
        fs::write(path, text)?;
        Ok(())
    }

    /// When `analyze` last ran.
    pub fn last_update_time(&self) -> SyncResult<Option<Timestamp>> {
        read_marker(&self.root.join(LAST_UPDATE))
    }

    /// When `compact` last ran.
    pub fn last_compact_time(&self) -> SyncResult<Option<Timestamp>> {
        read_marker(&self.root.join(LAST_COMPACT))
    }

    fn lock(&self) -> SyncResult<RootLock> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.root.join(LOCK_FILE))?;
        if file.try_lock_exclusive().is_err() {
            return Err(SyncError::RootLocked {
                root: self.root.clone(),
            });
        }
        Ok(RootLock { file })
    }
}

/// Held for the duration of a log update.
struct RootLock {
    file: File,
}

impl Drop for RootLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::paths;
    use crate::changelog::OPERATION_LOG;
    use chrono::TimeZone;
    use chrono::Utc;
    use std::time::{Duration, SystemTime};
    use tempfile::tempdir;

    fn set_mtime(path: &Path, time: SystemTime) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    #[test]
    fn empty_root_writes_marker_only() {
        let dir = tempdir().unwrap();
        let analyzer = StatusAnalyzer::new(dir.path());
        assert!(analyzer.analyze().unwrap().is_empty());
        assert!(!dir.path().join(OPERATION_LOG).exists());
        assert!(dir.path().join(LAST_UPDATE).exists());
        assert!(analyzer.last_update_time().unwrap().is_some());
    }

    #[test]
    fn missing_root_is_noop() {
        let dir = tempdir().unwrap();
        let analyzer = StatusAnalyzer::new(dir.path().join("absent"));
        assert!(analyzer.analyze().unwrap().is_empty());
        assert_eq!(analyzer.compact().unwrap(), 0);
        assert!(!dir.path().join("absent").exists());
    }

    #[test]
    fn create_modify_delete_cycle() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, b"hello").unwrap();
        let analyzer = StatusAnalyzer::new(dir.path());

        let first = analyzer.analyze().unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].operation, Operation::Created);
        assert_eq!(first[0].relative_path, "a.txt");
        assert_eq!(first[0].size, 5);

        assert!(analyzer.analyze().unwrap().is_empty());

        fs::write(&file, b"hello, world").unwrap();
        set_mtime(&file, SystemTime::now() + Duration::from_secs(5));
        let modified = analyzer.analyze().unwrap();
        assert_eq!(modified.len(), 1);
        assert_eq!(modified[0].operation, Operation::Modified);

        fs::remove_file(&file).unwrap();
        let deleted = analyzer.analyze().unwrap();
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].operation, Operation::Deleted);
        assert_eq!(deleted[0].size, 0);

        assert!(analyzer.analyze().unwrap().is_empty());
        assert_eq!(analyzer.log().read_all().unwrap().len(), 3);
    }

    #[test]
    fn size_change_alone_is_modification() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.bin");
        fs::write(&file, b"1234").unwrap();
        let mtime = SystemTime::now() - Duration::from_secs(60);
        set_mtime(&file, mtime);
        let analyzer = StatusAnalyzer::new(dir.path());
        analyzer.analyze().unwrap();

        fs::write(&file, b"123456").unwrap();
        set_mtime(&file, mtime);
        let changes = analyzer.analyze().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].operation, Operation::Modified);
        assert_eq!(changes[0].size, 6);
    }

    #[test]
    fn recreated_file_is_created_again() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a");
        fs::write(&file, b"1").unwrap();
        let analyzer = StatusAnalyzer::new(dir.path());
        analyzer.analyze().unwrap();
        fs::remove_file(&file).unwrap();
        analyzer.analyze().unwrap();
        fs::write(&file, b"2").unwrap();
        let changes = analyzer.analyze().unwrap();
        assert_eq!(changes[0].operation, Operation::Created);
    }

    #[test]
    fn state_files_are_not_logged() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a"), b"1").unwrap();
        let analyzer = StatusAnalyzer::new(dir.path());
        analyzer.analyze().unwrap();
        analyzer.compact().unwrap();
        analyzer
            .write_conflicts(&[ConflictItem {
                relative_path: "a".into(),
                local: analyzer.latest_entries().unwrap()["a"].clone(),
                remote: analyzer.latest_entries().unwrap()["a"].clone(),
            }])
            .unwrap();
        assert!(analyzer.analyze().unwrap().is_empty());
    }

    fn at(secs: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 2, 2, 2, 2, secs).unwrap()
    }

    fn logged(run: u32, op_time: u32, op: Operation, path: &str) -> LogEntry {
        LogEntry {
            run_start: at(run),
            op_time: at(op_time),
            file_time: at(op_time),
            size: 3,
            operation: op,
            relative_path: path.into(),
        }
    }

    #[test]
    fn compaction_keeps_latest_per_path() {
        let dir = tempdir().unwrap();
        let analyzer = StatusAnalyzer::new(dir.path());
        analyzer
            .log()
            .append(&[
                logged(1, 1, Operation::Created, "file1.txt"),
                logged(2, 2, Operation::Created, "file1.txt"),
                logged(3, 3, Operation::Modified, "file1.txt"),
                logged(1, 1, Operation::Created, "file2.txt"),
            ])
            .unwrap();

        assert_eq!(analyzer.compact().unwrap(), 2);
        let entries = analyzer.log().read_all().unwrap();
        assert_eq!(
            entries,
            vec![
                logged(1, 1, Operation::Created, "file2.txt"),
                logged(3, 3, Operation::Modified, "file1.txt"),
            ]
        );
        assert!(analyzer.last_compact_time().unwrap().is_some());
    }

    #[test]
    fn compaction_keeps_tombstones() {
        let dir = tempdir().unwrap();
        let analyzer = StatusAnalyzer::new(dir.path());
        analyzer
            .log()
            .append(&[
                logged(1, 1, Operation::Created, "gone"),
                logged(2, 2, Operation::Deleted, "gone"),
            ])
            .unwrap();
        assert_eq!(analyzer.compact().unwrap(), 1);
        assert_eq!(
            analyzer.log().read_all().unwrap()[0].operation,
            Operation::Deleted
        );
    }

    #[test]
    fn compacting_without_log_writes_marker() {
        let dir = tempdir().unwrap();
        let analyzer = StatusAnalyzer::new(dir.path());
        assert_eq!(analyzer.compact().unwrap(), 0);
        assert!(!dir.path().join(OPERATION_LOG).exists());
        assert!(dir.path().join(LAST_COMPACT).exists());
    }

    #[test]
    fn compare_against_other_log() {
        let local_dir = tempdir().unwrap();
        let remote_dir = tempdir().unwrap();
        let local = StatusAnalyzer::new(local_dir.path());
        let remote = StatusAnalyzer::new(remote_dir.path());

        local
            .log()
            .append(&[logged(1, 1, Operation::Created, "file1.txt")])
            .unwrap();
        let actions = local.compare(remote.log().path()).unwrap();
        assert_eq!(paths(&actions.files_to_send), vec!["file1.txt"]);
        assert!(actions.files_to_update.is_empty());

        let actions = remote.compare(local.log().path()).unwrap();
        assert_eq!(paths(&actions.files_to_update), vec!["file1.txt"]);

        remote
            .log()
            .append(&[logged(2, 2, Operation::Deleted, "file1.txt")])
            .unwrap();
        let actions = remote.compare(local.log().path()).unwrap();
        assert_eq!(paths(&actions.files_to_delete_remote), vec!["file1.txt"]);
    }

    #[test]
    fn recorded_entries_stop_changes() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("in.txt");
        fs::write(&file, b"abc").unwrap();
        let mtime = at(30);
        set_mtime(&file, dirsync_protocol::to_system_time(&mtime));

        let analyzer = StatusAnalyzer::new(dir.path());
        let mut peer = logged(1, 1, Operation::Created, "in.txt");
        peer.file_time = mtime;
        analyzer.record(&[peer.clone()]).unwrap();

        assert!(analyzer.analyze().unwrap().is_empty());
        let latest = analyzer.latest_entries().unwrap();
        assert_eq!(latest["in.txt"].op_time, peer.op_time);
        assert!(latest["in.txt"].run_start > peer.run_start);
    }

    #[test]
    fn conflict_report() {
        let dir = tempdir().unwrap();
        let analyzer = StatusAnalyzer::new(dir.path());
        let item = ConflictItem {
            relative_path: "both.txt".into(),
            local: logged(1, 1, Operation::Modified, "both.txt"),
            remote: logged(1, 1, Operation::Modified, "both.txt"),
        };
        analyzer.write_conflicts(&[item]).unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join(CONFLICTS)).unwrap(),
            "both.txt\n"
        );
        analyzer.write_conflicts(&[]).unwrap();
        assert!(!dir.path().join(CONFLICTS).exists());
    }

    #[test]
    fn second_lock_is_refused() {
        let dir = tempdir().unwrap();
        let analyzer = StatusAnalyzer::new(dir.path());
        let _held = analyzer.lock().unwrap();
        assert!(matches!(
            analyzer.analyze(),
            Err(SyncError::RootLocked { .. })
        ));
    }
}
