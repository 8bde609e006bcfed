//! Append-only operation log and marker files of a sync root.

use crate::error::{SyncError, SyncResult};
use dirsync_protocol::{format_timestamp, parse_timestamp, LogEntry, Timestamp};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Operation log file name.
pub const OPERATION_LOG: &str = ".operation.log";
/// Last analyze marker file name.
pub const LAST_UPDATE: &str = ".lastupdate.log";
/// Last compaction marker file name.
pub const LAST_COMPACT: &str = ".lastcompact.log";
/// Conflict report file name.
pub const CONFLICTS: &str = ".conflicts.log";
/// Advisory lock file name.
pub const LOCK_FILE: &str = ".dirsync.lock";

const STATE_FILES: [&str; 5] = [OPERATION_LOG, LAST_UPDATE, LAST_COMPACT, CONFLICTS, LOCK_FILE];

/// Whether a relative path names one of the root's own state files.
pub fn is_state_file(relative_path: &str) -> bool {
    STATE_FILES.contains(&relative_path)
}

/// The operation log of one root.
#[derive(Debug, Clone)]
pub struct ChangeLog {
    path: PathBuf,
}

impl ChangeLog {
    /// Opens the log at an explicit path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Opens the log inside `root`.
    pub fn in_root(root: &Path) -> Self {
        Self::new(root.join(OPERATION_LOG))
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the log file exists.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Reads every entry in log order. A missing log is empty.
    pub fn read_all(&self) -> SyncResult<Vec<LogEntry>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut entries = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry = LogEntry::from_line(&line).map_err(|source| SyncError::CorruptLog {
                path: self.path.clone(),
                line: index + 1,
                source,
            })?;
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Appends entries. Nothing is created when `entries` is empty.
    pub fn append(&self, entries: &[LogEntry]) -> SyncResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);
        for entry in entries {
            writeln!(writer, "{}", entry.to_line())?;
        }
        writer.flush()?;
        writer.get_ref().sync_data()?;
        Ok(())
    }

    /// Replaces the log contents atomically.
    pub fn rewrite(&self, entries: &[LogEntry]) -> SyncResult<()> {
        let mut temp_name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        temp_name.push(".tmp");
        let temp = self.path.with_file_name(temp_name);

        {
            let mut writer = BufWriter::new(File::create(&temp)?);
            for entry in entries {
                writeln!(writer, "{}", entry.to_line())?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&temp, &self.path)?;
        Ok(())
    }

    /// Latest entry per path, without touching the file.
    pub fn latest_entries(&self) -> SyncResult<BTreeMap<String, LogEntry>> {
        Ok(reduce_latest(self.read_all()?))
    }
}

/// Reduces entries to the latest one per path.
///
/// Later entries win over earlier ones by run start, then operation time;
/// on a full tie the later position in the input wins.
pub fn reduce_latest(entries: impl IntoIterator<Item = LogEntry>) -> BTreeMap<String, LogEntry> {
    let mut latest: BTreeMap<String, LogEntry> = BTreeMap::new();
    for entry in entries {
        match latest.get(&entry.relative_path) {
            Some(current) if !entry.supersedes(current) => {}
            _ => {
                latest.insert(entry.relative_path.clone(), entry);
            }
        }
    }
    latest
}

/// Reads a timestamp marker file. A missing or empty marker is `None`.
pub fn read_marker(path: &Path) -> SyncResult<Option<Timestamp>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    Ok(Some(parse_timestamp(text)?))
}

/// Writes a timestamp marker file.
pub fn write_marker(path: &Path, timestamp: &Timestamp) -> SyncResult<()> {
    fs::write(path, format!("{}\n", format_timestamp(timestamp)))?;
    Ok(())
}
