//! File metadata exchanged in file lists and descriptors.

use crate::error::{ProtocolError, ProtocolResult};
use crate::time::{format_timestamp, from_system_time, parse_timestamp, Timestamp};
use std::fs::Metadata;
use std::hash::{Hash, Hasher};
use std::path::{Component, Path};

/// Metadata for one file or directory under a sync root.
///
/// Identity is the relative path alone: two records with the same path are
/// equal and hash the same regardless of size or timestamps.
///
/// Line form: `relativePath\tsize\tcreationTime\tmodificationTime\tisDirectory`
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Path relative to the sync root, forward slashes.
    pub relative_path: String,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Creation time.
    pub creation_time: Timestamp,
    /// Last modification time.
    pub modification_time: Timestamp,
    /// Whether this entry is a directory.
    pub is_directory: bool,
}

impl FileInfo {
    /// Creates metadata for a regular file.
    pub fn new(
        relative_path: impl Into<String>,
        size: u64,
        creation_time: Timestamp,
        modification_time: Timestamp,
    ) -> Self {
        Self {
            relative_path: uniform_path(&relative_path.into()),
            size,
            creation_time,
            modification_time,
            is_directory: false,
        }
    }

    /// Builds metadata from filesystem attributes.
    ///
    /// Platforms without a creation time report the modification time.
    pub fn from_metadata(relative_path: impl Into<String>, metadata: &Metadata) -> std::io::Result<Self> {
        let modified = metadata.modified()?;
        let created = metadata.created().unwrap_or(modified);
        let is_directory = metadata.is_dir();
        Ok(Self {
            relative_path: uniform_path(&relative_path.into()),
            size: if is_directory { 0 } else { metadata.len() },
            creation_time: from_system_time(created),
            modification_time: from_system_time(modified),
            is_directory,
        })
    }

    /// Reads metadata for `path`, naming it relative to `root`.
    pub fn from_path(root: &Path, path: &Path) -> std::io::Result<Self> {
        let relative = relative_path(root, path).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not under {}", path.display(), root.display()),
            )
        })?;
        let metadata = std::fs::metadata(path)?;
        Self::from_metadata(relative, &metadata)
    }

    /// Formats this record as one tab-separated line.
    pub fn to_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}",
            self.relative_path,
            self.size,
            format_timestamp(&self.creation_time),
            format_timestamp(&self.modification_time),
            self.is_directory
        )
    }

    /// Parses one tab-separated line.
    pub fn from_line(line: &str) -> ProtocolResult<Self> {
        // The path is the only field that may itself contain a tab.
        let mut fields = line.rsplitn(5, '\t');
        let is_directory = fields.next();
        let modification_time = fields.next();
        let creation_time = fields.next();
        let size = fields.next();
        let relative_path = fields.next();

        let (Some(relative_path), Some(size), Some(creation_time), Some(modification_time), Some(is_directory)) =
            (relative_path, size, creation_time, modification_time, is_directory)
        else {
            return Err(ProtocolError::invalid_line(format!(
                "expected 5 fields in file line {line:?}"
            )));
        };

        let size = size
            .parse::<u64>()
            .map_err(|_| ProtocolError::invalid_line(format!("bad size {size:?}")))?;
        let is_directory = match is_directory {
            "true" => true,
            "false" => false,
            other => {
                return Err(ProtocolError::invalid_line(format!(
                    "bad directory flag {other:?}"
                )))
            }
        };

        Ok(Self {
            relative_path: relative_path.to_string(),
            size,
            creation_time: parse_timestamp(creation_time)?,
            modification_time: parse_timestamp(modification_time)?,
            is_directory,
        })
    }

    /// Joins records into newline-separated text.
    pub fn join_lines(files: &[FileInfo]) -> String {
        files
            .iter()
            .map(FileInfo::to_line)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Parses newline-separated records. Blank lines are skipped.
    pub fn parse_lines(text: &str) -> ProtocolResult<Vec<FileInfo>> {
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(FileInfo::from_line)
            .collect()
    }
}

impl PartialEq for FileInfo {
    fn eq(&self, other: &Self) -> bool {
        self.relative_path == other.relative_path
    }
}

impl Eq for FileInfo {}

impl Hash for FileInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.relative_path.hash(state);
    }
}

/// Normalizes a relative path: forward slashes, no leading slash, no `./`.
pub fn uniform_path(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Returns `path` relative to `root` with forward slashes, or `None` if
/// `path` is not under `root`.
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let stripped = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = stripped
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    Some(parts.join("/"))
}
