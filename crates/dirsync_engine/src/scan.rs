//! Filesystem enumeration.

use crate::changelog::is_state_file;
use crate::error::SyncResult;
use crate::transfer::PARTIAL_SUFFIX;
use dirsync_protocol::{relative_path, FileInfo};
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Lists the files under a root.
pub trait FileLister: Send + Sync {
    /// Returns the entries under `root`, sorted by relative path.
    ///
    /// The root's own state files are never listed.
    fn list(&self, root: &Path) -> SyncResult<Vec<FileInfo>>;
}

/// [`FileLister`] backed by a recursive directory walk.
///
/// Symlinks are not followed and not listed.
#[derive(Debug, Clone, Default)]
pub struct WalkDirLister {
    include_directories: bool,
}

impl WalkDirLister {
    /// Lists regular files only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Also lists directories.
    pub fn with_directories(mut self, include: bool) -> Self {
        self.include_directories = include;
        self
    }
}

impl FileLister for WalkDirLister {
    fn list(&self, root: &Path) -> SyncResult<Vec<FileInfo>> {
        debug!(root = %root.display(), "scanning");
        let mut files = Vec::new();
        for entry in WalkDir::new(root).min_depth(1).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                // Entries that vanish mid-walk are reported by the next scan.
                Err(err) if err.io_error().map(|e| e.kind()) == Some(std::io::ErrorKind::NotFound) => {
                    warn!(error = %err, "entry vanished during scan");
                    continue;
                }
                Err(err) => return Err(std::io::Error::from(err).into()),
            };

            let file_type = entry.file_type();
            if file_type.is_symlink() || (file_type.is_dir() && !self.include_directories) {
                continue;
            }
            let Some(relative) = relative_path(root, entry.path()) else {
                continue;
            };
            if is_state_file(&relative) || relative.ends_with(PARTIAL_SUFFIX) {
                continue;
            }
            // File lists and the operation log are line oriented.
            if has_line_break(&relative) {
                warn!(path = ?relative, "skipping path with a line break");
                continue;
            }
            let metadata = entry.metadata().map_err(std::io::Error::from)?;
            files.push(FileInfo::from_metadata(relative, &metadata)?);
        }
        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Ok(files)
    }
}

/// Whether `path` cannot be written as a single text line.
pub fn has_line_break(path: &str) -> bool {
    path.contains(['\n', '\r'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn lists_files_recursively() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub/deeper")).unwrap();
        fs::write(dir.path().join("b.txt"), b"bb").unwrap();
        fs::write(dir.path().join("sub/deeper/a.txt"), b"a").unwrap();

        let files = WalkDirLister::new().list(dir.path()).unwrap();
        let paths: Vec<_> = files.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["b.txt", "sub/deeper/a.txt"]);
        assert_eq!(files[0].size, 2);
        assert!(!files[0].is_directory);
    }

    #[test]
    fn skips_state_and_partial_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(".operation.log"), b"").unwrap();
        fs::write(dir.path().join(".lastupdate.log"), b"").unwrap();
        fs::write(dir.path().join(".dirsync.lock"), b"").unwrap();
        fs::write(dir.path().join(format!(".x{PARTIAL_SUFFIX}")), b"").unwrap();
        fs::write(dir.path().join("keep.txt"), b"k").unwrap();

        let files = WalkDirLister::new().list(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative_path, "keep.txt");
    }

    #[test]
    fn directories_on_request() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();

        assert!(WalkDirLister::new().list(dir.path()).unwrap().is_empty());
        let files = WalkDirLister::new()
            .with_directories(true)
            .list(dir.path())
            .unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].is_directory);
        assert_eq!(files[0].size, 0);
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_skipped() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("real.txt"), b"r").unwrap();
        std::os::unix::fs::symlink(dir.path().join("real.txt"), dir.path().join("link.txt"))
            .unwrap();

        let files = WalkDirLister::new().list(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative_path, "real.txt");
    }

    #[cfg(unix)]
    #[test]
    fn skips_names_with_line_breaks() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("bad\nname.txt"), b"x").unwrap();
        fs::create_dir(dir.path().join("odd\rdir")).unwrap();
        fs::write(dir.path().join("odd\rdir/inner.txt"), b"y").unwrap();
        fs::write(dir.path().join("good.txt"), b"g").unwrap();

        let files = WalkDirLister::new().list(dir.path()).unwrap();
        let paths: Vec<_> = files.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["good.txt"]);
    }
}
