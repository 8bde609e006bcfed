//! Temporary directory trees.
//!
//! Provides a self-cleaning root with helpers to write, touch, delete and
//! snapshot files by relative path.

use dirsync_protocol::{to_system_time, Timestamp};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

/// A temporary directory tree with automatic cleanup.
pub struct TestTree {
    dir: TempDir,
}

impl TestTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Creates a tree holding the given `(relative path, contents)` pairs.
    pub fn with_files<'a>(files: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let tree = Self::new();
        for (path, contents) in files {
            tree.write(path, contents);
        }
        tree
    }

    /// Root of the tree.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Absolute path of a relative one.
    pub fn join(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    /// Writes a file, creating parent directories.
    pub fn write(&self, relative: &str, contents: impl AsRef<[u8]>) {
        let path = self.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        fs::write(path, contents).expect("Failed to write file");
    }

    /// Reads a file as UTF-8.
    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.join(relative)).expect("Failed to read file")
    }

    /// Whether a file exists.
    pub fn exists(&self, relative: &str) -> bool {
        self.join(relative).exists()
    }

    /// Deletes a file.
    pub fn remove(&self, relative: &str) {
        fs::remove_file(self.join(relative)).expect("Failed to delete file");
    }

    /// Sets a file's modification time.
    pub fn set_modified(&self, relative: &str, time: Timestamp) {
        File::options()
            .write(true)
            .open(self.join(relative))
            .and_then(|file| file.set_modified(to_system_time(&time)))
            .expect("Failed to set modification time");
    }

    /// Contents of every regular file, keyed by relative path.
    ///
    /// Names starting with a dot at the root are skipped, so the change
    /// log and its markers do not show up.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        let mut files = BTreeMap::new();
        for entry in WalkDir::new(self.path()).min_depth(1) {
            let entry = entry.expect("Failed to walk tree");
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(self.path())
                .expect("Entry outside root")
                .to_string_lossy()
                .replace('\\', "/");
            if entry.depth() == 1 && relative.starts_with('.') {
                continue;
            }
            let contents = fs::read_to_string(entry.path()).unwrap_or_default();
            files.insert(relative, contents);
        }
        files
    }
}

impl Default for TestTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a test with a temporary tree.
///
/// # Example
///
/// ```rust
/// use dirsync_testkit::with_temp_tree;
///
/// with_temp_tree(|tree| {
///     tree.write("a/b.txt", "hello");
///     assert!(tree.exists("a/b.txt"));
/// });
/// ```
pub fn with_temp_tree<F, R>(f: F) -> R
where
    F: FnOnce(&TestTree) -> R,
{
    let tree = TestTree::new();
    f(&tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn write_read_remove() {
        let tree = TestTree::with_files([("docs/a.txt", "alpha"), ("b.txt", "beta")]);
        assert_eq!(tree.read("docs/a.txt"), "alpha");
        tree.remove("b.txt");
        assert!(!tree.exists("b.txt"));
    }

    #[test]
    fn snapshot_skips_state_files() {
        let tree = TestTree::with_files([(".operation.log", "x"), ("dir/.hidden", "kept")]);
        tree.write("z.txt", "z");
        let snapshot = tree.snapshot();
        assert_eq!(
            snapshot.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["dir/.hidden", "z.txt"]
        );
    }

    #[test]
    fn modification_time_is_set() {
        let tree = TestTree::with_files([("a.txt", "a")]);
        let time = Utc.with_ymd_and_hms(2023, 7, 1, 8, 30, 0).unwrap();
        tree.set_modified("a.txt", time);
        let modified = fs::metadata(tree.join("a.txt")).unwrap().modified().unwrap();
        assert_eq!(dirsync_protocol::from_system_time(modified), time);
    }
}
