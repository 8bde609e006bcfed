//! Block-wise file transfer over a [`MessageTransport`].
//!
//! Sender and receiver exchange, per file:
//!
//! ```text
//! FD ->          <- FA (ready)
//! FT #0 ->       <- DA
//! ...
//! FT #n-1 ->     <- DA
//! FE ->          <- EA
//! ```
//!
//! An empty file is one empty block. The receiver writes into a partial file
//! next to the target and renames it into place on `FE`, then restores the
//! modification time carried by the file info.

use crate::changelog::is_state_file;
use crate::error::{SyncError, SyncResult};
use crate::scan::has_line_break;
use crate::transport::MessageTransport;
use dirsync_protocol::{
    to_system_time, FileDataMessage, FileDescriptorAckMessage, FileDescriptorMessage,
    FileEndAckMessage, FileEndMessage, FileInfo, WireMessage,
};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Suffix of files being received.
pub const PARTIAL_SUFFIX: &str = ".dirsync-part";

/// Joins a peer-supplied relative path onto `root`.
///
/// Absolute paths, `..` components, the root's state files and partial
/// files are rejected.
pub fn resolve_path(root: &Path, relative_path: &str) -> SyncResult<PathBuf> {
    let invalid = || SyncError::InvalidPath {
        path: relative_path.to_string(),
    };
    let mut resolved = root.to_path_buf();
    let mut parts = Vec::new();
    for component in Path::new(relative_path).components() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                parts.push(part.to_string_lossy());
            }
            Component::CurDir => {}
            _ => return Err(invalid()),
        }
    }
    let normalized = parts.join("/");
    if normalized.is_empty()
        || is_state_file(&normalized)
        || normalized.ends_with(PARTIAL_SUFFIX)
        || has_line_break(&normalized)
    {
        return Err(invalid());
    }
    Ok(resolved)
}

/// Answers a `FileDescriptor` with a refusal; the sender skips the file.
pub fn decline_file<T: MessageTransport + ?Sized>(
    transport: &mut T,
    relative_path: &str,
    reason: &str,
) -> SyncResult<()> {
    warn!(path = %relative_path, reason, "declined incoming file");
    transport.send_message(&FileDescriptorAckMessage::refused(relative_path, reason).into())
}

fn block_count(size: u64, block_size: usize) -> i32 {
    let blocks = size.div_ceil(block_size.max(1) as u64).max(1);
    i32::try_from(blocks).unwrap_or(i32::MAX)
}

/// Sends one file. Returns `false` if the receiver declined it.
///
/// `file` names the file on the wire; `source` is where its bytes live.
pub fn send_file<T: MessageTransport + ?Sized>(
    transport: &mut T,
    source: &Path,
    file: &FileInfo,
    block_size: usize,
) -> SyncResult<bool> {
    let path = file.relative_path.clone();
    let mut reader = File::open(source)?;
    let size = reader.metadata()?.len();
    let mut info = file.clone();
    info.size = size;

    transport.send_message(&FileDescriptorMessage { file: info.clone() }.into())?;
    match transport.receive_reply()? {
        WireMessage::FileDescriptorAck(ack) if ack.ready => {}
        WireMessage::FileDescriptorAck(ack) => {
            warn!(
                path = %path,
                reason = ack.error_message.as_deref().unwrap_or(""),
                "receiver declined file"
            );
            return Ok(false);
        }
        other => return Err(SyncError::unexpected("FileDescriptorAck", other.message_type())),
    }

    let block_size = block_size.max(1);
    let total_blocks = block_count(size, block_size);
    let mut block = vec![0u8; block_size];
    for block_number in 0..total_blocks {
        let filled = read_block(&mut reader, &mut block)?;
        transport.send_message(
            &FileDataMessage {
                relative_path: path.clone(),
                block_number,
                total_blocks,
                data: block[..filled].to_vec(),
            }
            .into(),
        )?;
        match transport.receive_reply()? {
            WireMessage::FileDataAck => {}
            other => return Err(SyncError::unexpected("FileDataAck", other.message_type())),
        }
    }

    transport.send_message(
        &FileEndMessage {
            relative_path: path.clone(),
            file: Some(info),
        }
        .into(),
    )?;
    match transport.receive_reply()? {
        WireMessage::FileEndAck(ack) if ack.success => {
            debug!(path = %path, size, blocks = total_blocks, "file sent");
            Ok(true)
        }
        WireMessage::FileEndAck(ack) => Err(SyncError::transfer(
            path,
            ack.error_message.unwrap_or_default(),
        )),
        other => Err(SyncError::unexpected("FileEndAck", other.message_type())),
    }
}

/// Fills `block` as far as the file allows.
fn read_block(reader: &mut File, block: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < block.len() {
        match reader.read(&mut block[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

/// Where and how a received file is stored.
#[derive(Debug, Clone)]
pub struct ReceiveTarget {
    /// Final location of the file.
    pub path: PathBuf,
    /// Acknowledge everything, write nothing.
    pub dry_run: bool,
}

impl ReceiveTarget {
    /// Stores the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            dry_run: false,
        }
    }

    /// Enables or disables dry-run.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    fn partial_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(PARTIAL_SUFFIX);
        self.path.with_file_name(name)
    }
}

/// Receives one file after its `FileDescriptor` has been read.
///
/// Returns the final metadata when the file was stored (or would have been,
/// in dry-run), `None` when the receiver could not open the target and
/// declined it. A write failure after acceptance is reported to the sender
/// in `FileEndAck` and returned as [`SyncError::Transfer`].
pub fn receive_file<T: MessageTransport + ?Sized>(
    transport: &mut T,
    descriptor: &FileInfo,
    target: &ReceiveTarget,
) -> SyncResult<Option<FileInfo>> {
    let path = descriptor.relative_path.clone();
    let partial = target.partial_path();

    let mut writer = if target.dry_run {
        None
    } else {
        match open_partial(&partial) {
            Ok(file) => Some(file),
            Err(err) => {
                warn!(path = %path, error = %err, "cannot open target");
                transport.send_message(
                    &FileDescriptorAckMessage::refused(path, err.to_string()).into(),
                )?;
                return Ok(None);
            }
        }
    };
    transport.send_message(&FileDescriptorAckMessage::ready(path.clone()).into())?;

    let mut failure: Option<io::Error> = None;
    let end = loop {
        match transport.receive_reply()? {
            WireMessage::FileData(block) if block.relative_path == path => {
                if failure.is_none() {
                    if let Some(file) = writer.as_mut() {
                        failure = file.write_all(&block.data).err();
                    }
                }
                transport.send_message(&WireMessage::FileDataAck)?;
            }
            WireMessage::FileEnd(end) if end.relative_path == path => break end,
            other => {
                discard_partial(&partial, writer.is_some());
                return Err(SyncError::unexpected(
                    format!("FileData or FileEnd for {path}"),
                    other.message_type(),
                ));
            }
        }
    };

    let info = end.file.unwrap_or_else(|| descriptor.clone());
    let outcome = match (writer, failure) {
        (_, Some(err)) => Err(err),
        (Some(file), None) => finish(file, &partial, &target.path, &info),
        (None, None) => Ok(()),
    };

    match outcome {
        Ok(()) => {
            transport.send_message(&FileEndAckMessage::ok(path.clone()).into())?;
            debug!(path = %path, size = info.size, dry_run = target.dry_run, "file received");
            Ok(Some(info))
        }
        Err(err) => {
            discard_partial(&partial, true);
            transport.send_message(&FileEndAckMessage::failed(path.clone(), err.to_string()).into())?;
            Err(SyncError::transfer(path, err.to_string()))
        }
    }
}

fn open_partial(partial: &Path) -> io::Result<File> {
    if let Some(parent) = partial.parent() {
        fs::create_dir_all(parent)?;
    }
    File::create(partial)
}

fn finish(mut file: File, partial: &Path, target: &Path, info: &FileInfo) -> io::Result<()> {
    file.flush()?;
    file.set_modified(to_system_time(&info.modification_time))?;
    file.sync_all()?;
    drop(file);
    fs::rename(partial, target)
}

fn discard_partial(partial: &Path, exists: bool) {
    if exists {
        if let Err(err) = fs::remove_file(partial) {
            warn!(path = %partial.display(), error = %err, "cannot remove partial file");
        }
    }
}

/// Deletes one file under `root`. Returns whether something was removed.
///
/// In dry-run, reports whether the file exists without touching it.
pub fn delete_file(root: &Path, relative_path: &str, dry_run: bool) -> SyncResult<bool> {
    let path = resolve_path(root, relative_path)?;
    if dry_run {
        return Ok(path.is_file());
    }
    match fs::remove_file(&path) {
        Ok(()) => {
            debug!(path = %relative_path, "deleted");
            Ok(true)
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use dirsync_protocol::{from_system_time, now, StatusAck};
    use tempfile::tempdir;

    fn info_for(path: &Path, relative: &str) -> FileInfo {
        let metadata = fs::metadata(path).unwrap();
        FileInfo::from_metadata(relative, &metadata).unwrap()
    }

    #[test]
    fn resolve_rejects_escapes() {
        let root = Path::new("/srv/root");
        assert_eq!(
            resolve_path(root, "a/b.txt").unwrap(),
            PathBuf::from("/srv/root/a/b.txt")
        );
        assert!(resolve_path(root, "../etc/passwd").is_err());
        assert!(resolve_path(root, "/etc/passwd").is_err());
        assert!(resolve_path(root, "a/../../x").is_err());
        assert!(resolve_path(root, "").is_err());
        assert!(resolve_path(root, ".").is_err());
    }

    #[test]
    fn resolve_rejects_state_files() {
        let root = Path::new("/srv/root");
        for name in [".operation.log", "./.lastupdate.log", ".dirsync.lock", "a.txt.dirsync-part"] {
            assert!(
                matches!(resolve_path(root, name), Err(SyncError::InvalidPath { .. })),
                "{name} should be rejected"
            );
        }
        assert_eq!(
            resolve_path(root, "sub/.operation.log").unwrap(),
            PathBuf::from("/srv/root/sub/.operation.log")
        );
    }

    #[test]
    fn resolve_rejects_line_breaks() {
        let root = Path::new("/srv/root");
        for name in ["bad\nname.txt", "dir\r/a.txt"] {
            assert!(matches!(
                resolve_path(root, name),
                Err(SyncError::InvalidPath { .. })
            ));
        }
    }

    #[test]
    fn decline_file_sends_refusal() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a.txt");
        fs::write(&source, b"alpha").unwrap();
        let info = info_for(&source, "a.txt");

        let mut receiver = MockTransport::new();
        decline_file(&mut receiver, "a.txt", "not requested").unwrap();
        let refusal = receiver.sent()[0].clone();
        assert!(matches!(
            &refusal,
            WireMessage::FileDescriptorAck(ack) if !ack.ready && ack.relative_path == "a.txt"
        ));

        let mut sender = MockTransport::with_script([refusal]);
        assert!(!send_file(&mut sender, &source, &info, 16).unwrap());
        assert_eq!(sender.sent().len(), 1);
    }

    #[test]
    fn block_counts() {
        assert_eq!(block_count(0, 4), 1);
        assert_eq!(block_count(4, 4), 1);
        assert_eq!(block_count(5, 4), 2);
        assert_eq!(block_count(9, 4), 3);
    }

    #[test]
    fn send_splits_into_blocks() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("data.bin");
        fs::write(&source, b"0123456789").unwrap();
        let info = info_for(&source, "data.bin");

        let mut mock = MockTransport::with_script([
            FileDescriptorAckMessage::ready("data.bin").into(),
            WireMessage::FileDataAck,
            WireMessage::FileDataAck,
            WireMessage::FileDataAck,
            FileEndAckMessage::ok("data.bin").into(),
        ]);
        assert!(send_file(&mut mock, &source, &info, 4).unwrap());

        let blocks: Vec<_> = mock
            .sent()
            .iter()
            .filter_map(|m| match m {
                WireMessage::FileData(block) => Some(block.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].data, b"0123");
        assert_eq!(blocks[2].data, b"89");
        assert!(blocks.iter().all(|b| b.total_blocks == 3));
        assert!(matches!(mock.sent().last(), Some(WireMessage::FileEnd(_))));
    }

    #[test]
    fn empty_file_is_one_empty_block() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("empty");
        fs::write(&source, b"").unwrap();
        let info = info_for(&source, "empty");

        let mut mock = MockTransport::with_script([
            FileDescriptorAckMessage::ready("empty").into(),
            WireMessage::FileDataAck,
            FileEndAckMessage::ok("empty").into(),
        ]);
        assert!(send_file(&mut mock, &source, &info, 1024).unwrap());
        assert!(matches!(
            &mock.sent()[1],
            WireMessage::FileData(block) if block.data.is_empty() && block.total_blocks == 1
        ));
    }

    #[test]
    fn declined_file_is_skipped() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a");
        fs::write(&source, b"x").unwrap();
        let info = info_for(&source, "a");

        let mut mock =
            MockTransport::with_script([FileDescriptorAckMessage::refused("a", "no space").into()]);
        assert!(!send_file(&mut mock, &source, &info, 16).unwrap());
        assert_eq!(mock.sent().len(), 1);
    }

    #[test]
    fn failed_store_is_error() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a");
        fs::write(&source, b"x").unwrap();
        let info = info_for(&source, "a");

        let mut mock = MockTransport::with_script([
            FileDescriptorAckMessage::ready("a").into(),
            WireMessage::FileDataAck,
            FileEndAckMessage::failed("a", "disk full").into(),
        ]);
        assert!(matches!(
            send_file(&mut mock, &source, &info, 16),
            Err(SyncError::Transfer { .. })
        ));
    }

    #[test]
    fn wrong_reply_is_unexpected() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a");
        fs::write(&source, b"x").unwrap();
        let info = info_for(&source, "a");

        let mut mock = MockTransport::with_script([WireMessage::SyncEndAck(StatusAck::ok())]);
        assert!(matches!(
            send_file(&mut mock, &source, &info, 16),
            Err(SyncError::UnexpectedMessage { .. })
        ));
    }

    fn incoming_file(path: &str, blocks: &[&[u8]], info: &FileInfo) -> MockTransport {
        let mut mock = MockTransport::new();
        let total = blocks.len() as i32;
        for (i, data) in blocks.iter().enumerate() {
            mock.push_incoming(FileDataMessage {
                relative_path: path.to_string(),
                block_number: i as i32,
                total_blocks: total,
                data: data.to_vec(),
            });
        }
        mock.push_incoming(FileEndMessage {
            relative_path: path.to_string(),
            file: Some(info.clone()),
        });
        mock
    }

    #[test]
    fn receive_stores_file_with_mtime() {
        let dir = tempdir().unwrap();
        let mtime = now() - chrono::Duration::days(3);
        let info = FileInfo::new("sub/out.txt", 6, mtime, mtime);
        let mut mock = incoming_file("sub/out.txt", &[b"abc", b"def"], &info);

        let target = ReceiveTarget::new(dir.path().join("sub/out.txt"));
        let stored = receive_file(&mut mock, &info, &target).unwrap().unwrap();
        assert_eq!(stored.size, 6);

        let written = dir.path().join("sub/out.txt");
        assert_eq!(fs::read(&written).unwrap(), b"abcdef");
        let modified = fs::metadata(&written).unwrap().modified().unwrap();
        assert_eq!(from_system_time(modified), mtime);
        assert!(!dir.path().join("sub/out.txt.dirsync-part").exists());

        assert!(matches!(&mock.sent()[0], WireMessage::FileDescriptorAck(ack) if ack.ready));
        assert!(matches!(mock.sent().last(), Some(WireMessage::FileEndAck(ack)) if ack.success));
        assert_eq!(mock.sent().len(), 4);
    }

    #[test]
    fn dry_run_writes_nothing() {
        let dir = tempdir().unwrap();
        let info = FileInfo::new("x", 1, now(), now());
        let mut mock = incoming_file("x", &[b"1"], &info);
        let target = ReceiveTarget::new(dir.path().join("x")).with_dry_run(true);

        assert!(receive_file(&mut mock, &info, &target).unwrap().is_some());
        assert!(!dir.path().join("x").exists());
        assert!(matches!(mock.sent().last(), Some(WireMessage::FileEndAck(ack)) if ack.success));
    }

    #[test]
    fn unopenable_target_is_declined() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("blocker"), b"file, not dir").unwrap();
        let info = FileInfo::new("blocker/inner.txt", 1, now(), now());
        let mut mock = MockTransport::new();
        let target = ReceiveTarget::new(dir.path().join("blocker/inner.txt"));

        assert!(receive_file(&mut mock, &info, &target).unwrap().is_none());
        assert!(matches!(&mock.sent()[0], WireMessage::FileDescriptorAck(ack) if !ack.ready));
    }

    #[test]
    fn foreign_message_aborts_receive() {
        let dir = tempdir().unwrap();
        let info = FileInfo::new("x", 1, now(), now());
        let mut mock = MockTransport::with_script([WireMessage::StartRestore]);
        let target = ReceiveTarget::new(dir.path().join("x"));

        assert!(matches!(
            receive_file(&mut mock, &info, &target),
            Err(SyncError::UnexpectedMessage { .. })
        ));
        assert!(!dir.path().join("x.dirsync-part").exists());
    }

    #[test]
    fn delete_file_reports_removal() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("old.txt"), b"x").unwrap();

        assert!(delete_file(dir.path(), "old.txt", true).unwrap());
        assert!(dir.path().join("old.txt").exists());
        assert!(delete_file(dir.path(), "old.txt", false).unwrap());
        assert!(!delete_file(dir.path(), "old.txt", false).unwrap());
        assert!(matches!(
            delete_file(dir.path(), "../outside", false),
            Err(SyncError::InvalidPath { .. })
        ));
    }
}
