//! Uploads the server did not ask for are declined and never stored.

use dirsync_engine::{MockTransport, StatusAnalyzer, OPERATION_LOG};
use dirsync_protocol::{
    now, FileDataMessage, FileDescriptorAckMessage, FileDescriptorMessage, FileEndAckMessage,
    FileEndMessage, FileInfo, FileListMessage, FileSyncMessage, StatusAck, SyncEndMessage,
    WireMessage,
};
use dirsync_server::{run_backup, run_two_way, MirrorPolicy, Session};
use std::fs;
use tempfile::tempdir;

fn descriptor(path: &str, size: u64) -> WireMessage {
    let t = now();
    FileDescriptorMessage {
        file: FileInfo::new(path, size, t, t),
    }
    .into()
}

fn declined(sent: &[WireMessage]) -> Vec<String> {
    sent.iter()
        .filter_map(|message| match message {
            WireMessage::FileDescriptorAck(ack) if !ack.ready => Some(ack.relative_path.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn two_way_declines_unrequested_uploads() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("shared");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("a.txt"), b"alpha").unwrap();
    let session = Session {
        root: root.clone(),
        block_size: 1024,
        dry_run: false,
    };

    let mut mock = MockTransport::with_script([
        WireMessage::FileSync(FileSyncMessage::single(Vec::new())),
        // Declined: the client is expected to move on without sending data.
        descriptor(OPERATION_LOG, 7),
        descriptor("extra.txt", 5),
        WireMessage::FileSyncAck(StatusAck::ok()),
        WireMessage::StartRestore,
        FileDescriptorAckMessage::ready("a.txt").into(),
        WireMessage::FileDataAck,
        FileEndAckMessage::ok("a.txt").into(),
        WireMessage::SyncEndAck(StatusAck::ok()),
    ]);

    let stats = run_two_way(&mut mock, &session).unwrap();
    assert_eq!(stats.files_transferred, 1);
    assert_eq!(declined(mock.sent()), vec![OPERATION_LOG, "extra.txt"]);
    assert!(!root.join("extra.txt").exists());

    // The log is intact and still readable.
    let analyzer = StatusAnalyzer::new(&root);
    assert!(analyzer.analyze().unwrap().is_empty());
    assert!(analyzer.latest_entries().unwrap().contains_key("a.txt"));
}

#[test]
fn backup_declines_state_files() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("store");
    let session = Session {
        root: root.clone(),
        block_size: 1024,
        dry_run: false,
    };
    let t = now();
    let list = FileListMessage::single(vec![FileInfo::new("a.txt", 5, t, t)], true);

    let mut mock = MockTransport::with_script([
        descriptor(OPERATION_LOG, 7),
        descriptor("a.txt", 5),
        FileDataMessage {
            relative_path: "a.txt".into(),
            block_number: 0,
            total_blocks: 1,
            data: b"alpha".to_vec(),
        }
        .into(),
        FileEndMessage {
            relative_path: "a.txt".into(),
            file: None,
        }
        .into(),
        SyncEndMessage {
            is_backup: true,
            files_transferred: 1,
            files_deleted: 0,
        }
        .into(),
    ]);

    let stats = run_backup(&mut mock, &session, &MirrorPolicy, list).unwrap();
    assert_eq!(stats.files_transferred, 1);
    assert_eq!(declined(mock.sent()), vec![OPERATION_LOG]);
    assert!(!root.join(OPERATION_LOG).exists());
    assert_eq!(fs::read(root.join("a.txt")).unwrap(), b"alpha");
}
