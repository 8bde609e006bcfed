//! Full sessions between a real client and a loopback server.

use chrono::{TimeZone, Utc};
use dirsync_engine::SyncError;
use dirsync_protocol::error_codes;
use dirsync_testkit::prelude::*;
use std::fs;
use std::thread;
use std::time::{Duration, Instant};

fn wait_until_idle(server: &LoopbackServer) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !server.server().active_sessions().is_empty() {
        assert!(Instant::now() < deadline, "session never released its folder");
        thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn mirror_backup_then_restore() {
    let server = LoopbackServer::start(&[("docs", BackupType::Mirror)]);
    let client = server.client("docs", BackupType::Mirror);
    let source = TestTree::with_files([("a.txt", "alpha"), ("nested/b.txt", "beta")]);

    let stats = client.backup(source.path()).unwrap();
    assert_eq!(stats.files_transferred, 2);
    assert_eq!(
        fs::read_to_string(server.folder_path("docs").join("nested/b.txt")).unwrap(),
        "beta"
    );

    // Unchanged files are skipped, removed ones are mirrored.
    source.remove("a.txt");
    let stats = client.backup(source.path()).unwrap();
    assert_eq!(stats.files_transferred, 0);
    assert_eq!(stats.files_deleted, 1);
    assert!(!server.folder_path("docs").join("a.txt").exists());

    let target = TestTree::with_files([("stale.txt", "old")]);
    let stats = client.restore(target.path()).unwrap();
    assert_eq!(stats.files_transferred, 1);
    assert_eq!(stats.files_deleted, 1);
    assert_eq!(target.snapshot(), source.snapshot());
}

#[test]
fn preserve_keeps_deleted_files() {
    let server = LoopbackServer::start(&[("keep", BackupType::Preserve)]);
    let client = server.client("keep", BackupType::Preserve);
    let source = TestTree::with_files([("a.txt", "alpha"), ("b.txt", "beta")]);
    client.backup(source.path()).unwrap();

    source.remove("a.txt");
    let stats = client.backup(source.path()).unwrap();
    assert_eq!(stats.files_deleted, 0);
    assert!(server.folder_path("keep").join("a.txt").exists());

    let target = TestTree::with_files([("local.txt", "mine")]);
    client.restore(target.path()).unwrap();
    assert!(target.exists("a.txt"));
    assert!(target.exists("local.txt"));
}

#[test]
fn date_separated_stores_by_day() {
    let server = LoopbackServer::start(&[("daily", BackupType::DateSeparated)]);
    let client = server.client("daily", BackupType::DateSeparated);
    let source = TestTree::with_files([("report.txt", "march")]);
    source.set_modified("report.txt", Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap());

    client.backup(source.path()).unwrap();
    let stored = server.folder_path("daily").join("2024-03-05/report.txt");
    assert_eq!(fs::read_to_string(stored).unwrap(), "march");

    let target = TestTree::new();
    let stats = client.restore(target.path()).unwrap();
    assert_eq!(stats.files_transferred, 1);
    assert_eq!(target.read("report.txt"), "march");
}

#[test]
fn two_way_sync_converges() {
    let server = LoopbackServer::start(&[("shared", BackupType::TwoWaySync)]);
    let client = server.client("shared", BackupType::TwoWaySync);
    let local = TestTree::with_files([("docs/a.txt", "from client")]);
    let remote = server.folder_path("shared");
    fs::create_dir_all(remote.join("pics")).unwrap();
    fs::write(remote.join("pics/b.jpg"), "from server").unwrap();

    let first = client.sync(local.path()).unwrap();
    assert_eq!(first.files_transferred, 2);
    assert_eq!(first.conflicts, 0);
    assert_eq!(local.read("pics/b.jpg"), "from server");
    assert_eq!(
        fs::read_to_string(remote.join("docs/a.txt")).unwrap(),
        "from client"
    );

    let second = client.sync(local.path()).unwrap();
    assert_eq!(second.files_transferred, 0);
    assert_eq!(second.files_deleted, 0);
    assert_eq!(second.conflicts, 0);
}

#[test]
fn two_way_sync_propagates_deletion() {
    let server = LoopbackServer::start(&[("shared", BackupType::TwoWaySync)]);
    let client = server.client("shared", BackupType::TwoWaySync);
    let local = TestTree::with_files([("gone.txt", "bye"), ("kept.txt", "hi")]);
    client.sync(local.path()).unwrap();
    assert!(server.folder_path("shared").join("gone.txt").exists());

    // The deletion has to be observed after the upload was recorded.
    thread::sleep(Duration::from_millis(1100));
    local.remove("gone.txt");
    let stats = client.sync(local.path()).unwrap();
    assert_eq!(stats.conflicts, 0);
    assert!(!server.folder_path("shared").join("gone.txt").exists());
    assert!(server.folder_path("shared").join("kept.txt").exists());
}

#[test]
fn busy_folder_is_reported() {
    let server = LoopbackServer::start(&[("docs", BackupType::Mirror)]);
    let source = TestTree::with_files([("a.txt", "alpha")]);

    let held = server.client("docs", BackupType::Mirror).connect().unwrap();
    assert_eq!(server.server().active_sessions().len(), 1);
    let err = server
        .client("docs", BackupType::Mirror)
        .backup(source.path())
        .unwrap_err();
    assert!(matches!(err, SyncError::Remote { ref code, .. } if code == error_codes::BUSY));
    assert!(err.is_retryable());

    drop(held);
    wait_until_idle(&server);
    let stats = server
        .client("docs", BackupType::Mirror)
        .backup(source.path())
        .unwrap();
    assert_eq!(stats.files_transferred, 1);
}

#[test]
fn wrong_backup_type_is_refused() {
    let server = LoopbackServer::start(&[("docs", BackupType::Mirror)]);
    let local = TestTree::with_files([("a.txt", "alpha")]);
    let err = server
        .client("docs", BackupType::TwoWaySync)
        .sync(local.path())
        .unwrap_err();
    assert!(
        matches!(err, SyncError::Remote { ref code, .. } if code == error_codes::BACKUP_TYPE)
    );
}

#[test]
fn dry_run_changes_nothing() {
    let server = LoopbackServer::start(&[("docs", BackupType::Mirror)]);
    let source = TestTree::with_files([("a.txt", "alpha")]);
    let client = dirsync_engine::SyncClient::new(
        server
            .client_config("docs", BackupType::Mirror)
            .with_dry_run(true),
    );

    client.backup(source.path()).unwrap();
    assert!(!server.folder_path("docs").join("a.txt").exists());

    let server = LoopbackServer::start_with(&[("docs", BackupType::Mirror)], |config| {
        config.with_dry_run(true)
    });
    server
        .client("docs", BackupType::Mirror)
        .backup(source.path())
        .unwrap();
    assert!(!server.folder_path("docs").join("a.txt").exists());
}
