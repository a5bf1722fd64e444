//! Rsync engine tests.
//!
//! Most tests drive the engine against a small shell script standing in for
//! rsync, so the argument contract and output capture can be checked without
//! rsync installed. The mirror tests use the real rsync and skip when it is
//! missing.
//!
//! Every test calls `fake_rsync()` before spawning anything: the script is
//! written once, before any process is forked, so no child can inherit an open
//! handle to it (which would make exec fail with ETXTBSY).

use ramsync::adapters::StaticDisks;
use ramsync::config::MemoryConfigStore;
use ramsync::context::AppContext;
use ramsync::core::transfer_engine::rsync::MIRROR_ARGS;
use ramsync::core::transfer_engine::{RsyncEngine, TransferEngine, TransferStatus};
use ramsync::core::{Disk, SyncError, SyncOrchestrator, SyncStart, TransferRequest};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(30);

const FAKE_RSYNC: &str = r#"#!/bin/sh
for arg in "$@"; do
    echo "arg:$arg"
done
echo "notes.txt"
printf '        512  50%%    0.00kB/s    0:00:00\r'
printf '      1,024 100%%    0.00kB/s    0:00:00\n'
echo "fake rsync warning" >&2
case "$5" in
    *killed*) kill -9 $$ ;;
    *fail*) exit 23 ;;
esac
exit 0
"#;

fn fake_rsync() -> &'static Path {
    static SCRIPT: OnceLock<PathBuf> = OnceLock::new();
    SCRIPT.get_or_init(|| {
        let dir = std::env::temp_dir().join(format!("ramsync-fake-rsync-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("rsync");
        std::fs::write(&path, FAKE_RSYNC).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    })
}

fn has_rsync() -> bool {
    Command::new("rsync").arg("--version").output().is_ok()
}

fn create_file(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

#[tokio::test]
async fn passes_mirror_profile_and_both_paths() {
    let engine = RsyncEngine::new(fake_rsync());
    let req = TransferRequest::new("/Volumes/Scratch", "/tmp/sync/scratch/");

    let handle = engine.start(&req, None).unwrap();
    assert_eq!(handle.job_id(), req.job_id);
    let response = timeout(WAIT, handle.wait()).await.unwrap();

    let args: Vec<&str> = response
        .output
        .lines()
        .filter_map(|l| l.strip_prefix("arg:"))
        .collect();

    let mut expected: Vec<&str> = MIRROR_ARGS.to_vec();
    // both paths end with a slash so directory contents are mirrored
    expected.extend(["/Volumes/Scratch/", "/tmp/sync/scratch/"]);
    assert_eq!(args, expected);
    assert!(MIRROR_ARGS.contains(&"--delete"));
}

#[tokio::test]
async fn captures_stdout_stderr_and_exit_status() {
    let engine = RsyncEngine::new(fake_rsync());

    let ok = engine
        .start(&TransferRequest::new("/src", "/dst/ok"), None)
        .unwrap();
    let failed = engine
        .start(&TransferRequest::new("/src", "/dst/fail"), None)
        .unwrap();

    let ok = timeout(WAIT, ok.wait()).await.unwrap();
    let failed = timeout(WAIT, failed.wait()).await.unwrap();

    assert_eq!(ok.termination_status, 0);
    assert!(ok.output.contains("notes.txt\n"));
    assert!(ok.output.contains("\r"), "progress carriage returns are kept");
    assert_eq!(ok.error, "fake rsync warning\n");

    // a failing exit is reported, never turned into an error by the engine
    assert_eq!(failed.termination_status, 23);
    assert_eq!(failed.error, "fake rsync warning\n");
    assert!(ramsync::core::classify(&failed).is_err());
}

#[tokio::test]
async fn killed_process_reports_signal_status() {
    let engine = RsyncEngine::new(fake_rsync());

    let handle = engine
        .start(&TransferRequest::new("/src", "/dst/killed"), None)
        .unwrap();
    let response = timeout(WAIT, handle.wait()).await.unwrap();

    assert_eq!(response.termination_status, 128 + 9);
}

#[tokio::test]
async fn publishes_progress_until_exit() {
    let engine = RsyncEngine::new(fake_rsync());
    let (tx, mut rx) = mpsc::channel(32);

    let handle = engine
        .start(&TransferRequest::new("/src", "/dst/ok"), Some(tx))
        .unwrap();

    let mut updates = Vec::new();
    while let Some(status) = timeout(WAIT, rx.recv()).await.unwrap() {
        updates.push(status);
    }
    let response = handle.wait().await;

    assert_eq!(updates.first(), Some(&TransferStatus::Ready));
    assert!(updates.contains(&TransferStatus::InProgress {
        bytes_copied: 1024,
        percentage: 100,
        current_file: "notes.txt".to_string(),
    }));
    assert_eq!(
        updates.last(),
        Some(&TransferStatus::Complete {
            termination_status: response.termination_status
        })
    );
}

#[tokio::test]
async fn missing_binary_fails_before_anything_runs() {
    fake_rsync();
    let engine = RsyncEngine::new("/nonexistent/bin/rsync");

    let err = engine
        .start(&TransferRequest::new("/src", "/dst"), None)
        .unwrap_err();

    match err {
        SyncError::Spawn { program, .. } => {
            assert_eq!(program, PathBuf::from("/nonexistent/bin/rsync"))
        }
        other => panic!("expected Spawn, got {other:?}"),
    }
}

#[tokio::test]
async fn real_rsync_mirrors_and_deletes_extraneous_files() {
    fake_rsync();
    if !has_rsync() {
        eprintln!("rsync not installed, skipping");
        return;
    }

    let temp = tempdir().unwrap();
    let source = temp.path().join("source");
    let dest = temp.path().join("dest");
    create_file(&source.join("a.txt"), b"alpha");
    create_file(&source.join("nested/b.txt"), b"bravo");
    create_file(&dest.join("stale.txt"), b"old");
    create_file(&dest.join("a.txt"), b"outdated");

    let engine = RsyncEngine::new("rsync");
    let handle = engine
        .start(&TransferRequest::new(&source, &dest), None)
        .unwrap();
    let response = timeout(WAIT, handle.wait()).await.unwrap();

    assert_eq!(
        response.termination_status, 0,
        "rsync failed: {}",
        response.error
    );
    assert_eq!(std::fs::read(dest.join("a.txt")).unwrap(), b"alpha");
    assert_eq!(std::fs::read(dest.join("nested/b.txt")).unwrap(), b"bravo");
    assert!(!dest.join("stale.txt").exists(), "mirror must delete extras");
    assert!(!dest.join("source").exists(), "contents, not the directory");
}

#[tokio::test]
async fn backup_then_restore_round_trips_through_the_sync_folder() {
    fake_rsync();
    if !has_rsync() {
        eprintln!("rsync not installed, skipping");
        return;
    }

    let temp = tempdir().unwrap();
    let sync_root = temp.path().join("sync");
    let volumes = temp.path().join("Volumes");
    let volume = volumes.join("Scratch");
    std::fs::create_dir_all(sync_root.join("scratch")).unwrap();
    create_file(&volume.join("work/report.txt"), b"draft 1");

    let disk = Disk::new("Scratch", Some("Scratch"), 0);
    let ctx = AppContext::new(
        Arc::new(MemoryConfigStore::new(sync_root.to_string_lossy())),
        Arc::new(StaticDisks::new(vec![disk.clone()])),
        Arc::new(RsyncEngine::new("rsync")),
    )
    .with_volumes_root(&volumes);
    let orchestrator = SyncOrchestrator::new(ctx);

    let report = timeout(WAIT, orchestrator.backup_all()).await.unwrap();
    assert!(report.all_succeeded(), "{:?}", report.failures());
    assert_eq!(
        std::fs::read(sync_root.join("scratch/work/report.txt")).unwrap(),
        b"draft 1"
    );

    // the RAM disk comes back empty after a reboot
    std::fs::remove_dir_all(&volume).unwrap();
    std::fs::create_dir_all(&volume).unwrap();

    let SyncStart::Started(handle) = orchestrator.restore_one(&disk).unwrap() else {
        panic!("restore did not start");
    };
    let response = timeout(WAIT, handle.wait()).await.unwrap();
    assert_eq!(response.termination_status, 0, "{}", response.error);
    assert_eq!(
        std::fs::read(volume.join("work/report.txt")).unwrap(),
        b"draft 1"
    );
}
