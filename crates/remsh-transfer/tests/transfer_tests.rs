//! File transfer engine against the scripted transport's in-memory file tree

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use remsh_guard::{TransferRejection, TransferValidator};
use remsh_transfer::{FileTransferEngine, ProgressCallback, TransferError, TransferProgress};
use remsh_transport::testing::{ScriptHandle, ScriptedTransport};
use remsh_transport::{Credentials, Host, SharedSession, TransportSession};
use tempfile::TempDir;

fn connected_session() -> (SharedSession, ScriptHandle) {
    let (transport, handle) = ScriptedTransport::new();
    let mut session = TransportSession::new(Box::new(transport));
    session
        .connect(
            &Host::new("files.example.com", "deploy"),
            &Credentials::Password("secret".into()),
            Duration::from_secs(1),
        )
        .unwrap();
    (session.into_shared(), handle)
}

async fn connected_engine() -> (FileTransferEngine, ScriptHandle) {
    let (session, handle) = connected_session();
    let engine = FileTransferEngine::new(TransferValidator::new());
    engine.connect(&session).await.unwrap();
    (engine, handle)
}

fn recorder() -> (ProgressCallback, Arc<Mutex<Vec<TransferProgress>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callback: ProgressCallback = Arc::new(move |p| sink.lock().push(p));
    (callback, seen)
}

#[tokio::test]
async fn test_connect_requires_connected_session() {
    let (transport, _handle) = ScriptedTransport::new();
    let session = TransportSession::new(Box::new(transport)).into_shared();
    let engine = FileTransferEngine::new(TransferValidator::new());

    let result = engine.connect(&session).await;
    assert!(matches!(result, Err(TransferError::TransportNotReady)));
    assert!(!engine.is_connected());
}

#[tokio::test]
async fn test_operations_before_connect_fail() {
    let engine = FileTransferEngine::new(TransferValidator::new());
    assert!(matches!(
        engine.list_files(".").await,
        Err(TransferError::NotConnected)
    ));
    assert!(matches!(
        engine.stat("notes.txt").await,
        Err(TransferError::NotConnected)
    ));
}

#[tokio::test]
async fn test_list_files_sorts_directories_first() {
    let (engine, handle) = connected_engine().await;
    handle.files().add_file("b.log", b"bb");
    handle.files().add_dir("src");
    handle.files().add_file("a.txt", b"a");
    handle.files().add_dir("docs");
    handle.files().add_file("docs/readme.md", b"# hi");

    let entries = engine.list_files(".").await.unwrap();
    let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["docs", "src", "a.txt", "b.log"]);

    assert!(entries[0].is_directory);
    assert_eq!(entries[0].permissions_summary, "drwxr-xr-x");
    assert_eq!(entries[3].size, 2);
    assert_eq!(entries[3].permissions_summary, "-rw-r--r--");
    assert!(entries[3].last_modified.is_some());

    let nested = engine.list_files("docs").await.unwrap();
    assert_eq!(nested.len(), 1);
    assert_eq!(nested[0].path, "docs/readme.md");
}

#[tokio::test]
async fn test_upload_streams_file_with_progress() {
    let (engine, handle) = connected_engine().await;
    let dir = TempDir::new().unwrap();
    let local = dir.path().join("notes.txt");
    let contents = vec![b'x'; 70_000];
    fs::write(&local, &contents).unwrap();

    let (progress, seen) = recorder();
    let sent = engine
        .upload(&local, "uploads/notes.txt", Some(progress))
        .await
        .unwrap();

    assert_eq!(sent, 70_000);
    assert_eq!(handle.files().read("uploads/notes.txt"), Some(contents));

    let seen = seen.lock();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen.last().map(|p| p.transferred), Some(70_000));
    assert!(seen.iter().all(|p| p.total == Some(70_000)));
    assert!(seen.windows(2).all(|w| w[0].transferred < w[1].transferred));
}

#[tokio::test]
async fn test_upload_rejections_write_nothing() {
    let (engine, handle) = connected_engine().await;
    let dir = TempDir::new().unwrap();
    let local = dir.path().join("tool.exe");
    fs::write(&local, b"MZ").unwrap();

    let result = engine.upload(&local, "tool.exe", None).await;
    assert!(matches!(
        result,
        Err(TransferError::Rejected(TransferRejection::ExtensionNotAllowed(_)))
    ));

    let good = dir.path().join("notes.txt");
    fs::write(&good, b"ok").unwrap();
    let result = engine.upload(&good, "../etc/passwd", None).await;
    assert!(matches!(
        result,
        Err(TransferError::Rejected(TransferRejection::PathTraversal(_)))
    ));

    let result = engine.upload(&good, "/etc/notes.txt", None).await;
    assert!(matches!(
        result,
        Err(TransferError::Rejected(TransferRejection::AbsolutePath(_)))
    ));

    assert_eq!(handle.files().read("tool.exe"), None);
    assert!(engine.list_files(".").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_upload_respects_size_limit() {
    let (session, _handle) = connected_session();
    let engine = FileTransferEngine::new(TransferValidator::with_max_upload(16));
    engine.connect(&session).await.unwrap();

    let dir = TempDir::new().unwrap();
    let local = dir.path().join("big.txt");
    fs::write(&local, vec![b'a'; 17]).unwrap();

    let result = engine.upload(&local, "big.txt", None).await;
    assert!(matches!(
        result,
        Err(TransferError::Rejected(TransferRejection::FileTooLarge { .. }))
    ));
}

#[tokio::test]
async fn test_download_creates_parents() {
    let (engine, handle) = connected_engine().await;
    handle.files().add_dir("logs");
    handle.files().add_file("logs/app.log", b"line one\nline two\n");

    let dir = TempDir::new().unwrap();
    let local = dir.path().join("nested/deeper/app.log");
    let (progress, seen) = recorder();

    let received = engine
        .download("logs/app.log", &local, Some(progress))
        .await
        .unwrap();

    assert_eq!(received, 18);
    assert_eq!(fs::read(&local).unwrap(), b"line one\nline two\n");
    assert_eq!(
        seen.lock().last().copied(),
        Some(TransferProgress {
            transferred: 18,
            total: Some(18)
        })
    );

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(&local).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    let leftovers: Vec<_> = fs::read_dir(local.parent().unwrap())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(leftovers.len(), 1);
}

#[tokio::test]
async fn test_download_missing_file_leaves_no_partial() {
    let (engine, _handle) = connected_engine().await;
    let dir = TempDir::new().unwrap();
    let local = dir.path().join("missing.txt");

    let result = engine.download("missing.txt", &local, None).await;
    assert!(matches!(result, Err(TransferError::Transport(_))));
    assert!(!local.exists());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_stat_reports_size() {
    let (engine, handle) = connected_engine().await;
    handle.files().add_file("data.csv", b"a,b\n1,2\n");

    let stat = engine.stat("data.csv").await.unwrap();
    assert_eq!(stat.size, 8);
    assert!(!stat.is_dir);
}

#[tokio::test]
async fn test_disconnect_is_idempotent_and_logs_close_errors() {
    let (engine, handle) = connected_engine().await;
    handle.files().fail_close("channel already gone");

    engine.disconnect().await;
    engine.disconnect().await;

    assert!(!engine.is_connected());
    assert_eq!(handle.files().close_count(), 1);
    assert!(matches!(
        engine.list_files(".").await,
        Err(TransferError::NotConnected)
    ));
}

#[tokio::test]
async fn test_channel_outlives_session_borrow() {
    let (session, handle) = connected_session();
    let engine = FileTransferEngine::new(TransferValidator::new());
    engine.connect(&session).await.unwrap();
    drop(session);

    handle.files().add_file("still.txt", b"here");
    let entries = engine.list_files(".").await.unwrap();
    assert_eq!(entries.len(), 1);
}
