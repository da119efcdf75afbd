//! CLI command handlers against temporary storage and the scripted transport

use std::fs;
use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;
use remsh_cli::commands::connect::{build_engine, close_session, open_session, ConnectArgs, TargetArgs};
use remsh_cli::commands::files::{run_on_session, FilesAction};
use remsh_cli::commands::{history, vault, HistoryAction, VaultAction};
use remsh_cli::interactive;
use remsh_cli::output::OutputStyle;
use remsh_cli::AppContext;
use remsh_config::RemshConfig;
use remsh_terminal::SessionMode;
use remsh_transport::testing::ScriptedTransport;
use remsh_transport::{Credentials, ExecOutput, Host};
use tempfile::TempDir;

fn context(dir: &TempDir) -> AppContext {
    let mut config = RemshConfig::default();
    config.storage.data_dir = dir.path().join("data");
    AppContext::new(config)
}

fn run_vault(ctx: &AppContext, action: VaultAction) -> anyhow::Result<String> {
    let mut out = Vec::new();
    vault::execute(ctx, action, &mut out)?;
    Ok(String::from_utf8(out).unwrap())
}

fn run_history(ctx: &AppContext, action: HistoryAction) -> String {
    let mut out = Vec::new();
    history::execute(ctx, action, &mut out).unwrap();
    String::from_utf8(out).unwrap()
}

/// Cloneable in-memory writer
#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn connect_args(exec_mode: bool) -> ConnectArgs {
    ConnectArgs {
        target: TargetArgs {
            target: "deploy@build.example.com".into(),
            identity: None,
            remember: false,
        },
        exec_mode,
        no_pty: false,
    }
}

#[test]
fn test_vault_encrypt_decrypt_roundtrip() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);

    let blob = run_vault(&ctx, VaultAction::Encrypt { plaintext: "hunter2".into() }).unwrap();
    let blob = blob.trim().to_string();
    assert!(!blob.contains("hunter2"));

    let plain = run_vault(&ctx, VaultAction::Decrypt { blob }).unwrap();
    assert_eq!(plain.trim(), "hunter2");
}

#[test]
fn test_vault_clear_keys_requires_confirmation() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);
    let blob = run_vault(&ctx, VaultAction::Encrypt { plaintext: "pw".into() }).unwrap();

    assert!(run_vault(&ctx, VaultAction::ClearKeys { yes: false }).is_err());
    run_vault(&ctx, VaultAction::ClearKeys { yes: true }).unwrap();

    let result = run_vault(&ctx, VaultAction::Decrypt { blob: blob.trim().to_string() });
    assert!(result.is_err());
}

#[test]
fn test_vault_store_list_remove() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);

    run_vault(
        &ctx,
        VaultAction::Store {
            host_id: "ops@db.example.com:22".into(),
            secret: Some("s3cret".into()),
        },
    )
    .unwrap();

    let raw = fs::read_to_string(ctx.config.storage.credentials_file()).unwrap();
    assert!(!raw.contains("s3cret"));
    assert_eq!(run_vault(&ctx, VaultAction::List).unwrap(), "ops@db.example.com:22\n");

    let removed = run_vault(
        &ctx,
        VaultAction::Remove {
            host_id: "ops@db.example.com:22".into(),
        },
    )
    .unwrap();
    assert!(removed.starts_with("Removed"));
    assert_eq!(run_vault(&ctx, VaultAction::List).unwrap(), "");
}

#[test]
fn test_vault_refuses_empty_secret() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);
    let result = run_vault(
        &ctx,
        VaultAction::Store {
            host_id: "ops@db:22".into(),
            secret: Some(String::new()),
        },
    );
    assert!(result.is_err());
}

#[test]
fn test_history_commands() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);
    {
        let mut history = ctx.history(false);
        for command in ["ls -la", "git status", "tail -f app.log", "git log"] {
            history.add(command);
        }
    }

    let listed = run_history(&ctx, HistoryAction::List { limit: Some(2) });
    assert_eq!(listed, "    3  tail -f app.log\n    4  git log\n");

    let found = run_history(&ctx, HistoryAction::Search { query: "GIT".into() });
    assert_eq!(found, "git log\ngit status\n");

    let cleared = run_history(&ctx, HistoryAction::Clear);
    assert_eq!(cleared, "Cleared 4 history entries\n");
    assert_eq!(run_history(&ctx, HistoryAction::List { limit: None }), "");
}

#[tokio::test]
async fn test_interactive_exec_session() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);
    let (transport, handle) = ScriptedTransport::new();
    handle.set_exec("uptime", ExecOutput::success(" 10:00 up 3 days\n"));

    let engine = build_engine(&ctx, &connect_args(true));
    let mode = engine
        .connect(
            Box::new(transport),
            Host::new("build.example.com", "deploy"),
            Credentials::Password("pw".into()),
        )
        .await
        .unwrap();
    assert!(matches!(mode, SessionMode::ExecReady { pty_enabled: true }));

    let sink = SharedBuffer::default();
    let input: &[u8] = b"uptime\n\nexit\nnever sent\n";
    interactive::run(&engine, input, Box::new(sink.clone()), OutputStyle::plain())
        .await
        .unwrap();

    let text = sink.text();
    let lines: Vec<&str> = text.lines().collect();
    assert!(lines.contains(&"$ uptime"));
    assert!(lines.contains(&" 10:00 up 3 days"));
    assert_eq!(lines.last(), Some(&"Disconnected"));
    assert!(!text.contains("never sent"));

    assert_eq!(handle.execs(), vec![("uptime".to_string(), true)]);
    assert!(!handle.is_connected());
    assert_eq!(engine.history_entries(), vec!["uptime".to_string()]);
}

#[tokio::test]
async fn test_interactive_ends_with_input() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);
    let (transport, handle) = ScriptedTransport::new();

    let engine = build_engine(&ctx, &connect_args(true));
    engine
        .connect(
            Box::new(transport),
            Host::new("build.example.com", "deploy"),
            Credentials::Password("pw".into()),
        )
        .await
        .unwrap();

    let sink = SharedBuffer::default();
    let input: &[u8] = b"";
    interactive::run(&engine, input, Box::new(sink.clone()), OutputStyle::plain())
        .await
        .unwrap();

    assert_eq!(handle.close_count(), 1);
    assert!(sink.text().ends_with("Disconnected\n"));
}

#[tokio::test]
async fn test_files_over_session() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);
    let (transport, handle) = ScriptedTransport::new();
    handle.files().add_dir("logs");
    handle.files().add_file("logs/app.log", b"started\n");
    handle.files().add_file("notes.md", b"# notes");

    let session = open_session(
        Box::new(transport),
        Host::new("files.example.com", "deploy"),
        Credentials::Password("pw".into()),
        std::time::Duration::from_secs(1),
    )
    .await
    .unwrap();

    let mut out = Vec::new();
    run_on_session(&ctx, &session, FilesAction::Ls { dir: ".".into() }, &mut out, None)
        .await
        .unwrap();
    let listing = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = listing.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("drwxr-xr-x"));
    assert!(lines[0].ends_with(" logs"));
    assert!(lines[1].ends_with(" notes.md"));

    let local = dir.path().join("downloads/app.log");
    let mut out = Vec::new();
    run_on_session(
        &ctx,
        &session,
        FilesAction::Get {
            remote: "logs/app.log".into(),
            local: local.clone(),
        },
        &mut out,
        None,
    )
    .await
    .unwrap();
    assert_eq!(fs::read(&local).unwrap(), b"started\n");

    let upload = dir.path().join("report.csv");
    fs::write(&upload, b"a,b\n").unwrap();
    let mut out = Vec::new();
    run_on_session(
        &ctx,
        &session,
        FilesAction::Put {
            local: upload,
            remote: "reports/report.csv".into(),
        },
        &mut out,
        None,
    )
    .await
    .unwrap();
    assert_eq!(handle.files().read("reports/report.csv"), Some(b"a,b\n".to_vec()));

    let mut out = Vec::new();
    let rejected = run_on_session(
        &ctx,
        &session,
        FilesAction::Put {
            local: dir.path().join("report.csv"),
            remote: "../report.csv".into(),
        },
        &mut out,
        None,
    )
    .await;
    assert!(rejected.is_err());

    close_session(session).await;
    assert!(!handle.is_connected());
    assert_eq!(handle.files().close_count(), 4);
}
