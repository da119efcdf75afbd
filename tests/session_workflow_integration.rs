//! End-to-end workflows across the remsh crates over the scripted transport

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use remsh_config::{ConfigManager, RemshConfig};
use remsh_history::{CommandHistory, JsonFileHistoryStore};
use remsh_terminal::{EngineState, LineKind, SessionMode, SubmitOutcome, TerminalEngine};
use remsh_transfer::FileTransferEngine;
use remsh_transport::testing::ScriptedTransport;
use remsh_transport::{Credentials, ExecOutput, Host, KnownHosts, TransportError};
use remsh_vault::{CredentialStore, CredentialVault, FileKeyStore};
use tempfile::TempDir;

fn fast_config(dir: &TempDir) -> RemshConfig {
    let mut config = RemshConfig::default();
    config.terminal.shell_settle_ms = 10;
    config.polling.min_interval_ms = 5;
    config.polling.max_interval_ms = 40;
    config.polling.speedup_step_ms = 1;
    config.polling.slowdown_step_ms = 5;
    config.storage.data_dir = dir.path().join("data");
    config
}

async fn wait_for(
    engine: &TerminalEngine,
    predicate: impl FnMut(&EngineState) -> bool,
) -> EngineState {
    let mut rx = engine.subscribe();
    let state = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(predicate))
        .await
        .expect("condition not reached in time")
        .unwrap();
    state.clone()
}

#[tokio::test]
async fn test_shell_session_with_file_transfer_and_persisted_history() {
    let dir = TempDir::new().unwrap();
    let config = fast_config(&dir);
    let history_file = config.storage.history_file();

    let (transport, handle) = ScriptedTransport::new();
    handle.push_output("Welcome to build-01\n");
    handle.echo_writes(true);
    handle.files().add_dir("releases");
    handle.files().add_file("releases/v1.tar.gz", b"tarball");

    let history = CommandHistory::load(
        Arc::new(JsonFileHistoryStore::new(&history_file)),
        config.history.max_size,
    );
    let engine = TerminalEngine::new(config.engine_options(), history);
    let mode = engine
        .connect(
            Box::new(transport),
            Host::new("build-01", "deploy"),
            Credentials::Password("pw".into()),
        )
        .await
        .unwrap();
    assert_eq!(mode, SessionMode::ShellActive);

    let state = wait_for(&engine, |s| s.output.texts().iter().any(|t| t == "Welcome to build-01")).await;
    assert_eq!(state.host_label.as_deref(), Some("deploy@build-01"));

    assert!(matches!(engine.submit("ls releases").await, SubmitOutcome::Sent));
    let state = wait_for(&engine, |s| {
        s.output
            .iter()
            .any(|l| l.kind == LineKind::Output && l.text == "ls releases")
    })
    .await;
    assert!(state.output.texts().contains(&"$ ls releases".to_string()));

    // The same session carries file transfers
    let session = engine.session_handle().unwrap();
    let transfer = FileTransferEngine::new(RemshConfig::default().transfer.validator());
    transfer.connect(&session).await.unwrap();

    let entries = transfer.list_files("releases").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "v1.tar.gz");

    let local = dir.path().join("downloads/v1.tar.gz");
    assert_eq!(transfer.download("releases/v1.tar.gz", &local, None).await.unwrap(), 7);
    assert_eq!(fs::read(&local).unwrap(), b"tarball");
    transfer.disconnect().await;

    assert!(matches!(engine.submit("exit").await, SubmitOutcome::Disconnected));
    assert_eq!(engine.mode(), SessionMode::Disconnected);
    assert!(!handle.is_connected());

    let stored: Vec<String> = serde_json::from_str(&fs::read_to_string(&history_file).unwrap()).unwrap();
    assert_eq!(stored, vec!["ls releases".to_string()]);
}

#[tokio::test]
async fn test_shell_failure_falls_back_to_exec() {
    let dir = TempDir::new().unwrap();
    let config = fast_config(&dir);

    let (transport, handle) = ScriptedTransport::new();
    handle.fail_shell("pty refused");
    handle.set_exec("hostname", ExecOutput::success("db-02\n"));

    let engine = TerminalEngine::new(config.engine_options(), CommandHistory::in_memory(50));
    let mode = engine
        .connect(
            Box::new(transport),
            Host::new("db-02", "ops"),
            Credentials::Password("pw".into()),
        )
        .await
        .unwrap();
    assert_eq!(mode, SessionMode::ExecReady { pty_enabled: true });

    match engine.submit("hostname").await {
        SubmitOutcome::Executing(task) => task.await.unwrap(),
        other => panic!("expected an exec, got {:?}", other),
    }
    let texts = engine.state().output.texts();
    assert!(texts.iter().any(|t| t.starts_with("Shell unavailable:")));
    assert!(texts.contains(&"db-02".to_string()));
}

#[tokio::test]
async fn test_rate_limit_from_config() {
    let dir = TempDir::new().unwrap();
    let mut config = fast_config(&dir);
    config.terminal.shell_mode = false;
    config.guard.max_commands_per_window = 2;
    config.guard.window_ms = 60_000;

    let (transport, _handle) = ScriptedTransport::new();
    let engine = TerminalEngine::new(config.engine_options(), CommandHistory::in_memory(50));
    engine
        .connect(
            Box::new(transport),
            Host::new("web-1", "deploy"),
            Credentials::Password("pw".into()),
        )
        .await
        .unwrap();

    for command in ["uptime", "df -h"] {
        if let SubmitOutcome::Executing(task) = engine.submit(command).await {
            task.await.unwrap();
        }
    }
    assert!(matches!(engine.submit("free -m").await, SubmitOutcome::Rejected(_)));
    assert_eq!(
        engine.history_entries(),
        vec!["uptime".to_string(), "df -h".to_string()]
    );
}

#[test]
fn test_stored_credentials_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let config = fast_config(&dir);
    let storage = &config.storage;
    let host = Host::new("db.example.com", "ops");

    {
        let vault = CredentialVault::new(Arc::new(FileKeyStore::open(storage.keys_dir()).unwrap())).unwrap();
        let store = CredentialStore::open(storage.credentials_file()).unwrap();
        store.store_secret(&vault, &host.id(), "correct horse").unwrap();
    }

    let vault = CredentialVault::new(Arc::new(FileKeyStore::open(storage.keys_dir()).unwrap())).unwrap();
    let store = CredentialStore::open(storage.credentials_file()).unwrap();
    assert_eq!(
        store.load_secret(&vault, &host.id()).unwrap().as_deref(),
        Some("correct horse")
    );

    vault.clear_keys().unwrap();
    let fresh = CredentialVault::new(Arc::new(FileKeyStore::open(storage.keys_dir()).unwrap())).unwrap();
    assert!(store.load_secret(&fresh, &host.id()).is_err());
}

#[test]
fn test_known_hosts_pin_persists() {
    let dir = TempDir::new().unwrap();
    let config = fast_config(&dir);
    let path = config.storage.known_hosts_file();
    fs::create_dir_all(path.parent().unwrap()).unwrap();

    let known = KnownHosts::open(&path).unwrap();
    known.check("db.example.com:22", "SHA256:aaaa").unwrap();

    let reopened = KnownHosts::open(&path).unwrap();
    assert!(reopened.check("db.example.com:22", "SHA256:aaaa").is_ok());
    assert!(matches!(
        reopened.check("db.example.com:22", "SHA256:bbbb"),
        Err(TransportError::HostKeyMismatch { .. })
    ));
}

#[test]
fn test_config_file_drives_cli_context() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    let mut config = fast_config(&dir);
    config.history.max_size = 20;
    ConfigManager::with_path(&path).save(&config).unwrap();

    let cli = remsh_cli::Cli::parse_from([
        "remsh",
        "--config",
        path.to_str().unwrap(),
        "history",
        "list",
    ]);
    let ctx = cli.load_context().unwrap();
    assert_eq!(ctx.config.history.max_size, 20);
    assert_eq!(ctx.history(false).max_size(), 20);
}
