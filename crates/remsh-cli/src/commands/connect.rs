//! `remsh connect`: interactive remote session

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Args;
use remsh_terminal::{SessionMode, TerminalEngine};
use remsh_transport::{Credentials, Host, SharedSession, Transport, TransportSession};
use tracing::{debug, info, warn};

use crate::context::AppContext;
use crate::interactive;
use crate::output::OutputStyle;

/// How to reach a host and prove identity to it
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// `user@host[:port]`
    #[arg(value_name = "TARGET")]
    pub target: String,

    /// PEM private key to authenticate with instead of a password
    #[arg(short = 'i', long, value_name = "FILE")]
    pub identity: Option<PathBuf>,

    /// Encrypt and store the typed password for later connections
    #[arg(long)]
    pub remember: bool,
}

impl TargetArgs {
    pub fn host(&self) -> Result<Host> {
        Host::parse(&self.target)
            .ok_or_else(|| anyhow!("Invalid target '{}', expected user@host[:port]", self.target))
    }
}

#[derive(Args, Debug, Clone)]
pub struct ConnectArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Run every command as a one-shot execution instead of a persistent shell
    #[arg(long)]
    pub exec_mode: bool,

    /// Do not request a pty for one-shot executions
    #[arg(long)]
    pub no_pty: bool,
}

/// Credentials for `host`: key file, then stored password, then a prompt
pub fn resolve_credentials(ctx: &AppContext, host: &Host, args: &TargetArgs) -> Result<Credentials> {
    if let Some(identity) = &args.identity {
        return read_identity(identity);
    }

    let id = host.id();
    match stored_password(ctx, &id) {
        Ok(Some(password)) => {
            debug!(host = %host, "Using stored credential");
            return Ok(Credentials::Password(password));
        }
        Ok(None) => {}
        Err(e) => warn!(host = %host, error = %e, "Stored credential unavailable"),
    }

    let password = prompt_password(host)?;
    if args.remember {
        let vault = ctx.vault()?;
        ctx.credential_store()?
            .store_secret(&vault, &id, &password)
            .context("Failed to store credential")?;
    }
    Ok(Credentials::Password(password))
}

fn stored_password(ctx: &AppContext, id: &str) -> Result<Option<String>> {
    let store = ctx.credential_store()?;
    if store.get(id).is_none() {
        return Ok(None);
    }
    let vault = ctx.vault()?;
    Ok(store.load_secret(&vault, id)?)
}

fn read_identity(path: &Path) -> Result<Credentials> {
    let key_pem = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read identity file {}", path.display()))?;
    let passphrase = std::env::var("REMSH_KEY_PASSPHRASE").ok();
    Ok(Credentials::PrivateKey {
        key_pem,
        passphrase,
    })
}

fn prompt_password(host: &Host) -> Result<String> {
    eprint!("Password for {}: ", host);
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("Failed to read password")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Connect a fresh transport session without an engine, for one-shot work
pub async fn open_session(
    transport: Box<dyn Transport>,
    host: Host,
    credentials: Credentials,
    timeout: Duration,
) -> Result<SharedSession> {
    let label = host.to_string();
    let session = tokio::task::spawn_blocking(move || {
        let mut session = TransportSession::new(transport);
        session.connect(&host, &credentials, timeout).map(|_| session)
    })
    .await
    .context("Connection task failed")?
    .with_context(|| format!("Failed to connect to {}", label))?;
    Ok(session.into_shared())
}

/// Close a session opened with [`open_session`], logging failures
pub async fn close_session(session: SharedSession) {
    let closed = tokio::task::spawn_blocking(move || session.lock().close()).await;
    match closed {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Error while closing session"),
        Err(e) => warn!(error = %e, "Close task failed"),
    }
}

/// Engine configured for this invocation
pub fn build_engine(ctx: &AppContext, args: &ConnectArgs) -> TerminalEngine {
    let mut options = ctx.config.engine_options();
    if args.exec_mode {
        options.shell_mode = false;
    }
    if args.no_pty {
        options.pty_enabled = false;
    }
    TerminalEngine::new(options, ctx.history(true))
}

/// Connect the engine and hand stdin/stdout to it until the session ends
pub async fn run_with_transport(
    ctx: &AppContext,
    args: &ConnectArgs,
    transport: Box<dyn Transport>,
    credentials: Credentials,
) -> Result<()> {
    let host = args.target.host()?;
    let engine = build_engine(ctx, args);
    let style = OutputStyle::default();

    let mode = match engine.connect(transport, host.clone(), credentials).await {
        Ok(mode) => mode,
        Err(e) => {
            for line in engine.state().output.iter() {
                eprintln!("{}", style.line(line));
            }
            return Err(e).with_context(|| format!("Failed to connect to {}", host));
        }
    };
    info!(host = %host, mode = ?mode, "Connected");
    if let SessionMode::ExecReady { .. } = mode {
        eprintln!("{}", style.warning("Running in exec mode: each command starts a fresh shell"));
    }

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    interactive::run(&engine, stdin, Box::new(std::io::stdout()), style).await
}

#[cfg(feature = "ssh")]
pub async fn execute(ctx: &AppContext, args: ConnectArgs) -> Result<()> {
    let host = args.target.host()?;
    let credentials = resolve_credentials(ctx, &host, &args.target)?;
    let transport = crate::commands::ssh_transport(ctx)?;
    run_with_transport(ctx, &args, transport, credentials).await
}
