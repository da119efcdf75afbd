//! `remsh files`: one-shot listing, upload and download

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use remsh_transfer::{FileTransferEngine, ProgressCallback, TransferProgress};
use remsh_transport::SharedSession;

use crate::commands::connect::TargetArgs;
use crate::context::AppContext;

#[derive(Args, Debug, Clone)]
pub struct FilesArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    #[command(subcommand)]
    pub action: FilesAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum FilesAction {
    /// List a remote directory
    Ls {
        #[arg(value_name = "DIR", default_value = ".")]
        dir: String,
    },

    /// Download a remote file
    Get {
        #[arg(value_name = "REMOTE")]
        remote: String,
        #[arg(value_name = "LOCAL")]
        local: PathBuf,
    },

    /// Upload a local file to a relative remote path
    Put {
        #[arg(value_name = "LOCAL")]
        local: PathBuf,
        #[arg(value_name = "REMOTE")]
        remote: String,
    },
}

/// Transfer engine configured from the transfer section
pub fn transfer_engine(ctx: &AppContext) -> FileTransferEngine {
    let transfer = &ctx.config.transfer;
    FileTransferEngine::with_buffer_size(transfer.validator(), transfer.buffer_size)
}

/// Run one files action over an already connected session
pub async fn run_on_session(
    ctx: &AppContext,
    session: &SharedSession,
    action: FilesAction,
    out: &mut dyn Write,
    progress: Option<ProgressCallback>,
) -> Result<()> {
    let engine = transfer_engine(ctx);
    engine
        .connect(session)
        .await
        .context("Failed to open file transfer channel")?;

    let result = run_action(&engine, action, out, progress).await;
    engine.disconnect().await;
    result
}

async fn run_action(
    engine: &FileTransferEngine,
    action: FilesAction,
    out: &mut dyn Write,
    progress: Option<ProgressCallback>,
) -> Result<()> {
    match action {
        FilesAction::Ls { dir } => {
            for entry in engine.list_files(&dir).await? {
                let modified = entry
                    .last_modified
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".to_string());
                writeln!(
                    out,
                    "{} {:>12} {} {}",
                    entry.permissions_summary, entry.size, modified, entry.name
                )?;
            }
        }
        FilesAction::Get { remote, local } => {
            let bytes = engine.download(&remote, &local, progress).await?;
            writeln!(out, "Downloaded {} ({} bytes) to {}", remote, bytes, local.display())?;
        }
        FilesAction::Put { local, remote } => {
            let bytes = engine.upload(&local, &remote, progress).await?;
            writeln!(out, "Uploaded {} ({} bytes) to {}", local.display(), bytes, remote)?;
        }
    }
    Ok(())
}

/// Progress printed on stderr as a percentage when the size is known
pub fn stderr_progress() -> ProgressCallback {
    Arc::new(|p: TransferProgress| match p.total {
        Some(total) if total > 0 => {
            eprint!("\r{:>3}% ({}/{} bytes)", p.transferred * 100 / total, p.transferred, total);
            if p.transferred >= total {
                eprintln!();
            }
        }
        _ => eprint!("\r{} bytes", p.transferred),
    })
}

#[cfg(feature = "ssh")]
pub async fn execute(ctx: &AppContext, args: FilesArgs) -> Result<()> {
    use crate::commands::connect::{close_session, open_session, resolve_credentials};

    let host = args.target.host()?;
    let credentials = resolve_credentials(ctx, &host, &args.target)?;
    let transport = crate::commands::ssh_transport(ctx)?;
    let timeout = ctx.config.engine_options().connect_timeout;
    let session = open_session(transport, host, credentials, timeout).await?;

    let mut stdout = std::io::stdout();
    let result = run_on_session(ctx, &session, args.action, &mut stdout, Some(stderr_progress())).await;
    close_session(session).await;
    result
}
