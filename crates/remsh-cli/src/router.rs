// Command-line parsing and dispatch

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use remsh_config::ConfigManager;

use crate::commands::{self, ConnectArgs, FilesArgs, HistoryAction, VaultAction};
use crate::context::AppContext;

/// remsh - remote shell and file transfer client
#[derive(Parser, Debug)]
#[command(name = "remsh")]
#[command(bin_name = "remsh")]
#[command(about = "Remote shell and file transfer client")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (default: <config dir>/remsh/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `remsh_terminal=trace`
    #[arg(long, global = true, value_name = "FILTER")]
    pub log_level: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Open an interactive session on a remote host
    Connect(ConnectArgs),

    /// List, upload or download remote files
    Files(FilesArgs),

    /// Encrypt, decrypt and store credentials
    Vault {
        #[command(subcommand)]
        action: VaultAction,
    },

    /// Inspect or clear the command history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

impl Cli {
    pub fn load_context(&self) -> Result<AppContext> {
        let manager = match &self.config {
            Some(path) => ConfigManager::with_path(path),
            None => ConfigManager::new(),
        };
        let config = manager
            .load()
            .with_context(|| format!("Failed to load {}", manager.config_path().display()))?;
        Ok(AppContext::new(config))
    }
}

/// Run the parsed command
pub async fn route(cli: Cli) -> Result<()> {
    let ctx = cli.load_context()?;
    let mut stdout = std::io::stdout();

    match cli.command {
        Commands::Connect(args) => connect(&ctx, args).await,
        Commands::Files(args) => files(&ctx, args).await,
        Commands::Vault { action } => commands::vault::execute(&ctx, action, &mut stdout),
        Commands::History { action } => commands::history::execute(&ctx, action, &mut stdout),
    }
}

#[cfg(feature = "ssh")]
async fn connect(ctx: &AppContext, args: ConnectArgs) -> Result<()> {
    commands::connect::execute(ctx, args).await
}

#[cfg(not(feature = "ssh"))]
async fn connect(_ctx: &AppContext, _args: ConnectArgs) -> Result<()> {
    anyhow::bail!("remsh was built without SSH support; rebuild with the `ssh` feature")
}

#[cfg(feature = "ssh")]
async fn files(ctx: &AppContext, args: FilesArgs) -> Result<()> {
    commands::files::execute(ctx, args).await
}

#[cfg(not(feature = "ssh"))]
async fn files(_ctx: &AppContext, _args: FilesArgs) -> Result<()> {
    anyhow::bail!("remsh was built without SSH support; rebuild with the `ssh` feature")
}
