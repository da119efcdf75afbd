// Command handlers for the remsh CLI

pub mod connect;
pub mod files;
pub mod history;
pub mod vault;

pub use connect::{ConnectArgs, TargetArgs};
pub use files::{FilesAction, FilesArgs};
pub use history::HistoryAction;
pub use vault::VaultAction;

/// libssh2 transport pinned against the configured known-hosts file
#[cfg(feature = "ssh")]
pub fn ssh_transport(
    ctx: &crate::context::AppContext,
) -> anyhow::Result<Box<dyn remsh_transport::Transport>> {
    use anyhow::Context;

    let path = ctx.config.storage.known_hosts_file();
    let known_hosts = remsh_transport::KnownHosts::open(&path)
        .with_context(|| format!("Failed to open known hosts at {}", path.display()))?;
    Ok(Box::new(remsh_transport::Ssh2Transport::new(
        std::sync::Arc::new(known_hosts),
    )))
}
