//! `remsh vault` subcommands

use std::io::Write;

use anyhow::{bail, Context, Result};
use clap::Subcommand;

use crate::context::AppContext;

#[derive(Subcommand, Debug, Clone)]
pub enum VaultAction {
    /// Encrypt a secret and print the blob
    Encrypt {
        #[arg(value_name = "PLAINTEXT")]
        plaintext: String,
    },

    /// Decrypt a blob produced by `encrypt`
    Decrypt {
        #[arg(value_name = "BLOB")]
        blob: String,
    },

    /// Delete the master key; every stored blob becomes unreadable
    ClearKeys {
        /// Required confirmation
        #[arg(long)]
        yes: bool,
    },

    /// Encrypt and store the password for a host (`user@host[:port]`)
    Store {
        #[arg(value_name = "HOST_ID")]
        host_id: String,

        /// Secret to store; read from stdin when omitted
        #[arg(long)]
        secret: Option<String>,
    },

    /// Forget the stored password for a host
    Remove {
        #[arg(value_name = "HOST_ID")]
        host_id: String,
    },

    /// List hosts with a stored password
    List,
}

pub fn execute(ctx: &AppContext, action: VaultAction, out: &mut dyn Write) -> Result<()> {
    match action {
        VaultAction::Encrypt { plaintext } => {
            let blob = ctx.vault()?.encrypt(&plaintext)?;
            writeln!(out, "{}", blob)?;
        }
        VaultAction::Decrypt { blob } => {
            let plaintext = ctx
                .vault()?
                .decrypt(&blob)
                .context("Blob could not be decrypted with the current master key")?;
            writeln!(out, "{}", plaintext)?;
        }
        VaultAction::ClearKeys { yes } => {
            if !yes {
                bail!("Refusing to delete the master key without --yes");
            }
            ctx.vault()?.clear_keys()?;
            writeln!(out, "Master key deleted")?;
        }
        VaultAction::Store { host_id, secret } => {
            let secret = match secret {
                Some(secret) => secret,
                None => read_secret_line()?,
            };
            if secret.is_empty() {
                bail!("Refusing to store an empty secret");
            }
            let vault = ctx.vault()?;
            ctx.credential_store()?
                .store_secret(&vault, &host_id, &secret)?;
            writeln!(out, "Stored credential for {}", host_id)?;
        }
        VaultAction::Remove { host_id } => {
            if ctx.credential_store()?.remove(&host_id)? {
                writeln!(out, "Removed credential for {}", host_id)?;
            } else {
                writeln!(out, "No credential stored for {}", host_id)?;
            }
        }
        VaultAction::List => {
            for id in ctx.credential_store()?.ids() {
                writeln!(out, "{}", id)?;
            }
        }
    }
    Ok(())
}

fn read_secret_line() -> Result<String> {
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("Failed to read secret from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
