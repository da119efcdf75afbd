//! `remsh history` subcommands

use std::io::Write;

use anyhow::Result;
use clap::Subcommand;

use crate::context::AppContext;

#[derive(Subcommand, Debug, Clone)]
pub enum HistoryAction {
    /// Show recorded commands, oldest first
    List {
        /// Only the newest N commands
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Commands containing a substring (case-insensitive), newest first
    Search {
        #[arg(value_name = "QUERY")]
        query: String,
    },

    /// Forget every recorded command
    Clear,
}

pub fn execute(ctx: &AppContext, action: HistoryAction, out: &mut dyn Write) -> Result<()> {
    let mut history = ctx.history(false);
    match action {
        HistoryAction::List { limit } => {
            let entries = history.entries();
            let skip = limit.map_or(0, |n| entries.len().saturating_sub(n));
            for (i, entry) in entries.iter().enumerate().skip(skip) {
                writeln!(out, "{:>5}  {}", i + 1, entry)?;
            }
        }
        HistoryAction::Search { query } => {
            for entry in history.search(&query) {
                writeln!(out, "{}", entry)?;
            }
        }
        HistoryAction::Clear => {
            let removed = history.len();
            history.clear();
            writeln!(out, "Cleared {} history entries", removed)?;
        }
    }
    Ok(())
}
