//! remsh command-line client
//!
//! Composes the remsh crates into the `remsh` binary:
//!
//! - `connect`: interactive session through the terminal engine
//! - `files`: listing, upload and download through the transfer engine
//! - `vault`: credential encryption and storage
//! - `history`: the persisted command history

pub mod commands;
pub mod context;
pub mod interactive;
pub mod logging;
pub mod output;
pub mod router;

pub use context::AppContext;
pub use router::{route, Cli, Commands};
