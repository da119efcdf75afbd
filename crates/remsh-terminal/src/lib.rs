//! remsh terminal session engine
//!
//! [`TerminalEngine`] drives one remote session in one of two modes:
//!
//! - **Shell**: a persistent pty shell. Commands are written to it and output
//!   is collected by an adaptive poller that speeds up while the remote side
//!   is chatty and slows down while it is idle.
//! - **Exec**: every command runs as an independent one-shot execution.
//!
//! Input passes through a [`CommandGuard`](remsh_guard::CommandGuard) and is
//! recorded in a [`CommandHistory`](remsh_history::CommandHistory). Visible
//! state is published as an [`EngineState`] through a `watch` channel.

pub mod engine;
pub mod error;
pub mod output;
pub mod poll;
pub mod state;

pub use engine::{needs_terminal, EngineOptions, SubmitOutcome, TerminalEngine};
pub use error::EngineError;
pub use output::{split_lines, LineAssembler, LineKind, OutputBuffer, OutputLine, MAX_LINES};
pub use poll::{PollConfig, PollState};
pub use state::{EngineState, SessionMode};

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
