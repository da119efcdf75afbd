//! remsh input guarding
//!
//! Everything a user types or picks passes through here before it reaches
//! the remote side:
//!
//! - **Command guard**: length limit, fixed-window rate limit, blank check
//! - **Transfer validator**: remote path sanitization, upload size and
//!   extension allow-list
//!
//! ```rust
//! use remsh_guard::{CommandGuard, CommandRejection};
//!
//! let mut guard = CommandGuard::new();
//! assert!(guard.check("uptime").is_ok());
//! assert_eq!(guard.check("   "), Err(CommandRejection::EmptyCommand));
//! ```

pub mod command;
pub mod error;
pub mod transfer;

pub use command::{
    CommandGuard, GuardLimits, MAX_COMMANDS_PER_WINDOW, MAX_COMMAND_LENGTH, RATE_WINDOW,
};
pub use error::{CommandRejection, TransferRejection};
pub use transfer::{TransferValidator, UploadPlan, ALLOWED_EXTENSIONS, MAX_UPLOAD_BYTES};
