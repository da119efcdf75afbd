//! remsh transport layer
//!
//! A [`TransportSession`] owns one authenticated connection and tracks which
//! of its primitives are usable:
//!
//! - **Exec**: one-shot command execution with captured stdout/stderr/exit code
//! - **Shell**: a persistent pty-backed shell read by polling
//! - **File channel**: SFTP-style listing and streaming reads/writes
//!
//! The wire protocol is supplied by a [`Transport`] implementation. The `ssh`
//! feature provides [`Ssh2Transport`]; the `testing` feature provides a
//! scripted in-memory transport for tests.

pub mod error;
pub mod host;
pub mod known_hosts;
pub mod session;
pub mod transport;

#[cfg(feature = "ssh")]
pub mod ssh;

#[cfg(feature = "testing")]
pub mod testing;

pub use error::TransportError;
pub use host::{Credentials, Host, PtyRequest, DEFAULT_PORT};
pub use known_hosts::{HostKeyStatus, KnownHosts};
pub use session::{SharedSession, TransportSession, TransportState};
pub use transport::{ExecOutput, FileChannel, RemoteDirEntry, RemoteStat, Transport};

#[cfg(feature = "ssh")]
pub use ssh::Ssh2Transport;

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;
