//! Transport collaborator interface
//!
//! Implementations are synchronous; callers running on an async runtime are
//! expected to move calls onto a blocking-capable thread.

use std::io::{Read, Write};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::host::{Credentials, Host, PtyRequest};
use crate::Result;

/// Captured result of a one-shot remote command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Default::default()
        }
    }

    pub fn failure(stderr: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stderr: stderr.into(),
            exit_code,
            ..Default::default()
        }
    }
}

/// Metadata of a remote file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteStat {
    pub size: u64,
    pub is_dir: bool,
    /// Modification time, seconds since the unix epoch
    pub modified: Option<u64>,
    /// Unix permission bits including the file type
    pub permissions: Option<u32>,
}

/// One entry of a remote directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDirEntry {
    pub name: String,
    pub path: String,
    pub stat: RemoteStat,
}

/// A live connection to a remote host
pub trait Transport: Send {
    /// Connect and authenticate, giving up after `timeout`
    fn connect(&mut self, host: &Host, credentials: &Credentials, timeout: Duration)
        -> Result<()>;

    /// Start a persistent shell with a pseudo-terminal
    fn open_shell(&mut self, pty: &PtyRequest) -> Result<()>;

    /// Read whatever shell output is available, at most `max_bytes`
    ///
    /// Returns an empty buffer when nothing is pending instead of blocking.
    fn read_shell(&mut self, max_bytes: usize) -> Result<Vec<u8>>;

    fn write_shell(&mut self, data: &[u8]) -> Result<()>;

    /// Run a command to completion on its own channel
    fn exec(&mut self, command: &str, pty: Option<&PtyRequest>) -> Result<ExecOutput>;

    fn is_connected(&self) -> bool;

    /// Open a file-transfer sub-channel that stays usable independently of
    /// this handle
    fn open_file_channel(&mut self) -> Result<Box<dyn FileChannel>>;

    fn close(&mut self) -> Result<()>;
}

/// File-transfer sub-channel of a transport
pub trait FileChannel: Send {
    fn list(&mut self, dir: &str) -> Result<Vec<RemoteDirEntry>>;

    fn stat(&mut self, path: &str) -> Result<RemoteStat>;

    /// Open a remote file for streaming reads
    fn open_read(&mut self, path: &str) -> Result<Box<dyn Read + Send>>;

    /// Create or truncate a remote file for streaming writes
    fn create_write(&mut self, path: &str) -> Result<Box<dyn Write + Send>>;

    fn close(&mut self) -> Result<()>;
}
