//! Scripted in-memory transport for tests
//!
//! [`ScriptedTransport`] plays back queued shell output and canned exec
//! results, and records everything written to it. The paired
//! [`ScriptHandle`] stays with the test to steer and inspect the transport
//! after it has been handed to an engine.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io::{Cursor, Read, Write};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::TransportError;
use crate::host::{Credentials, Host, PtyRequest};
use crate::transport::{ExecOutput, FileChannel, RemoteDirEntry, RemoteStat, Transport};
use crate::Result;

/// Fixed modification time reported for in-memory files
pub const MEMORY_MTIME: u64 = 1_700_000_000;

enum ReadStep {
    Data(Vec<u8>),
    Error(String),
}

#[derive(Default)]
struct Script {
    connect_error: Option<String>,
    reject_auth: bool,
    connect_delay: Option<Duration>,
    shell_error: Option<String>,
    echo_writes: bool,
    reads: VecDeque<ReadStep>,
    read_count: usize,
    exec_results: HashMap<String, ExecOutput>,
    exec_error: Option<String>,
    written: Vec<String>,
    execs: Vec<(String, bool)>,
    connected: bool,
    shell_open: bool,
    close_error: Option<String>,
    close_count: usize,
}

/// Transport whose behavior is scripted through a [`ScriptHandle`]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
    files: MemoryFs,
}

/// Test-side control of a [`ScriptedTransport`]
#[derive(Clone)]
pub struct ScriptHandle {
    script: Arc<Mutex<Script>>,
    files: MemoryFs,
}

impl ScriptedTransport {
    pub fn new() -> (Self, ScriptHandle) {
        let script = Arc::new(Mutex::new(Script::default()));
        let files = MemoryFs::new();
        (
            Self {
                script: Arc::clone(&script),
                files: files.clone(),
            },
            ScriptHandle { script, files },
        )
    }
}

impl ScriptHandle {
    /// Queue shell output for a later read
    pub fn push_output(&self, text: &str) {
        self.script
            .lock()
            .reads
            .push_back(ReadStep::Data(text.as_bytes().to_vec()));
    }

    /// Queue a failing read
    pub fn push_read_error(&self, message: &str) {
        self.script
            .lock()
            .reads
            .push_back(ReadStep::Error(message.to_string()));
    }

    /// Make shell writes show up as shell output, like a remote tty echo
    pub fn echo_writes(&self, enabled: bool) {
        self.script.lock().echo_writes = enabled;
    }

    pub fn fail_connect(&self, message: &str) {
        self.script.lock().connect_error = Some(message.to_string());
    }

    pub fn reject_auth(&self) {
        self.script.lock().reject_auth = true;
    }

    /// Make connecting take `delay`
    pub fn delay_connect(&self, delay: Duration) {
        self.script.lock().connect_delay = Some(delay);
    }

    pub fn fail_shell(&self, message: &str) {
        self.script.lock().shell_error = Some(message.to_string());
    }

    pub fn fail_exec(&self, message: &str) {
        self.script.lock().exec_error = Some(message.to_string());
    }

    pub fn fail_close(&self, message: &str) {
        self.script.lock().close_error = Some(message.to_string());
    }

    /// Canned result for one command; unknown commands succeed silently
    pub fn set_exec(&self, command: &str, output: ExecOutput) {
        self.script
            .lock()
            .exec_results
            .insert(command.to_string(), output);
    }

    /// Simulate the remote side dropping the connection
    pub fn drop_connection(&self) {
        self.script.lock().connected = false;
    }

    /// Everything written to the shell, one entry per write
    pub fn written(&self) -> Vec<String> {
        self.script.lock().written.clone()
    }

    /// Executed commands with whether a pty was requested
    pub fn execs(&self) -> Vec<(String, bool)> {
        self.script.lock().execs.clone()
    }

    pub fn read_count(&self) -> usize {
        self.script.lock().read_count
    }

    pub fn pending_reads(&self) -> usize {
        self.script.lock().reads.len()
    }

    pub fn close_count(&self) -> usize {
        self.script.lock().close_count
    }

    pub fn is_connected(&self) -> bool {
        self.script.lock().connected
    }

    pub fn shell_open(&self) -> bool {
        self.script.lock().shell_open
    }

    /// Remote file system seen through file channels
    pub fn files(&self) -> &MemoryFs {
        &self.files
    }
}

impl Transport for ScriptedTransport {
    fn connect(&mut self, host: &Host, _credentials: &Credentials, timeout: Duration) -> Result<()> {
        let (delay, error, reject_auth) = {
            let script = self.script.lock();
            (
                script.connect_delay,
                script.connect_error.clone(),
                script.reject_auth,
            )
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay.min(timeout));
            if delay > timeout {
                return Err(TransportError::ConnectTimeout(timeout));
            }
        }
        if let Some(message) = error {
            return Err(TransportError::Connect(message));
        }
        if reject_auth {
            return Err(TransportError::Authentication {
                user: host.username.clone(),
            });
        }
        self.script.lock().connected = true;
        Ok(())
    }

    fn open_shell(&mut self, _pty: &PtyRequest) -> Result<()> {
        let mut script = self.script.lock();
        if let Some(message) = script.shell_error.clone() {
            return Err(TransportError::Channel(message));
        }
        script.shell_open = true;
        Ok(())
    }

    fn read_shell(&mut self, max_bytes: usize) -> Result<Vec<u8>> {
        let mut script = self.script.lock();
        script.read_count += 1;
        match script.reads.pop_front() {
            None => Ok(Vec::new()),
            Some(ReadStep::Error(message)) => Err(TransportError::Channel(message)),
            Some(ReadStep::Data(mut data)) => {
                if data.len() > max_bytes {
                    let rest = data.split_off(max_bytes);
                    script.reads.push_front(ReadStep::Data(rest));
                }
                Ok(data)
            }
        }
    }

    fn write_shell(&mut self, data: &[u8]) -> Result<()> {
        let mut script = self.script.lock();
        if !script.shell_open {
            return Err(TransportError::ShellClosed);
        }
        script.written.push(String::from_utf8_lossy(data).into_owned());
        if script.echo_writes {
            script.reads.push_back(ReadStep::Data(data.to_vec()));
        }
        Ok(())
    }

    fn exec(&mut self, command: &str, pty: Option<&PtyRequest>) -> Result<ExecOutput> {
        let mut script = self.script.lock();
        script.execs.push((command.to_string(), pty.is_some()));
        if let Some(message) = script.exec_error.clone() {
            return Err(TransportError::Channel(message));
        }
        Ok(script.exec_results.get(command).cloned().unwrap_or_default())
    }

    fn is_connected(&self) -> bool {
        self.script.lock().connected
    }

    fn open_file_channel(&mut self) -> Result<Box<dyn FileChannel>> {
        if !self.script.lock().connected {
            return Err(TransportError::NotConnected);
        }
        Ok(Box::new(self.files.channel()))
    }

    fn close(&mut self) -> Result<()> {
        let mut script = self.script.lock();
        script.close_count += 1;
        script.connected = false;
        script.shell_open = false;
        match script.close_error.clone() {
            Some(message) => Err(TransportError::Channel(message)),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
enum MemoryNode {
    Dir,
    File(Vec<u8>),
}

#[derive(Debug, Default)]
struct MemoryFsInner {
    nodes: BTreeMap<String, MemoryNode>,
    close_error: Option<String>,
    closes: usize,
}

/// Shared in-memory file tree
#[derive(Debug, Clone, Default)]
pub struct MemoryFs {
    inner: Arc<Mutex<MemoryFsInner>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_dir(&self, path: &str) {
        self.inner
            .lock()
            .nodes
            .insert(normalize(path), MemoryNode::Dir);
    }

    pub fn add_file(&self, path: &str, contents: &[u8]) {
        self.inner
            .lock()
            .nodes
            .insert(normalize(path), MemoryNode::File(contents.to_vec()));
    }

    /// Contents of a file, if present
    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        match self.inner.lock().nodes.get(&normalize(path)) {
            Some(MemoryNode::File(data)) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn fail_close(&self, message: &str) {
        self.inner.lock().close_error = Some(message.to_string());
    }

    /// Number of closed channels
    pub fn close_count(&self) -> usize {
        self.inner.lock().closes
    }

    /// New channel onto this tree
    pub fn channel(&self) -> MemoryFileChannel {
        MemoryFileChannel {
            fs: self.clone(),
            open: true,
        }
    }

    fn stat_of(node: &MemoryNode) -> RemoteStat {
        match node {
            MemoryNode::Dir => RemoteStat {
                size: 0,
                is_dir: true,
                modified: Some(MEMORY_MTIME),
                permissions: Some(0o040755),
            },
            MemoryNode::File(data) => RemoteStat {
                size: data.len() as u64,
                is_dir: false,
                modified: Some(MEMORY_MTIME),
                permissions: Some(0o100644),
            },
        }
    }
}

fn normalize(path: &str) -> String {
    if !path.is_empty() && path.chars().all(|c| c == '/') {
        return "/".to_string();
    }
    let trimmed = path.trim_end_matches('/');
    match trimmed {
        "" | "." => ".".to_string(),
        other => other.trim_start_matches("./").to_string(),
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(i) => &path[..i],
        None => ".",
    }
}

/// [`FileChannel`] over a [`MemoryFs`]
#[derive(Debug)]
pub struct MemoryFileChannel {
    fs: MemoryFs,
    open: bool,
}

impl MemoryFileChannel {
    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }
}

impl FileChannel for MemoryFileChannel {
    fn list(&mut self, dir: &str) -> Result<Vec<RemoteDirEntry>> {
        self.ensure_open()?;
        let dir = normalize(dir);
        let inner = self.fs.inner.lock();
        let is_root = dir == "." || dir == "/";
        if !is_root && !matches!(inner.nodes.get(&dir), Some(MemoryNode::Dir)) {
            return Err(TransportError::File(format!("no such directory: {}", dir)));
        }
        Ok(inner
            .nodes
            .iter()
            .filter(|(path, _)| parent_of(path) == dir)
            .map(|(path, node)| RemoteDirEntry {
                name: path.rsplit('/').next().unwrap_or(path).to_string(),
                path: path.clone(),
                stat: MemoryFs::stat_of(node),
            })
            .collect())
    }

    fn stat(&mut self, path: &str) -> Result<RemoteStat> {
        self.ensure_open()?;
        let inner = self.fs.inner.lock();
        inner
            .nodes
            .get(&normalize(path))
            .map(MemoryFs::stat_of)
            .ok_or_else(|| TransportError::File(format!("no such file: {}", path)))
    }

    fn open_read(&mut self, path: &str) -> Result<Box<dyn Read + Send>> {
        self.ensure_open()?;
        match self.fs.read(path) {
            Some(data) => Ok(Box::new(Cursor::new(data))),
            None => Err(TransportError::File(format!("no such file: {}", path))),
        }
    }

    fn create_write(&mut self, path: &str) -> Result<Box<dyn Write + Send>> {
        self.ensure_open()?;
        let path = normalize(path);
        self.fs
            .inner
            .lock()
            .nodes
            .insert(path.clone(), MemoryNode::File(Vec::new()));
        Ok(Box::new(MemoryWriter {
            fs: self.fs.clone(),
            path,
            buffer: Vec::new(),
        }))
    }

    fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        let mut inner = self.fs.inner.lock();
        inner.closes += 1;
        match inner.close_error.clone() {
            Some(message) => Err(TransportError::File(message)),
            None => Ok(()),
        }
    }
}

struct MemoryWriter {
    fs: MemoryFs,
    path: String,
    buffer: Vec<u8>,
}

impl MemoryWriter {
    fn commit(&self) {
        self.fs
            .inner
            .lock()
            .nodes
            .insert(self.path.clone(), MemoryNode::File(self.buffer.clone()));
    }
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.commit();
        Ok(())
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        self.commit();
    }
}
