//! libssh2 backend

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use parking_lot::Mutex;
use ssh2::{Channel, File, HashType, Session, Sftp};
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::host::{Credentials, Host, PtyRequest};
use crate::known_hosts::{HostKeyStatus, KnownHosts};
use crate::transport::{ExecOutput, FileChannel, RemoteDirEntry, RemoteStat, Transport};
use crate::Result;

const KEEPALIVE_INTERVAL_SECS: u32 = 30;
const EXEC_READ_CHUNK: usize = 8192;
const EXEC_IDLE_WAIT: Duration = Duration::from_millis(20);

/// Held while the session is switched to non-blocking mode and around every
/// SFTP call, since the blocking flag is shared by all channels of a session
type IoLock = Arc<Mutex<()>>;

/// Run `call` with the session in non-blocking mode
fn nonblocking<T>(session: &Session, io: &IoLock, call: impl FnOnce() -> T) -> T {
    let _io = io.lock();
    session.set_blocking(false);
    let result = call();
    session.set_blocking(true);
    result
}

/// Read whatever is available into `out`; `true` when bytes arrived
fn read_available(stream: &mut impl Read, buf: &mut [u8], out: &mut Vec<u8>) -> Result<bool> {
    match stream.read(buf) {
        Ok(n) => {
            out.extend_from_slice(&buf[..n]);
            Ok(n > 0)
        }
        Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn map_ssh_error(err: ssh2::Error) -> TransportError {
    let io_err: std::io::Error = err.into();
    TransportError::Io(io_err)
}

fn fingerprint_sha256(session: &Session) -> Option<String> {
    let hash = session.host_key_hash(HashType::Sha256)?;
    let encoded = base64::engine::general_purpose::STANDARD_NO_PAD.encode(hash);
    Some(format!("SHA256:{}", encoded))
}

/// [`Transport`] over an SSH connection driven by libssh2
pub struct Ssh2Transport {
    known_hosts: Arc<KnownHosts>,
    session: Option<Session>,
    shell: Option<Channel>,
    io: IoLock,
}

impl Ssh2Transport {
    /// Transport verifying host keys against `known_hosts`
    pub fn new(known_hosts: Arc<KnownHosts>) -> Self {
        Self {
            known_hosts,
            session: None,
            shell: None,
            io: IoLock::default(),
        }
    }

    fn session(&self) -> Result<&Session> {
        self.session.as_ref().ok_or(TransportError::NotConnected)
    }

    fn open_tcp(host: &Host, timeout: Duration) -> Result<TcpStream> {
        let addrs = (host.address.as_str(), host.port)
            .to_socket_addrs()
            .map_err(|e| TransportError::Connect(format!("cannot resolve {}: {}", host.address, e)))?;

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(tcp) => return Ok(tcp),
                Err(e) if e.kind() == ErrorKind::TimedOut => {
                    return Err(TransportError::ConnectTimeout(timeout));
                }
                Err(e) => last_error = Some(e),
            }
        }
        Err(TransportError::Connect(match last_error {
            Some(e) => e.to_string(),
            None => format!("no addresses for {}", host.address),
        }))
    }

    fn authenticate(session: &Session, host: &Host, credentials: &Credentials) -> Result<()> {
        let result = match credentials {
            Credentials::Password(password) => session.userauth_password(&host.username, password),
            Credentials::PrivateKey {
                key_pem,
                passphrase,
            } => session.userauth_pubkey_memory(
                &host.username,
                None,
                key_pem,
                passphrase.as_deref(),
            ),
        };
        if let Err(e) = result {
            debug!(host = %host, error = %e, "SSH authentication rejected");
        }
        if !session.authenticated() {
            return Err(TransportError::Authentication {
                user: host.username.clone(),
            });
        }
        Ok(())
    }
}

impl Transport for Ssh2Transport {
    fn connect(&mut self, host: &Host, credentials: &Credentials, timeout: Duration) -> Result<()> {
        let tcp = Self::open_tcp(host, timeout)?;
        tcp.set_read_timeout(Some(timeout)).ok();
        tcp.set_write_timeout(Some(timeout)).ok();

        let mut session = Session::new().map_err(map_ssh_error)?;
        session.set_tcp_stream(tcp);
        session.set_timeout(timeout.as_millis().min(u32::MAX as u128) as u32);
        session.handshake().map_err(|e| {
            let io_err: std::io::Error = e.into();
            if io_err.kind() == ErrorKind::TimedOut {
                TransportError::ConnectTimeout(timeout)
            } else {
                TransportError::Connect(io_err.to_string())
            }
        })?;

        let fingerprint = fingerprint_sha256(&session)
            .ok_or_else(|| TransportError::Connect("server sent no host key".to_string()))?;
        if self.known_hosts.check(&host.endpoint(), &fingerprint)? == HostKeyStatus::NewlyTrusted {
            info!(host = %host, fingerprint = %fingerprint, "Trusting host key on first use");
        }

        Self::authenticate(&session, host, credentials)?;

        // Interactive work must not inherit the connect timeout
        session.set_timeout(0);
        session.set_keepalive(true, KEEPALIVE_INTERVAL_SECS);
        self.session = Some(session);
        Ok(())
    }

    fn open_shell(&mut self, pty: &PtyRequest) -> Result<()> {
        let session = self.session()?;
        let mut channel = session.channel_session().map_err(map_ssh_error)?;
        channel
            .request_pty(&pty.term, None, Some((pty.cols, pty.rows, 0, 0)))
            .map_err(|e| TransportError::Channel(format!("pty request failed: {}", e)))?;
        channel
            .shell()
            .map_err(|e| TransportError::Channel(format!("shell request failed: {}", e)))?;
        self.shell = Some(channel);
        Ok(())
    }

    fn read_shell(&mut self, max_bytes: usize) -> Result<Vec<u8>> {
        let session = self.session.as_ref().ok_or(TransportError::NotConnected)?;
        let channel = self.shell.as_mut().ok_or(TransportError::ShellClosed)?;

        let mut buf = vec![0u8; max_bytes];
        let result = nonblocking(session, &self.io, || channel.read(&mut buf));

        match result {
            Ok(0) if channel.eof() => Err(TransportError::ShellClosed),
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_shell(&mut self, data: &[u8]) -> Result<()> {
        let channel = self.shell.as_mut().ok_or(TransportError::ShellClosed)?;
        channel.write_all(data)?;
        channel.flush()?;
        Ok(())
    }

    fn exec(&mut self, command: &str, pty: Option<&PtyRequest>) -> Result<ExecOutput> {
        let session = self.session()?;
        let mut channel = session.channel_session().map_err(map_ssh_error)?;
        if let Some(pty) = pty {
            if let Err(e) = channel.request_pty(&pty.term, None, Some((pty.cols, pty.rows, 0, 0)))
            {
                warn!(error = %e, "PTY request for exec failed, running without");
            }
        }
        channel.exec(command).map_err(map_ssh_error)?;

        // Both streams are drained together so a full stderr window can
        // never stall stdout
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut buf = vec![0u8; EXEC_READ_CHUNK];
        loop {
            let (progressed, eof) = nonblocking(session, &self.io, || -> Result<(bool, bool)> {
                let out = read_available(&mut channel, &mut buf, &mut stdout)?;
                let err = read_available(&mut channel.stderr(), &mut buf, &mut stderr)?;
                Ok((out || err, channel.eof()))
            })?;
            if eof && !progressed {
                break;
            }
            if !progressed {
                std::thread::sleep(EXEC_IDLE_WAIT);
            }
        }
        channel.wait_close().map_err(map_ssh_error)?;
        let exit_code = channel.exit_status().map_err(map_ssh_error)?;

        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code,
        })
    }

    fn is_connected(&self) -> bool {
        self.session
            .as_ref()
            .map(|session| session.authenticated())
            .unwrap_or(false)
    }

    fn open_file_channel(&mut self) -> Result<Box<dyn FileChannel>> {
        let session = self.session()?;
        let sftp = {
            let _io = self.io.lock();
            session.sftp().map_err(map_ssh_error)?
        };
        Ok(Box::new(SftpChannel {
            sftp: Some(sftp),
            io: Arc::clone(&self.io),
        }))
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut channel) = self.shell.take() {
            if let Err(e) = channel.close().and_then(|_| channel.wait_close()) {
                warn!(error = %e, "Failed to close shell channel");
            }
        }
        match self.session.take() {
            Some(session) => session
                .disconnect(None, "remsh disconnect", None)
                .map_err(map_ssh_error),
            None => Ok(()),
        }
    }
}

fn stat_from(stat: &ssh2::FileStat) -> RemoteStat {
    RemoteStat {
        size: stat.size.unwrap_or(0),
        is_dir: stat.is_dir(),
        modified: stat.mtime,
        permissions: stat.perm,
    }
}

/// SFTP sub-channel of an [`Ssh2Transport`]
///
/// Every call takes the transport's I/O lock so it never runs while the
/// shell poller has the session in non-blocking mode.
struct SftpChannel {
    sftp: Option<Sftp>,
    io: IoLock,
}

/// Remote file handle that takes the I/O lock per read and write
struct LockedFile {
    file: Option<File>,
    io: IoLock,
}

impl LockedFile {
    fn file(&mut self) -> std::io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| std::io::Error::new(ErrorKind::NotConnected, "file already closed"))
    }
}

impl Read for LockedFile {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let io = Arc::clone(&self.io);
        let _io = io.lock();
        self.file()?.read(buf)
    }
}

impl Write for LockedFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let io = Arc::clone(&self.io);
        let _io = io.lock();
        self.file()?.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let io = Arc::clone(&self.io);
        let _io = io.lock();
        self.file()?.flush()
    }
}

impl Drop for LockedFile {
    fn drop(&mut self) {
        // Closing the handle is a round trip to the server
        let _io = self.io.lock();
        self.file.take();
    }
}

impl SftpChannel {
    fn sftp(&self) -> Result<&Sftp> {
        self.sftp.as_ref().ok_or(TransportError::NotConnected)
    }
}

impl FileChannel for SftpChannel {
    fn list(&mut self, dir: &str) -> Result<Vec<RemoteDirEntry>> {
        let _io = self.io.lock();
        let entries = self
            .sftp()?
            .readdir(Path::new(dir))
            .map_err(|e| TransportError::File(format!("cannot list {}: {}", dir, e)))?;
        Ok(entries
            .into_iter()
            .filter_map(|(path, stat)| {
                let name = path.file_name()?.to_string_lossy().into_owned();
                Some(RemoteDirEntry {
                    name,
                    path: path.to_string_lossy().into_owned(),
                    stat: stat_from(&stat),
                })
            })
            .collect())
    }

    fn stat(&mut self, path: &str) -> Result<RemoteStat> {
        let _io = self.io.lock();
        let stat = self
            .sftp()?
            .stat(Path::new(path))
            .map_err(|e| TransportError::File(format!("cannot stat {}: {}", path, e)))?;
        Ok(stat_from(&stat))
    }

    fn open_read(&mut self, path: &str) -> Result<Box<dyn Read + Send>> {
        let _io = self.io.lock();
        let file = self
            .sftp()?
            .open(Path::new(path))
            .map_err(|e| TransportError::File(format!("cannot open {}: {}", path, e)))?;
        Ok(Box::new(LockedFile {
            file: Some(file),
            io: Arc::clone(&self.io),
        }))
    }

    fn create_write(&mut self, path: &str) -> Result<Box<dyn Write + Send>> {
        let _io = self.io.lock();
        let file = self
            .sftp()?
            .create(Path::new(path))
            .map_err(|e| TransportError::File(format!("cannot create {}: {}", path, e)))?;
        Ok(Box::new(LockedFile {
            file: Some(file),
            io: Arc::clone(&self.io),
        }))
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the handle shuts the subsystem channel down
        let _io = self.io.lock();
        self.sftp.take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Reader replaying a fixed sequence of results
    struct Replay(VecDeque<std::io::Result<Vec<u8>>>);

    impl Read for Replay {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.0.pop_front() {
                Some(Ok(data)) => {
                    buf[..data.len()].copy_from_slice(&data);
                    Ok(data.len())
                }
                Some(Err(e)) => Err(e),
                None => Ok(0),
            }
        }
    }

    #[test]
    fn test_read_available_treats_would_block_as_idle() {
        let mut stream = Replay(VecDeque::from(vec![
            Ok(b"err".to_vec()),
            Err(ErrorKind::WouldBlock.into()),
            Ok(b"or\n".to_vec()),
        ]));
        let mut buf = [0u8; 16];
        let mut out = Vec::new();

        assert!(read_available(&mut stream, &mut buf, &mut out).unwrap());
        assert!(!read_available(&mut stream, &mut buf, &mut out).unwrap());
        assert!(read_available(&mut stream, &mut buf, &mut out).unwrap());
        assert!(!read_available(&mut stream, &mut buf, &mut out).unwrap());
        assert_eq!(out, b"error\n");
    }

    #[test]
    fn test_read_available_propagates_real_errors() {
        let mut stream = Replay(VecDeque::from(vec![Err(ErrorKind::ConnectionReset.into())]));
        let mut buf = [0u8; 4];
        let result = read_available(&mut stream, &mut buf, &mut Vec::new());
        assert!(matches!(result, Err(TransportError::Io(_))));
    }

    #[test]
    fn test_nonblocking_holds_io_lock_and_restores_blocking() {
        let session = Session::new().unwrap();
        let io = IoLock::default();

        let was_blocking = nonblocking(&session, &io, || {
            assert!(io.try_lock().is_none());
            session.is_blocking()
        });
        assert!(!was_blocking);
        assert!(session.is_blocking());
        assert!(io.try_lock().is_some());
    }
}
