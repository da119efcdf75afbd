//! File transfer engine

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use remsh_guard::TransferValidator;
use remsh_transport::{FileChannel, RemoteStat, SharedSession};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::entry::{listing_order, RemoteFileEntry};
use crate::error::TransferError;
use crate::Result;

/// Size of the streaming buffer used for uploads and downloads
pub const TRANSFER_BUFFER_SIZE: usize = 32 * 1024;

/// Bytes moved so far in one transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferProgress {
    pub transferred: u64,
    /// Total size when known
    pub total: Option<u64>,
}

/// Called after every buffer is written
pub type ProgressCallback = Arc<dyn Fn(TransferProgress) + Send + Sync>;

type SharedChannel = Arc<Mutex<Option<Box<dyn FileChannel>>>>;

/// Lists, uploads and downloads files over a file channel of a session
///
/// Every remote destination is validated before anything is written, and
/// uploads are checked against the size limit and extension allow-list.
pub struct FileTransferEngine {
    validator: TransferValidator,
    buffer_size: usize,
    channel: SharedChannel,
}

impl FileTransferEngine {
    pub fn new(validator: TransferValidator) -> Self {
        Self::with_buffer_size(validator, TRANSFER_BUFFER_SIZE)
    }

    pub fn with_buffer_size(validator: TransferValidator, buffer_size: usize) -> Self {
        Self {
            validator,
            buffer_size: buffer_size.max(1),
            channel: Arc::new(Mutex::new(None)),
        }
    }

    pub fn validator(&self) -> &TransferValidator {
        &self.validator
    }

    pub fn is_connected(&self) -> bool {
        self.channel.lock().is_some()
    }

    /// Open a file channel on an already connected session
    ///
    /// The session is only borrowed for the duration of this call; the
    /// channel stays usable on its own afterwards.
    pub async fn connect(&self, session: &SharedSession) -> Result<()> {
        let session = Arc::clone(session);
        let channel = tokio::task::spawn_blocking(move || {
            let mut session = session.lock();
            if !session.is_connected() {
                return Err(TransferError::TransportNotReady);
            }
            Ok(session.open_file_channel()?)
        })
        .await??;

        let previous = self.channel.lock().replace(channel);
        if let Some(mut previous) = previous {
            close_quietly(previous.as_mut());
        }
        debug!("File transfer channel opened");
        Ok(())
    }

    /// Entries of a remote directory, directories first, then by name
    pub async fn list_files(&self, remote_dir: &str) -> Result<Vec<RemoteFileEntry>> {
        let dir = remote_dir.to_string();
        let raw = self.with_channel(move |channel| Ok(channel.list(&dir)?)).await?;

        let mut entries: Vec<RemoteFileEntry> = raw.into_iter().map(RemoteFileEntry::from).collect();
        entries.sort_by(listing_order);
        Ok(entries)
    }

    pub async fn stat(&self, remote_path: &str) -> Result<RemoteStat> {
        let path = remote_path.to_string();
        self.with_channel(move |channel| Ok(channel.stat(&path)?)).await
    }

    /// Upload a local file, returning the number of bytes sent
    ///
    /// # Arguments
    ///
    /// * `local` - Source file; must exist, be readable, within the size
    ///   limit and carry an allowed extension
    /// * `remote_path` - Relative destination path
    /// * `progress` - Optional callback invoked after each buffer
    pub async fn upload(
        &self,
        local: &Path,
        remote_path: &str,
        progress: Option<ProgressCallback>,
    ) -> Result<u64> {
        let plan = self.validator.validate_upload(local, remote_path)?;
        let local = local.to_path_buf();
        let remote = remote_path.to_string();
        let buffer_size = self.buffer_size;

        let sent = self
            .with_channel(move |channel| {
                let mut source = File::open(&local).map_err(|source| TransferError::LocalIo {
                    path: local.clone(),
                    source,
                })?;
                let mut sink = channel.create_write(&remote)?;
                let sent = stream(
                    &mut source,
                    &mut sink,
                    buffer_size,
                    Some(plan.size),
                    progress.as_ref(),
                )?;
                sink.flush().map_err(TransferError::Stream)?;
                Ok(sent)
            })
            .await?;

        info!(remote = %remote_path, bytes = sent, "Upload complete");
        Ok(sent)
    }

    /// Download a remote file, returning the number of bytes received
    ///
    /// Missing local parent directories are created. The finished file is
    /// restricted to owner read/write; failing to do so is only logged.
    pub async fn download(
        &self,
        remote_path: &str,
        local: &Path,
        progress: Option<ProgressCallback>,
    ) -> Result<u64> {
        if let Some(parent) = local.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| TransferError::LocalIo {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let remote = remote_path.to_string();
        let target = local.to_path_buf();
        let partial = partial_path(local);
        let buffer_size = self.buffer_size;

        let received = self
            .with_channel(move |channel| {
                let total = match channel.stat(&remote) {
                    Ok(stat) => Some(stat.size),
                    Err(e) => {
                        debug!(remote = %remote, error = %e, "Size unknown before download");
                        None
                    }
                };
                let mut source = channel.open_read(&remote)?;
                let result = write_partial(&mut source, &partial, buffer_size, total, progress.as_ref())
                    .and_then(|received| {
                        fs::rename(&partial, &target)
                            .map(|_| received)
                            .map_err(|source| TransferError::LocalIo {
                                path: target.clone(),
                                source,
                            })
                    });
                if result.is_err() {
                    let _ = fs::remove_file(&partial);
                }
                result
            })
            .await?;

        if let Err(e) = restrict_to_owner(local) {
            warn!(path = ?local, error = %e, "Failed to restrict permissions of downloaded file");
        }
        info!(remote = %remote_path, bytes = received, "Download complete");
        Ok(received)
    }

    /// Close the file channel. Safe to call repeatedly; close errors are logged.
    pub async fn disconnect(&self) {
        let channel = self.channel.lock().take();
        let Some(mut channel) = channel else {
            return;
        };
        let closed = tokio::task::spawn_blocking(move || close_quietly(channel.as_mut())).await;
        if let Err(e) = closed {
            warn!(error = %e, "File channel close task failed");
        }
    }

    async fn with_channel<T, F>(&self, call: F) -> Result<T>
    where
        F: FnOnce(&mut dyn FileChannel) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        if !self.is_connected() {
            return Err(TransferError::NotConnected);
        }
        let channel = Arc::clone(&self.channel);
        tokio::task::spawn_blocking(move || {
            let mut guard = channel.lock();
            let channel = guard.as_mut().ok_or(TransferError::NotConnected)?;
            call(channel.as_mut())
        })
        .await?
    }
}

fn close_quietly(channel: &mut dyn FileChannel) {
    match channel.close() {
        Ok(()) => debug!("File transfer channel closed"),
        Err(e) => warn!(error = %e, "Error closing file transfer channel"),
    }
}

/// Copy through a fixed-size buffer, reporting progress per chunk
fn stream(
    source: &mut dyn Read,
    sink: &mut dyn Write,
    buffer_size: usize,
    total: Option<u64>,
    progress: Option<&ProgressCallback>,
) -> Result<u64> {
    let mut buffer = vec![0u8; buffer_size];
    let mut transferred = 0u64;
    loop {
        let n = match source.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(TransferError::Stream(e)),
        };
        sink.write_all(&buffer[..n]).map_err(TransferError::Stream)?;
        transferred += n as u64;
        if let Some(progress) = progress {
            progress(TransferProgress { transferred, total });
        }
    }
    Ok(transferred)
}

fn write_partial(
    source: &mut dyn Read,
    partial: &Path,
    buffer_size: usize,
    total: Option<u64>,
    progress: Option<&ProgressCallback>,
) -> Result<u64> {
    let local_err = |source: std::io::Error| TransferError::LocalIo {
        path: partial.to_path_buf(),
        source,
    };
    let mut sink = File::create(partial).map_err(local_err)?;
    let received = stream(source, &mut sink, buffer_size, total, progress)?;
    sink.sync_all().map_err(local_err)?;
    Ok(received)
}

fn partial_path(local: &Path) -> PathBuf {
    let name = local
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    local.with_file_name(format!(".{}.{}.part", name, Uuid::new_v4()))
}

#[cfg(unix)]
fn restrict_to_owner(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_to_owner(path: &Path) -> std::io::Result<()> {
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_readonly(false);
    fs::set_permissions(path, permissions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_stream_uses_fixed_chunks() {
        let data = vec![7u8; 100];
        let mut sink = Vec::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let progress: ProgressCallback = Arc::new(move |p| {
            seen.fetch_add(1, Ordering::SeqCst);
            assert!(p.transferred <= 100);
            assert_eq!(p.total, Some(100));
        });

        let sent = stream(&mut Cursor::new(data.clone()), &mut sink, 32, Some(100), Some(&progress))
            .unwrap();
        assert_eq!(sent, 100);
        assert_eq!(sink, data);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_partial_path_is_hidden_sibling() {
        let partial = partial_path(Path::new("/tmp/out/report.pdf"));
        assert_eq!(partial.parent(), Some(Path::new("/tmp/out")));
        let name = partial.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".report.pdf."));
        assert!(name.ends_with(".part"));
    }
}
