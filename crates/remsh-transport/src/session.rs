//! Transport session state machine

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::host::{Credentials, Host, PtyRequest};
use crate::transport::{ExecOutput, FileChannel, Transport};
use crate::Result;

/// Lifecycle of a [`TransportSession`]
///
/// `Disconnected → Connected → ShellActive | ExecReady → Closed`. A failed
/// shell request leaves the session `Connected` so the caller can fall back
/// to exec mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportState {
    Disconnected,
    Connected,
    ShellActive,
    ExecReady,
    Closed,
}

impl TransportState {
    fn is_live(self) -> bool {
        matches!(
            self,
            TransportState::Connected | TransportState::ShellActive | TransportState::ExecReady
        )
    }
}

/// Session handle shared between an engine and its background tasks
pub type SharedSession = Arc<Mutex<TransportSession>>;

/// One authenticated connection and the state it is in
pub struct TransportSession {
    transport: Box<dyn Transport>,
    host: Option<Host>,
    state: TransportState,
}

impl std::fmt::Debug for TransportSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSession")
            .field("host", &self.host)
            .field("state", &self.state)
            .finish()
    }
}

impl TransportSession {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            host: None,
            state: TransportState::Disconnected,
        }
    }

    /// Wrap into the shared handle used by engines
    pub fn into_shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn host(&self) -> Option<&Host> {
        self.host.as_ref()
    }

    /// Whether the session is live and the underlying transport agrees
    pub fn is_connected(&self) -> bool {
        self.state.is_live() && self.transport.is_connected()
    }

    pub fn connect(&mut self, host: &Host, credentials: &Credentials, timeout: Duration) -> Result<()> {
        if self.state != TransportState::Disconnected {
            return Err(self.invalid("a disconnected session"));
        }
        debug!(host = %host, "Connecting transport");
        self.transport.connect(host, credentials, timeout)?;
        self.host = Some(host.clone());
        self.state = TransportState::Connected;
        info!(host = %host, "Transport connected");
        Ok(())
    }

    /// Start the persistent shell
    pub fn open_shell(&mut self, pty: &PtyRequest) -> Result<()> {
        if !matches!(
            self.state,
            TransportState::Connected | TransportState::ExecReady
        ) {
            return Err(self.invalid("a connected session without a shell"));
        }
        self.transport.open_shell(pty)?;
        self.state = TransportState::ShellActive;
        Ok(())
    }

    /// Settle on one-shot execution
    pub fn enter_exec_mode(&mut self) -> Result<()> {
        if !self.state.is_live() {
            return Err(self.invalid("a connected session"));
        }
        self.state = TransportState::ExecReady;
        Ok(())
    }

    pub fn read_shell(&mut self, max_bytes: usize) -> Result<Vec<u8>> {
        self.require_shell()?;
        self.transport.read_shell(max_bytes)
    }

    pub fn write_shell(&mut self, text: &str) -> Result<()> {
        self.require_shell()?;
        self.transport.write_shell(text.as_bytes())
    }

    pub fn exec(&mut self, command: &str, pty: Option<&PtyRequest>) -> Result<ExecOutput> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.transport.exec(command, pty)
    }

    pub fn open_file_channel(&mut self) -> Result<Box<dyn FileChannel>> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.transport.open_file_channel()
    }

    /// Close the connection. Calling it again is a no-op.
    ///
    /// The session ends up `Closed` even when the transport reports an error.
    pub fn close(&mut self) -> Result<()> {
        if self.state == TransportState::Closed {
            return Ok(());
        }
        let was_live = self.state.is_live();
        self.state = TransportState::Closed;
        if !was_live {
            return Ok(());
        }

        let result = self.transport.close();
        match &result {
            Ok(()) => info!(host = ?self.host.as_ref().map(Host::to_string), "Transport closed"),
            Err(e) => warn!(error = %e, "Transport close reported an error"),
        }
        result
    }

    fn require_shell(&self) -> Result<()> {
        if self.state != TransportState::ShellActive {
            return Err(self.invalid("an active shell"));
        }
        Ok(())
    }

    fn invalid(&self, expected: &'static str) -> TransportError {
        TransportError::InvalidState {
            expected,
            actual: self.state,
        }
    }
}

#[cfg(all(test, feature = "testing"))]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;

    fn connected() -> (TransportSession, crate::testing::ScriptHandle) {
        let (transport, handle) = ScriptedTransport::new();
        let mut session = TransportSession::new(Box::new(transport));
        session
            .connect(
                &Host::new("example.com", "alice"),
                &Credentials::Password("pw".into()),
                Duration::from_secs(1),
            )
            .unwrap();
        (session, handle)
    }

    #[test]
    fn test_shell_lifecycle() {
        let (mut session, handle) = connected();
        assert_eq!(session.state(), TransportState::Connected);

        session.open_shell(&PtyRequest::default()).unwrap();
        assert_eq!(session.state(), TransportState::ShellActive);

        session.write_shell("ls\n").unwrap();
        assert_eq!(handle.written(), vec!["ls\n"]);

        session.close().unwrap();
        assert_eq!(session.state(), TransportState::Closed);
        assert!(!session.is_connected());
        assert!(session.close().is_ok());
    }

    #[test]
    fn test_shell_io_requires_shell() {
        let (mut session, _handle) = connected();
        assert!(matches!(
            session.write_shell("ls\n"),
            Err(TransportError::InvalidState { .. })
        ));
        assert!(session.read_shell(16).is_err());
    }

    #[test]
    fn test_failed_shell_stays_connected() {
        let (mut session, handle) = connected();
        handle.fail_shell("no pty available");

        assert!(session.open_shell(&PtyRequest::default()).is_err());
        assert_eq!(session.state(), TransportState::Connected);
        session.enter_exec_mode().unwrap();
        assert_eq!(session.state(), TransportState::ExecReady);
    }

    #[test]
    fn test_connect_twice_rejected() {
        let (mut session, _handle) = connected();
        let again = session.connect(
            &Host::new("example.com", "alice"),
            &Credentials::Password("pw".into()),
            Duration::from_secs(1),
        );
        assert!(matches!(again, Err(TransportError::InvalidState { .. })));
    }

    #[test]
    fn test_close_error_still_closes() {
        let (mut session, handle) = connected();
        handle.fail_close("socket already gone");

        assert!(session.close().is_err());
        assert_eq!(session.state(), TransportState::Closed);
    }
}
