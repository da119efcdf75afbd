//! Terminal session engine

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use remsh_guard::{CommandGuard, CommandRejection, GuardLimits};
use remsh_history::CommandHistory;
use remsh_transport::{
    Credentials, ExecOutput, Host, PtyRequest, SharedSession, Transport, TransportError,
    TransportSession,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::output::{LineAssembler, LineKind, OutputLine, MAX_LINES};
use crate::poll::{PollConfig, PollState};
use crate::state::{EngineState, SessionMode};
use crate::Result;

/// Programs that misbehave without a terminal
const INTERACTIVE_COMMANDS: &[&str] = &[
    "vi", "vim", "nvim", "nano", "emacs", "pico", "top", "htop", "btop", "less", "more", "man",
    "tmux", "screen", "watch", "ssh", "telnet", "mc",
];

/// Engine tuning, normally built from the `terminal` and `polling` config
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub max_lines: usize,
    /// Prefix of the local echo line
    pub prompt: String,
    /// Try a persistent shell on attach; exec mode otherwise
    pub shell_mode: bool,
    /// Request a pty for exec-mode commands
    pub pty_enabled: bool,
    pub pty: PtyRequest,
    /// Wait after opening the shell before reading from it
    pub settle_delay: Duration,
    /// Size of the one-off read after the shell settles
    pub initial_drain_bytes: usize,
    /// Size of each poller read
    pub read_chunk_bytes: usize,
    pub connect_timeout: Duration,
    pub polling: PollConfig,
    pub guard: GuardLimits,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_lines: MAX_LINES,
            prompt: "$ ".to_string(),
            shell_mode: true,
            pty_enabled: true,
            pty: PtyRequest::default(),
            settle_delay: Duration::from_millis(500),
            initial_drain_bytes: 16 * 1024,
            read_chunk_bytes: 8192,
            connect_timeout: Duration::from_secs(10),
            polling: PollConfig::default(),
            guard: GuardLimits::default(),
        }
    }
}

/// What [`TerminalEngine::submit`] did with an input
#[derive(Debug)]
pub enum SubmitOutcome {
    /// Blank input, nothing happened
    Ignored,
    /// `clear` emptied the output
    Cleared,
    /// `exit` closed the session
    Disconnected,
    /// No session to send to
    NotConnected,
    Rejected(CommandRejection),
    /// Queued for the shell; output arrives through the poller
    Sent,
    /// Running as a one-shot exec; the handle finishes once output is shown
    Executing(JoinHandle<()>),
}

/// Line reassembly shared by the initial drain and the poller
type SharedLines = Arc<Mutex<LineAssembler>>;

/// Background tasks of an active shell
struct ShellTasks {
    cancel: CancellationToken,
    commands: mpsc::UnboundedSender<String>,
    poller: JoinHandle<()>,
    writer: JoinHandle<()>,
}

/// Coordinates command submission and output for one remote session
///
/// All visible state lives in an [`EngineState`] published through a
/// `watch` channel; every change replaces it atomically, so observers never
/// see a half-applied update. Blocking transport calls run on the blocking
/// thread pool.
pub struct TerminalEngine {
    options: EngineOptions,
    state: Arc<watch::Sender<EngineState>>,
    session: Mutex<Option<SharedSession>>,
    shell: Mutex<Option<ShellTasks>>,
    guard: Mutex<CommandGuard>,
    history: Mutex<CommandHistory>,
}

impl TerminalEngine {
    pub fn new(options: EngineOptions, history: CommandHistory) -> Self {
        let (state, _) = watch::channel(EngineState::new(options.max_lines));
        Self {
            guard: Mutex::new(CommandGuard::with_limits(options.guard)),
            options,
            state: Arc::new(state),
            session: Mutex::new(None),
            shell: Mutex::new(None),
            history: Mutex::new(history),
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Observe state changes
    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    /// Copy of the current state
    pub fn state(&self) -> EngineState {
        self.state.borrow().clone()
    }

    pub fn mode(&self) -> SessionMode {
        self.state.borrow().mode
    }

    /// Handle to the attached session, for opening a file-transfer channel
    pub fn session_handle(&self) -> Option<SharedSession> {
        self.session.lock().clone()
    }

    /// Connect with a fresh transport, then attach to the new session
    pub async fn connect(
        &self,
        transport: Box<dyn Transport>,
        host: Host,
        credentials: Credentials,
    ) -> Result<SessionMode> {
        self.disconnect().await;

        let label = host.to_string();
        publish(&self.state, |s| {
            s.mode = SessionMode::Connecting;
            s.host_label = Some(label.clone());
            s.output
                .push(OutputLine::new(format!("Connecting to {}...", label), LineKind::System));
        });

        let timeout = self.options.connect_timeout;
        let task = tokio::task::spawn_blocking(move || {
            let mut session = TransportSession::new(transport);
            session.connect(&host, &credentials, timeout).map(|_| session)
        });

        let connected = match tokio::time::timeout(timeout, task).await {
            Err(_) => Err(EngineError::ConnectTimeout(timeout)),
            Ok(Err(join)) => Err(join.into()),
            Ok(Ok(Err(TransportError::ConnectTimeout(t)))) => Err(EngineError::ConnectTimeout(t)),
            Ok(Ok(Err(e))) => Err(e.into()),
            Ok(Ok(Ok(session))) => Ok(session),
        };

        match connected {
            Ok(session) => self.attach(session).await,
            Err(e) => {
                warn!(host = %label, error = %e, "Connection failed");
                publish(&self.state, |s| {
                    s.mode = SessionMode::Disconnected;
                    s.host_label = None;
                    s.output
                        .push(OutputLine::new(format!("Connection failed: {}", e), LineKind::Error));
                });
                Err(e)
            }
        }
    }

    /// Take ownership of a connected session and start working with it
    ///
    /// In shell mode a pty shell is requested, allowed to settle, polled,
    /// and drained once for its banner. If any of that fails the engine
    /// falls back to exec mode and reports why.
    pub async fn attach(&self, session: TransportSession) -> Result<SessionMode> {
        if self.session.lock().is_some() {
            self.disconnect().await;
        }

        if !session.is_connected() {
            return Err(EngineError::NotConnected);
        }
        let label = session
            .host()
            .map(Host::to_string)
            .unwrap_or_else(|| "remote".to_string());
        let shared = session.into_shared();
        *self.session.lock() = Some(Arc::clone(&shared));
        publish(&self.state, |s| s.host_label = Some(label.clone()));

        if self.options.shell_mode {
            match self.start_shell(&shared, &label).await {
                Ok(()) => return Ok(SessionMode::ShellActive),
                Err(e) => {
                    warn!(host = %label, error = %e, "Shell unavailable, falling back to exec mode");
                    self.stop_shell().await;
                    publish(&self.state, |s| {
                        s.poll_interval = None;
                        s.output.push(OutputLine::new(
                            format!("Shell unavailable: {}", e),
                            LineKind::Error,
                        ));
                    });
                }
            }
        }

        if let Err(e) = with_session(&shared, |s| s.enter_exec_mode()).await {
            warn!(error = %e, "Failed to switch session to exec mode");
        }
        let mode = SessionMode::ExecReady {
            pty_enabled: self.options.pty_enabled,
        };
        publish(&self.state, |s| {
            s.mode = mode;
            s.output.push(OutputLine::new(
                format!("Connected to {} (exec mode)", label),
                LineKind::System,
            ));
        });
        info!(host = %label, "Attached in exec mode");
        Ok(mode)
    }

    async fn start_shell(&self, session: &SharedSession, label: &str) -> Result<()> {
        let pty = self.options.pty.clone();
        with_session(session, move |s| s.open_shell(&pty)).await?;
        tokio::time::sleep(self.options.settle_delay).await;

        let lines = self.spawn_shell_tasks(session).await;
        publish(&self.state, |s| {
            s.mode = SessionMode::ShellActive;
            s.poll_interval = Some(self.options.polling.min_interval);
            s.output.push(OutputLine::new(
                format!("Connected to {} (shell)", label),
                LineKind::System,
            ));
        });

        let drain_bytes = self.options.initial_drain_bytes;
        let (_, banner) = read_lines(session, &lines, drain_bytes).await?;
        append_output(&self.state, banner);
        info!(host = %label, "Attached in shell mode");
        Ok(())
    }

    /// Start the poller and the shell writer, replacing any running ones
    async fn spawn_shell_tasks(&self, session: &SharedSession) -> SharedLines {
        self.stop_shell().await;

        let cancel = CancellationToken::new();
        let lines = SharedLines::default();
        let (commands, queue) = mpsc::unbounded_channel();
        let poller = tokio::spawn(run_poller(
            Arc::clone(session),
            Arc::clone(&self.state),
            Arc::clone(&lines),
            self.options.polling,
            self.options.read_chunk_bytes,
            cancel.clone(),
        ));
        let writer = tokio::spawn(run_writer(
            Arc::clone(session),
            Arc::clone(&self.state),
            queue,
            cancel.clone(),
        ));
        *self.shell.lock() = Some(ShellTasks {
            cancel,
            commands,
            poller,
            writer,
        });
        lines
    }

    async fn stop_shell(&self) {
        let Some(tasks) = self.shell.lock().take() else {
            return;
        };
        tasks.cancel.cancel();
        drop(tasks.commands);
        for (name, handle) in [("poller", tasks.poller), ("writer", tasks.writer)] {
            if let Err(e) = handle.await {
                warn!(task = name, error = %e, "Shell task ended abnormally");
            }
        }
        debug!("Shell tasks stopped");
    }

    /// Handle one line of user input
    ///
    /// `exit` and `clear` are handled locally. Everything else is checked by
    /// the command guard, echoed, recorded in history and dispatched. The
    /// echo is appended before dispatch so echoes keep submission order.
    pub async fn submit(&self, raw: &str) -> SubmitOutcome {
        let command = raw.trim();
        if command.is_empty() {
            return SubmitOutcome::Ignored;
        }

        match command {
            "exit" => {
                publish(&self.state, |s| s.input.clear());
                self.disconnect().await;
                return SubmitOutcome::Disconnected;
            }
            "clear" => {
                publish(&self.state, |s| {
                    s.input.clear();
                    s.output.clear();
                    s.output
                        .push(OutputLine::new("Output cleared", LineKind::System));
                });
                return SubmitOutcome::Cleared;
            }
            _ => {}
        }

        let mode = self.mode();
        if !mode.is_connected() {
            publish(&self.state, |s| {
                s.output
                    .push(OutputLine::new("Not connected", LineKind::Error));
            });
            return SubmitOutcome::NotConnected;
        }

        let checked = self.guard.lock().check(command);
        if let Err(rejection) = checked {
            debug!(reason = %rejection, "Command rejected");
            publish(&self.state, |s| {
                s.input.clear();
                s.output
                    .push(OutputLine::new(rejection.to_string(), LineKind::Error));
            });
            return SubmitOutcome::Rejected(rejection);
        }

        let echo = format!("{}{}", self.options.prompt, command);
        publish(&self.state, |s| {
            s.input.clear();
            s.output.push(OutputLine::new(echo, LineKind::Command));
        });
        self.history.lock().add(command);

        match mode {
            SessionMode::ShellActive => self.send_to_shell(command),
            SessionMode::ExecReady { pty_enabled } => self.spawn_exec(command, pty_enabled),
            SessionMode::Disconnected | SessionMode::Connecting => SubmitOutcome::NotConnected,
        }
    }

    /// Submit whatever is in the input field
    pub async fn submit_input(&self) -> SubmitOutcome {
        let input = self.state.borrow().input.clone();
        self.submit(&input).await
    }

    fn send_to_shell(&self, command: &str) -> SubmitOutcome {
        let sent = self
            .shell
            .lock()
            .as_ref()
            .map(|tasks| tasks.commands.send(format!("{}\n", command)).is_ok())
            .unwrap_or(false);
        if !sent {
            publish(&self.state, |s| {
                s.output
                    .push(OutputLine::new("Shell is not running", LineKind::Error));
            });
            return SubmitOutcome::NotConnected;
        }
        SubmitOutcome::Sent
    }

    fn spawn_exec(&self, command: &str, pty_enabled: bool) -> SubmitOutcome {
        let Some(session) = self.session_handle() else {
            return SubmitOutcome::NotConnected;
        };
        if !pty_enabled && needs_terminal(command) {
            publish(&self.state, |s| {
                s.output.push(OutputLine::new(
                    format!(
                        "Warning: '{}' may need an interactive terminal; output may be incomplete",
                        command
                    ),
                    LineKind::System,
                ));
            });
        }

        let state = Arc::clone(&self.state);
        let pty = pty_enabled.then(|| self.options.pty.clone());
        let command = command.to_string();
        SubmitOutcome::Executing(tokio::spawn(async move {
            let label = command.clone();
            match with_session(&session, move |s| s.exec(&command, pty.as_ref())).await {
                Ok(output) => publish(&state, |s| append_exec_output(s, &output)),
                Err(e) => {
                    warn!(command = %label, error = %e, "Exec failed");
                    publish(&state, |s| {
                        s.output
                            .push(OutputLine::new(format!("Command failed: {}", e), LineKind::Error));
                    });
                }
            }
        }))
    }

    /// Close the session. Safe to call repeatedly.
    ///
    /// The poller is stopped first, then the transport is closed, then the
    /// visible state is reset even if closing failed.
    pub async fn disconnect(&self) {
        self.stop_shell().await;

        let session = self.session.lock().take();
        let had_session = session.is_some();
        if let Some(session) = session {
            if let Err(e) = with_session(&session, |s| s.close()).await {
                warn!(error = %e, "Error while closing session");
            }
        }

        publish(&self.state, |s| {
            s.mode = SessionMode::Disconnected;
            s.host_label = None;
            s.poll_interval = None;
            if had_session {
                s.output.push(OutputLine::new("Disconnected", LineKind::System));
            }
        });
        self.history.lock().reset_navigation();
        if had_session {
            info!("Session disconnected");
        }
    }

    /// Recall the previous command into the input field
    pub fn navigate_up(&self) -> Option<String> {
        let entry = self.history.lock().navigate_up();
        if let Some(entry) = &entry {
            publish(&self.state, |s| s.input = entry.clone());
        }
        entry
    }

    /// Recall the next command, ending on an empty input field
    pub fn navigate_down(&self) -> String {
        let entry = self.history.lock().navigate_down();
        publish(&self.state, |s| s.input = entry.clone());
        entry
    }

    /// Direct edit of the input field
    pub fn set_input(&self, text: &str) {
        self.history.lock().reset_navigation();
        publish(&self.state, |s| s.input = text.to_string());
    }

    pub fn history_search(&self, query: &str) -> Vec<String> {
        self.history.lock().search(query)
    }

    /// Commands in history, oldest first
    pub fn history_entries(&self) -> Vec<String> {
        self.history.lock().entries().to_vec()
    }
}

impl Drop for TerminalEngine {
    fn drop(&mut self) {
        if let Some(tasks) = self.shell.get_mut().take() {
            tasks.cancel.cancel();
        }
        let Some(session) = self.session.get_mut().take() else {
            return;
        };
        let close = move || {
            if let Err(e) = session.lock().close() {
                warn!(error = %e, "Error while closing session on drop");
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(close);
            }
            Err(_) => close(),
        }
    }
}

fn publish(state: &watch::Sender<EngineState>, update: impl FnOnce(&mut EngineState)) {
    state.send_modify(update);
}

/// Run a transport call on the blocking pool
async fn with_session<T, F>(session: &SharedSession, call: F) -> Result<T>
where
    F: FnOnce(&mut TransportSession) -> remsh_transport::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let session = Arc::clone(session);
    let result = tokio::task::spawn_blocking(move || call(&mut session.lock())).await?;
    Ok(result?)
}

/// Read from the shell and reassemble lines
///
/// Returns whether any bytes arrived, and the lines now complete. An empty
/// read releases a held-back partial line so prompts become visible.
async fn read_lines(
    session: &SharedSession,
    lines: &SharedLines,
    max_bytes: usize,
) -> Result<(bool, Vec<String>)> {
    let lines = Arc::clone(lines);
    with_session(session, move |s| {
        let bytes = s.read_shell(max_bytes)?;
        let mut lines = lines.lock();
        if bytes.is_empty() {
            return Ok((false, lines.flush().into_iter().collect::<Vec<_>>()));
        }
        Ok((true, lines.feed(&bytes)))
    })
    .await
}

fn append_output(state: &watch::Sender<EngineState>, lines: Vec<String>) {
    if lines.is_empty() {
        return;
    }
    publish(state, |s| {
        s.output
            .extend(lines.into_iter().map(|line| OutputLine::new(line, LineKind::Output)))
    });
}

fn append_exec_output(state: &mut EngineState, output: &ExecOutput) {
    if !output.stdout.is_empty() {
        state.output.push_text(&output.stdout, LineKind::Output);
    }
    if !output.stderr.is_empty() {
        state.output.push_text(&output.stderr, LineKind::Error);
    } else if output.exit_code != 0 {
        state.output.push(OutputLine::new(
            format!("Command exited with status {}", output.exit_code),
            LineKind::Error,
        ));
    }
}

/// Whether a command looks like it wants an interactive terminal
pub fn needs_terminal(command: &str) -> bool {
    let mut words = command.split_whitespace();
    let mut program = words.next().unwrap_or("");
    if program == "sudo" {
        program = words.next().unwrap_or("");
    }
    let program = program.rsplit('/').next().unwrap_or(program);
    INTERACTIVE_COMMANDS.contains(&program)
}

async fn run_poller(
    session: SharedSession,
    state: Arc<watch::Sender<EngineState>>,
    lines: SharedLines,
    config: PollConfig,
    chunk: usize,
    cancel: CancellationToken,
) {
    let mut poll = PollState::new(config);
    debug!("Shell poller started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(poll.interval()) => {}
        }

        let result = read_lines(&session, &lines, chunk).await;
        if cancel.is_cancelled() {
            break;
        }

        match result {
            Ok((received, complete)) => {
                if received {
                    poll.on_output();
                } else {
                    poll.on_empty();
                }
                append_output(&state, complete);
            }
            Err(e) => {
                warn!(error = %e, "Shell read failed, backing off");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(poll.error_backoff()) => {}
                }
                continue;
            }
        }

        let interval = poll.interval();
        state.send_if_modified(|s| {
            if s.poll_interval == Some(interval) {
                return false;
            }
            s.poll_interval = Some(interval);
            true
        });
    }
    debug!("Shell poller stopped");
}

async fn run_writer(
    session: SharedSession,
    state: Arc<watch::Sender<EngineState>>,
    mut queue: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
) {
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            next = queue.recv() => match next {
                Some(line) => line,
                None => break,
            },
        };
        if let Err(e) = with_session(&session, move |s| s.write_shell(&line)).await {
            warn!(error = %e, "Failed to send command to shell");
            publish(&state, |s| {
                s.output
                    .push(OutputLine::new(format!("Failed to send command: {}", e), LineKind::Error));
            });
        }
    }
}
