//! Line-oriented front end for a [`TerminalEngine`]
//!
//! Input lines are submitted one at a time; a printer task follows the
//! engine state and writes every new output line as it appears.

use std::io::Write;

use anyhow::Result;
use remsh_terminal::{EngineState, OutputLine, SubmitOutcome, TerminalEngine};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::output::{unseen_lines, OutputStyle};

/// Sink for rendered lines
pub type LineSink = Box<dyn Write + Send>;

/// Feed `input` to the engine until it ends or the user types `exit`
///
/// The session is always disconnected on return, and every line produced
/// up to that point has been written to `sink`.
pub async fn run<R>(engine: &TerminalEngine, input: R, sink: LineSink, style: OutputStyle) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let cancel = CancellationToken::new();
    let printer = spawn_printer(engine.subscribe(), sink, style, cancel.clone());

    let result = read_loop(engine, input).await;

    engine.disconnect().await;
    cancel.cancel();
    printer.await??;
    result
}

async fn read_loop<R>(engine: &TerminalEngine, input: R) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        match engine.submit(&line).await {
            SubmitOutcome::Disconnected => {
                debug!("Session ended by user");
                break;
            }
            SubmitOutcome::NotConnected if !engine.mode().is_connected() => break,
            // One-shot commands finish before the next line is read
            SubmitOutcome::Executing(handle) => {
                if let Err(e) = handle.await {
                    debug!(error = %e, "Exec task ended abnormally");
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn spawn_printer(
    mut state: watch::Receiver<EngineState>,
    mut sink: LineSink,
    style: OutputStyle,
    cancel: CancellationToken,
) -> JoinHandle<std::io::Result<()>> {
    tokio::spawn(async move {
        let mut last_shown: Option<OutputLine> = None;
        loop {
            let fresh = unseen_lines(&state.borrow_and_update().output, last_shown.as_ref());
            write_lines(&mut sink, &fresh, style)?;
            if let Some(line) = fresh.last() {
                last_shown = Some(line.clone());
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        let fresh = unseen_lines(&state.borrow().output, last_shown.as_ref());
        write_lines(&mut sink, &fresh, style)?;
        sink.flush()
    })
}

fn write_lines(sink: &mut LineSink, lines: &[OutputLine], style: OutputStyle) -> std::io::Result<()> {
    for line in lines {
        writeln!(sink, "{}", style.line(line))?;
    }
    if !lines.is_empty() {
        sink.flush()?;
    }
    Ok(())
}
