//! Output lines and the bounded output buffer

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default cap on retained output lines
pub const MAX_LINES: usize = 10_000;

/// Origin of an output line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LineKind {
    /// Local echo of a submitted command
    Command,
    Output,
    Error,
    /// Messages from the engine itself
    System,
}

/// One line of visible output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLine {
    pub text: String,
    pub kind: LineKind,
    pub timestamp: DateTime<Utc>,
}

impl OutputLine {
    pub fn new(text: impl Into<String>, kind: LineKind) -> Self {
        Self {
            text: text.into(),
            kind,
            timestamp: Utc::now(),
        }
    }
}

/// Split raw remote output into lines
///
/// Carriage returns are dropped and a trailing newline does not produce an
/// empty last line.
pub fn split_lines(text: &str) -> Vec<String> {
    let cleaned = text.replace('\r', "");
    let body = cleaned.strip_suffix('\n').unwrap_or(&cleaned);
    if body.is_empty() && cleaned.is_empty() {
        return Vec::new();
    }
    body.split('\n').map(str::to_string).collect()
}

/// Ordered output lines capped at a maximum count, oldest dropped first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputBuffer {
    lines: VecDeque<OutputLine>,
    max_lines: usize,
}

impl OutputBuffer {
    pub fn new(max_lines: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            max_lines: max_lines.max(1),
        }
    }

    pub fn push(&mut self, line: OutputLine) {
        self.extend(std::iter::once(line));
    }

    /// Append a batch, then evict from the front down to the cap
    pub fn extend(&mut self, lines: impl IntoIterator<Item = OutputLine>) {
        self.lines.extend(lines);
        let excess = self.lines.len().saturating_sub(self.max_lines);
        if excess > 0 {
            self.lines.drain(..excess);
        }
    }

    /// Append every line of `text` with the same kind
    pub fn push_text(&mut self, text: &str, kind: LineKind) {
        self.extend(
            split_lines(text)
                .into_iter()
                .map(|line| OutputLine::new(line, kind)),
        );
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn max_lines(&self) -> usize {
        self.max_lines
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutputLine> {
        self.lines.iter()
    }

    pub fn last(&self) -> Option<&OutputLine> {
        self.lines.back()
    }

    /// Line texts, oldest first
    pub fn texts(&self) -> Vec<String> {
        self.lines.iter().map(|l| l.text.clone()).collect()
    }
}

/// Reassembles shell output that arrives in arbitrary chunks
///
/// The bytes of an unfinished UTF-8 sequence and the text after the last
/// newline are held back until a later chunk completes them. Invalid
/// sequences decode to U+FFFD.
#[derive(Debug, Default, Clone)]
pub struct LineAssembler {
    pending: Vec<u8>,
    partial: String,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a chunk, returning the lines it completed
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let data = std::mem::take(&mut self.pending);
        let mut rest = data.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.partial.push_str(text);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    self.partial.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            self.partial.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        // Truncated sequence at the end of the chunk
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }
        self.pending = rest.to_vec();

        let mut lines = Vec::new();
        while let Some(end) = self.partial.find('\n') {
            let line: String = self.partial.drain(..=end).collect();
            lines.push(line[..end].replace('\r', ""));
        }
        lines
    }

    /// Release the unterminated last line, e.g. a prompt waiting for input
    ///
    /// Bytes of an unfinished character stay pending.
    pub fn flush(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.partial).replace('\r', "");
        (!line.is_empty()).then_some(line)
    }

    /// Whether anything is held back
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.partial.is_empty()
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new(MAX_LINES)
    }
}
