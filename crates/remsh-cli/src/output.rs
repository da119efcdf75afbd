//! Terminal output styling

use colored::Colorize;
use remsh_terminal::{LineKind, OutputBuffer, OutputLine};

/// Output styling configuration
#[derive(Debug, Clone, Copy)]
pub struct OutputStyle {
    pub use_colors: bool,
}

impl Default for OutputStyle {
    fn default() -> Self {
        Self {
            use_colors: colored::control::SHOULD_COLORIZE.should_colorize(),
        }
    }
}

impl OutputStyle {
    pub fn plain() -> Self {
        Self { use_colors: false }
    }

    pub fn success(&self, msg: &str) -> String {
        if self.use_colors {
            format!("{} {}", "✓".green().bold(), msg)
        } else {
            format!("✓ {}", msg)
        }
    }

    pub fn error(&self, msg: &str) -> String {
        if self.use_colors {
            format!("{} {}", "✗".red().bold(), msg)
        } else {
            format!("✗ {}", msg)
        }
    }

    pub fn warning(&self, msg: &str) -> String {
        if self.use_colors {
            format!("{} {}", "⚠".yellow(), msg)
        } else {
            format!("⚠ {}", msg)
        }
    }

    /// Render one terminal line according to its kind
    pub fn line(&self, line: &OutputLine) -> String {
        if !self.use_colors {
            return line.text.clone();
        }
        match line.kind {
            LineKind::Command => line.text.bold().to_string(),
            LineKind::Output => line.text.clone(),
            LineKind::Error => line.text.red().to_string(),
            LineKind::System => line.text.yellow().to_string(),
        }
    }
}

/// Lines of `buffer` that come after `last_shown`
///
/// If `last_shown` is no longer in the buffer (cleared or evicted), every
/// line is new.
pub fn unseen_lines(buffer: &OutputBuffer, last_shown: Option<&OutputLine>) -> Vec<OutputLine> {
    let lines: Vec<&OutputLine> = buffer.iter().collect();
    let start = last_shown
        .and_then(|last| lines.iter().rposition(|line| *line == last))
        .map(|i| i + 1)
        .unwrap_or(0);
    lines[start..].iter().map(|line| (*line).clone()).collect()
}

pub fn print_error(msg: &str) {
    eprintln!("{}", OutputStyle::default().error(msg));
}
