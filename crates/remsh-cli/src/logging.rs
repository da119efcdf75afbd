//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

/// Filter used when neither `--log-level` nor `RUST_LOG` is given
pub const DEFAULT_FILTER: &str = "warn";

/// Pick the filter directive: explicit level, then verbosity flags, then `RUST_LOG`
pub fn filter_directive(log_level: Option<&str>, verbose: bool, quiet: bool) -> String {
    if let Some(level) = log_level {
        return level.to_string();
    }
    if quiet {
        return "error".to_string();
    }
    if verbose {
        return "debug".to_string();
    }
    std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_else(|_| DEFAULT_FILTER.to_string())
}

/// Install the global subscriber, writing to stderr so it never mixes with remote output
pub fn init_logging(log_level: Option<&str>, verbose: bool, quiet: bool) {
    let directive = filter_directive(log_level, verbose, quiet);
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    // A second init (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
