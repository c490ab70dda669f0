//! Logging configuration
//!
//! Structured logging with tracing. `RUST_LOG` overrides the default filter.

use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

/// Default filter directive
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "bergelmir=debug"
    } else {
        "bergelmir=info"
    }
}

/// Initialize logging with environment-based filtering
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
