//! Logging configuration
//!
//! Structured logging with tracing. `RUST_LOG` takes precedence over the
//! verbosity flag.

use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "newnym=debug"
    } else {
        "newnym=info"
    }
}

/// Initialize logging with environment-based filtering
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
