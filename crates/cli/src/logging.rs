//! Tracing setup for the `pflow` binary.
//!
//! Library crates only emit events; this is the one place a subscriber is
//! installed. Output goes to stderr so `--json` results on stdout stay clean.

use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins over `verbose`. Safe to call more than once.
pub fn init(json: bool, verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let _ = if json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
}
