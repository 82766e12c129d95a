//! `tracing` subscriber setup for the binary.
//!
//! `RUST_LOG` wins when set. Otherwise the level follows `-v` flags:
//! warnings only, `-v` for info, `-vv` for debug.

use tracing_subscriber::EnvFilter;

fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "shortform=warn,shortform_core=warn",
        1 => "shortform=info,shortform_core=info",
        _ => "shortform=debug,shortform_core=debug",
    }
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbosity > 1)
        .without_time()
        .try_init();
}
