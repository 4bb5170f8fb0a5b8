//! Logging setup for the extpack CLI
//!
//! Console logging through `tracing` with an environment-based filter:
//! `RUST_LOG` takes precedence, otherwise `--verbose` picks the default
//! level.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global subscriber
pub fn init(verbose: bool) {
    let default_filter = if verbose {
        "debug"
    } else {
        "warn,extpack_core=info,extpack_manifest=info,extpack_install=info,extpack_drivers=info"
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}
