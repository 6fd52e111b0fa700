//! Logging setup
//!
//! The library only emits `tracing` events; binaries decide where they go.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a stderr subscriber filtered by `RUST_LOG`.
///
/// Defaults to INFO for this crate and WARN for dependencies, or DEBUG for
/// this crate when `verbose` is set. Calling it twice is harmless.
pub fn init(verbose: bool) {
    let default = if verbose {
        "emx_workflow=debug,warn"
    } else {
        "emx_workflow=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .try_init();
}
