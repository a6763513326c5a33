//! Development-time tracing.
//!
//! - **Tracing (this module)**: diagnostics via `RUST_LOG`, written to stderr.
//!   Not persisted.
//! - **Artifacts (`io/artifacts`) and the run journal (`io/journal`)**: product
//!   output. Always written in run mode, unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`; defaults to `warn`. Output is compact, on stderr, so it
/// never mixes with step narration on stdout.
///
/// # Example
/// ```bash
/// RUST_LOG=stepdeck=debug stepdeck run demo install
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
