//! Development-time tracing for the worker.
//!
//! Diagnostics go to stderr and are controlled by `RUST_LOG`. Run journals
//! under `.worker/runs/` are product artifacts and are written regardless.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the stderr subscriber. Defaults to `warn` when `RUST_LOG` is unset.
///
/// ```bash
/// RUST_LOG=exec_worker=debug exec-worker run --id 1 --title t --description d
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
