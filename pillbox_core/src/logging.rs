//! Logging setup for the pillbox binaries.
//!
//! Filtering comes from `PILLBOX_LOG`, then `RUST_LOG`, then the level
//! passed in (normally `[log] level` from the config file).

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize logging with the default level
pub fn init() {
    init_with_level("warn")
}

/// Initialize logging with a specific default level
///
/// # Arguments
/// * `default_level` - Default filter directive (e.g. "info", "pillbox_core=debug")
pub fn init_with_level(default_level: &str) {
    let filter = EnvFilter::try_from_env("PILLBOX_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .try_init();
}

/// Initialize logging for testing (captures logs for test output)
#[cfg(test)]
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::new("debug"))
        .try_init();
}
