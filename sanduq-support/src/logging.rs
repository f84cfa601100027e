//! Tracing bootstrap shared by demos and tests.

use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber filtered by `RUST_LOG`, falling back to `default_filter`.
///
/// Returns `false` when a global subscriber was already set, so calling it
/// from several tests is harmless.
///
/// ```
/// sanduq_support::logging::init_tracing("sanduq=debug");
/// ```
pub fn init_tracing(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_test_writer()
        .try_init()
        .is_ok();
    if installed {
        debug!(default_filter, "Tracing subscriber installed");
    }
    installed
}
