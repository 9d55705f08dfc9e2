//! Log output setup

use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// The filter comes from `RUST_LOG` and defaults to `info`. Protocol lines
/// are logged at `trace`.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();
}
