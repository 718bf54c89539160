//! Logging setup.
//!
//! stdout belongs to the handshake, so the subscriber always writes to
//! stderr, where the host collects plugin output.

use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Environment variable holding a `tracing` filter directive.
pub const LOG_ENV: &str = "PLINTH_LOG";

/// Install the global subscriber.
///
/// The filter comes from [`LOG_ENV`] when set, otherwise `default_level`.
/// Returns `false` if a subscriber was already installed, which is expected
/// when `serve` runs more than once in a process.
pub fn init_logging(default_level: &str) -> bool {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .is_ok()
}
