//! Logging setup for applications embedding the engine.

use tracing_subscriber::{EnvFilter, fmt};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,tessera_gpu=info,tessera_runtime=debug";

/// Install a formatted subscriber.
///
/// Use `RUST_LOG` to override [`DEFAULT_FILTER`]. Library code never calls
/// this; a second call leaves the first subscriber in place.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}
