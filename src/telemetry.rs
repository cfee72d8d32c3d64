//! Process-wide tracing setup for the binary.
//!
//! Library code only emits through `tracing` macros; without a subscriber
//! (e.g. in tests) those are no-ops.

use crate::error::{PaymentError, Result};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber. `RUST_LOG` takes precedence over `level`.
///
/// Logs go to stderr so stdout stays reserved for command output.
pub fn init(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| PaymentError::Config(format!("invalid log level {:?}: {}", level, e)))?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    result.map_err(|e| PaymentError::Config(format!("tracing already initialised: {}", e)))
}
