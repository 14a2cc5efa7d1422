//! Tracing setup for MRIA binaries and tests.
//!
//! - [`init_telemetry`] installs a human-readable `fmt` subscriber.
//! - [`init_json_telemetry`] emits one JSON object per line.
//! - [`SpanRecorder`] is a layer that keeps closed spans in memory so
//!   tests can assert on what the pipeline recorded.
//!
//! Both initialisers honour `RUST_LOG` and fall back to `info`.

mod memory;

pub use memory::{SpanRecord, SpanRecorder, SpanStore};

use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

/// Errors raised while installing a subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global subscriber was already installed.
    #[error("failed to install tracing subscriber: {0}")]
    Init(String),
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a global `fmt` subscriber tagged with `service_name`.
///
/// # Errors
///
/// Returns [`TelemetryError::Init`] if a global subscriber is already set.
pub fn init_telemetry(service_name: &str) -> Result<(), TelemetryError> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .map_err(|e| TelemetryError::Init(e.to_string()))?;
    tracing::info!(service.name = service_name, "telemetry initialized");
    Ok(())
}

/// Install a global subscriber writing JSON lines, tagged with `service_name`.
///
/// # Errors
///
/// Returns [`TelemetryError::Init`] if a global subscriber is already set.
pub fn init_json_telemetry(service_name: &str) -> Result<(), TelemetryError> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
        .try_init()
        .map_err(|e| TelemetryError::Init(e.to_string()))?;
    tracing::info!(service.name = service_name, "telemetry initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_fails_instead_of_panicking() {
        // The first call may lose a race with another test's subscriber.
        let _ = init_telemetry("test");
        assert!(matches!(init_json_telemetry("test"), Err(TelemetryError::Init(_))));
    }
}
