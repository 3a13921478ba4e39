//! Kolab Telemetry
//!
//! Structured logging setup and lightweight in-process counters.

mod config;
mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use metrics::{Counter, Gauge};
pub use tracing_setup::init_tracing;

/// Initialize telemetry for a service from the environment
pub fn init(service_name: &str) -> Result<TelemetryGuard, TelemetryError> {
    let config = TelemetryConfig::from_env(service_name);
    init_tracing(&config)?;
    Ok(TelemetryGuard {
        service_name: config.service_name,
    })
}

/// Held by `main` for the life of the process. Logging is synchronous, so
/// there is nothing to flush; dropping the guard marks the end of the log.
pub struct TelemetryGuard {
    service_name: String,
}

impl TelemetryGuard {
    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service_name, "Telemetry stopped");
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Tracing initialization failed: {0}")]
    TracingInit(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_installs_subscriber_once() {
        let guard = init("kolab-telemetry-test").unwrap();
        assert!(!guard.service_name().is_empty());

        assert!(matches!(init("kolab-telemetry-test"), Err(TelemetryError::TracingInit(_))));
        drop(guard);
    }
}
