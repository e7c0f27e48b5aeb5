//! Telemetry for Tally.
//!
//! Installs the global OpenTelemetry meter provider that the dispatcher
//! records its attempt, rotation and backoff metrics to.

pub mod metrics;

use config::TelemetryConfig;
use opentelemetry_sdk::metrics::SdkMeterProvider;

pub use opentelemetry::{
    KeyValue,
    metrics::{Counter, Histogram, Meter},
};

/// Keeps the meter provider alive. Pending metrics are flushed and the
/// exporter shut down when it is dropped.
pub struct TelemetryGuard {
    meter_provider: SdkMeterProvider,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Err(e) = self.meter_provider.shutdown() {
            log::error!("Failed to shutdown meter provider: {e}");
        }
    }
}

/// Install the global meter provider described by the configuration.
pub async fn init(config: &TelemetryConfig) -> anyhow::Result<TelemetryGuard> {
    let meter_provider = metrics::init_metrics(config)?;

    Ok(TelemetryGuard { meter_provider })
}
