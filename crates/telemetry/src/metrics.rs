//! Meter provider setup and the metrics recorded by the gateway.

mod names;
mod recorder;

pub use names::*;
pub use recorder::Recorder;

use anyhow::Context;
use config::{OtlpExporterConfig, OtlpProtocol, TelemetryConfig};
use opentelemetry::{KeyValue, metrics::Meter};
use opentelemetry_otlp::{MetricExporter, WithExportConfig};
use opentelemetry_sdk::{
    Resource,
    metrics::{PeriodicReader, SdkMeterProvider},
};

const METER_NAME: &str = "tally";

/// The meter every gateway metric is created from.
pub fn meter() -> Meter {
    opentelemetry::global::meter(METER_NAME)
}

pub(crate) fn init_metrics(config: &TelemetryConfig) -> anyhow::Result<SdkMeterProvider> {
    let meter_provider = match config.metrics_otlp_config() {
        Some(exporter) => otlp_meter_provider(config, exporter)?,
        None => {
            log::debug!("No metrics exporter enabled, metrics are recorded but not exported");
            SdkMeterProvider::builder().build()
        }
    };

    opentelemetry::global::set_meter_provider(meter_provider.clone());

    log::info!(
        "Telemetry metrics initialized for service '{}'",
        config.service_name().unwrap_or(METER_NAME)
    );

    Ok(meter_provider)
}

fn otlp_meter_provider(config: &TelemetryConfig, exporter: &OtlpExporterConfig) -> anyhow::Result<SdkMeterProvider> {
    let mut resource = Resource::builder().with_service_name(config.service_name().unwrap_or(METER_NAME).to_string());

    for (key, value) in config.resource_attributes() {
        resource = resource.with_attribute(KeyValue::new(key.clone(), value.clone()));
    }

    let metric_exporter = match exporter.protocol {
        OtlpProtocol::Grpc => MetricExporter::builder()
            .with_tonic()
            .with_endpoint(exporter.endpoint.as_str())
            .with_timeout(exporter.timeout)
            .build()
            .context("Failed to create gRPC OTLP metric exporter")?,
        OtlpProtocol::Http => MetricExporter::builder()
            .with_http()
            .with_endpoint(exporter.endpoint.as_str())
            .with_timeout(exporter.timeout)
            .build()
            .context("Failed to create HTTP OTLP metric exporter")?,
    };

    let reader = PeriodicReader::builder(metric_exporter)
        .with_interval(exporter.interval)
        .build();

    log::info!(
        "OTLP metrics exporter initialized to {} via {:?}",
        exporter.endpoint,
        exporter.protocol
    );

    Ok(SdkMeterProvider::builder()
        .with_resource(resource.build())
        .with_reader(reader)
        .build())
}
