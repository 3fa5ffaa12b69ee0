//! OpenTelemetry metrics export module.
//!
//! Exports pipeline metrics to an OTLP collector.
//!
//! ## OTLP endpoint priority
//! 1. `OTEL_EXPORTER_OTLP_ENDPOINT` environment variable
//! 2. Disabled (no default fallback)

use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use opentelemetry::metrics::{Counter, Meter};
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::Resource;
use tracing::{info, warn};

const METRIC_EXPORT_INTERVAL_SECS: u64 = 30;

static METRICS: OnceLock<AgentMetrics> = OnceLock::new();
static METER_PROVIDER: OnceLock<SdkMeterProvider> = OnceLock::new();

/// Pipeline metrics collection.
///
/// Note: do NOT add a `_total` suffix to counter names (Prometheus adds it
/// automatically).
pub struct AgentMetrics {
    pub events_processed: Counter<u64>,
    pub events_suppressed: Counter<u64>,
    pub events_dropped: Counter<u64>,
    pub cache_hits: Counter<u64>,
    pub cache_misses: Counter<u64>,
    pub log_write_errors: Counter<u64>,
}

impl AgentMetrics {
    fn new(meter: &Meter) -> Self {
        Self {
            events_processed: meter
                .u64_counter("events_processed")
                .with_description("Number of kernel events handled by the pipeline")
                .with_unit("events")
                .build(),
            events_suppressed: meter
                .u64_counter("events_suppressed")
                .with_description("Number of events suppressed by filter rules")
                .with_unit("events")
                .build(),
            events_dropped: meter
                .u64_counter("events_dropped")
                .with_description("Number of events dropped because the dispatch queue was full")
                .with_unit("events")
                .build(),
            cache_hits: meter
                .u64_counter("resolver_cache_hits")
                .with_description("Number of cgroup resolutions served from cache")
                .with_unit("lookups")
                .build(),
            cache_misses: meter
                .u64_counter("resolver_cache_misses")
                .with_description("Number of cgroup resolutions requiring a full lookup")
                .with_unit("lookups")
                .build(),
            log_write_errors: meter
                .u64_counter("log_write_errors")
                .with_description("Number of failed detection log writes")
                .with_unit("errors")
                .build(),
        }
    }
}

fn get_otlp_endpoint() -> Option<String> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;
    if endpoint.is_empty() {
        return None;
    }
    if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
        Some(format!("http://{endpoint}"))
    } else {
        Some(endpoint)
    }
}

/// Initialize the OpenTelemetry metrics provider.
///
/// Skips initialization if `OTEL_EXPORTER_OTLP_ENDPOINT` is not set.
pub fn init_metrics() -> Result<()> {
    let endpoint = match get_otlp_endpoint() {
        Some(ep) => ep,
        None => {
            info!("OTEL_EXPORTER_OTLP_ENDPOINT not set. Metrics export disabled.");
            return Ok(());
        }
    };

    info!(endpoint = %endpoint, "initializing OpenTelemetry metrics exporter");

    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(&endpoint)
        .with_timeout(Duration::from_secs(10))
        .build()
        .context("failed to create OTLP metric exporter")?;

    let reader = PeriodicReader::builder(exporter, opentelemetry_sdk::runtime::Tokio)
        .with_interval(Duration::from_secs(METRIC_EXPORT_INTERVAL_SECS))
        .build();

    let resource = Resource::default().merge(&Resource::new(vec![
        KeyValue::new("service.name", "cgroup-sentinel"),
        KeyValue::new("telemetry.sdk.language", "rust"),
    ]));

    let provider = SdkMeterProvider::builder().with_reader(reader).with_resource(resource).build();

    global::set_meter_provider(provider.clone());
    let _ = METER_PROVIDER.set(provider);

    let meter = global::meter("cgroup-sentinel");
    let _ = METRICS.set(AgentMetrics::new(&meter));

    info!("OpenTelemetry metrics initialized successfully");
    Ok(())
}

pub fn metrics() -> Option<&'static AgentMetrics> {
    METRICS.get()
}

pub fn record_event_processed(event_type: &str) {
    if let Some(m) = metrics() {
        m.events_processed.add(1, &[KeyValue::new("type", event_type.to_string())]);
    }
}

pub fn record_event_suppressed() {
    if let Some(m) = metrics() {
        m.events_suppressed.add(1, &[]);
    }
}

pub fn record_event_dropped() {
    if let Some(m) = metrics() {
        m.events_dropped.add(1, &[]);
    }
}

pub fn record_cache_hit() {
    if let Some(m) = metrics() {
        m.cache_hits.add(1, &[]);
    }
}

pub fn record_cache_miss() {
    if let Some(m) = metrics() {
        m.cache_misses.add(1, &[]);
    }
}

pub fn record_log_write_error() {
    if let Some(m) = metrics() {
        m.log_write_errors.add(1, &[]);
    }
}

/// Flush pending metrics and shut down the meter provider.
pub fn shutdown_metrics() {
    info!("shutting down OpenTelemetry metrics");
    if let Some(provider) = METER_PROVIDER.get() {
        if let Err(err) = provider.shutdown() {
            warn!(error = %err, "failed to shut down meter provider");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn otlp_endpoint_unset_disables_metrics() {
        unsafe {
            std::env::remove_var("OTEL_EXPORTER_OTLP_ENDPOINT");
        }
        assert!(get_otlp_endpoint().is_none());
    }

    #[test]
    #[serial]
    fn otlp_endpoint_without_scheme_gets_http_prefix() {
        unsafe {
            std::env::set_var("OTEL_EXPORTER_OTLP_ENDPOINT", "collector:4317");
        }
        assert_eq!(get_otlp_endpoint(), Some("http://collector:4317".to_string()));
        unsafe {
            std::env::remove_var("OTEL_EXPORTER_OTLP_ENDPOINT");
        }
    }

    #[test]
    #[serial]
    fn otlp_endpoint_empty_string_disables_metrics() {
        unsafe {
            std::env::set_var("OTEL_EXPORTER_OTLP_ENDPOINT", "");
        }
        assert!(get_otlp_endpoint().is_none());
        unsafe {
            std::env::remove_var("OTEL_EXPORTER_OTLP_ENDPOINT");
        }
    }
}
