//! Telemetry: structured logging, optional OTLP trace export and the
//! Prometheus recorder.
//!
//! # Example
//!
//! ```rust,no_run
//! use warden_core::config::ObservabilityConfig;
//! use warden_core::telemetry;
//!
//! let handle = telemetry::init(&ObservabilityConfig::default()).expect("telemetry");
//! // ... serve ...
//! handle.shutdown();
//! ```

pub mod metrics;

pub use self::metrics::{install_recorder, MetricsRegistry};

use opentelemetry_otlp::WithExportConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::ObservabilityConfig;

/// Install the global subscriber and metrics recorder. Call once at startup.
pub fn init(config: &ObservabilityConfig) -> anyhow::Result<TelemetryHandle> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;

    let fmt_layer = if config.json_logging {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().pretty().boxed()
    };

    let otel_layer = match config.otlp_endpoint {
        Some(ref endpoint) => {
            let tracer = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(
                    opentelemetry_otlp::new_exporter()
                        .tonic()
                        .with_endpoint(endpoint),
                )
                .with_trace_config(opentelemetry_sdk::trace::config().with_resource(
                    opentelemetry_sdk::Resource::new(vec![opentelemetry::KeyValue::new(
                        "service.name",
                        config.service_name.clone(),
                    )]),
                ))
                .install_batch(opentelemetry_sdk::runtime::Tokio)?;
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };
    let tracing_enabled = otel_layer.is_some();

    tracing_subscriber::registry()
        .with(filter)
        .with(otel_layer)
        .with(fmt_layer)
        .try_init()?;

    let metrics = install_recorder()?;

    tracing::info!(
        service_name = %config.service_name,
        otlp = tracing_enabled,
        json = config.json_logging,
        "Telemetry initialized"
    );

    Ok(TelemetryHandle {
        metrics,
        tracing_enabled,
    })
}

/// Keeps the exporters alive for the life of the process.
#[derive(Debug)]
pub struct TelemetryHandle {
    pub metrics: MetricsRegistry,
    tracing_enabled: bool,
}

impl TelemetryHandle {
    /// Flush pending spans.
    pub fn shutdown(self) {
        if self.tracing_enabled {
            opentelemetry::global::shutdown_tracer_provider();
        }
        tracing::info!("Telemetry shutdown complete");
    }
}
