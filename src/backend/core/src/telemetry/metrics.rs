//! Prometheus metrics.
//!
//! Counters are emitted at the call sites with the `metrics` macros; this
//! module installs the recorder, describes every metric once and renders the
//! text exposition for `/metrics`.

use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Handle onto the installed recorder. Cheap to clone.
#[derive(Clone, Default)]
pub struct MetricsRegistry {
    prometheus_handle: Option<PrometheusHandle>,
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("prometheus_handle", &self.prometheus_handle.is_some())
            .finish()
    }
}

impl MetricsRegistry {
    /// A registry with no recorder; renders nothing.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn from_handle(handle: PrometheusHandle) -> Self {
        Self {
            prometheus_handle: Some(handle),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.prometheus_handle.is_some()
    }

    /// Prometheus text format.
    pub fn render(&self) -> String {
        self.prometheus_handle
            .as_ref()
            .map(|h| h.render())
            .unwrap_or_default()
    }
}

/// Install the global Prometheus recorder and describe our metrics.
///
/// Fails if a recorder is already installed.
pub fn install_recorder() -> anyhow::Result<MetricsRegistry> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metric_descriptions();
    Ok(MetricsRegistry::from_handle(handle))
}

fn register_metric_descriptions() {
    // Authentication
    describe_counter!("auth_success_total", "Successful bearer authentications");
    describe_counter!(
        "auth_errors_total",
        "Rejected authentication or authorization attempts by error type"
    );

    // Authorization
    describe_counter!(
        "authz_decisions_total",
        "Authorization decisions by policy and outcome"
    );

    // Audit trail
    describe_counter!("audit_records_total", "Audit records persisted by status");
    describe_counter!(
        "audit_write_failures_total",
        "Audit records that could not be persisted"
    );

    // Errors
    describe_counter!("warden_errors_total", "Service errors returned to callers by code");
}
