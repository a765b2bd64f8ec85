//! Prometheus recorder for the `metrics` facade.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::{info, warn};

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the global recorder once.
///
/// When another recorder is already installed the exporter stays disabled
/// and `/metrics` renders an empty body.
pub fn init_metrics() {
    let _ = PROMETHEUS_HANDLE.get_or_try_init(|| {
        PrometheusBuilder::new()
            .install_recorder()
            .inspect(|_| info!("Prometheus metrics initialized"))
            .inspect_err(|e| warn!(error = %e, "Failed to install Prometheus recorder"))
    });
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    PROMETHEUS_HANDLE
        .get()
        .map(|h| h.render())
        .unwrap_or_default()
}
