//! Prometheus metrics via `metrics` + `metrics-exporter-prometheus`. The
//! recorder is installed once at startup; every crate downstream of this one
//! records through the plain `metrics::counter!`/`histogram!` macros, which
//! forward to whatever recorder is globally installed.

use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder exactly once and return its handle.
pub fn init_metrics() -> PrometheusHandle {
    HANDLE
        .get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

/// Render the current metrics snapshot in Prometheus text exposition format.
pub fn render() -> String {
    init_metrics().render()
}
