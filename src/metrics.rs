//! Self-observability: Prometheus metrics about the monitor process itself,
//! distinct from component H which streams *observed service* health to
//! graphite. Grounded in the teacher's `core::metrics::metrics_handler`
//! (`PrometheusBuilder::install_recorder`, a `PrometheusHandle` rendered at
//! a text endpoint).

#[cfg(feature = "metrics")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

#[cfg(feature = "metrics")]
pub fn init() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install the Prometheus recorder")
}

#[cfg(feature = "metrics")]
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

#[cfg(not(feature = "metrics"))]
pub fn render(_handle: &()) -> String {
    "metrics disabled: feature \"metrics\" not enabled".to_string()
}
