//! Prometheus exposition for the storefront's counters.
//!
//! The checkout layer records `checkout_attempts_total`, its retry and
//! outcome counters, and `order_status_transitions` against the
//! process-wide recorder; this route renders whatever has accumulated.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;

/// GET /metrics — renders the registered metrics in Prometheus text format.
pub async fn get(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        handle.render(),
    )
}
