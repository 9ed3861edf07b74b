//! Prometheus metrics endpoint and metric descriptions.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use metrics::Unit;
use metrics_exporter_prometheus::PrometheusHandle;

/// Registers help text for the reservation metrics.
///
/// Must run after the recorder is installed.
pub fn describe() {
    metrics::describe_counter!(
        "reservations_attempted_total",
        "Reservation requests received by the coordinator"
    );
    metrics::describe_counter!(
        "reservations_confirmed_total",
        "Reservations committed"
    );
    metrics::describe_counter!(
        "reservations_rejected_total",
        "Reservation requests rejected, by reason"
    );
    metrics::describe_counter!(
        "reservations_cancelled_total",
        "Reservations cancelled and released"
    );
    metrics::describe_counter!(
        "reservation_lock_retries_total",
        "Retries after a showtime hold timed out"
    );
    metrics::describe_histogram!(
        "reservation_duration_seconds",
        Unit::Seconds,
        "Time spent in the reserve path, retries included"
    );
}

/// GET /metrics — returns Prometheus-formatted metrics.
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
