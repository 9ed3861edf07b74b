//! HTTP API server with observability for the seat reservation service.
//!
//! Provides REST endpoints for showtimes and reservations on top of the
//! booking coordinator, with structured logging (tracing) and Prometheus
//! metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use booking::{ReservationCoordinator, RetryPolicy};
use metrics_exporter_prometheus::PrometheusHandle;
use seat_store::SeatStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::reservations::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: SeatStore>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/reservations",
            post(routes::reservations::create::<S>).get(routes::reservations::list::<S>),
        )
        .route(
            "/reservations/{id}",
            get(routes::reservations::get::<S>).delete(routes::reservations::cancel::<S>),
        )
        .route("/showtimes", post(routes::showtimes::create::<S>))
        .route("/showtimes/{id}", get(routes::showtimes::get::<S>))
        .route("/showtimes/{id}/seats", get(routes::showtimes::seats::<S>))
        .route(
            "/showtimes/{id}/reservations",
            get(routes::reservations::list_for_showtime::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state around a seat store.
pub fn create_state<S: SeatStore>(store: S, retry: RetryPolicy) -> Arc<AppState<S>> {
    Arc::new(AppState {
        coordinator: ReservationCoordinator::new(store).with_retry_policy(retry),
    })
}
