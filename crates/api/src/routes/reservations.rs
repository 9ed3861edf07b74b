//! Reservation endpoints: reserve, cancel and read back.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use booking::{CustomerInfo, ReservationCoordinator, ReserveSeats};
use common::{ReservationId, ShowtimeId};
use seat_store::{Reservation, SeatStore};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: SeatStore> {
    pub coordinator: ReservationCoordinator<S>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateReservationRequest {
    pub showtime_id: i64,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub seat_numbers: Vec<u32>,
}

// -- Response types --

#[derive(Serialize)]
pub struct ReservationResponse {
    pub id: i64,
    pub showtime_id: i64,
    pub seat_numbers: Vec<u32>,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub total_amount_cents: i64,
    pub status: String,
    pub created_at: String,
}

impl From<Reservation> for ReservationResponse {
    fn from(r: Reservation) -> Self {
        Self {
            id: r.id.as_i64(),
            showtime_id: r.showtime_id.as_i64(),
            seat_numbers: r.seat_numbers.into_iter().collect(),
            customer_name: r.customer_name,
            customer_email: r.customer_email,
            customer_phone: r.customer_phone,
            total_amount_cents: r.total_amount.cents(),
            status: r.status.to_string(),
            created_at: r.created_at.to_rfc3339(),
        }
    }
}

// -- Handlers --

/// POST /reservations — reserve seats for a showtime.
#[tracing::instrument(skip(state, payload))]
pub async fn create<S: SeatStore>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<CreateReservationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ReservationResponse>), ApiError> {
    let Json(req) = payload?;

    let customer = CustomerInfo::new(req.customer_name, req.customer_email, req.customer_phone)?;
    let request = ReserveSeats::new(
        ShowtimeId::new(req.showtime_id),
        req.seat_numbers,
        customer,
    )?;

    let reservation = state.coordinator.reserve(request).await?;

    Ok((StatusCode::CREATED, Json(reservation.into())))
}

/// DELETE /reservations/:id — cancel a reservation and release its seats.
#[tracing::instrument(skip(state))]
pub async fn cancel<S: SeatStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<i64>,
) -> Result<Json<ReservationResponse>, ApiError> {
    let reservation = state.coordinator.cancel(ReservationId::new(id)).await?;
    Ok(Json(reservation.into()))
}

/// GET /reservations/:id — load a reservation by ID.
#[tracing::instrument(skip(state))]
pub async fn get<S: SeatStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<i64>,
) -> Result<Json<ReservationResponse>, ApiError> {
    let reservation = state.coordinator.get(ReservationId::new(id)).await?;
    Ok(Json(reservation.into()))
}

/// GET /reservations — list every reservation.
#[tracing::instrument(skip(state))]
pub async fn list<S: SeatStore>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<ReservationResponse>>, ApiError> {
    let reservations = state.coordinator.list_all().await?;
    Ok(Json(reservations.into_iter().map(Into::into).collect()))
}

/// GET /showtimes/:id/reservations — list the reservations of one showtime.
#[tracing::instrument(skip(state))]
pub async fn list_for_showtime<S: SeatStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<ReservationResponse>>, ApiError> {
    let reservations = state
        .coordinator
        .list_by_showtime(ShowtimeId::new(id))
        .await?;
    Ok(Json(reservations.into_iter().map(Into::into).collect()))
}
