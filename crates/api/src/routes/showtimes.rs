//! Showtime catalog endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{Money, ShowtimeId};
use seat_store::{NewShowtime, SeatStore, Showtime};
use serde::{Deserialize, Serialize};

use super::reservations::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct CreateShowtimeRequest {
    pub movie_title: String,
    pub starts_at: DateTime<Utc>,
    pub total_seats: u32,
    pub price_cents: i64,
}

#[derive(Serialize)]
pub struct ShowtimeResponse {
    pub id: i64,
    pub movie_title: String,
    pub starts_at: DateTime<Utc>,
    pub total_seats: u32,
    pub available_seats: u32,
    pub price_cents: i64,
}

impl From<Showtime> for ShowtimeResponse {
    fn from(s: Showtime) -> Self {
        Self {
            id: s.id.as_i64(),
            movie_title: s.movie_title,
            starts_at: s.starts_at,
            total_seats: s.total_seats,
            available_seats: s.available_seats,
            price_cents: s.price.cents(),
        }
    }
}

#[derive(Serialize)]
pub struct SeatMapResponse {
    pub showtime_id: i64,
    pub total_seats: u32,
    pub available_seats: u32,
    pub held_seats: Vec<u32>,
}

/// POST /showtimes — register a showtime in the catalog.
#[tracing::instrument(skip(state, payload))]
pub async fn create<S: SeatStore>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<CreateShowtimeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ShowtimeResponse>), ApiError> {
    let Json(req) = payload?;

    let showtime = state
        .coordinator
        .register_showtime(NewShowtime::new(
            req.movie_title,
            req.starts_at,
            req.total_seats,
            Money::from_cents(req.price_cents),
        ))
        .await?;

    Ok((StatusCode::CREATED, Json(showtime.into())))
}

/// GET /showtimes/:id
#[tracing::instrument(skip(state))]
pub async fn get<S: SeatStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<i64>,
) -> Result<Json<ShowtimeResponse>, ApiError> {
    let showtime = state.coordinator.get_showtime(ShowtimeId::new(id)).await?;
    Ok(Json(showtime.into()))
}

/// GET /showtimes/:id/seats — which seats are taken.
#[tracing::instrument(skip(state))]
pub async fn seats<S: SeatStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<i64>,
) -> Result<Json<SeatMapResponse>, ApiError> {
    let map = state.coordinator.seat_map(ShowtimeId::new(id)).await?;

    Ok(Json(SeatMapResponse {
        showtime_id: map.showtime.id.as_i64(),
        total_seats: map.showtime.total_seats,
        available_seats: map.showtime.available_seats,
        held_seats: map.held_seats.into_iter().collect(),
    }))
}
