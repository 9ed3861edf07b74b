//! API error types with HTTP response mapping.

use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use booking::BookingError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Reservation or catalog error.
    Booking(BookingError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut retryable = false;
        let (status, message, seats) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ApiError::Booking(err) => {
                let status = booking_status(&err);
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!(error = %err, "booking store failure");
                }
                retryable = err.is_retryable();
                (status, err.to_string(), err.seats().map(<[u32]>::to_vec))
            }
        };

        let body = match seats {
            Some(seats) => serde_json::json!({ "error": message, "seats": seats }),
            None => serde_json::json!({ "error": message }),
        };

        let mut response = (status, axum::Json(body)).into_response();
        if retryable {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}

fn booking_status(err: &BookingError) -> StatusCode {
    match err {
        BookingError::ShowtimeNotFound(_) | BookingError::ReservationNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        BookingError::Validation(_)
        | BookingError::InvalidSeat { .. }
        | BookingError::InsufficientCapacity { .. } => StatusCode::BAD_REQUEST,
        BookingError::SeatConflict { .. }
        | BookingError::TransientLockConflict { .. }
        | BookingError::AlreadyCancelled(_) => StatusCode::CONFLICT,
        BookingError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<BookingError> for ApiError {
    fn from(err: BookingError) -> Self {
        ApiError::Booking(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
