//! Booking error types.

use common::{ReservationId, ShowtimeId};
use seat_store::StoreError;
use thiserror::Error;

/// Errors that can occur while reserving or cancelling seats.
///
/// Every variant leaves the capacity record and the ledger untouched.
#[derive(Debug, Error)]
pub enum BookingError {
    /// The showtime does not exist.
    #[error("Showtime not found: {0}")]
    ShowtimeNotFound(ShowtimeId),

    /// The reservation does not exist.
    #[error("Reservation not found: {0}")]
    ReservationNotFound(ReservationId),

    /// The request is malformed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Some requested seats do not exist for the showtime.
    #[error("Invalid seat numbers {seats:?} for showtime {showtime_id} (seats 1-{total_seats})")]
    InvalidSeat {
        showtime_id: ShowtimeId,
        seats: Vec<u32>,
        total_seats: u32,
    },

    /// Some requested seats are already held by a confirmed reservation.
    #[error("Seats {seats:?} are already reserved for showtime {showtime_id}")]
    SeatConflict {
        showtime_id: ShowtimeId,
        seats: Vec<u32>,
    },

    /// Fewer seats are available than requested.
    #[error("Insufficient capacity: requested {requested}, available {available}")]
    InsufficientCapacity { requested: u32, available: u32 },

    /// The showtime stayed busy through every retry.
    #[error("Showtime {showtime_id} is busy, gave up after {attempts} attempts")]
    TransientLockConflict {
        showtime_id: ShowtimeId,
        attempts: usize,
    },

    /// The reservation was already cancelled.
    #[error("Reservation {0} is already cancelled")]
    AlreadyCancelled(ReservationId),

    /// Storage failure.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl BookingError {
    /// Returns true if retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BookingError::TransientLockConflict { .. })
    }

    /// The seat numbers the error is about, if any.
    pub fn seats(&self) -> Option<&[u32]> {
        match self {
            BookingError::InvalidSeat { seats, .. } | BookingError::SeatConflict { seats, .. } => {
                Some(seats)
            }
            _ => None,
        }
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            BookingError::ShowtimeNotFound(_) => "showtime_not_found",
            BookingError::ReservationNotFound(_) => "reservation_not_found",
            BookingError::Validation(_) => "validation",
            BookingError::InvalidSeat { .. } => "invalid_seat",
            BookingError::SeatConflict { .. } => "seat_conflict",
            BookingError::InsufficientCapacity { .. } => "insufficient_capacity",
            BookingError::TransientLockConflict { .. } => "transient_lock_conflict",
            BookingError::AlreadyCancelled(_) => "already_cancelled",
            BookingError::Store(_) => "store",
        }
    }
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ShowtimeNotFound(id) => BookingError::ShowtimeNotFound(id),
            StoreError::ReservationNotFound(id) => BookingError::ReservationNotFound(id),
            StoreError::AlreadyCancelled(id) => BookingError::AlreadyCancelled(id),
            StoreError::InvalidShowtime(msg) => BookingError::Validation(msg),
            other => BookingError::Store(other),
        }
    }
}

/// Convenience type alias for booking results.
pub type Result<T> = std::result::Result<T, BookingError>;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn store_not_found_maps_to_booking_not_found() {
        let err = BookingError::from(StoreError::ShowtimeNotFound(ShowtimeId::new(3)));
        assert!(matches!(err, BookingError::ShowtimeNotFound(id) if id == ShowtimeId::new(3)));
    }

    #[test]
    fn lock_timeout_stays_a_store_error() {
        let err = BookingError::from(StoreError::LockTimeout {
            showtime_id: ShowtimeId::new(1),
            waited: Duration::from_millis(10),
        });
        assert!(matches!(err, BookingError::Store(ref e) if e.is_lock_timeout()));
        assert!(!err.is_retryable());
    }

    #[test]
    fn seat_errors_expose_offending_seats() {
        let err = BookingError::SeatConflict {
            showtime_id: ShowtimeId::new(1),
            seats: vec![1, 4],
        };
        assert_eq!(err.seats(), Some(&[1, 4][..]));
        assert_eq!(err.kind(), "seat_conflict");
        assert_eq!(
            err.to_string(),
            "Seats [1, 4] are already reserved for showtime 1"
        );
    }
}
