use std::time::Duration;

use thiserror::Error;

use crate::{ReservationId, ShowtimeId};

/// Errors that can occur when interacting with the seat store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The showtime does not exist in the catalog.
    #[error("Showtime not found: {0}")]
    ShowtimeNotFound(ShowtimeId),

    /// The reservation does not exist in the ledger.
    #[error("Reservation not found: {0}")]
    ReservationNotFound(ReservationId),

    /// The reservation was already cancelled.
    #[error("Reservation {0} is already cancelled")]
    AlreadyCancelled(ReservationId),

    /// A ledger write targeted a showtime other than the one the hold covers.
    #[error("Hold covers showtime {held}, but the write targets showtime {requested}")]
    HoldMismatch {
        held: ShowtimeId,
        requested: ShowtimeId,
    },

    /// The exclusive hold on a showtime could not be acquired in time.
    #[error("Timed out after {}ms waiting for the hold on showtime {showtime_id}", waited.as_millis())]
    LockTimeout {
        showtime_id: ShowtimeId,
        waited: Duration,
    },

    /// A commit tried to write an available-seat count outside `[0, total_seats]`.
    #[error("Available seats {available} out of range for showtime {showtime_id} (total {total})")]
    CapacityOutOfRange {
        showtime_id: ShowtimeId,
        available: u32,
        total: u32,
    },

    /// The showtime definition is invalid.
    #[error("Invalid showtime: {0}")]
    InvalidShowtime(String),

    /// A stored row could not be mapped back into a record.
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Returns true if the error only reflects contention on a showtime hold.
    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, StoreError::LockTimeout { .. })
    }
}

/// Result type for seat store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
