use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Money, ReservationId, ShowtimeId};

/// An ordered set of seat numbers.
///
/// Ordered so that offending-seat lists and stored arrays are deterministic.
pub type SeatSet = BTreeSet<u32>;

/// A scheduled screening with a fixed number of seats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Showtime {
    pub id: ShowtimeId,
    pub movie_title: String,
    pub starts_at: DateTime<Utc>,
    pub total_seats: u32,
    pub available_seats: u32,
    pub price: Money,
}

/// Input for registering a showtime in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewShowtime {
    pub movie_title: String,
    pub starts_at: DateTime<Utc>,
    pub total_seats: u32,
    pub price: Money,
}

impl NewShowtime {
    pub fn new(
        movie_title: impl Into<String>,
        starts_at: DateTime<Utc>,
        total_seats: u32,
        price: Money,
    ) -> Self {
        Self {
            movie_title: movie_title.into(),
            starts_at,
            total_seats,
            price,
        }
    }

    /// Checks the invariants a showtime must satisfy before it is stored.
    pub fn validate(&self) -> Result<(), String> {
        if self.movie_title.trim().is_empty() {
            return Err("movie title is required".to_string());
        }
        if self.total_seats == 0 {
            return Err("total seats must be greater than 0".to_string());
        }
        if i32::try_from(self.total_seats).is_err() {
            return Err(format!("total seats {} is too large", self.total_seats));
        }
        if self.price.is_negative() {
            return Err(format!("price {} must not be negative", self.price));
        }
        if self.price.multiply(self.total_seats as usize).is_none() {
            return Err(format!(
                "price {} for {} seats overflows the amount range",
                self.price, self.total_seats
            ));
        }
        Ok(())
    }

    /// Builds the stored showtime; every seat starts out available.
    pub fn into_showtime(self, id: ShowtimeId) -> Showtime {
        Showtime {
            id,
            movie_title: self.movie_title,
            starts_at: self.starts_at,
            total_seats: self.total_seats,
            available_seats: self.total_seats,
            price: self.price,
        }
    }
}

/// Capacity view of a showtime as seen under an exclusive hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityRecord {
    pub showtime_id: ShowtimeId,
    pub total_seats: u32,
    pub available_seats: u32,
    pub price: Money,
}

impl From<&Showtime> for CapacityRecord {
    fn from(showtime: &Showtime) -> Self {
        Self {
            showtime_id: showtime.id,
            total_seats: showtime.total_seats,
            available_seats: showtime.available_seats,
            price: showtime.price,
        }
    }
}

/// Lifecycle state of a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Confirmed,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Confirmed => "CONFIRMED",
            ReservationStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONFIRMED" => Ok(ReservationStatus::Confirmed),
            "CANCELLED" => Ok(ReservationStatus::Cancelled),
            other => Err(format!("unknown reservation status '{other}'")),
        }
    }
}

/// A reservation about to be inserted; the ledger assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReservation {
    pub showtime_id: ShowtimeId,
    pub seat_numbers: SeatSet,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub total_amount: Money,
}

impl NewReservation {
    /// Builds the persisted record in CONFIRMED state.
    pub fn confirm(self, id: ReservationId, created_at: DateTime<Utc>) -> Reservation {
        Reservation {
            id,
            showtime_id: self.showtime_id,
            seat_numbers: self.seat_numbers,
            customer_name: self.customer_name,
            customer_email: self.customer_email,
            customer_phone: self.customer_phone,
            total_amount: self.total_amount,
            status: ReservationStatus::Confirmed,
            created_at,
        }
    }
}

/// A claim on a set of seats for one showtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub showtime_id: ShowtimeId,
    pub seat_numbers: SeatSet,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub total_amount: Money,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    pub fn is_confirmed(&self) -> bool {
        self.status == ReservationStatus::Confirmed
    }

    /// Number of seats held (or formerly held) by this reservation.
    pub fn seat_count(&self) -> u32 {
        self.seat_numbers.len() as u32
    }
}
