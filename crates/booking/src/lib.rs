//! Seat reservation core.
//!
//! The [`ReservationCoordinator`] is the only writer of reservations and
//! capacity counters. A reservation runs as one unit of work under the
//! showtime's exclusive hold:
//! 1. acquire the hold and read the capacity record
//! 2. reject seats outside `[1, total_seats]`
//! 3. reject seats already held by confirmed reservations
//! 4. insert the reservation and commit the decremented counter together
//!
//! Any failure releases the hold without writing.

pub mod conflict;
pub mod coordinator;
pub mod error;
pub mod request;
pub mod retry;

pub use conflict::{conflicts, out_of_range};
pub use coordinator::{ReservationCoordinator, SeatMap};
pub use error::{BookingError, Result};
pub use request::{CustomerInfo, ReserveSeats};
pub use retry::RetryPolicy;
