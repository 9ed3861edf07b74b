pub mod error;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;

pub use common::{Money, ReservationId, ShowtimeId};
pub use error::{Result, StoreError};
pub use memory::{InMemorySeatStore, MemoryHold};
pub use postgres::{PgHold, PostgresSeatStore};
pub use record::{
    CapacityRecord, NewReservation, NewShowtime, Reservation, ReservationStatus, SeatSet, Showtime,
};
pub use store::{
    CapacityHold, CapacityStore, DEFAULT_LOCK_TIMEOUT, HoldProvider, ReservationLedger, SeatStore,
    ShowtimeCatalog,
};
