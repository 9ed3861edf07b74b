use std::time::Duration;

use async_trait::async_trait;

use crate::{
    CapacityRecord, NewReservation, NewShowtime, Reservation, ReservationId, Result, SeatSet,
    Showtime, ShowtimeId,
};

/// How long `load` waits for a showtime hold before giving up.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// An exclusive hold on one showtime's capacity record.
///
/// The hold is the unit of work of a reservation transaction: ledger writes
/// are staged on it and become visible only when it is committed through
/// [`CapacityStore::commit`]. Dropping a hold discards everything staged on it.
pub trait CapacityHold: Send {
    /// The capacity record as read when the hold was acquired.
    fn record(&self) -> &CapacityRecord;

    fn showtime_id(&self) -> ShowtimeId {
        self.record().showtime_id
    }
}

/// Names the hold type shared by the capacity store and the ledger of one backend.
pub trait HoldProvider: Send + Sync {
    type Hold: CapacityHold;
}

/// Per-showtime capacity counters with exclusive read-then-write access.
#[async_trait]
pub trait CapacityStore: HoldProvider {
    /// Acquires the exclusive hold on a showtime and reads its capacity record.
    ///
    /// Blocks other holders of the same showtime; fails with `LockTimeout`
    /// if the hold cannot be acquired within the store's lock timeout.
    async fn load(&self, showtime_id: ShowtimeId) -> Result<Self::Hold>;

    /// Writes the new available-seat count together with every ledger write
    /// staged on the hold, then releases it.
    async fn commit(&self, hold: Self::Hold, new_available: u32) -> Result<CapacityRecord>;

    /// Releases the hold without writing anything.
    async fn abort(&self, hold: Self::Hold) -> Result<()>;
}

/// Store of confirmed and cancelled reservations.
#[async_trait]
pub trait ReservationLedger: HoldProvider {
    /// Union of the seats held by CONFIRMED reservations of the hold's showtime.
    ///
    /// Writes already staged on the hold are taken into account.
    async fn held_seats(&self, hold: &mut Self::Hold) -> Result<SeatSet>;

    /// Stages a new CONFIRMED reservation on the hold.
    async fn insert(&self, hold: &mut Self::Hold, reservation: NewReservation)
    -> Result<Reservation>;

    /// Stages the CONFIRMED → CANCELLED transition of a reservation on the hold.
    ///
    /// Returns the reservation as it will read once committed.
    async fn mark_cancelled(&self, hold: &mut Self::Hold, id: ReservationId)
    -> Result<Reservation>;

    /// Finds a committed reservation by id.
    async fn find(&self, id: ReservationId) -> Result<Option<Reservation>>;

    /// Lists the committed reservations of a showtime, ordered by id.
    async fn list_by_showtime(&self, showtime_id: ShowtimeId) -> Result<Vec<Reservation>>;

    /// Lists every committed reservation, ordered by id.
    async fn list_all(&self) -> Result<Vec<Reservation>>;
}

/// The showtime catalog: source of seat-capacity and pricing truth.
#[async_trait]
pub trait ShowtimeCatalog: Send + Sync {
    async fn register_showtime(&self, showtime: NewShowtime) -> Result<Showtime>;

    async fn get_showtime(&self, id: ShowtimeId) -> Result<Option<Showtime>>;
}

/// A complete backend: catalog, capacity store and ledger sharing one hold type.
pub trait SeatStore:
    ShowtimeCatalog + CapacityStore + ReservationLedger + Clone + 'static
{
}

impl<T> SeatStore for T where
    T: ShowtimeCatalog + CapacityStore + ReservationLedger + Clone + 'static
{
}
