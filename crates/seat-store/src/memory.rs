use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{OwnedMutexGuard, RwLock};

use crate::{
    CapacityRecord, NewReservation, NewShowtime, Reservation, ReservationId, ReservationStatus,
    Result, SeatSet, Showtime, ShowtimeId, StoreError,
    store::{
        CapacityHold, CapacityStore, DEFAULT_LOCK_TIMEOUT, HoldProvider, ReservationLedger,
        ShowtimeCatalog,
    },
};

#[derive(Debug, Default)]
struct MemoryState {
    showtimes: BTreeMap<ShowtimeId, Showtime>,
    reservations: BTreeMap<ReservationId, Reservation>,
    by_showtime: HashMap<ShowtimeId, BTreeSet<ReservationId>>,
}

impl MemoryState {
    fn reservations_of(&self, showtime_id: ShowtimeId) -> impl Iterator<Item = &Reservation> {
        self.by_showtime
            .get(&showtime_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.reservations.get(id))
    }
}

#[derive(Debug)]
enum StagedWrite {
    Insert(Reservation),
    Cancel(ReservationId),
}

/// Hold on one showtime of an [`InMemorySeatStore`].
///
/// Owns the showtime's mutex guard and the writes staged under it.
#[derive(Debug)]
pub struct MemoryHold {
    record: CapacityRecord,
    staged: Vec<StagedWrite>,
    _guard: OwnedMutexGuard<()>,
}

impl CapacityHold for MemoryHold {
    fn record(&self) -> &CapacityRecord {
        &self.record
    }
}

/// In-memory seat store.
///
/// Committed state lives behind a single `RwLock`, so a commit publishes the
/// ledger writes and the counter update in one step. Exclusive access per
/// showtime is a lazily created async mutex.
#[derive(Clone)]
pub struct InMemorySeatStore {
    state: Arc<RwLock<MemoryState>>,
    locks: Arc<Mutex<HashMap<ShowtimeId, Arc<tokio::sync::Mutex<()>>>>>,
    next_showtime_id: Arc<AtomicI64>,
    next_reservation_id: Arc<AtomicI64>,
    lock_timeout: Duration,
}

impl Default for InMemorySeatStore {
    fn default() -> Self {
        Self {
            state: Arc::default(),
            locks: Arc::default(),
            next_showtime_id: Arc::default(),
            next_reservation_id: Arc::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl InMemorySeatStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how long `load` waits for a showtime hold.
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Returns the total number of committed reservations.
    pub async fn reservation_count(&self) -> usize {
        self.state.read().await.reservations.len()
    }

    fn showtime_lock(&self, showtime_id: ShowtimeId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(showtime_id).or_default().clone()
    }
}

impl HoldProvider for InMemorySeatStore {
    type Hold = MemoryHold;
}

#[async_trait]
impl CapacityStore for InMemorySeatStore {
    async fn load(&self, showtime_id: ShowtimeId) -> Result<MemoryHold> {
        // Unknown showtimes never get an entry in the lock table.
        if !self.state.read().await.showtimes.contains_key(&showtime_id) {
            return Err(StoreError::ShowtimeNotFound(showtime_id));
        }

        let lock = self.showtime_lock(showtime_id);
        let guard = tokio::time::timeout(self.lock_timeout, lock.lock_owned())
            .await
            .map_err(|_| StoreError::LockTimeout {
                showtime_id,
                waited: self.lock_timeout,
            })?;

        let state = self.state.read().await;
        let showtime = state
            .showtimes
            .get(&showtime_id)
            .ok_or(StoreError::ShowtimeNotFound(showtime_id))?;

        Ok(MemoryHold {
            record: CapacityRecord::from(showtime),
            staged: Vec::new(),
            _guard: guard,
        })
    }

    async fn commit(&self, hold: MemoryHold, new_available: u32) -> Result<CapacityRecord> {
        let showtime_id = hold.record.showtime_id;
        if new_available > hold.record.total_seats {
            return Err(StoreError::CapacityOutOfRange {
                showtime_id,
                available: new_available,
                total: hold.record.total_seats,
            });
        }

        let mut state = self.state.write().await;
        let MemoryState {
            showtimes,
            reservations,
            by_showtime,
        } = &mut *state;

        let showtime = showtimes
            .get_mut(&showtime_id)
            .ok_or(StoreError::ShowtimeNotFound(showtime_id))?;

        for write in hold.staged {
            match write {
                StagedWrite::Insert(reservation) => {
                    by_showtime
                        .entry(reservation.showtime_id)
                        .or_default()
                        .insert(reservation.id);
                    reservations.insert(reservation.id, reservation);
                }
                StagedWrite::Cancel(id) => {
                    if let Some(reservation) = reservations.get_mut(&id) {
                        reservation.status = ReservationStatus::Cancelled;
                    }
                }
            }
        }
        showtime.available_seats = new_available;

        Ok(CapacityRecord::from(&*showtime))
    }

    async fn abort(&self, hold: MemoryHold) -> Result<()> {
        drop(hold);
        Ok(())
    }
}

#[async_trait]
impl ReservationLedger for InMemorySeatStore {
    async fn held_seats(&self, hold: &mut MemoryHold) -> Result<SeatSet> {
        let showtime_id = hold.record.showtime_id;
        let state = self.state.read().await;

        let mut held: SeatSet = state
            .reservations_of(showtime_id)
            .filter(|r| r.is_confirmed())
            .flat_map(|r| r.seat_numbers.iter().copied())
            .collect();

        for write in &hold.staged {
            match write {
                StagedWrite::Insert(reservation) => {
                    held.extend(reservation.seat_numbers.iter().copied());
                }
                StagedWrite::Cancel(id) => {
                    if let Some(reservation) = state.reservations.get(id) {
                        for seat in &reservation.seat_numbers {
                            held.remove(seat);
                        }
                    }
                }
            }
        }

        Ok(held)
    }

    async fn insert(
        &self,
        hold: &mut MemoryHold,
        reservation: NewReservation,
    ) -> Result<Reservation> {
        if reservation.showtime_id != hold.record.showtime_id {
            return Err(StoreError::HoldMismatch {
                held: hold.record.showtime_id,
                requested: reservation.showtime_id,
            });
        }

        let id = ReservationId::new(self.next_reservation_id.fetch_add(1, Ordering::SeqCst) + 1);
        let reservation = reservation.confirm(id, Utc::now());
        hold.staged.push(StagedWrite::Insert(reservation.clone()));

        tracing::debug!(reservation_id = %id, showtime_id = %reservation.showtime_id, "reservation staged");
        Ok(reservation)
    }

    async fn mark_cancelled(
        &self,
        hold: &mut MemoryHold,
        id: ReservationId,
    ) -> Result<Reservation> {
        let state = self.state.read().await;
        let reservation = state
            .reservations
            .get(&id)
            .ok_or(StoreError::ReservationNotFound(id))?;

        if reservation.showtime_id != hold.record.showtime_id {
            return Err(StoreError::HoldMismatch {
                held: hold.record.showtime_id,
                requested: reservation.showtime_id,
            });
        }

        let already_staged = hold
            .staged
            .iter()
            .any(|w| matches!(w, StagedWrite::Cancel(staged) if *staged == id));
        if !reservation.is_confirmed() || already_staged {
            return Err(StoreError::AlreadyCancelled(id));
        }

        let mut cancelled = reservation.clone();
        cancelled.status = ReservationStatus::Cancelled;
        hold.staged.push(StagedWrite::Cancel(id));

        Ok(cancelled)
    }

    async fn find(&self, id: ReservationId) -> Result<Option<Reservation>> {
        let state = self.state.read().await;
        Ok(state.reservations.get(&id).cloned())
    }

    async fn list_by_showtime(&self, showtime_id: ShowtimeId) -> Result<Vec<Reservation>> {
        let state = self.state.read().await;
        Ok(state.reservations_of(showtime_id).cloned().collect())
    }

    async fn list_all(&self) -> Result<Vec<Reservation>> {
        let state = self.state.read().await;
        Ok(state.reservations.values().cloned().collect())
    }
}

#[async_trait]
impl ShowtimeCatalog for InMemorySeatStore {
    async fn register_showtime(&self, showtime: NewShowtime) -> Result<Showtime> {
        showtime.validate().map_err(StoreError::InvalidShowtime)?;

        let id = ShowtimeId::new(self.next_showtime_id.fetch_add(1, Ordering::SeqCst) + 1);
        let showtime = showtime.into_showtime(id);

        let mut state = self.state.write().await;
        state.showtimes.insert(id, showtime.clone());
        Ok(showtime)
    }

    async fn get_showtime(&self, id: ShowtimeId) -> Result<Option<Showtime>> {
        let state = self.state.read().await;
        Ok(state.showtimes.get(&id).cloned())
    }
}
