//! Reservation coordinator: the transactional core of seat booking.

use std::time::Instant;

use common::{ReservationId, ShowtimeId};
use seat_store::{CapacityHold, NewShowtime, Reservation, SeatSet, SeatStore, Showtime};

use crate::conflict::{conflicts, out_of_range};
use crate::error::{BookingError, Result};
use crate::request::ReserveSeats;
use crate::retry::RetryPolicy;

/// A read-only view of which seats of a showtime are taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatMap {
    pub showtime: Showtime,
    pub held_seats: SeatSet,
}

/// Orchestrates reservations and cancellations against a [`SeatStore`].
///
/// Every write runs under the showtime's exclusive hold, which is the unit
/// of work: it is acquired at the start of the operation, threaded through
/// each step and either committed or aborted at the end. Holds on different
/// showtimes never wait for each other, and no operation takes more than one.
#[derive(Clone)]
pub struct ReservationCoordinator<S: SeatStore> {
    store: S,
    retry: RetryPolicy,
}

impl<S: SeatStore> ReservationCoordinator<S> {
    /// Creates a coordinator with the default retry policy.
    pub fn new(store: S) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
        }
    }

    /// Replaces the policy used when a showtime hold times out.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Reserves the requested seats.
    ///
    /// Fails without side effects on an unknown showtime, out-of-range seats,
    /// seats already held, or insufficient capacity. Lock timeouts are
    /// retried per the retry policy, then surface as `TransientLockConflict`.
    #[tracing::instrument(
        skip(self, request),
        fields(showtime_id = %request.showtime_id, seats = request.seat_numbers.len())
    )]
    pub async fn reserve(&self, request: ReserveSeats) -> Result<Reservation> {
        metrics::counter!("reservations_attempted_total").increment(1);
        let started = Instant::now();

        let mut attempt = 0;
        let result = loop {
            match self.try_reserve(&request).await {
                Err(BookingError::Store(err)) if err.is_lock_timeout() => {
                    if let Err(exhausted) = self.backoff(request.showtime_id, &mut attempt).await {
                        break Err(exhausted);
                    }
                }
                result => break result,
            }
        };

        metrics::histogram!("reservation_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        match &result {
            Ok(reservation) => {
                metrics::counter!("reservations_confirmed_total").increment(1);
                tracing::info!(
                    reservation_id = %reservation.id,
                    total_amount = %reservation.total_amount,
                    "reservation confirmed"
                );
            }
            Err(err) => {
                metrics::counter!("reservations_rejected_total", "reason" => err.kind())
                    .increment(1);
                tracing::info!(reason = err.kind(), error = %err, "reservation rejected");
            }
        }

        result
    }

    /// Cancels a confirmed reservation and gives its seats back to the showtime.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, reservation_id: ReservationId) -> Result<Reservation> {
        let existing = self
            .store
            .find(reservation_id)
            .await?
            .ok_or(BookingError::ReservationNotFound(reservation_id))?;

        if !existing.is_confirmed() {
            return Err(BookingError::AlreadyCancelled(reservation_id));
        }

        let mut attempt = 0;
        let result = loop {
            match self.try_cancel(existing.showtime_id, reservation_id).await {
                Err(BookingError::Store(err)) if err.is_lock_timeout() => {
                    if let Err(exhausted) = self.backoff(existing.showtime_id, &mut attempt).await
                    {
                        break Err(exhausted);
                    }
                }
                result => break result,
            }
        };

        if let Ok(cancelled) = &result {
            metrics::counter!("reservations_cancelled_total").increment(1);
            tracing::info!(
                showtime_id = %cancelled.showtime_id,
                seats = cancelled.seat_numbers.len(),
                "reservation cancelled"
            );
        }

        result
    }

    /// Loads a reservation by id.
    pub async fn get(&self, reservation_id: ReservationId) -> Result<Reservation> {
        self.store
            .find(reservation_id)
            .await?
            .ok_or(BookingError::ReservationNotFound(reservation_id))
    }

    /// Lists the reservations of a showtime, in creation order.
    pub async fn list_by_showtime(&self, showtime_id: ShowtimeId) -> Result<Vec<Reservation>> {
        self.get_showtime(showtime_id).await?;
        Ok(self.store.list_by_showtime(showtime_id).await?)
    }

    /// Lists every reservation, in creation order.
    pub async fn list_all(&self) -> Result<Vec<Reservation>> {
        Ok(self.store.list_all().await?)
    }

    #[tracing::instrument(skip(self, showtime), fields(movie_title = %showtime.movie_title))]
    pub async fn register_showtime(&self, showtime: NewShowtime) -> Result<Showtime> {
        let showtime = self.store.register_showtime(showtime).await?;
        tracing::info!(
            showtime_id = %showtime.id,
            total_seats = showtime.total_seats,
            "showtime registered"
        );
        Ok(showtime)
    }

    pub async fn get_showtime(&self, showtime_id: ShowtimeId) -> Result<Showtime> {
        self.store
            .get_showtime(showtime_id)
            .await?
            .ok_or(BookingError::ShowtimeNotFound(showtime_id))
    }

    /// Seats held by confirmed reservations, read without taking the hold.
    ///
    /// The counter and the seat list come from separate reads, so under
    /// concurrent writes they may briefly disagree.
    pub async fn seat_map(&self, showtime_id: ShowtimeId) -> Result<SeatMap> {
        let showtime = self.get_showtime(showtime_id).await?;
        let held_seats = self
            .store
            .list_by_showtime(showtime_id)
            .await?
            .into_iter()
            .filter(Reservation::is_confirmed)
            .flat_map(|reservation| reservation.seat_numbers)
            .collect();

        Ok(SeatMap {
            showtime,
            held_seats,
        })
    }

    async fn try_reserve(&self, request: &ReserveSeats) -> Result<Reservation> {
        let mut hold = self.store.load(request.showtime_id).await?;

        let reservation = match self.stage_reservation(&mut hold, request).await {
            Ok(reservation) => reservation,
            Err(err) => {
                self.release(hold).await;
                return Err(err);
            }
        };

        let new_available = hold.record().available_seats - reservation.seat_count();
        self.store.commit(hold, new_available).await?;

        Ok(reservation)
    }

    /// Runs the checks and stages the insert; nothing is visible until commit.
    async fn stage_reservation(
        &self,
        hold: &mut S::Hold,
        request: &ReserveSeats,
    ) -> Result<Reservation> {
        let record = *hold.record();

        let invalid = out_of_range(&request.seat_numbers, record.total_seats);
        if !invalid.is_empty() {
            return Err(BookingError::InvalidSeat {
                showtime_id: record.showtime_id,
                seats: invalid.into_iter().collect(),
                total_seats: record.total_seats,
            });
        }

        let held = self.store.held_seats(hold).await?;
        let taken = conflicts(&request.seat_numbers, &held);
        if !taken.is_empty() {
            return Err(BookingError::SeatConflict {
                showtime_id: record.showtime_id,
                seats: taken.into_iter().collect(),
            });
        }

        // Implied by the conflict check unless the counter has drifted.
        let requested = request.seat_count();
        if record.available_seats < requested {
            tracing::warn!(
                showtime_id = %record.showtime_id,
                available = record.available_seats,
                held = held.len(),
                "capacity counter disagrees with held seats"
            );
            return Err(BookingError::InsufficientCapacity {
                requested,
                available: record.available_seats,
            });
        }

        let total_amount = record
            .price
            .multiply(request.seat_numbers.len())
            .ok_or_else(|| {
                BookingError::Validation(format!(
                    "total for {} seats at {} exceeds the supported amount",
                    requested, record.price
                ))
            })?;
        let reservation = self
            .store
            .insert(hold, request.to_new_reservation(total_amount))
            .await?;

        Ok(reservation)
    }

    async fn try_cancel(
        &self,
        showtime_id: ShowtimeId,
        reservation_id: ReservationId,
    ) -> Result<Reservation> {
        let mut hold = self.store.load(showtime_id).await?;

        let cancelled = match self.store.mark_cancelled(&mut hold, reservation_id).await {
            Ok(cancelled) => cancelled,
            Err(err) => {
                self.release(hold).await;
                return Err(err.into());
            }
        };

        let record = *hold.record();
        let new_available = record
            .available_seats
            .saturating_add(cancelled.seat_count())
            .min(record.total_seats);
        self.store.commit(hold, new_available).await?;

        Ok(cancelled)
    }

    async fn release(&self, hold: S::Hold) {
        let showtime_id = hold.showtime_id();
        if let Err(err) = self.store.abort(hold).await {
            tracing::warn!(%showtime_id, error = %err, "failed to release showtime hold");
        }
    }

    /// Sleeps before the next attempt, or reports that retries are exhausted.
    async fn backoff(&self, showtime_id: ShowtimeId, attempt: &mut usize) -> Result<()> {
        if *attempt >= self.retry.max_retries {
            return Err(BookingError::TransientLockConflict {
                showtime_id,
                attempts: *attempt + 1,
            });
        }

        let delay = self.retry.delay_for_attempt(*attempt);
        *attempt += 1;
        metrics::counter!("reservation_lock_retries_total").increment(1);
        tracing::debug!(%showtime_id, attempt = *attempt, ?delay, "showtime busy, retrying");
        tokio::time::sleep(delay).await;
        Ok(())
    }
}
