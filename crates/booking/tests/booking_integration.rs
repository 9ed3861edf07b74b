//! Integration tests for the reservation coordinator on the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use booking::{BookingError, CustomerInfo, ReservationCoordinator, ReserveSeats, RetryPolicy};
use chrono::Utc;
use common::{Money, ReservationId, ShowtimeId};
use futures_util::future::join_all;
use seat_store::{
    CapacityHold, CapacityStore, InMemorySeatStore, NewShowtime, ReservationLedger,
    ReservationStatus, SeatSet, ShowtimeCatalog,
};

type Coordinator = ReservationCoordinator<InMemorySeatStore>;

struct TestHarness {
    coordinator: Coordinator,
    store: InMemorySeatStore,
}

impl TestHarness {
    fn new() -> Self {
        let store = InMemorySeatStore::new();
        let coordinator = ReservationCoordinator::new(store.clone());
        Self { coordinator, store }
    }

    fn with_lock_timeout(lock_timeout: Duration, retry: RetryPolicy) -> Self {
        let store = InMemorySeatStore::new().with_lock_timeout(lock_timeout);
        let coordinator = ReservationCoordinator::new(store.clone()).with_retry_policy(retry);
        Self { coordinator, store }
    }

    async fn showtime(&self, total_seats: u32, price_cents: i64) -> ShowtimeId {
        self.store
            .register_showtime(NewShowtime::new(
                "Sunrise",
                Utc::now(),
                total_seats,
                Money::from_cents(price_cents),
            ))
            .await
            .unwrap()
            .id
    }

    async fn reserve(
        &self,
        showtime_id: ShowtimeId,
        seats: &[u32],
    ) -> Result<seat_store::Reservation, BookingError> {
        self.coordinator.reserve(request(showtime_id, seats)).await
    }

    async fn available(&self, showtime_id: ShowtimeId) -> u32 {
        self.store
            .get_showtime(showtime_id)
            .await
            .unwrap()
            .unwrap()
            .available_seats
    }

    /// Checks the capacity and disjointness invariants of a showtime.
    async fn assert_invariants(&self, showtime_id: ShowtimeId) {
        let showtime = self.store.get_showtime(showtime_id).await.unwrap().unwrap();
        let confirmed: Vec<_> = self
            .store
            .list_by_showtime(showtime_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.is_confirmed())
            .collect();

        let mut held = SeatSet::new();
        let mut seat_total = 0;
        for reservation in &confirmed {
            seat_total += reservation.seat_numbers.len();
            held.extend(reservation.seat_numbers.iter().copied());
        }

        assert_eq!(held.len(), seat_total, "confirmed seat sets overlap");
        assert_eq!(
            showtime.available_seats as usize,
            showtime.total_seats as usize - held.len(),
            "capacity counter drifted"
        );
    }
}

fn customer() -> CustomerInfo {
    CustomerInfo::new("Buster Keaton", "buster@example.com", "555-0123").unwrap()
}

fn request(showtime_id: ShowtimeId, seats: &[u32]) -> ReserveSeats {
    ReserveSeats::new(showtime_id, seats.iter().copied(), customer()).unwrap()
}

#[tokio::test]
async fn test_reserve_all_seats_then_conflict() {
    let h = TestHarness::new();
    let showtime = h.showtime(2, 10).await;

    let a = h.reserve(showtime, &[1, 2]).await.unwrap();
    assert_eq!(a.total_amount, Money::from_cents(20));
    assert_eq!(a.status, ReservationStatus::Confirmed);
    assert_eq!(h.available(showtime).await, 0);

    let b = h.reserve(showtime, &[1]).await;
    match b {
        Err(BookingError::SeatConflict { seats, .. }) => assert_eq!(seats, vec![1]),
        other => panic!("expected SeatConflict, got {other:?}"),
    }
    assert_eq!(h.available(showtime).await, 0);
    h.assert_invariants(showtime).await;
}

#[tokio::test]
async fn test_out_of_range_seat_is_rejected() {
    let h = TestHarness::new();
    let showtime = h.showtime(2, 10).await;

    let result = h.reserve(showtime, &[1, 2, 3]).await;
    match result {
        Err(BookingError::InvalidSeat { seats, total_seats, .. }) => {
            assert_eq!(seats, vec![3]);
            assert_eq!(total_seats, 2);
        }
        other => panic!("expected InvalidSeat, got {other:?}"),
    }

    assert!(h.coordinator.list_all().await.unwrap().is_empty());
    assert_eq!(h.available(showtime).await, 2);
}

#[tokio::test]
async fn test_seat_zero_and_past_the_end_never_mutate() {
    let h = TestHarness::new();
    let showtime = h.showtime(5, 10).await;

    for seat in [0, 6] {
        let result = h.reserve(showtime, &[seat]).await;
        assert!(
            matches!(result, Err(BookingError::InvalidSeat { ref seats, .. }) if seats == &vec![seat])
        );
    }

    assert_eq!(h.available(showtime).await, 5);
    assert_eq!(h.store.reservation_count().await, 0);
}

#[tokio::test]
async fn test_conflict_lists_only_taken_seats() {
    let h = TestHarness::new();
    let showtime = h.showtime(10, 10).await;

    h.reserve(showtime, &[2, 4]).await.unwrap();
    let result = h.reserve(showtime, &[1, 2, 3, 4]).await;

    assert!(
        matches!(result, Err(BookingError::SeatConflict { ref seats, .. }) if seats == &vec![2, 4])
    );
    assert_eq!(h.available(showtime).await, 8);
    h.assert_invariants(showtime).await;
}

#[tokio::test]
async fn test_unknown_showtime() {
    let h = TestHarness::new();

    let result = h.reserve(ShowtimeId::new(404), &[1]).await;
    assert!(matches!(result, Err(BookingError::ShowtimeNotFound(_))));
}

#[tokio::test]
async fn test_cancel_restores_capacity() {
    let h = TestHarness::new();
    let showtime = h.showtime(1, 10).await;

    let first = h.reserve(showtime, &[1]).await.unwrap();
    assert_eq!(h.available(showtime).await, 0);

    let cancelled = h.coordinator.cancel(first.id).await.unwrap();
    assert_eq!(cancelled.status, ReservationStatus::Cancelled);
    assert_eq!(h.available(showtime).await, 1);

    let second = h.reserve(showtime, &[1]).await.unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!(h.available(showtime).await, 0);
    h.assert_invariants(showtime).await;

    let stored = h.coordinator.get(first.id).await.unwrap();
    assert_eq!(stored.status, ReservationStatus::Cancelled);
}

#[tokio::test]
async fn test_cancel_unknown_and_twice() {
    let h = TestHarness::new();
    let showtime = h.showtime(3, 10).await;

    let result = h.coordinator.cancel(ReservationId::new(999)).await;
    assert!(matches!(result, Err(BookingError::ReservationNotFound(_))));

    let reservation = h.reserve(showtime, &[1, 2]).await.unwrap();
    h.coordinator.cancel(reservation.id).await.unwrap();

    let again = h.coordinator.cancel(reservation.id).await;
    assert!(matches!(again, Err(BookingError::AlreadyCancelled(_))));
    assert_eq!(h.available(showtime).await, 3);
}

#[tokio::test]
async fn test_concurrent_requests_for_last_seat() {
    let h = TestHarness::new();
    let showtime = h.showtime(1, 10).await;
    let coordinator = Arc::new(h.coordinator.clone());

    let attempts = 32;
    let handles = (0..attempts).map(|_| {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.reserve(request(showtime, &[1])).await })
    });
    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let confirmed = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(BookingError::SeatConflict { .. })))
        .count();

    assert_eq!(confirmed, 1);
    assert_eq!(conflicts, attempts - 1);
    assert_eq!(h.available(showtime).await, 0);
    h.assert_invariants(showtime).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_mixed_workload_keeps_invariants() {
    let h = TestHarness::new();
    let showtime = h.showtime(20, 500).await;
    let coordinator = Arc::new(h.coordinator.clone());

    // Overlapping seat pairs so that many requests collide.
    let handles = (0..60u32).map(|i| {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            let first = i % 20 + 1;
            let second = (i * 7) % 20 + 1;
            let reservation = coordinator.reserve(request(showtime, &[first, second])).await;
            if let Ok(reservation) = reservation
                && i % 3 == 0
            {
                coordinator.cancel(reservation.id).await.unwrap();
            }
        })
    });
    for joined in join_all(handles).await {
        joined.unwrap();
    }

    h.assert_invariants(showtime).await;
}

#[tokio::test]
async fn test_list_by_showtime_is_idempotent() {
    let h = TestHarness::new();
    let showtime = h.showtime(4, 10).await;
    let other = h.showtime(4, 10).await;

    h.reserve(showtime, &[1]).await.unwrap();
    h.reserve(showtime, &[2, 3]).await.unwrap();
    h.reserve(other, &[1]).await.unwrap();

    let first = h.coordinator.list_by_showtime(showtime).await.unwrap();
    let second = h.coordinator.list_by_showtime(showtime).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
    assert_eq!(h.coordinator.list_all().await.unwrap().len(), 3);

    let missing = h.coordinator.list_by_showtime(ShowtimeId::new(404)).await;
    assert!(matches!(missing, Err(BookingError::ShowtimeNotFound(_))));
}

#[tokio::test]
async fn test_busy_showtime_surfaces_transient_conflict() {
    let h = TestHarness::with_lock_timeout(
        Duration::from_millis(20),
        RetryPolicy::new(2, Duration::from_millis(1)),
    );
    let showtime = h.showtime(3, 10).await;

    let hold = h.store.load(showtime).await.unwrap();
    let result = h.reserve(showtime, &[1]).await;
    match result {
        Err(err @ BookingError::TransientLockConflict { .. }) => {
            assert!(err.is_retryable());
            assert!(matches!(err, BookingError::TransientLockConflict { attempts: 3, .. }));
        }
        other => panic!("expected TransientLockConflict, got {other:?}"),
    }
    drop(hold);

    h.reserve(showtime, &[1]).await.unwrap();
    assert_eq!(h.available(showtime).await, 2);
}

#[tokio::test]
async fn test_other_showtimes_are_not_blocked() {
    let h = TestHarness::with_lock_timeout(Duration::from_millis(20), RetryPolicy::no_retry());
    let busy = h.showtime(3, 10).await;
    let free = h.showtime(3, 10).await;

    let _hold = h.store.load(busy).await.unwrap();
    let reservation = h.reserve(free, &[2]).await.unwrap();
    assert_eq!(reservation.showtime_id, free);
}

#[tokio::test]
async fn test_drifted_counter_reports_insufficient_capacity() {
    let h = TestHarness::new();
    let showtime = h.showtime(3, 10).await;

    // Force the counter to zero without holding any seats.
    let hold = h.store.load(showtime).await.unwrap();
    assert_eq!(hold.record().available_seats, 3);
    h.store.commit(hold, 0).await.unwrap();

    let result = h.reserve(showtime, &[1]).await;
    assert!(matches!(
        result,
        Err(BookingError::InsufficientCapacity {
            requested: 1,
            available: 0
        })
    ));
    assert_eq!(h.store.reservation_count().await, 0);
}

#[tokio::test]
async fn test_abandoned_reserve_leaves_no_trace() {
    let h = TestHarness::with_lock_timeout(Duration::from_secs(5), RetryPolicy::no_retry());
    let showtime = h.showtime(2, 10).await;

    // The request waits on the hold; dropping it mid-flight must not leak state.
    let hold = h.store.load(showtime).await.unwrap();
    let pending = h.coordinator.reserve(request(showtime, &[1]));
    let timed_out = tokio::time::timeout(Duration::from_millis(20), pending).await;
    assert!(timed_out.is_err());
    drop(hold);

    assert_eq!(h.store.reservation_count().await, 0);
    assert_eq!(h.available(showtime).await, 2);
    h.reserve(showtime, &[1]).await.unwrap();
}

#[tokio::test]
async fn test_seat_map_tracks_confirmed_seats() {
    let h = TestHarness::new();
    let showtime = h.showtime(5, 10).await;

    let kept = h.reserve(showtime, &[1, 2]).await.unwrap();
    let dropped = h.reserve(showtime, &[4]).await.unwrap();
    h.coordinator.cancel(dropped.id).await.unwrap();

    let map = h.coordinator.seat_map(showtime).await.unwrap();
    assert_eq!(map.held_seats, kept.seat_numbers);
    assert_eq!(map.showtime.available_seats, 3);
}

#[tokio::test]
async fn test_invalid_showtime_is_a_validation_error() {
    let h = TestHarness::new();

    let result = h
        .coordinator
        .register_showtime(NewShowtime::new("Empty hall", Utc::now(), 0, Money::zero()))
        .await;
    assert!(matches!(result, Err(BookingError::Validation(_))));
}

#[tokio::test]
async fn test_price_overflowing_the_full_house_is_rejected() {
    let h = TestHarness::new();

    let result = h
        .coordinator
        .register_showtime(NewShowtime::new(
            "Greed",
            Utc::now(),
            2,
            Money::from_cents(i64::MAX / 2 + 1),
        ))
        .await;
    assert!(matches!(result, Err(BookingError::Validation(_))));

    // The largest price that still fits books every seat without overflow.
    let showtime = h.showtime(2, i64::MAX / 2).await;
    let reservation = h.reserve(showtime, &[1, 2]).await.unwrap();
    assert_eq!(reservation.total_amount, Money::from_cents(i64::MAX / 2 * 2));
}
