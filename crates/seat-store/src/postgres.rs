use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::{
    CapacityRecord, Money, NewReservation, NewShowtime, Reservation, ReservationId,
    ReservationStatus, Result, SeatSet, Showtime, ShowtimeId, StoreError,
    store::{
        CapacityHold, CapacityStore, DEFAULT_LOCK_TIMEOUT, HoldProvider, ReservationLedger,
        ShowtimeCatalog,
    },
};

/// SQLSTATE raised when `lock_timeout` expires.
const LOCK_NOT_AVAILABLE: &str = "55P03";

const RESERVATION_COLUMNS: &str = "id, showtime_id, seat_numbers, customer_name, customer_email, \
     customer_phone, total_amount_cents, status, created_at";

/// Hold on one showtime row: an open transaction that owns its row lock.
///
/// Dropping it rolls the transaction back.
pub struct PgHold {
    tx: Transaction<'static, Postgres>,
    record: CapacityRecord,
}

impl CapacityHold for PgHold {
    fn record(&self) -> &CapacityRecord {
        &self.record
    }
}

/// PostgreSQL-backed seat store.
///
/// The exclusive section is a `SELECT ... FOR UPDATE` on the showtime row,
/// bounded by `SET LOCAL lock_timeout`.
#[derive(Clone)]
pub struct PostgresSeatStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresSeatStore {
    /// Creates a new PostgreSQL seat store.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Sets how long `load` waits for the showtime row lock.
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    /// Maps a row-lock timeout, or a pool that had no connection to give in
    /// time, to `LockTimeout`.
    fn map_lock_error(&self, err: sqlx::Error, showtime_id: ShowtimeId) -> StoreError {
        let timed_out = match &err {
            sqlx::Error::PoolTimedOut => true,
            sqlx::Error::Database(db_err) => {
                db_err.code().is_some_and(|code| code == LOCK_NOT_AVAILABLE)
            }
            _ => false,
        };
        if timed_out {
            return StoreError::LockTimeout {
                showtime_id,
                waited: self.lock_timeout,
            };
        }
        StoreError::Database(err)
    }

    fn row_to_showtime(row: PgRow) -> Result<Showtime> {
        Ok(Showtime {
            id: ShowtimeId::new(row.try_get("id")?),
            movie_title: row.try_get("movie_title")?,
            starts_at: row.try_get("starts_at")?,
            total_seats: to_u32(row.try_get("total_seats")?, "total_seats")?,
            available_seats: to_u32(row.try_get("available_seats")?, "available_seats")?,
            price: Money::from_cents(row.try_get("price_cents")?),
        })
    }

    fn row_to_reservation(row: PgRow) -> Result<Reservation> {
        let status: String = row.try_get("status")?;
        let seats: Vec<i32> = row.try_get("seat_numbers")?;

        Ok(Reservation {
            id: ReservationId::new(row.try_get("id")?),
            showtime_id: ShowtimeId::new(row.try_get("showtime_id")?),
            seat_numbers: to_seat_set(seats)?,
            customer_name: row.try_get("customer_name")?,
            customer_email: row.try_get("customer_email")?,
            customer_phone: row.try_get("customer_phone")?,
            total_amount: Money::from_cents(row.try_get("total_amount_cents")?),
            status: status.parse().map_err(StoreError::CorruptRecord)?,
            created_at: row.try_get("created_at")?,
        })
    }
}

fn to_u32(value: i32, column: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| StoreError::CorruptRecord(format!("{column} is negative: {value}")))
}

fn to_seat_set(seats: Vec<i32>) -> Result<SeatSet> {
    seats
        .into_iter()
        .map(|seat| to_u32(seat, "seat_numbers"))
        .collect()
}

fn to_db_seats(seats: &SeatSet) -> Result<Vec<i32>> {
    seats
        .iter()
        .map(|&seat| {
            i32::try_from(seat)
                .map_err(|_| StoreError::CorruptRecord(format!("seat {seat} exceeds INTEGER")))
        })
        .collect()
}

impl HoldProvider for PostgresSeatStore {
    type Hold = PgHold;
}

#[async_trait]
impl CapacityStore for PostgresSeatStore {
    async fn load(&self, showtime_id: ShowtimeId) -> Result<PgHold> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| self.map_lock_error(e, showtime_id))?;

        // SET does not take bind parameters.
        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(
            r#"
            SELECT id, total_seats, available_seats, price_cents
            FROM showtimes
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(showtime_id.as_i64())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| self.map_lock_error(e, showtime_id))?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Err(StoreError::ShowtimeNotFound(showtime_id));
        };

        let record = CapacityRecord {
            showtime_id,
            total_seats: to_u32(row.try_get("total_seats")?, "total_seats")?,
            available_seats: to_u32(row.try_get("available_seats")?, "available_seats")?,
            price: Money::from_cents(row.try_get("price_cents")?),
        };

        Ok(PgHold { tx, record })
    }

    async fn commit(&self, mut hold: PgHold, new_available: u32) -> Result<CapacityRecord> {
        let showtime_id = hold.record.showtime_id;
        if new_available > hold.record.total_seats {
            return Err(StoreError::CapacityOutOfRange {
                showtime_id,
                available: new_available,
                total: hold.record.total_seats,
            });
        }

        sqlx::query("UPDATE showtimes SET available_seats = $2 WHERE id = $1")
            .bind(showtime_id.as_i64())
            .bind(new_available as i32)
            .execute(&mut *hold.tx)
            .await?;

        hold.tx.commit().await?;

        Ok(CapacityRecord {
            available_seats: new_available,
            ..hold.record
        })
    }

    async fn abort(&self, hold: PgHold) -> Result<()> {
        hold.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl ReservationLedger for PostgresSeatStore {
    async fn held_seats(&self, hold: &mut PgHold) -> Result<SeatSet> {
        let rows: Vec<Vec<i32>> = sqlx::query_scalar(
            "SELECT seat_numbers FROM reservations WHERE showtime_id = $1 AND status = 'CONFIRMED'",
        )
        .bind(hold.record.showtime_id.as_i64())
        .fetch_all(&mut *hold.tx)
        .await?;

        let mut held = SeatSet::new();
        for seats in rows {
            held.extend(to_seat_set(seats)?);
        }
        Ok(held)
    }

    async fn insert(&self, hold: &mut PgHold, reservation: NewReservation) -> Result<Reservation> {
        if reservation.showtime_id != hold.record.showtime_id {
            return Err(StoreError::HoldMismatch {
                held: hold.record.showtime_id,
                requested: reservation.showtime_id,
            });
        }

        let row = sqlx::query(
            r#"
            INSERT INTO reservations
                (showtime_id, seat_numbers, customer_name, customer_email, customer_phone,
                 total_amount_cents, status)
            VALUES ($1, $2, $3, $4, $5, $6, 'CONFIRMED')
            RETURNING id, created_at
            "#,
        )
        .bind(reservation.showtime_id.as_i64())
        .bind(to_db_seats(&reservation.seat_numbers)?)
        .bind(&reservation.customer_name)
        .bind(&reservation.customer_email)
        .bind(&reservation.customer_phone)
        .bind(reservation.total_amount.cents())
        .fetch_one(&mut *hold.tx)
        .await?;

        let id = ReservationId::new(row.try_get("id")?);
        Ok(reservation.confirm(id, row.try_get("created_at")?))
    }

    async fn mark_cancelled(&self, hold: &mut PgHold, id: ReservationId) -> Result<Reservation> {
        let showtime_id = hold.record.showtime_id;

        let updated = sqlx::query(&format!(
            r#"
            UPDATE reservations SET status = 'CANCELLED'
            WHERE id = $1 AND showtime_id = $2 AND status = 'CONFIRMED'
            RETURNING {RESERVATION_COLUMNS}
            "#
        ))
        .bind(id.as_i64())
        .bind(showtime_id.as_i64())
        .fetch_optional(&mut *hold.tx)
        .await?;

        if let Some(row) = updated {
            return Self::row_to_reservation(row);
        }

        // Nothing updated: work out why.
        let existing = sqlx::query("SELECT showtime_id, status FROM reservations WHERE id = $1")
            .bind(id.as_i64())
            .fetch_optional(&mut *hold.tx)
            .await?;

        match existing {
            None => Err(StoreError::ReservationNotFound(id)),
            Some(row) => {
                let owner = ShowtimeId::new(row.try_get("showtime_id")?);
                if owner != showtime_id {
                    Err(StoreError::HoldMismatch {
                        held: showtime_id,
                        requested: owner,
                    })
                } else {
                    Err(StoreError::AlreadyCancelled(id))
                }
            }
        }
    }

    async fn find(&self, id: ReservationId) -> Result<Option<Reservation>> {
        let row = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1"
        ))
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_reservation).transpose()
    }

    async fn list_by_showtime(&self, showtime_id: ShowtimeId) -> Result<Vec<Reservation>> {
        let rows = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE showtime_id = $1 ORDER BY id ASC"
        ))
        .bind(showtime_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_reservation).collect()
    }

    async fn list_all(&self) -> Result<Vec<Reservation>> {
        let rows = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_reservation).collect()
    }
}

#[async_trait]
impl ShowtimeCatalog for PostgresSeatStore {
    async fn register_showtime(&self, showtime: NewShowtime) -> Result<Showtime> {
        showtime.validate().map_err(StoreError::InvalidShowtime)?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO showtimes (movie_title, starts_at, total_seats, available_seats, price_cents)
            VALUES ($1, $2, $3, $3, $4)
            RETURNING id
            "#,
        )
        .bind(&showtime.movie_title)
        .bind(showtime.starts_at)
        .bind(showtime.total_seats as i32)
        .bind(showtime.price.cents())
        .fetch_one(&self.pool)
        .await?;

        Ok(showtime.into_showtime(ShowtimeId::new(id)))
    }

    async fn get_showtime(&self, id: ShowtimeId) -> Result<Option<Showtime>> {
        let row = sqlx::query(
            r#"
            SELECT id, movie_title, starts_at, total_seats, available_seats, price_cents
            FROM showtimes
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_showtime).transpose()
    }
}
