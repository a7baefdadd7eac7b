use crate::core::{AppError, Result};
use crate::modules::bookings::models::{Booking, BookingPaymentStatus, BookingStatus, CancelOutcome};
use crate::modules::trips::repositories::trip_repository::{TripRow, TRIP_COLUMNS};
use crate::modules::trips::Trip;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, MySql, MySqlPool, Transaction};
use std::str::FromStr;

/// Validates a seat request against the locked trip and its active bookings
/// and produces the booking to persist.
pub type BookingBuilder<'a> = &'a (dyn Fn(&Trip, &[Booking]) -> Result<Booking> + Send + Sync);

/// Booking persistence.
///
/// Every method that changes trip counters runs as one atomic unit holding the
/// trip's lock, so concurrent reservations on a trip behave as if serial.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Lock the trip, hand it and its active bookings to `build`, then persist
    /// the returned booking and decrement the trip counters.
    async fn reserve_seats(&self, trip_id: &str, build: BookingBuilder<'_>) -> Result<Booking>;

    /// Cancel a booking and release its seats. Cancelling twice is a no-op.
    async fn cancel(&self, booking_id: &str) -> Result<CancelOutcome>;

    /// Cancel a booking only if it is still overdue at `now` and has no
    /// pending or processing payment.
    async fn cancel_if_unpaid(&self, booking_id: &str, now: DateTime<Utc>)
        -> Result<Option<Booking>>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Booking>>;

    /// Pending or confirmed bookings of a trip
    async fn find_active_by_trip(&self, trip_id: &str) -> Result<Vec<Booking>>;

    async fn find_overdue(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<Booking>>;
}

pub(crate) const BOOKING_COLUMNS: &str = "id, booking_reference, trip_id, passenger_name, \
     passenger_phone, passenger_email, seats_booked, seat_numbers, status, payment_status, \
     total_fare, amount_paid, amount_due, payment_deadline, created_at, updated_at";

#[derive(Debug, FromRow)]
pub(crate) struct BookingRow {
    id: String,
    booking_reference: String,
    trip_id: String,
    passenger_name: String,
    passenger_phone: String,
    passenger_email: Option<String>,
    seats_booked: u32,
    seat_numbers: String,
    status: String,
    payment_status: String,
    total_fare: Decimal,
    amount_paid: Decimal,
    amount_due: Decimal,
    payment_deadline: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = AppError;

    fn try_from(row: BookingRow) -> Result<Self> {
        Ok(Booking {
            seat_numbers: serde_json::from_str(&row.seat_numbers).map_err(|e| {
                AppError::Internal(format!("Corrupt seat numbers on booking {}: {}", row.id, e))
            })?,
            status: BookingStatus::from_str(&row.status).map_err(AppError::Internal)?,
            payment_status: BookingPaymentStatus::from_str(&row.payment_status)
                .map_err(AppError::Internal)?,
            id: row.id,
            booking_reference: row.booking_reference,
            trip_id: row.trip_id,
            passenger_name: row.passenger_name,
            passenger_phone: row.passenger_phone,
            passenger_email: row.passenger_email,
            seats_booked: row.seats_booked,
            total_fare: row.total_fare,
            amount_paid: row.amount_paid,
            amount_due: row.amount_due,
            payment_deadline: row.payment_deadline,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Lock a booking row inside `tx`
pub(crate) async fn lock_booking(
    tx: &mut Transaction<'_, MySql>,
    booking_id: &str,
) -> Result<Option<Booking>> {
    let row = sqlx::query_as::<_, BookingRow>(&format!(
        "SELECT {} FROM bookings WHERE id = ? FOR UPDATE",
        BOOKING_COLUMNS
    ))
    .bind(booking_id)
    .fetch_optional(&mut **tx)
    .await?;

    row.map(Booking::try_from).transpose()
}

/// Persist the mutable payment-side fields of a booking inside `tx`
pub(crate) async fn update_booking_payment(
    tx: &mut Transaction<'_, MySql>,
    booking: &Booking,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE bookings
        SET status = ?, payment_status = ?, amount_paid = ?, amount_due = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(booking.status.to_string())
    .bind(booking.payment_status.to_string())
    .bind(booking.amount_paid)
    .bind(booking.amount_due)
    .bind(booking.updated_at)
    .bind(&booking.id)
    .execute(&mut **tx)
    .await
    .map_err(|e| AppError::Internal(format!("Failed to update booking payment: {}", e)))?;

    Ok(())
}

/// MySQL-backed booking repository using pessimistic row locks
pub struct MySqlBookingRepository {
    pool: MySqlPool,
}

impl MySqlBookingRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn lock_trip(tx: &mut Transaction<'_, MySql>, trip_id: &str) -> Result<Option<Trip>> {
        let row = sqlx::query_as::<_, TripRow>(&format!(
            "SELECT {} FROM trips WHERE id = ? FOR UPDATE",
            TRIP_COLUMNS
        ))
        .bind(trip_id)
        .fetch_optional(&mut **tx)
        .await?;

        row.map(Trip::try_from).transpose()
    }

    async fn save_trip_counters(tx: &mut Transaction<'_, MySql>, trip: &Trip) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE trips
            SET available_seats = ?, booked_seats = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(trip.available_seats)
        .bind(trip.booked_seats)
        .bind(trip.updated_at)
        .bind(&trip.id)
        .execute(&mut **tx)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to update trip counters: {}", e)))?;

        Ok(())
    }

    async fn mark_cancelled(tx: &mut Transaction<'_, MySql>, booking: &Booking) -> Result<()> {
        sqlx::query("UPDATE bookings SET status = ?, updated_at = ? WHERE id = ?")
            .bind(booking.status.to_string())
            .bind(booking.updated_at)
            .bind(&booking.id)
            .execute(&mut **tx)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to cancel booking: {}", e)))?;

        Ok(())
    }

    /// Trip first, then booking: the same lock order as `reserve_seats`.
    async fn lock_trip_and_booking(
        &self,
        tx: &mut Transaction<'_, MySql>,
        booking_id: &str,
    ) -> Result<(Trip, Booking)> {
        let trip_id: Option<String> =
            sqlx::query_scalar("SELECT trip_id FROM bookings WHERE id = ?")
                .bind(booking_id)
                .fetch_optional(&mut **tx)
                .await?;
        let trip_id =
            trip_id.ok_or_else(|| AppError::not_found(format!("Booking '{}'", booking_id)))?;

        let trip = Self::lock_trip(tx, &trip_id)
            .await?
            .ok_or_else(|| AppError::TripNotFound(trip_id.clone()))?;
        let booking = lock_booking(tx, booking_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Booking '{}'", booking_id)))?;

        Ok((trip, booking))
    }
}

#[async_trait]
impl BookingRepository for MySqlBookingRepository {
    async fn reserve_seats(&self, trip_id: &str, build: BookingBuilder<'_>) -> Result<Booking> {
        let mut tx = self.pool.begin().await?;

        let mut trip = Self::lock_trip(&mut tx, trip_id)
            .await?
            .ok_or_else(|| AppError::TripNotFound(trip_id.to_string()))?;

        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE trip_id = ? AND status IN ('pending', 'confirmed') FOR UPDATE",
            BOOKING_COLUMNS
        ))
        .bind(trip_id)
        .fetch_all(&mut *tx)
        .await?;
        let active = rows
            .into_iter()
            .map(Booking::try_from)
            .collect::<Result<Vec<_>>>()?;

        let booking = build(&trip, &active)?;
        trip.reserve(booking.seats_booked)?;
        Self::save_trip_counters(&mut tx, &trip).await?;

        let seat_numbers = serde_json::to_string(&booking.seat_numbers)?;
        sqlx::query(
            r#"
            INSERT INTO bookings (
                id, booking_reference, trip_id, passenger_name, passenger_phone,
                passenger_email, seats_booked, seat_numbers, status, payment_status,
                total_fare, amount_paid, amount_due, payment_deadline, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&booking.id)
        .bind(&booking.booking_reference)
        .bind(&booking.trip_id)
        .bind(&booking.passenger_name)
        .bind(&booking.passenger_phone)
        .bind(&booking.passenger_email)
        .bind(booking.seats_booked)
        .bind(seat_numbers)
        .bind(booking.status.to_string())
        .bind(booking.payment_status.to_string())
        .bind(booking.total_fare)
        .bind(booking.amount_paid)
        .bind(booking.amount_due)
        .bind(booking.payment_deadline)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to create booking: {}", e)))?;

        tx.commit().await?;
        Ok(booking)
    }

    async fn cancel(&self, booking_id: &str) -> Result<CancelOutcome> {
        let mut tx = self.pool.begin().await?;
        let (mut trip, mut booking) = self.lock_trip_and_booking(&mut tx, booking_id).await?;

        if !booking.cancel()? {
            return Ok(CancelOutcome::AlreadyCancelled(booking));
        }

        trip.release(booking.seats_booked);
        Self::save_trip_counters(&mut tx, &trip).await?;
        Self::mark_cancelled(&mut tx, &booking).await?;

        tx.commit().await?;
        Ok(CancelOutcome::Cancelled(booking))
    }

    async fn cancel_if_unpaid(
        &self,
        booking_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Booking>> {
        let mut tx = self.pool.begin().await?;
        let (mut trip, mut booking) = self.lock_trip_and_booking(&mut tx, booking_id).await?;

        if !booking.is_overdue(now) {
            return Ok(None);
        }

        let open_payments: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM payment_transactions WHERE booking_id = ? AND status IN ('pending', 'processing')",
        )
        .bind(booking_id)
        .fetch_one(&mut *tx)
        .await?;
        if open_payments > 0 {
            return Ok(None);
        }

        booking.cancel()?;
        trip.release(booking.seats_booked);
        Self::save_trip_counters(&mut tx, &trip).await?;
        Self::mark_cancelled(&mut tx, &booking).await?;

        tx.commit().await?;
        Ok(Some(booking))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE id = ?",
            BOOKING_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Booking::try_from).transpose()
    }

    async fn find_active_by_trip(&self, trip_id: &str) -> Result<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE trip_id = ? AND status IN ('pending', 'confirmed')",
            BOOKING_COLUMNS
        ))
        .bind(trip_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Booking::try_from).collect()
    }

    async fn find_overdue(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            r#"
            SELECT {} FROM bookings
            WHERE status = 'pending' AND payment_status = 'pending' AND payment_deadline < ?
            ORDER BY payment_deadline ASC
            LIMIT ?
            "#,
            BOOKING_COLUMNS
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Booking::try_from).collect()
    }
}
