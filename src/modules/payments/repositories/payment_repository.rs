use crate::core::{AppError, Result};
use crate::modules::bookings::models::Booking;
use crate::modules::bookings::repositories::booking_repository::{lock_booking, update_booking_payment};
use crate::modules::payments::models::{PaymentOutcome, PaymentStatus, PaymentTransaction};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, MySql, MySqlPool, Transaction};
use std::str::FromStr;

/// Validates a payment request against the locked booking and its existing
/// payments and produces the pending transaction to persist.
pub type PaymentBuilder<'a> =
    &'a (dyn Fn(&Booking, &[PaymentTransaction]) -> Result<PaymentTransaction> + Send + Sync);

/// Payment transaction persistence.
///
/// Status changes are compare-and-set: they only apply when the stored status
/// is one of the legal sources for the target status, and return `None` to
/// the caller that lost the race.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Lock the booking, hand it and its payments to `build`, and insert the
    /// returned transaction in the same atomic unit.
    async fn insert_if_payable(
        &self,
        booking_id: &str,
        build: PaymentBuilder<'_>,
    ) -> Result<PaymentTransaction>;

    /// `pending → processing`, storing the gateway identifiers
    async fn mark_processing(
        &self,
        payment_id: &str,
        checkout_request_id: &str,
        merchant_request_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<PaymentTransaction>>;

    /// Apply a terminal outcome. A completion also records the payment on the
    /// booking in the same atomic unit.
    async fn apply_outcome(
        &self,
        payment_id: &str,
        outcome: &PaymentOutcome,
        now: DateTime<Utc>,
    ) -> Result<Option<PaymentTransaction>>;

    async fn find_by_id(&self, id: &str) -> Result<Option<PaymentTransaction>>;

    async fn find_by_gateway_request_id(
        &self,
        gateway_request_id: &str,
    ) -> Result<Option<PaymentTransaction>>;

    /// Open payments whose `expires_at` is before `now`
    async fn find_expired(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<PaymentTransaction>>;
}

pub(crate) const PAYMENT_COLUMNS: &str = "id, booking_id, payment_reference, gateway_request_id, \
     merchant_request_id, phone_number, amount, status, gateway_receipt, failure_reason, \
     transaction_date, expires_at, created_at, updated_at";

#[derive(Debug, FromRow)]
pub(crate) struct PaymentRow {
    id: String,
    booking_id: String,
    payment_reference: String,
    gateway_request_id: Option<String>,
    merchant_request_id: Option<String>,
    phone_number: String,
    amount: Decimal,
    status: String,
    gateway_receipt: Option<String>,
    failure_reason: Option<String>,
    transaction_date: Option<DateTime<Utc>>,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for PaymentTransaction {
    type Error = AppError;

    fn try_from(row: PaymentRow) -> Result<Self> {
        Ok(PaymentTransaction {
            status: PaymentStatus::from_str(&row.status).map_err(AppError::Internal)?,
            id: row.id,
            booking_id: row.booking_id,
            payment_reference: row.payment_reference,
            gateway_request_id: row.gateway_request_id,
            merchant_request_id: row.merchant_request_id,
            phone_number: row.phone_number,
            amount: row.amount,
            gateway_receipt: row.gateway_receipt,
            failure_reason: row.failure_reason,
            transaction_date: row.transaction_date,
            expires_at: row.expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// `?, ?, ?` for an `IN` list of `n` values
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Lock a payment row inside `tx`
pub(crate) async fn lock_payment(
    tx: &mut Transaction<'_, MySql>,
    payment_id: &str,
) -> Result<Option<PaymentTransaction>> {
    let row = sqlx::query_as::<_, PaymentRow>(&format!(
        "SELECT {} FROM payment_transactions WHERE id = ? FOR UPDATE",
        PAYMENT_COLUMNS
    ))
    .bind(payment_id)
    .fetch_optional(&mut **tx)
    .await?;

    row.map(PaymentTransaction::try_from).transpose()
}

/// Compare-and-set a payment's status inside `tx`; `true` when the row moved
pub(crate) async fn transition_status(
    tx: &mut Transaction<'_, MySql>,
    payment: &PaymentTransaction,
    sources: &[PaymentStatus],
) -> Result<bool> {
    let sql = format!(
        r#"
        UPDATE payment_transactions
        SET status = ?, gateway_receipt = ?, failure_reason = ?, transaction_date = ?, updated_at = ?
        WHERE id = ? AND status IN ({})
        "#,
        placeholders(sources.len())
    );

    let mut query = sqlx::query(&sql)
        .bind(payment.status.to_string())
        .bind(&payment.gateway_receipt)
        .bind(&payment.failure_reason)
        .bind(payment.transaction_date)
        .bind(payment.updated_at)
        .bind(&payment.id);
    for status in sources {
        query = query.bind(status.to_string());
    }

    let result = query
        .execute(&mut **tx)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to update payment status: {}", e)))?;

    Ok(result.rows_affected() == 1)
}

/// MySQL-backed payment repository
pub struct MySqlPaymentRepository {
    pool: MySqlPool,
}

impl MySqlPaymentRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentRepository for MySqlPaymentRepository {
    async fn insert_if_payable(
        &self,
        booking_id: &str,
        build: PaymentBuilder<'_>,
    ) -> Result<PaymentTransaction> {
        let mut tx = self.pool.begin().await?;

        let booking = lock_booking(&mut tx, booking_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Booking '{}'", booking_id)))?;

        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payment_transactions WHERE booking_id = ?",
            PAYMENT_COLUMNS
        ))
        .bind(booking_id)
        .fetch_all(&mut *tx)
        .await?;
        let existing = rows
            .into_iter()
            .map(PaymentTransaction::try_from)
            .collect::<Result<Vec<_>>>()?;

        let payment = build(&booking, &existing)?;

        sqlx::query(
            r#"
            INSERT INTO payment_transactions (
                id, booking_id, payment_reference, gateway_request_id, merchant_request_id,
                phone_number, amount, status, gateway_receipt, failure_reason,
                transaction_date, expires_at, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.booking_id)
        .bind(&payment.payment_reference)
        .bind(&payment.gateway_request_id)
        .bind(&payment.merchant_request_id)
        .bind(&payment.phone_number)
        .bind(payment.amount)
        .bind(payment.status.to_string())
        .bind(&payment.gateway_receipt)
        .bind(&payment.failure_reason)
        .bind(payment.transaction_date)
        .bind(payment.expires_at)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to create payment: {}", e)))?;

        tx.commit().await?;
        Ok(payment)
    }

    async fn mark_processing(
        &self,
        payment_id: &str,
        checkout_request_id: &str,
        merchant_request_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<PaymentTransaction>> {
        let result = sqlx::query(
            r#"
            UPDATE payment_transactions
            SET status = 'processing', gateway_request_id = ?, merchant_request_id = ?, updated_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(checkout_request_id)
        .bind(merchant_request_id)
        .bind(now)
        .bind(payment_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to mark payment processing: {}", e)))?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.find_by_id(payment_id).await
    }

    async fn apply_outcome(
        &self,
        payment_id: &str,
        outcome: &PaymentOutcome,
        now: DateTime<Utc>,
    ) -> Result<Option<PaymentTransaction>> {
        let mut tx = self.pool.begin().await?;

        let Some(mut payment) = lock_payment(&mut tx, payment_id).await? else {
            return Err(AppError::PaymentNotFound(payment_id.to_string()));
        };
        let current = payment.status;
        if !payment.apply(outcome, now) {
            return Ok(None);
        }
        if !transition_status(&mut tx, &payment, &[current]).await? {
            return Ok(None);
        }

        if payment.status == PaymentStatus::Completed {
            if let Some(mut booking) = lock_booking(&mut tx, &payment.booking_id).await? {
                if booking.record_payment(payment.amount) {
                    update_booking_payment(&mut tx, &booking).await?;
                } else {
                    tracing::warn!(
                        payment_id = %payment.id,
                        booking_id = %booking.id,
                        booking_status = %booking.status,
                        "Payment completed for inactive booking; refund required"
                    );
                }
            }
        }

        tx.commit().await?;
        Ok(Some(payment))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<PaymentTransaction>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payment_transactions WHERE id = ?",
            PAYMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PaymentTransaction::try_from).transpose()
    }

    async fn find_by_gateway_request_id(
        &self,
        gateway_request_id: &str,
    ) -> Result<Option<PaymentTransaction>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payment_transactions WHERE gateway_request_id = ?",
            PAYMENT_COLUMNS
        ))
        .bind(gateway_request_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PaymentTransaction::try_from).transpose()
    }

    async fn find_expired(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<PaymentTransaction>> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            r#"
            SELECT {} FROM payment_transactions
            WHERE status IN ('pending', 'processing') AND expires_at < ?
            ORDER BY expires_at ASC
            LIMIT ?
            "#,
            PAYMENT_COLUMNS
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PaymentTransaction::try_from).collect()
    }
}
