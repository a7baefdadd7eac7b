use crate::core::{AppError, Result};
use crate::modules::bookings::repositories::booking_repository::{lock_booking, update_booking_payment};
use crate::modules::payments::models::{PaymentStatus, PaymentTransaction};
use crate::modules::payments::repositories::payment_repository::{
    lock_payment, placeholders, transition_status,
};
use crate::modules::refunds::models::{RefundChange, RefundReason, RefundStatus, RefundTransaction};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, MySql, MySqlPool, Transaction};
use std::str::FromStr;

/// Validates a refund request against the locked payment and the amount
/// already committed to other refunds, and produces the refund to persist.
pub type RefundBuilder<'a> =
    &'a (dyn Fn(&PaymentTransaction, Decimal) -> Result<RefundTransaction> + Send + Sync);

#[async_trait]
pub trait RefundRepository: Send + Sync {
    /// Lock the payment, sum its fund-holding refunds, hand both to `build`
    /// and insert the result in the same atomic unit.
    async fn insert_if_refundable(
        &self,
        payment_id: &str,
        build: RefundBuilder<'_>,
    ) -> Result<RefundTransaction>;

    /// Apply a change if legal from the stored status. Completing the refund
    /// that covers the full payment marks the payment and booking refunded.
    async fn apply_change(
        &self,
        refund_id: &str,
        change: &RefundChange,
        now: DateTime<Utc>,
    ) -> Result<Option<RefundTransaction>>;

    async fn find_by_id(&self, id: &str) -> Result<Option<RefundTransaction>>;
}

const REFUND_COLUMNS: &str = "id, refund_reference, original_payment_id, booking_id, \
     refund_amount, reason, notes, status, requires_approval, approved_by, approved_at, \
     requested_by, payout_reference, failure_reason, created_at, updated_at";

#[derive(Debug, FromRow)]
struct RefundRow {
    id: String,
    refund_reference: String,
    original_payment_id: String,
    booking_id: String,
    refund_amount: Decimal,
    reason: String,
    notes: Option<String>,
    status: String,
    requires_approval: bool,
    approved_by: Option<String>,
    approved_at: Option<DateTime<Utc>>,
    requested_by: Option<String>,
    payout_reference: Option<String>,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RefundRow> for RefundTransaction {
    type Error = AppError;

    fn try_from(row: RefundRow) -> Result<Self> {
        Ok(RefundTransaction {
            reason: RefundReason::from_str(&row.reason).map_err(AppError::Internal)?,
            status: RefundStatus::from_str(&row.status).map_err(AppError::Internal)?,
            id: row.id,
            refund_reference: row.refund_reference,
            original_payment_id: row.original_payment_id,
            booking_id: row.booking_id,
            refund_amount: row.refund_amount,
            notes: row.notes,
            requires_approval: row.requires_approval,
            approved_by: row.approved_by,
            approved_at: row.approved_at,
            requested_by: row.requested_by,
            payout_reference: row.payout_reference,
            failure_reason: row.failure_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// MySQL-backed refund repository
pub struct MySqlRefundRepository {
    pool: MySqlPool,
}

impl MySqlRefundRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn refunds_total(
        tx: &mut Transaction<'_, MySql>,
        payment_id: &str,
        statuses: &[RefundStatus],
    ) -> Result<Decimal> {
        let sql = format!(
            "SELECT COALESCE(SUM(refund_amount), 0) FROM refund_transactions WHERE original_payment_id = ? AND status IN ({})",
            placeholders(statuses.len())
        );
        let mut query = sqlx::query_scalar::<_, Decimal>(&sql).bind(payment_id);
        for status in statuses {
            query = query.bind(status.to_string());
        }

        Ok(query.fetch_one(&mut **tx).await?)
    }

    /// Payment and booking side of a completed refund
    async fn settle_payment(
        tx: &mut Transaction<'_, MySql>,
        refund: &RefundTransaction,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let Some(mut payment) = lock_payment(tx, &refund.original_payment_id).await? else {
            return Err(AppError::PaymentNotFound(refund.original_payment_id.clone()));
        };

        let refunded = Self::refunds_total(tx, &payment.id, &[RefundStatus::Completed]).await?;
        if refunded < payment.amount || payment.status != PaymentStatus::Completed {
            return Ok(());
        }

        payment.status = PaymentStatus::Refunded;
        payment.updated_at = now;
        if !transition_status(tx, &payment, &[PaymentStatus::Completed]).await? {
            return Ok(());
        }

        if let Some(mut booking) = lock_booking(tx, &payment.booking_id).await? {
            booking.mark_refunded();
            update_booking_payment(tx, &booking).await?;
        }

        Ok(())
    }
}

#[async_trait]
impl RefundRepository for MySqlRefundRepository {
    async fn insert_if_refundable(
        &self,
        payment_id: &str,
        build: RefundBuilder<'_>,
    ) -> Result<RefundTransaction> {
        let mut tx = self.pool.begin().await?;

        let payment = lock_payment(&mut tx, payment_id)
            .await?
            .ok_or_else(|| AppError::PaymentNotFound(payment_id.to_string()))?;

        let committed = Self::refunds_total(
            &mut tx,
            payment_id,
            &[
                RefundStatus::Pending,
                RefundStatus::Approved,
                RefundStatus::Processing,
                RefundStatus::Completed,
            ],
        )
        .await?;

        let refund = build(&payment, committed)?;

        sqlx::query(&format!(
            "INSERT INTO refund_transactions ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            REFUND_COLUMNS
        ))
        .bind(&refund.id)
        .bind(&refund.refund_reference)
        .bind(&refund.original_payment_id)
        .bind(&refund.booking_id)
        .bind(refund.refund_amount)
        .bind(refund.reason.to_string())
        .bind(&refund.notes)
        .bind(refund.status.to_string())
        .bind(refund.requires_approval)
        .bind(&refund.approved_by)
        .bind(refund.approved_at)
        .bind(&refund.requested_by)
        .bind(&refund.payout_reference)
        .bind(&refund.failure_reason)
        .bind(refund.created_at)
        .bind(refund.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to create refund: {}", e)))?;

        tx.commit().await?;
        Ok(refund)
    }

    async fn apply_change(
        &self,
        refund_id: &str,
        change: &RefundChange,
        now: DateTime<Utc>,
    ) -> Result<Option<RefundTransaction>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, RefundRow>(&format!(
            "SELECT {} FROM refund_transactions WHERE id = ? FOR UPDATE",
            REFUND_COLUMNS
        ))
        .bind(refund_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Err(AppError::not_found(format!("Refund '{}'", refund_id)));
        };

        let mut refund = RefundTransaction::try_from(row)?;
        if !refund.apply(change, now) {
            return Ok(None);
        }

        sqlx::query(
            r#"
            UPDATE refund_transactions
            SET status = ?, approved_by = ?, approved_at = ?, payout_reference = ?,
                failure_reason = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(refund.status.to_string())
        .bind(&refund.approved_by)
        .bind(refund.approved_at)
        .bind(&refund.payout_reference)
        .bind(&refund.failure_reason)
        .bind(refund.updated_at)
        .bind(&refund.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to update refund: {}", e)))?;

        if refund.status == RefundStatus::Completed {
            Self::settle_payment(&mut tx, &refund, now).await?;
        }

        tx.commit().await?;
        Ok(Some(refund))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<RefundTransaction>> {
        let row = sqlx::query_as::<_, RefundRow>(&format!(
            "SELECT {} FROM refund_transactions WHERE id = ?",
            REFUND_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(RefundTransaction::try_from).transpose()
    }
}
