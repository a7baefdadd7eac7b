use crate::core::{AppError, Result};
use crate::modules::payments::models::{LedgerOutcome, WebhookLogEntry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, MySqlPool};

/// Storage for the webhook idempotency ledger
#[async_trait]
pub trait WebhookRepository: Send + Sync {
    /// Insert the entry, or report what the existing entry for the same
    /// `(webhook_type, gateway_request_id)` says about this delivery. The
    /// insert is the atomic check.
    async fn record(&self, entry: &WebhookLogEntry) -> Result<LedgerOutcome>;

    async fn mark_processed(
        &self,
        webhook_type: &str,
        gateway_request_id: &str,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Keep the entry unprocessed and remember why
    async fn mark_failed(&self, webhook_type: &str, gateway_request_id: &str, error: &str)
        -> Result<()>;

    async fn find(&self, webhook_type: &str, gateway_request_id: &str)
        -> Result<Option<WebhookLogEntry>>;
}

#[derive(Debug, FromRow)]
struct WebhookRow {
    id: String,
    webhook_type: String,
    gateway_request_id: String,
    raw_payload: String,
    payload_digest: String,
    processed: bool,
    processing_error: Option<String>,
    retry_count: u32,
    received_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl TryFrom<WebhookRow> for WebhookLogEntry {
    type Error = AppError;

    fn try_from(row: WebhookRow) -> Result<Self> {
        Ok(WebhookLogEntry {
            raw_payload: serde_json::from_str(&row.raw_payload)?,
            id: row.id,
            webhook_type: row.webhook_type,
            gateway_request_id: row.gateway_request_id,
            payload_digest: row.payload_digest,
            processed: row.processed,
            processing_error: row.processing_error,
            retry_count: row.retry_count,
            received_at: row.received_at,
            processed_at: row.processed_at,
        })
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// MySQL-backed ledger, unique on `(webhook_type, gateway_request_id)`
pub struct MySqlWebhookRepository {
    pool: MySqlPool,
}

impl MySqlWebhookRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn record_redelivery(&self, entry: &WebhookLogEntry) -> Result<LedgerOutcome> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<(bool, u32)> = sqlx::query_as(
            r#"
            SELECT processed, retry_count FROM payment_webhook_logs
            WHERE webhook_type = ? AND gateway_request_id = ?
            FOR UPDATE
            "#,
        )
        .bind(&entry.webhook_type)
        .bind(&entry.gateway_request_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((processed, retry_count)) = existing else {
            return Err(AppError::internal(format!(
                "Webhook ledger entry for '{}' vanished after duplicate insert",
                entry.gateway_request_id
            )));
        };

        if processed {
            return Ok(LedgerOutcome::AlreadyProcessed);
        }

        sqlx::query(
            r#"
            UPDATE payment_webhook_logs
            SET retry_count = retry_count + 1
            WHERE webhook_type = ? AND gateway_request_id = ?
            "#,
        )
        .bind(&entry.webhook_type)
        .bind(&entry.gateway_request_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(LedgerOutcome::Redelivered {
            retry_count: retry_count + 1,
        })
    }
}

#[async_trait]
impl WebhookRepository for MySqlWebhookRepository {
    async fn record(&self, entry: &WebhookLogEntry) -> Result<LedgerOutcome> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO payment_webhook_logs (
                id, webhook_type, gateway_request_id, raw_payload, payload_digest,
                processed, processing_error, retry_count, received_at, processed_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.webhook_type)
        .bind(&entry.gateway_request_id)
        .bind(entry.raw_payload.to_string())
        .bind(&entry.payload_digest)
        .bind(entry.processed)
        .bind(&entry.processing_error)
        .bind(entry.retry_count)
        .bind(entry.received_at)
        .bind(entry.processed_at)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(LedgerOutcome::FirstSeen),
            Err(e) if is_unique_violation(&e) => self.record_redelivery(entry).await,
            Err(e) => Err(AppError::Internal(format!(
                "Failed to record webhook: {}",
                e
            ))),
        }
    }

    async fn mark_processed(
        &self,
        webhook_type: &str,
        gateway_request_id: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE payment_webhook_logs
            SET processed = TRUE, processing_error = NULL, processed_at = ?
            WHERE webhook_type = ? AND gateway_request_id = ?
            "#,
        )
        .bind(now)
        .bind(webhook_type)
        .bind(gateway_request_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_failed(
        &self,
        webhook_type: &str,
        gateway_request_id: &str,
        error: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE payment_webhook_logs
            SET processing_error = ?
            WHERE webhook_type = ? AND gateway_request_id = ? AND processed = FALSE
            "#,
        )
        .bind(error)
        .bind(webhook_type)
        .bind(gateway_request_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(
        &self,
        webhook_type: &str,
        gateway_request_id: &str,
    ) -> Result<Option<WebhookLogEntry>> {
        let row = sqlx::query_as::<_, WebhookRow>(
            r#"
            SELECT id, webhook_type, gateway_request_id, raw_payload, payload_digest,
                   processed, processing_error, retry_count, received_at, processed_at
            FROM payment_webhook_logs
            WHERE webhook_type = ? AND gateway_request_id = ?
            "#,
        )
        .bind(webhook_type)
        .bind(gateway_request_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(WebhookLogEntry::try_from).transpose()
    }
}
