use crate::core::Result;
use crate::modules::payments::models::webhook_log::payload_digest;
use crate::modules::payments::models::{LedgerOutcome, WebhookLogEntry};
use crate::modules::payments::repositories::WebhookRepository;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;

/// Prefix of ledger keys for callbacks that carry no usable request id
const UNATTRIBUTED_PREFIX: &str = "unattributed:";

/// Idempotency ledger for inbound gateway callbacks
///
/// Every delivery is recorded with its raw payload before any business
/// effect. The ledger decides whether a delivery may be processed; the
/// payment compare-and-set keeps the effect single even when an unprocessed
/// entry is delivered again.
#[derive(Clone)]
pub struct WebhookLedger {
    repo: Arc<dyn WebhookRepository>,
}

impl WebhookLedger {
    pub fn new(repo: Arc<dyn WebhookRepository>) -> Self {
        Self { repo }
    }

    pub async fn record_and_check(
        &self,
        webhook_type: &str,
        gateway_request_id: &str,
        payload: Value,
    ) -> Result<LedgerOutcome> {
        let entry = WebhookLogEntry::new(webhook_type, gateway_request_id, payload);
        let outcome = self.repo.record(&entry).await?;

        tracing::debug!(
            webhook_type,
            gateway_request_id,
            digest = %entry.payload_digest,
            outcome = ?outcome,
            "Webhook delivery recorded"
        );
        Ok(outcome)
    }

    /// Keep a payload that cannot be attributed to a request, for audit.
    /// Identical payloads share one entry.
    pub async fn record_unattributed(
        &self,
        webhook_type: &str,
        payload: Value,
        error: &str,
    ) -> Result<String> {
        let key = format!("{}{}", UNATTRIBUTED_PREFIX, payload_digest(&payload));
        if self
            .record_and_check(webhook_type, &key, payload)
            .await?
            .should_process()
        {
            self.repo.mark_failed(webhook_type, &key, error).await?;
        }
        Ok(key)
    }

    pub async fn mark_processed(&self, webhook_type: &str, gateway_request_id: &str) -> Result<()> {
        self.repo
            .mark_processed(webhook_type, gateway_request_id, Utc::now())
            .await
    }

    pub async fn mark_failed(
        &self,
        webhook_type: &str,
        gateway_request_id: &str,
        error: &str,
    ) -> Result<()> {
        self.repo
            .mark_failed(webhook_type, gateway_request_id, error)
            .await
    }

    /// Entry that was recorded but never processed
    pub async fn find_unprocessed(
        &self,
        webhook_type: &str,
        gateway_request_id: &str,
    ) -> Result<Option<WebhookLogEntry>> {
        Ok(self
            .repo
            .find(webhook_type, gateway_request_id)
            .await?
            .filter(|entry| !entry.processed))
    }

    pub async fn find(
        &self,
        webhook_type: &str,
        gateway_request_id: &str,
    ) -> Result<Option<WebhookLogEntry>> {
        self.repo.find(webhook_type, gateway_request_id).await
    }
}
