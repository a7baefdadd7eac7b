use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Webhook type for STK push result callbacks
pub const STK_CALLBACK: &str = "stk_callback";

/// Inbound callback as recorded in the idempotency ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookLogEntry {
    pub id: String,
    pub webhook_type: String,
    /// Unique per `webhook_type`
    pub gateway_request_id: String,
    pub raw_payload: serde_json::Value,
    /// Hex SHA-256 of the serialized payload
    pub payload_digest: String,
    pub processed: bool,
    pub processing_error: Option<String>,
    pub retry_count: u32,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl WebhookLogEntry {
    pub fn new(webhook_type: &str, gateway_request_id: &str, raw_payload: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            webhook_type: webhook_type.to_string(),
            gateway_request_id: gateway_request_id.to_string(),
            payload_digest: payload_digest(&raw_payload),
            raw_payload,
            processed: false,
            processing_error: None,
            retry_count: 0,
            received_at: Utc::now(),
            processed_at: None,
        }
    }
}

/// Result of recording a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOutcome {
    /// First delivery for this request id
    FirstSeen,
    /// Seen before but never processed successfully
    Redelivered { retry_count: u32 },
    /// Already applied; the delivery must have no effect
    AlreadyProcessed,
}

impl LedgerOutcome {
    pub fn should_process(&self) -> bool {
        !matches!(self, LedgerOutcome::AlreadyProcessed)
    }
}

pub fn payload_digest(payload: &serde_json::Value) -> String {
    hex::encode(Sha256::digest(payload.to_string().as_bytes()))
}
