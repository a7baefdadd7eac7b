use crate::core::reference::{generate_reference, PAYMENT_PREFIX};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Payment transaction status
///
/// `pending → processing → {completed | failed | cancelled | expired}`, with
/// `pending` also allowed to fail or expire directly. `completed → refunded`
/// is reserved for the refund workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Created, push request not yet accepted by the gateway
    #[default]
    Pending,
    /// Push request accepted, waiting for the customer
    Processing,
    Completed,
    Failed,
    /// Customer dismissed the prompt
    Cancelled,
    /// No outcome before the client-side timeout
    Expired,
    Refunded,
}

impl PaymentStatus {
    /// Statuses from which the gateway outcome (or a timeout) may still be applied
    pub const OPEN: [PaymentStatus; 2] = [PaymentStatus::Pending, PaymentStatus::Processing];

    pub const ALL: [PaymentStatus; 7] = [
        PaymentStatus::Pending,
        PaymentStatus::Processing,
        PaymentStatus::Completed,
        PaymentStatus::Failed,
        PaymentStatus::Cancelled,
        PaymentStatus::Expired,
        PaymentStatus::Refunded,
    ];

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending | PaymentStatus::Processing)
    }

    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Failed)
                | (Pending, Expired)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Cancelled)
                | (Processing, Expired)
                | (Completed, Refunded)
        )
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Processing => write!(f, "processing"),
            PaymentStatus::Completed => write!(f, "completed"),
            PaymentStatus::Failed => write!(f, "failed"),
            PaymentStatus::Cancelled => write!(f, "cancelled"),
            PaymentStatus::Expired => write!(f, "expired"),
            PaymentStatus::Refunded => write!(f, "refunded"),
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "processing" => Ok(PaymentStatus::Processing),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            "expired" => Ok(PaymentStatus::Expired),
            "refunded" => Ok(PaymentStatus::Refunded),
            _ => Err(format!("Invalid payment status: {}", s)),
        }
    }
}

/// Terminal outcome applied to an open payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Completed {
        receipt: Option<String>,
        transaction_date: Option<DateTime<Utc>>,
    },
    Failed(String),
    Cancelled(String),
    Expired,
}

impl PaymentOutcome {
    pub fn target_status(&self) -> PaymentStatus {
        match self {
            PaymentOutcome::Completed { .. } => PaymentStatus::Completed,
            PaymentOutcome::Failed(_) => PaymentStatus::Failed,
            PaymentOutcome::Cancelled(_) => PaymentStatus::Cancelled,
            PaymentOutcome::Expired => PaymentStatus::Expired,
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            PaymentOutcome::Failed(reason) | PaymentOutcome::Cancelled(reason) => Some(reason),
            PaymentOutcome::Expired => Some("Payment request timed out"),
            PaymentOutcome::Completed { .. } => None,
        }
    }
}

/// Mobile-money payment attempt for a booking
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTransaction {
    pub id: String,
    pub booking_id: String,
    /// Our reference, sent to the gateway as `AccountReference`
    pub payment_reference: String,
    /// Gateway `CheckoutRequestID`, set once the push request is accepted
    pub gateway_request_id: Option<String>,
    pub merchant_request_id: Option<String>,
    pub phone_number: String,
    pub amount: Decimal,
    pub status: PaymentStatus,
    /// Gateway receipt number (`MpesaReceiptNumber`)
    pub gateway_receipt: Option<String>,
    pub failure_reason: Option<String>,
    pub transaction_date: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentTransaction {
    /// Create a new pending payment
    ///
    /// # Arguments
    /// * `booking_id` - Booking being paid
    /// * `phone_number` - Normalized payer number
    /// * `amount` - Amount requested from the payer
    /// * `timeout` - Time allowed for the gateway outcome
    pub fn new_pending(
        booking_id: &str,
        phone_number: &str,
        amount: Decimal,
        timeout: Duration,
    ) -> Self {
        let now = Utc::now();
        let timeout = chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::MAX);

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            booking_id: booking_id.to_string(),
            payment_reference: generate_reference(PAYMENT_PREFIX),
            gateway_request_id: None,
            merchant_request_id: None,
            phone_number: phone_number.to_string(),
            amount,
            status: PaymentStatus::Pending,
            gateway_receipt: None,
            failure_reason: None,
            transaction_date: None,
            expires_at: now.checked_add_signed(timeout).unwrap_or(now),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply an outcome in memory. Returns `false` when the transition is not allowed.
    pub fn apply(&mut self, outcome: &PaymentOutcome, now: DateTime<Utc>) -> bool {
        let target = outcome.target_status();
        if !self.status.can_transition_to(target) {
            return false;
        }

        self.status = target;
        self.failure_reason = outcome.failure_reason().map(str::to_string);
        if let PaymentOutcome::Completed {
            receipt,
            transaction_date,
        } = outcome
        {
            self.gateway_receipt = receipt.clone();
            self.transaction_date = transaction_date.or(Some(now));
        }
        self.updated_at = now;
        true
    }

    /// Record the gateway ids and move to processing
    pub fn accept(
        &mut self,
        checkout_request_id: &str,
        merchant_request_id: &str,
        now: DateTime<Utc>,
    ) -> bool {
        if !self.status.can_transition_to(PaymentStatus::Processing) {
            return false;
        }

        self.status = PaymentStatus::Processing;
        self.gateway_request_id = Some(checkout_request_id.to_string());
        self.merchant_request_id = Some(merchant_request_id.to_string());
        self.updated_at = now;
        true
    }

    /// Time left before the client-side timeout fires
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Request body for `POST /payments/initiate`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentRequest {
    pub booking_id: String,
    pub phone: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentResponse {
    pub payment_id: String,
    pub gateway_request_id: Option<String>,
    pub reference: String,
    pub status: PaymentStatus,
    pub message: String,
}

/// Response body for `GET /payments/status/{paymentId}`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusView {
    pub payment_id: String,
    pub booking_id: String,
    pub reference: String,
    pub gateway_request_id: Option<String>,
    pub status: PaymentStatus,
    pub amount: Decimal,
    pub receipt: Option<String>,
    pub failure_reason: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&PaymentTransaction> for PaymentStatusView {
    fn from(payment: &PaymentTransaction) -> Self {
        Self {
            payment_id: payment.id.clone(),
            booking_id: payment.booking_id.clone(),
            reference: payment.payment_reference.clone(),
            gateway_request_id: payment.gateway_request_id.clone(),
            status: payment.status,
            amount: payment.amount,
            receipt: payment.gateway_receipt.clone(),
            failure_reason: payment.failure_reason.clone(),
            expires_at: payment.expires_at,
            updated_at: payment.updated_at,
        }
    }
}
