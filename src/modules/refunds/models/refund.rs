use crate::core::reference::{generate_reference, REFUND_PREFIX};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Refund lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefundStatus {
    /// Waiting for manager approval
    #[default]
    Pending,
    Approved,
    /// Payout leg in flight
    Processing,
    Completed,
    Failed,
    /// Rejected by a manager
    Cancelled,
}

impl RefundStatus {
    /// Refunds in these statuses count against the refundable balance
    pub fn holds_funds(&self) -> bool {
        !matches!(self, RefundStatus::Failed | RefundStatus::Cancelled)
    }
}

impl std::fmt::Display for RefundStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefundStatus::Pending => write!(f, "pending"),
            RefundStatus::Approved => write!(f, "approved"),
            RefundStatus::Processing => write!(f, "processing"),
            RefundStatus::Completed => write!(f, "completed"),
            RefundStatus::Failed => write!(f, "failed"),
            RefundStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for RefundStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RefundStatus::Pending),
            "approved" => Ok(RefundStatus::Approved),
            "processing" => Ok(RefundStatus::Processing),
            "completed" => Ok(RefundStatus::Completed),
            "failed" => Ok(RefundStatus::Failed),
            "cancelled" => Ok(RefundStatus::Cancelled),
            _ => Err(format!("Invalid refund status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundReason {
    TripCancelledByOperator,
    VehicleBreakdown,
    WeatherConditions,
    PassengerRequest,
    DuplicateBooking,
    SystemError,
    Other,
}

impl std::fmt::Display for RefundReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RefundReason::TripCancelledByOperator => "trip_cancelled_by_operator",
            RefundReason::VehicleBreakdown => "vehicle_breakdown",
            RefundReason::WeatherConditions => "weather_conditions",
            RefundReason::PassengerRequest => "passenger_request",
            RefundReason::DuplicateBooking => "duplicate_booking",
            RefundReason::SystemError => "system_error",
            RefundReason::Other => "other",
        };
        f.write_str(label)
    }
}

impl std::str::FromStr for RefundReason {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "trip_cancelled_by_operator" => Ok(RefundReason::TripCancelledByOperator),
            "vehicle_breakdown" => Ok(RefundReason::VehicleBreakdown),
            "weather_conditions" => Ok(RefundReason::WeatherConditions),
            "passenger_request" => Ok(RefundReason::PassengerRequest),
            "duplicate_booking" => Ok(RefundReason::DuplicateBooking),
            "system_error" => Ok(RefundReason::SystemError),
            "other" => Ok(RefundReason::Other),
            _ => Err(format!("Invalid refund reason: {}", s)),
        }
    }
}

/// Refund against a completed payment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundTransaction {
    pub id: String,
    pub refund_reference: String,
    pub original_payment_id: String,
    pub booking_id: String,
    pub refund_amount: Decimal,
    pub reason: RefundReason,
    pub notes: Option<String>,
    pub status: RefundStatus,
    pub requires_approval: bool,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub requested_by: Option<String>,
    pub payout_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RefundTransaction {
    /// Create a refund request
    ///
    /// Amounts strictly above `approval_threshold` start `pending` and need a
    /// manager; smaller refunds go straight to `processing`.
    pub fn new(
        original_payment_id: &str,
        booking_id: &str,
        refund_amount: Decimal,
        reason: RefundReason,
        notes: Option<String>,
        requested_by: Option<String>,
        approval_threshold: Decimal,
    ) -> Self {
        let now = Utc::now();
        let requires_approval = refund_amount > approval_threshold;

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            refund_reference: generate_reference(REFUND_PREFIX),
            original_payment_id: original_payment_id.to_string(),
            booking_id: booking_id.to_string(),
            refund_amount,
            reason,
            notes,
            status: if requires_approval {
                RefundStatus::Pending
            } else {
                RefundStatus::Processing
            },
            requires_approval,
            approved_by: None,
            approved_at: None,
            requested_by,
            payout_reference: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Approval gate for the processing transition
    pub fn approval_satisfied(&self) -> bool {
        !self.requires_approval || self.approved_by.is_some()
    }

    /// Apply `change` in memory. Returns `false` when it is not allowed from
    /// the current status.
    pub fn apply(&mut self, change: &RefundChange, now: DateTime<Utc>) -> bool {
        let allowed = match change {
            RefundChange::Approve { .. } | RefundChange::Reject { .. } => {
                self.status == RefundStatus::Pending
            }
            RefundChange::BeginProcessing => {
                self.status == RefundStatus::Approved && self.approval_satisfied()
            }
            RefundChange::Complete { .. } | RefundChange::Fail { .. } => {
                self.status == RefundStatus::Processing
            }
        };
        if !allowed {
            return false;
        }

        match change {
            RefundChange::Approve { approved_by } => {
                self.status = RefundStatus::Approved;
                self.approved_by = Some(approved_by.clone());
                self.approved_at = Some(now);
            }
            RefundChange::Reject { reason } => {
                self.status = RefundStatus::Cancelled;
                self.failure_reason = Some(reason.clone());
            }
            RefundChange::BeginProcessing => self.status = RefundStatus::Processing,
            RefundChange::Complete { payout_reference } => {
                self.status = RefundStatus::Completed;
                self.payout_reference = payout_reference.clone();
            }
            RefundChange::Fail { reason } => {
                self.status = RefundStatus::Failed;
                self.failure_reason = Some(reason.clone());
            }
        }
        self.updated_at = now;
        true
    }
}

/// Operator or payout-driven change to a refund
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundChange {
    Approve { approved_by: String },
    Reject { reason: String },
    BeginProcessing,
    Complete { payout_reference: Option<String> },
    Fail { reason: String },
}

/// Request body for `POST /refunds`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRefundRequest {
    pub payment_id: String,
    pub amount: Decimal,
    pub reason: RefundReason,
    pub notes: Option<String>,
    pub requested_by: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveRefundRequest {
    pub approved_by: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectRefundRequest {
    pub reason: String,
}

/// Result of the external payout leg
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutResultRequest {
    pub success: bool,
    pub payout_reference: Option<String>,
    pub reason: Option<String>,
}
