use crate::core::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Push-payment gateway (customer approves the charge on their handset)
///
/// Implementations hold no business state: they translate requests and map
/// gateway answers onto [`PushOutcome`] and [`QueryOutcome`].
#[async_trait]
pub trait PushPaymentGateway: Send + Sync {
    /// Ask the gateway to prompt the payer
    ///
    /// # Errors
    /// * `GatewayUnavailable` - connection failure, timeout or 5xx after retries
    async fn initiate_push(&self, request: PushRequest) -> Result<PushOutcome>;

    /// Ask the gateway for the result of an accepted push request
    async fn query_status(&self, checkout_request_id: &str) -> Result<QueryOutcome>;

    /// Get gateway name
    fn name(&self) -> &str;
}

/// Push request data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRequest {
    /// Normalized payer MSISDN
    pub phone_number: String,

    pub amount: Decimal,

    /// Our payment reference (`AccountReference`)
    pub account_reference: String,

    pub description: String,
}

/// Gateway answer to a push request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Accepted {
        checkout_request_id: String,
        merchant_request_id: String,
        customer_message: Option<String>,
    },
    /// Gateway understood the request and refused it
    Rejected(String),
}

/// Gateway answer to a status query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    Completed { receipt: Option<String> },
    Cancelled(String),
    Failed(String),
    /// Customer has not answered yet
    Pending,
}
