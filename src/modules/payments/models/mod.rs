pub mod payment_transaction;
pub mod webhook_log;

pub use payment_transaction::{
    InitiatePaymentRequest, InitiatePaymentResponse, PaymentOutcome, PaymentStatus,
    PaymentStatusView, PaymentTransaction,
};
pub use webhook_log::{LedgerOutcome, WebhookLogEntry, STK_CALLBACK};
