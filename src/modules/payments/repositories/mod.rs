pub mod payment_repository;
pub mod webhook_repository;

pub use payment_repository::{MySqlPaymentRepository, PaymentBuilder, PaymentRepository};
pub use webhook_repository::{MySqlWebhookRepository, WebhookRepository};
