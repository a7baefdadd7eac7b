pub mod expiration_checker;
pub mod payment_orchestrator;
pub mod timeout_scheduler;
pub mod webhook_ledger;

pub use expiration_checker::{ExpirationChecker, SweepReport};
pub use payment_orchestrator::PaymentOrchestrator;
pub use timeout_scheduler::TimeoutScheduler;
pub use webhook_ledger::WebhookLedger;
