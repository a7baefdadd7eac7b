pub mod controllers;
pub mod models;
pub mod repositories;
pub mod services;

pub use models::{PaymentOutcome, PaymentStatus, PaymentTransaction};
pub use repositories::{PaymentRepository, WebhookRepository};
pub use services::{ExpirationChecker, PaymentOrchestrator, TimeoutScheduler, WebhookLedger};
