pub mod notifier;

pub use notifier::{LogNotifier, PaymentNotifier};
