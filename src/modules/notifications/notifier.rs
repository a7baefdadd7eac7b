use crate::core::money::format_amount;
use crate::core::phone::mask_msisdn;
use crate::core::Result;
use crate::modules::payments::models::PaymentTransaction;
use async_trait::async_trait;

/// Customer-facing confirmation channel (SMS, e-mail, push)
///
/// Called once per completed payment, after the state change has been
/// persisted. A failure is logged by the caller and never rolls back the
/// payment.
#[async_trait]
pub trait PaymentNotifier: Send + Sync {
    async fn payment_completed(&self, payment: &PaymentTransaction) -> Result<()>;
}

/// Notifier that only writes a structured log line
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl PaymentNotifier for LogNotifier {
    async fn payment_completed(&self, payment: &PaymentTransaction) -> Result<()> {
        tracing::info!(
            payment_id = %payment.id,
            booking_id = %payment.booking_id,
            reference = %payment.payment_reference,
            receipt = payment.gateway_receipt.as_deref().unwrap_or("-"),
            phone = %mask_msisdn(&payment.phone_number),
            amount = %format_amount(payment.amount),
            "Payment confirmation dispatched"
        );
        Ok(())
    }
}
