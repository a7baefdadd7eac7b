use super::timeout_scheduler::TimeoutScheduler;
use super::webhook_ledger::WebhookLedger;
use crate::config::PaymentConfig;
use crate::core::phone::{mask_msisdn, normalize_msisdn};
use crate::core::{money, AppError, Result};
use crate::modules::bookings::models::{Booking, BookingPaymentStatus};
use crate::modules::gateways::{PushOutcome, PushPaymentGateway, PushRequest, QueryOutcome, StkCallback};
use crate::modules::notifications::PaymentNotifier;
use crate::modules::payments::models::{
    InitiatePaymentRequest, InitiatePaymentResponse, LedgerOutcome, PaymentOutcome, PaymentStatus,
    PaymentStatusView, PaymentTransaction, STK_CALLBACK,
};
use crate::modules::payments::repositories::PaymentRepository;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;

const PUSH_DESCRIPTION: &str = "Bus fare";

/// Payment orchestrator
///
/// Drives each payment through
/// `pending → processing → {completed | failed | cancelled | expired}`.
/// Callbacks, timeouts, status polls and the expiration sweep all funnel
/// into [`PaymentOrchestrator::apply_outcome`], a compare-and-set on the
/// stored status, so whichever path lands first wins and the rest are
/// no-ops. Only the winner cancels the timer and notifies the customer.
#[derive(Clone)]
pub struct PaymentOrchestrator {
    payments: Arc<dyn PaymentRepository>,
    gateway: Arc<dyn PushPaymentGateway>,
    ledger: WebhookLedger,
    timers: Arc<TimeoutScheduler>,
    notifier: Arc<dyn PaymentNotifier>,
    config: PaymentConfig,
}

impl PaymentOrchestrator {
    pub fn new(
        payments: Arc<dyn PaymentRepository>,
        gateway: Arc<dyn PushPaymentGateway>,
        ledger: WebhookLedger,
        timers: Arc<TimeoutScheduler>,
        notifier: Arc<dyn PaymentNotifier>,
        config: PaymentConfig,
    ) -> Self {
        Self {
            payments,
            gateway,
            ledger,
            timers,
            notifier,
            config,
        }
    }

    /// Start a push payment for a booking
    ///
    /// The pending transaction is created under the booking lock; the gateway
    /// is called afterwards with no lock held.
    ///
    /// # Errors
    /// * `ValidationError` - bad phone or amount, amount differs from amount due,
    ///   booking already paid
    /// * `PaymentAlreadyInProgress` - booking has a pending or processing payment
    /// * `PaymentRejected` - gateway refused the push request
    /// * `GatewayUnavailable` - gateway unreachable after retries
    pub async fn initiate(&self, request: InitiatePaymentRequest) -> Result<InitiatePaymentResponse> {
        let phone = normalize_msisdn(&request.phone).map_err(AppError::Validation)?;
        money::validate_amount(request.amount, "amount").map_err(AppError::Validation)?;
        if money::to_gateway_units(request.amount).is_none() {
            return Err(AppError::validation(
                "amount must be at least one whole shilling",
            ));
        }

        let amount = request.amount;
        let tolerance = self.config.amount_tolerance;
        let timeout = self.config.timeout;
        let build = |booking: &Booking, existing: &[PaymentTransaction]| -> Result<PaymentTransaction> {
            check_payable(booking)?;

            if let Some(open) = existing.iter().find(|p| !p.is_terminal()) {
                return Err(AppError::PaymentAlreadyInProgress(format!(
                    "{} is {} for booking {}",
                    open.payment_reference, open.status, booking.booking_reference
                )));
            }

            if !money::amounts_match(amount, booking.amount_due, tolerance) {
                return Err(AppError::validation(format!(
                    "Amount {} does not match amount due {}",
                    amount, booking.amount_due
                )));
            }

            Ok(PaymentTransaction::new_pending(&booking.id, &phone, amount, timeout))
        };

        let payment = self
            .payments
            .insert_if_payable(&request.booking_id, &build)
            .await?;
        self.schedule_timeout(&payment);

        tracing::info!(
            payment_id = %payment.id,
            booking_id = %payment.booking_id,
            reference = %payment.payment_reference,
            phone = %mask_msisdn(&payment.phone_number),
            amount = %money::format_amount(payment.amount),
            "Payment initiated"
        );

        let push = PushRequest {
            phone_number: payment.phone_number.clone(),
            amount: payment.amount,
            account_reference: payment.payment_reference.clone(),
            description: PUSH_DESCRIPTION.to_string(),
        };

        match self.gateway.initiate_push(push).await {
            Ok(PushOutcome::Accepted {
                checkout_request_id,
                merchant_request_id,
                customer_message,
            }) => {
                self.accept(&payment, &checkout_request_id, &merchant_request_id)
                    .await?;
                let current = self.load(&payment.id).await?;

                Ok(InitiatePaymentResponse {
                    payment_id: current.id,
                    gateway_request_id: current.gateway_request_id,
                    reference: current.payment_reference,
                    status: current.status,
                    message: customer_message
                        .unwrap_or_else(|| "Payment request sent to handset".to_string()),
                })
            }
            Ok(PushOutcome::Rejected(reason)) => {
                self.apply_outcome(&payment.id, PaymentOutcome::Failed(reason.clone()))
                    .await?;
                Err(AppError::PaymentRejected(reason))
            }
            Err(e) => {
                tracing::error!(payment_id = %payment.id, error = %e, "Push request failed");
                self.apply_outcome(
                    &payment.id,
                    PaymentOutcome::Failed(format!("Gateway error: {}", e.public_message())),
                )
                .await?;
                Err(e)
            }
        }
    }

    /// `pending → processing`, then replay a callback that beat us here
    async fn accept(
        &self,
        payment: &PaymentTransaction,
        checkout_request_id: &str,
        merchant_request_id: &str,
    ) -> Result<()> {
        let accepted = self
            .payments
            .mark_processing(&payment.id, checkout_request_id, merchant_request_id, Utc::now())
            .await?;

        if accepted.is_none() {
            tracing::warn!(
                payment_id = %payment.id,
                checkout_request_id,
                "Gateway accepted a payment that already left pending"
            );
            return Ok(());
        }

        self.replay_early_callback(checkout_request_id).await;
        Ok(())
    }

    async fn replay_early_callback(&self, checkout_request_id: &str) {
        let entry = match self
            .ledger
            .find_unprocessed(STK_CALLBACK, checkout_request_id)
            .await
        {
            Ok(Some(entry)) => entry,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(checkout_request_id, error = %e, "Could not check for early callback");
                return;
            }
        };

        let Ok(callback) = StkCallback::parse(&entry.raw_payload) else {
            return;
        };

        tracing::info!(checkout_request_id, "Replaying callback received before acceptance");
        if let Err(e) = self.process_callback(&callback).await {
            tracing::error!(checkout_request_id, error = %e, "Replayed callback failed");
        }
    }

    /// Handle an STK result callback
    ///
    /// Never fails because of the payload itself: unusable payloads are
    /// kept in the ledger with the reason. Errors are storage failures.
    pub async fn handle_callback(&self, payload: Value) -> Result<()> {
        let callback = match StkCallback::parse(&payload) {
            Ok(callback) => callback,
            Err(reason) => {
                tracing::warn!(reason = %reason, payload = %payload, "Unusable STK callback");
                match StkCallback::checkout_request_id_of(&payload) {
                    Some(id) => {
                        if self
                            .ledger
                            .record_and_check(STK_CALLBACK, &id, payload)
                            .await?
                            .should_process()
                        {
                            self.ledger.mark_failed(STK_CALLBACK, &id, &reason).await?;
                        }
                    }
                    None => {
                        self.ledger
                            .record_unattributed(STK_CALLBACK, payload, &reason)
                            .await?;
                    }
                }
                return Ok(());
            }
        };

        let checkout_request_id = callback.checkout_request_id.clone();
        match self
            .ledger
            .record_and_check(STK_CALLBACK, &checkout_request_id, payload)
            .await?
        {
            LedgerOutcome::AlreadyProcessed => {
                tracing::info!(%checkout_request_id, "Duplicate callback ignored");
                return Ok(());
            }
            LedgerOutcome::Redelivered { retry_count } => {
                tracing::warn!(%checkout_request_id, retry_count, "Callback redelivered before processing completed");
            }
            LedgerOutcome::FirstSeen => {}
        }

        self.process_callback(&callback).await
    }

    async fn process_callback(&self, callback: &StkCallback) -> Result<()> {
        let checkout_request_id = callback.checkout_request_id.as_str();

        let Some(payment) = self
            .payments
            .find_by_gateway_request_id(checkout_request_id)
            .await?
        else {
            tracing::warn!(checkout_request_id, "Callback for unknown checkout request kept for replay");
            self.ledger
                .mark_failed(STK_CALLBACK, checkout_request_id, "No payment matches CheckoutRequestID")
                .await?;
            return Ok(());
        };

        if let Some(paid) = callback.amount {
            if callback.result_code == 0 && !money::amounts_match(paid, payment.amount, Decimal::ONE) {
                tracing::warn!(
                    payment_id = %payment.id,
                    expected = %payment.amount,
                    paid = %paid,
                    "Callback amount differs from requested amount"
                );
            }
        }

        match self.apply_outcome(&payment.id, callback.outcome()).await {
            Ok(applied) => {
                if applied.is_none() {
                    tracing::info!(
                        payment_id = %payment.id,
                        status = %payment.status,
                        "Callback for settled payment has no effect"
                    );
                }
                self.ledger
                    .mark_processed(STK_CALLBACK, checkout_request_id)
                    .await
            }
            Err(e) => {
                tracing::error!(payment_id = %payment.id, error = %e, "Failed to apply callback");
                self.ledger
                    .mark_failed(STK_CALLBACK, checkout_request_id, &e.to_string())
                    .await?;
                Err(e)
            }
        }
    }

    /// Expire the payment if it is still open; a no-op otherwise
    pub async fn timeout_check(&self, payment_id: &str) -> Result<Option<PaymentTransaction>> {
        let expired = self.apply_outcome(payment_id, PaymentOutcome::Expired).await?;
        if let Some(payment) = &expired {
            tracing::info!(payment_id = %payment.id, booking_id = %payment.booking_id, "Payment expired");
        }
        Ok(expired)
    }

    /// Current view of a payment; a processing payment is refreshed from the
    /// gateway first. Gateway errors and "still processing" answers leave
    /// the stored state untouched.
    pub async fn query_status(&self, payment_id: &str) -> Result<PaymentStatusView> {
        let payment = self.load(payment_id).await?;
        let checkout_request_id = match (&payment.status, &payment.gateway_request_id) {
            (PaymentStatus::Processing, Some(id)) => id.clone(),
            _ => return Ok(PaymentStatusView::from(&payment)),
        };

        let outcome = match self.gateway.query_status(&checkout_request_id).await {
            Ok(result) => query_outcome(result),
            Err(e) => {
                tracing::warn!(payment_id, error = %e, "Gateway status query failed");
                None
            }
        };

        match outcome {
            Some(outcome) => {
                self.apply_outcome(payment_id, outcome).await?;
                let current = self.load(payment_id).await?;
                Ok(PaymentStatusView::from(&current))
            }
            None => Ok(PaymentStatusView::from(&payment)),
        }
    }

    /// Expire open payments past `expires_at`. Returns how many this call expired.
    pub async fn expire_overdue(&self, now: DateTime<Utc>, limit: u32) -> Result<usize> {
        let overdue = self.payments.find_expired(now, limit).await?;
        let mut expired = 0;
        for payment in overdue {
            if self.timeout_check(&payment.id).await?.is_some() {
                expired += 1;
            }
        }
        Ok(expired)
    }

    pub async fn get_payment(&self, payment_id: &str) -> Result<PaymentTransaction> {
        self.load(payment_id).await
    }

    /// Single transition function for every path that settles a payment
    async fn apply_outcome(
        &self,
        payment_id: &str,
        outcome: PaymentOutcome,
    ) -> Result<Option<PaymentTransaction>> {
        let applied = self
            .payments
            .apply_outcome(payment_id, &outcome, Utc::now())
            .await?;

        let Some(payment) = &applied else {
            tracing::debug!(payment_id, to = %outcome.target_status(), "Transition lost or not allowed");
            return Ok(None);
        };

        self.timers.cancel(&payment.id);
        tracing::info!(
            payment_id = %payment.id,
            booking_id = %payment.booking_id,
            status = %payment.status,
            receipt = payment.gateway_receipt.as_deref().unwrap_or("-"),
            reason = payment.failure_reason.as_deref().unwrap_or("-"),
            "Payment settled"
        );

        if payment.status == PaymentStatus::Completed {
            let notifier = Arc::clone(&self.notifier);
            let completed = payment.clone();
            tokio::spawn(async move {
                if let Err(e) = notifier.payment_completed(&completed).await {
                    tracing::warn!(payment_id = %completed.id, error = %e, "Payment notification failed");
                }
            });
        }

        Ok(applied)
    }

    fn schedule_timeout(&self, payment: &PaymentTransaction) {
        let orchestrator = self.clone();
        let payment_id = payment.id.clone();
        self.timers.schedule(
            &payment.id,
            payment.remaining(Utc::now()),
            async move {
                if let Err(e) = orchestrator.timeout_check(&payment_id).await {
                    tracing::error!(%payment_id, error = %e, "Payment timeout check failed");
                }
            },
        );
    }

    async fn load(&self, payment_id: &str) -> Result<PaymentTransaction> {
        self.payments
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| AppError::PaymentNotFound(payment_id.to_string()))
    }
}

fn check_payable(booking: &Booking) -> Result<()> {
    if booking.is_payable() {
        return Ok(());
    }

    match booking.payment_status {
        BookingPaymentStatus::Completed | BookingPaymentStatus::Refunded => Err(
            AppError::validation(format!("Booking {} is already paid", booking.booking_reference)),
        ),
        BookingPaymentStatus::Pending => Err(AppError::conflict(format!(
            "Booking {} is {} and cannot be paid",
            booking.booking_reference, booking.status
        ))),
    }
}

fn query_outcome(result: QueryOutcome) -> Option<PaymentOutcome> {
    match result {
        QueryOutcome::Completed { receipt } => Some(PaymentOutcome::Completed {
            receipt,
            transaction_date: None,
        }),
        QueryOutcome::Cancelled(reason) => Some(PaymentOutcome::Cancelled(reason)),
        QueryOutcome::Failed(reason) => Some(PaymentOutcome::Failed(reason)),
        QueryOutcome::Pending => None,
    }
}
