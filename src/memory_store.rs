//! In-memory storage backend
//!
//! Implements every repository trait over a single async mutex. Holding the
//! lock for a whole operation gives each call the same all-or-nothing,
//! serial-per-entity behavior the MySQL repositories get from row locks.

use crate::core::{AppError, Result};
use crate::modules::bookings::models::{Booking, CancelOutcome};
use crate::modules::bookings::repositories::{BookingBuilder, BookingRepository};
use crate::modules::payments::models::{
    LedgerOutcome, PaymentOutcome, PaymentStatus, PaymentTransaction, WebhookLogEntry,
};
use crate::modules::payments::repositories::{PaymentBuilder, PaymentRepository, WebhookRepository};
use crate::modules::refunds::models::{RefundChange, RefundStatus, RefundTransaction};
use crate::modules::refunds::repositories::{RefundBuilder, RefundRepository};
use crate::modules::trips::{Trip, TripRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Default)]
struct State {
    trips: HashMap<String, Trip>,
    bookings: HashMap<String, Booking>,
    payments: HashMap<String, PaymentTransaction>,
    /// Keyed by `(webhook_type, gateway_request_id)`
    webhooks: HashMap<(String, String), WebhookLogEntry>,
    refunds: HashMap<String, RefundTransaction>,
}

impl State {
    fn booking_not_found(booking_id: &str) -> AppError {
        AppError::not_found(format!("Booking '{}'", booking_id))
    }

    fn has_open_payment(&self, booking_id: &str) -> bool {
        self.payments
            .values()
            .any(|p| p.booking_id == booking_id && !p.is_terminal())
    }

    fn refunds_total(&self, payment_id: &str, counts: impl Fn(RefundStatus) -> bool) -> Decimal {
        self.refunds
            .values()
            .filter(|r| r.original_payment_id == payment_id && counts(r.status))
            .map(|r| r.refund_amount)
            .sum()
    }

    /// Booking to cancel together with its trip, or the reason it cannot be
    fn cancel_booking(&mut self, booking_id: &str) -> Result<CancelOutcome> {
        let mut booking = self
            .bookings
            .get(booking_id)
            .cloned()
            .ok_or_else(|| Self::booking_not_found(booking_id))?;
        let mut trip = self
            .trips
            .get(&booking.trip_id)
            .cloned()
            .ok_or_else(|| AppError::TripNotFound(booking.trip_id.clone()))?;

        if !booking.cancel()? {
            return Ok(CancelOutcome::AlreadyCancelled(booking));
        }

        trip.release(booking.seats_booked);
        self.trips.insert(trip.id.clone(), trip);
        self.bookings.insert(booking.id.clone(), booking.clone());
        Ok(CancelOutcome::Cancelled(booking))
    }

    /// Payment and booking side of a completed refund
    fn settle_payment(&mut self, refund: &RefundTransaction, now: DateTime<Utc>) {
        let refunded = self.refunds_total(&refund.original_payment_id, |s| {
            s == RefundStatus::Completed
        });

        let Some(payment) = self.payments.get_mut(&refund.original_payment_id) else {
            return;
        };
        if refunded < payment.amount || payment.status != PaymentStatus::Completed {
            return;
        }

        payment.status = PaymentStatus::Refunded;
        payment.updated_at = now;
        if let Some(booking) = self.bookings.get_mut(&payment.booking_id) {
            booking.mark_refunded();
        }
    }
}

/// Shared in-memory store; clones share the same state
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TripRepository for MemoryStore {
    async fn create(&self, trip: &Trip) -> Result<Trip> {
        let mut state = self.state.lock().await;
        if state.trips.contains_key(&trip.id) {
            return Err(AppError::conflict(format!("Trip '{}' already exists", trip.id)));
        }

        state.trips.insert(trip.id.clone(), trip.clone());
        Ok(trip.clone())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Trip>> {
        Ok(self.state.lock().await.trips.get(id).cloned())
    }
}

#[async_trait]
impl BookingRepository for MemoryStore {
    async fn reserve_seats(&self, trip_id: &str, build: BookingBuilder<'_>) -> Result<Booking> {
        let mut state = self.state.lock().await;

        let mut trip = state
            .trips
            .get(trip_id)
            .cloned()
            .ok_or_else(|| AppError::TripNotFound(trip_id.to_string()))?;
        let active: Vec<Booking> = state
            .bookings
            .values()
            .filter(|b| b.trip_id == trip_id && b.status.is_active())
            .cloned()
            .collect();

        let booking = build(&trip, &active)?;
        trip.reserve(booking.seats_booked)?;

        state.trips.insert(trip.id.clone(), trip);
        state.bookings.insert(booking.id.clone(), booking.clone());
        Ok(booking)
    }

    async fn cancel(&self, booking_id: &str) -> Result<CancelOutcome> {
        self.state.lock().await.cancel_booking(booking_id)
    }

    async fn cancel_if_unpaid(
        &self,
        booking_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Booking>> {
        let mut state = self.state.lock().await;

        let booking = state
            .bookings
            .get(booking_id)
            .ok_or_else(|| State::booking_not_found(booking_id))?;
        if !booking.is_overdue(now) || state.has_open_payment(booking_id) {
            return Ok(None);
        }

        match state.cancel_booking(booking_id)? {
            CancelOutcome::Cancelled(booking) => Ok(Some(booking)),
            CancelOutcome::AlreadyCancelled(_) => Ok(None),
        }
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Booking>> {
        Ok(self.state.lock().await.bookings.get(id).cloned())
    }

    async fn find_active_by_trip(&self, trip_id: &str) -> Result<Vec<Booking>> {
        Ok(self
            .state
            .lock()
            .await
            .bookings
            .values()
            .filter(|b| b.trip_id == trip_id && b.status.is_active())
            .cloned()
            .collect())
    }

    async fn find_overdue(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<Booking>> {
        let state = self.state.lock().await;
        let mut overdue: Vec<Booking> = state
            .bookings
            .values()
            .filter(|b| b.is_overdue(now))
            .cloned()
            .collect();

        overdue.sort_by_key(|b| b.payment_deadline);
        overdue.truncate(limit as usize);
        Ok(overdue)
    }
}

#[async_trait]
impl PaymentRepository for MemoryStore {
    async fn insert_if_payable(
        &self,
        booking_id: &str,
        build: PaymentBuilder<'_>,
    ) -> Result<PaymentTransaction> {
        let mut state = self.state.lock().await;

        let booking = state
            .bookings
            .get(booking_id)
            .ok_or_else(|| State::booking_not_found(booking_id))?;
        let existing: Vec<PaymentTransaction> = state
            .payments
            .values()
            .filter(|p| p.booking_id == booking_id)
            .cloned()
            .collect();

        let payment = build(booking, &existing)?;
        state.payments.insert(payment.id.clone(), payment.clone());
        Ok(payment)
    }

    async fn mark_processing(
        &self,
        payment_id: &str,
        checkout_request_id: &str,
        merchant_request_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<PaymentTransaction>> {
        let mut state = self.state.lock().await;

        let Some(payment) = state.payments.get_mut(payment_id) else {
            return Ok(None);
        };
        if !payment.accept(checkout_request_id, merchant_request_id, now) {
            return Ok(None);
        }
        Ok(Some(payment.clone()))
    }

    async fn apply_outcome(
        &self,
        payment_id: &str,
        outcome: &PaymentOutcome,
        now: DateTime<Utc>,
    ) -> Result<Option<PaymentTransaction>> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let payment = state
            .payments
            .get_mut(payment_id)
            .ok_or_else(|| AppError::PaymentNotFound(payment_id.to_string()))?;
        if !payment.apply(outcome, now) {
            return Ok(None);
        }

        if payment.status == PaymentStatus::Completed {
            if let Some(booking) = state.bookings.get_mut(&payment.booking_id) {
                if !booking.record_payment(payment.amount) {
                    tracing::warn!(
                        payment_id = %payment.id,
                        booking_id = %booking.id,
                        booking_status = %booking.status,
                        "Payment completed for inactive booking; refund required"
                    );
                }
            }
        }

        Ok(Some(payment.clone()))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<PaymentTransaction>> {
        Ok(self.state.lock().await.payments.get(id).cloned())
    }

    async fn find_by_gateway_request_id(
        &self,
        gateway_request_id: &str,
    ) -> Result<Option<PaymentTransaction>> {
        Ok(self
            .state
            .lock()
            .await
            .payments
            .values()
            .find(|p| p.gateway_request_id.as_deref() == Some(gateway_request_id))
            .cloned())
    }

    async fn find_expired(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<PaymentTransaction>> {
        let state = self.state.lock().await;
        let mut expired: Vec<PaymentTransaction> = state
            .payments
            .values()
            .filter(|p| !p.is_terminal() && p.expires_at < now)
            .cloned()
            .collect();

        expired.sort_by_key(|p| p.expires_at);
        expired.truncate(limit as usize);
        Ok(expired)
    }
}

#[async_trait]
impl WebhookRepository for MemoryStore {
    async fn record(&self, entry: &WebhookLogEntry) -> Result<LedgerOutcome> {
        let mut state = self.state.lock().await;
        let key = (entry.webhook_type.clone(), entry.gateway_request_id.clone());

        match state.webhooks.get_mut(&key) {
            Some(existing) if existing.processed => Ok(LedgerOutcome::AlreadyProcessed),
            Some(existing) => {
                existing.retry_count += 1;
                Ok(LedgerOutcome::Redelivered {
                    retry_count: existing.retry_count,
                })
            }
            None => {
                state.webhooks.insert(key, entry.clone());
                Ok(LedgerOutcome::FirstSeen)
            }
        }
    }

    async fn mark_processed(
        &self,
        webhook_type: &str,
        gateway_request_id: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let key = (webhook_type.to_string(), gateway_request_id.to_string());
        if let Some(entry) = state.webhooks.get_mut(&key) {
            entry.processed = true;
            entry.processing_error = None;
            entry.processed_at = Some(now);
        }
        Ok(())
    }

    async fn mark_failed(
        &self,
        webhook_type: &str,
        gateway_request_id: &str,
        error: &str,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let key = (webhook_type.to_string(), gateway_request_id.to_string());
        if let Some(entry) = state.webhooks.get_mut(&key).filter(|e| !e.processed) {
            entry.processing_error = Some(error.to_string());
        }
        Ok(())
    }

    async fn find(
        &self,
        webhook_type: &str,
        gateway_request_id: &str,
    ) -> Result<Option<WebhookLogEntry>> {
        let key = (webhook_type.to_string(), gateway_request_id.to_string());
        Ok(self.state.lock().await.webhooks.get(&key).cloned())
    }
}

#[async_trait]
impl RefundRepository for MemoryStore {
    async fn insert_if_refundable(
        &self,
        payment_id: &str,
        build: RefundBuilder<'_>,
    ) -> Result<RefundTransaction> {
        let mut state = self.state.lock().await;

        let payment = state
            .payments
            .get(payment_id)
            .ok_or_else(|| AppError::PaymentNotFound(payment_id.to_string()))?;
        let committed = state.refunds_total(payment_id, |s| s.holds_funds());

        let refund = build(payment, committed)?;
        state.refunds.insert(refund.id.clone(), refund.clone());
        Ok(refund)
    }

    async fn apply_change(
        &self,
        refund_id: &str,
        change: &RefundChange,
        now: DateTime<Utc>,
    ) -> Result<Option<RefundTransaction>> {
        let mut state = self.state.lock().await;

        let refund = state
            .refunds
            .get_mut(refund_id)
            .ok_or_else(|| AppError::not_found(format!("Refund '{}'", refund_id)))?;
        if !refund.apply(change, now) {
            return Ok(None);
        }

        let refund = refund.clone();
        if refund.status == RefundStatus::Completed {
            state.settle_payment(&refund, now);
        }
        Ok(Some(refund))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<RefundTransaction>> {
        Ok(self.state.lock().await.refunds.get(id).cloned())
    }
}
