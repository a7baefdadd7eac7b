use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info};

use super::payment_orchestrator::PaymentOrchestrator;
use crate::core::Result;
use crate::modules::bookings::services::BookingService;
use chrono::Utc;

/// Rows handled per entity per sweep
const SWEEP_BATCH_SIZE: u32 = 200;

/// What one sweep changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_payments: usize,
    pub cancelled_bookings: usize,
}

/// Background job expiring overdue payments and unpaid bookings
///
/// Expires `pending`/`processing` payments past `expires_at` (timers lost on
/// restart) and cancels pending bookings past their payment deadline that
/// have no open payment, releasing their seats.
pub struct ExpirationChecker {
    orchestrator: PaymentOrchestrator,
    bookings: Arc<BookingService>,
    period: Duration,
}

impl ExpirationChecker {
    pub fn new(orchestrator: PaymentOrchestrator, bookings: Arc<BookingService>, period: Duration) -> Self {
        Self {
            orchestrator,
            bookings,
            period,
        }
    }

    /// Start the background expiration checker
    /// This should be spawned as a tokio task in main.rs
    pub async fn start(self: Arc<Self>) {
        info!(period_secs = self.period.as_secs(), "Starting payment expiration checker");

        let mut ticker = interval(self.period);

        loop {
            ticker.tick().await;

            match self.run_once().await {
                Ok(report) => {
                    if report != SweepReport::default() {
                        info!(
                            expired_payments = report.expired_payments,
                            cancelled_bookings = report.cancelled_bookings,
                            "Expiration sweep processed"
                        );
                    }
                }
                Err(e) => {
                    error!(
                        error = %e,
                        "Error running expiration sweep"
                    );
                }
            }
        }
    }

    pub async fn run_once(&self) -> Result<SweepReport> {
        let now = Utc::now();
        let expired_payments = self.orchestrator.expire_overdue(now, SWEEP_BATCH_SIZE).await?;
        let cancelled_bookings = self.bookings.expire_overdue(now, SWEEP_BATCH_SIZE).await?;

        Ok(SweepReport {
            expired_payments,
            cancelled_bookings,
        })
    }
}
