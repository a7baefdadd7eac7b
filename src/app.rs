use std::sync::Arc;
use std::time::Duration;

use actix_web::web;
use sqlx::MySqlPool;

use crate::config::EngineSettings;
use crate::memory_store::MemoryStore;
use crate::middleware::{json_config, path_config, query_config};
use crate::modules::bookings::repositories::{BookingRepository, MySqlBookingRepository};
use crate::modules::bookings::BookingService;
use crate::modules::gateways::{CallbackVerifier, PushPaymentGateway};
use crate::modules::notifications::PaymentNotifier;
use crate::modules::payments::repositories::{
    MySqlPaymentRepository, MySqlWebhookRepository, PaymentRepository, WebhookRepository,
};
use crate::modules::payments::{ExpirationChecker, PaymentOrchestrator, TimeoutScheduler, WebhookLedger};
use crate::modules::refunds::repositories::{MySqlRefundRepository, RefundRepository};
use crate::modules::refunds::RefundService;
use crate::modules::trips::repositories::MySqlTripRepository;
use crate::modules::trips::TripRepository;
use crate::modules::{bookings, health, payments, refunds};

/// Storage backend handles shared by the services
#[derive(Clone)]
pub struct Repositories {
    pub trips: Arc<dyn TripRepository>,
    pub bookings: Arc<dyn BookingRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub webhooks: Arc<dyn WebhookRepository>,
    pub refunds: Arc<dyn RefundRepository>,
    /// Present for the MySQL backend; used by the readiness probe
    pub pool: Option<MySqlPool>,
}

impl Repositories {
    pub fn memory(store: MemoryStore) -> Self {
        let store = Arc::new(store);
        Self {
            trips: store.clone(),
            bookings: store.clone(),
            payments: store.clone(),
            webhooks: store.clone(),
            refunds: store,
            pool: None,
        }
    }

    pub fn mysql(pool: MySqlPool) -> Self {
        Self {
            trips: Arc::new(MySqlTripRepository::new(pool.clone())),
            bookings: Arc::new(MySqlBookingRepository::new(pool.clone())),
            payments: Arc::new(MySqlPaymentRepository::new(pool.clone())),
            webhooks: Arc::new(MySqlWebhookRepository::new(pool.clone())),
            refunds: Arc::new(MySqlRefundRepository::new(pool.clone())),
            pool: Some(pool),
        }
    }
}

/// Wired services, shared by every HTTP worker
#[derive(Clone)]
pub struct AppState {
    pub trips: Arc<dyn TripRepository>,
    pub bookings: Arc<BookingService>,
    pub orchestrator: Arc<PaymentOrchestrator>,
    pub refunds: Arc<RefundService>,
    pub ledger: WebhookLedger,
    pub timers: Arc<TimeoutScheduler>,
    pub verifier: CallbackVerifier,
    pool: Option<MySqlPool>,
}

impl AppState {
    pub fn new(
        repos: Repositories,
        gateway: Arc<dyn PushPaymentGateway>,
        notifier: Arc<dyn PaymentNotifier>,
        settings: EngineSettings,
    ) -> Self {
        let timers = TimeoutScheduler::new();
        let ledger = WebhookLedger::new(repos.webhooks.clone());

        let bookings = Arc::new(BookingService::new(
            repos.trips.clone(),
            repos.bookings.clone(),
            settings.booking,
        ));
        let orchestrator = Arc::new(PaymentOrchestrator::new(
            repos.payments.clone(),
            gateway,
            ledger.clone(),
            timers.clone(),
            notifier,
            settings.payment,
        ));
        let refunds = Arc::new(RefundService::new(repos.refunds.clone(), settings.refund));

        Self {
            trips: repos.trips,
            bookings,
            orchestrator,
            refunds,
            ledger,
            timers,
            verifier: CallbackVerifier::new(settings.callback_token),
            pool: repos.pool,
        }
    }

    /// Background sweep expiring overdue payments and unpaid bookings
    pub fn expiration_checker(&self, period: Duration) -> ExpirationChecker {
        ExpirationChecker::new(self.orchestrator.as_ref().clone(), self.bookings.clone(), period)
    }

    /// Register shared data, extractor configs and every route
    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(web::Data::new(self.bookings.clone()))
            .app_data(web::Data::new(self.orchestrator.clone()))
            .app_data(web::Data::new(self.refunds.clone()))
            .app_data(web::Data::new(self.verifier.clone()))
            .app_data(web::Data::new(self.timers.clone()))
            .app_data(json_config())
            .app_data(path_config())
            .app_data(query_config());

        if let Some(pool) = &self.pool {
            cfg.app_data(web::Data::new(pool.clone()));
        }

        health::controllers::configure(cfg);
        bookings::controllers::configure(cfg);
        payments::controllers::configure(cfg);
        refunds::controllers::configure(cfg);
    }
}
