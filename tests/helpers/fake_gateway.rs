// Scripted gateway and recording notifier
//
// The gateway answers push requests according to its current mode and hands
// out sequential checkout request ids, unless the next id was set explicitly.

use async_trait::async_trait;
use fleetpay::core::{AppError, Result};
use fleetpay::modules::gateways::{PushOutcome, PushPaymentGateway, PushRequest, QueryOutcome};
use fleetpay::modules::notifications::PaymentNotifier;
use fleetpay::modules::payments::PaymentTransaction;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushMode {
    Accept,
    Reject(String),
    Unavailable,
}

pub struct FakeGateway {
    mode: Mutex<PushMode>,
    query: Mutex<QueryOutcome>,
    next_checkout_id: Mutex<Option<String>>,
    pushes: Mutex<Vec<PushRequest>>,
    queries: AtomicUsize,
    sequence: AtomicUsize,
    checkout_prefix: String,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self::with_checkout_prefix("ws_CO_TEST")
    }
}

impl FakeGateway {
    /// Sequential checkout ids become `<prefix>_<n>`
    pub fn with_checkout_prefix(prefix: &str) -> Self {
        Self {
            mode: Mutex::new(PushMode::Accept),
            query: Mutex::new(QueryOutcome::Pending),
            next_checkout_id: Mutex::new(None),
            pushes: Mutex::new(Vec::new()),
            queries: AtomicUsize::new(0),
            sequence: AtomicUsize::new(0),
            checkout_prefix: prefix.to_string(),
        }
    }

    pub fn set_mode(&self, mode: PushMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn set_query_outcome(&self, outcome: QueryOutcome) {
        *self.query.lock().unwrap() = outcome;
    }

    /// Checkout request id handed out by the next accepted push
    pub fn set_next_checkout_id(&self, id: &str) {
        *self.next_checkout_id.lock().unwrap() = Some(id.to_string());
    }

    pub fn pushes(&self) -> Vec<PushRequest> {
        self.pushes.lock().unwrap().clone()
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushPaymentGateway for FakeGateway {
    async fn initiate_push(&self, request: PushRequest) -> Result<PushOutcome> {
        self.pushes.lock().unwrap().push(request);

        let mode = self.mode.lock().unwrap().clone();
        match mode {
            PushMode::Accept => {
                let n = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
                let checkout_request_id = self
                    .next_checkout_id
                    .lock()
                    .unwrap()
                    .take()
                    .unwrap_or_else(|| format!("{}_{}", self.checkout_prefix, n));

                Ok(PushOutcome::Accepted {
                    checkout_request_id,
                    merchant_request_id: format!("mr-{}", n),
                    customer_message: Some("Success. Request accepted for processing".to_string()),
                })
            }
            PushMode::Reject(reason) => Ok(PushOutcome::Rejected(reason)),
            PushMode::Unavailable => Err(AppError::gateway_unavailable("M-Pesa timeout")),
        }
    }

    async fn query_status(&self, _checkout_request_id: &str) -> Result<QueryOutcome> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.query.lock().unwrap().clone())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Notifier that remembers every completed payment it was told about
#[derive(Default)]
pub struct RecordingNotifier {
    completed: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn completed(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }

    pub fn count_for(&self, payment_id: &str) -> usize {
        self.completed
            .lock()
            .unwrap()
            .iter()
            .filter(|id| id.as_str() == payment_id)
            .count()
    }
}

#[async_trait]
impl PaymentNotifier for RecordingNotifier {
    async fn payment_completed(&self, payment: &PaymentTransaction) -> Result<()> {
        self.completed.lock().unwrap().push(payment.id.clone());
        Ok(())
    }
}
