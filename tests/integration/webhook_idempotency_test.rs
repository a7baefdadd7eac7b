// Webhook idempotency tests
//
// Every callback delivery lands in the ledger before any business effect;
// duplicates, early arrivals and unusable payloads must each have exactly
// the effect described by the ledger entry.

#[path = "../helpers/mod.rs"]
mod helpers;

use fleetpay::modules::bookings::BookingStatus;
use fleetpay::modules::payments::models::webhook_log::payload_digest;
use fleetpay::modules::payments::models::STK_CALLBACK;
use fleetpay::modules::payments::PaymentStatus;
use helpers::*;
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn test_duplicate_callback_has_single_effect() {
    let engine = TestEngine::new();
    let trip = engine.seed_trip(10, dec!(500)).await;
    let booking = engine.book(&trip.id, &["1"]).await.unwrap();
    let initiated = engine.pay(&booking).await.unwrap();
    let checkout_id = initiated.gateway_request_id.clone().unwrap();

    for _ in 0..3 {
        engine
            .state
            .orchestrator
            .handle_callback(stk_success(&checkout_id, 500, "ABC123"))
            .await
            .unwrap();
    }
    engine.settle().await;

    let entry = engine
        .state
        .ledger
        .find(STK_CALLBACK, &checkout_id)
        .await
        .unwrap()
        .expect("ledger entry");
    assert!(entry.processed);
    assert!(entry.processed_at.is_some());
    assert!(entry.processing_error.is_none());

    assert_eq!(engine.notifier.count_for(&initiated.payment_id), 1);
    let booking = engine.booking(&booking.id).await;
    assert_eq!(booking.amount_paid, dec!(500));
    assert_eq!(booking.status, BookingStatus::Confirmed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicates_notify_once() {
    let engine = TestEngine::new();
    let trip = engine.seed_trip(10, dec!(500)).await;
    let booking = engine.book(&trip.id, &["1"]).await.unwrap();
    let initiated = engine.pay(&booking).await.unwrap();
    let checkout_id = initiated.gateway_request_id.clone().unwrap();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let orchestrator = engine.state.orchestrator.clone();
        let payload = stk_success(&checkout_id, 500, "ABC123");
        handles.push(tokio::spawn(async move { orchestrator.handle_callback(payload).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    engine.settle().await;

    assert_eq!(engine.notifier.count_for(&initiated.payment_id), 1);
    assert_eq!(engine.booking(&booking.id).await.amount_paid, dec!(500));
}

#[tokio::test]
async fn test_callback_before_acceptance_is_replayed() {
    let engine = TestEngine::new();
    let trip = engine.seed_trip(10, dec!(500)).await;
    let booking = engine.book(&trip.id, &["1"]).await.unwrap();

    // The result arrives before the push response is handled
    engine
        .state
        .orchestrator
        .handle_callback(stk_success("ws_CO_EARLY", 500, "EARLY01"))
        .await
        .unwrap();
    let entry = engine
        .state
        .ledger
        .find(STK_CALLBACK, "ws_CO_EARLY")
        .await
        .unwrap()
        .expect("early entry recorded");
    assert!(!entry.processed);
    assert!(entry.processing_error.is_some());

    engine.gateway.set_next_checkout_id("ws_CO_EARLY");
    let initiated = engine.pay(&booking).await.unwrap();
    assert_eq!(initiated.gateway_request_id.as_deref(), Some("ws_CO_EARLY"));
    assert_eq!(initiated.status, PaymentStatus::Completed);
    engine.settle().await;

    let payment = engine.payment(&initiated.payment_id).await;
    assert_eq!(payment.status, PaymentStatus::Completed);
    assert_eq!(payment.gateway_receipt.as_deref(), Some("EARLY01"));
    assert_eq!(engine.booking(&booking.id).await.status, BookingStatus::Confirmed);
    assert_eq!(engine.notifier.count_for(&payment.id), 1);

    let entry = engine
        .state
        .ledger
        .find(STK_CALLBACK, "ws_CO_EARLY")
        .await
        .unwrap()
        .unwrap();
    assert!(entry.processed);
}

#[tokio::test]
async fn test_cancelled_by_user_keeps_booking_pending() {
    let engine = TestEngine::new();
    let trip = engine.seed_trip(10, dec!(500)).await;
    let booking = engine.book(&trip.id, &["1"]).await.unwrap();
    let initiated = engine.pay(&booking).await.unwrap();
    let checkout_id = initiated.gateway_request_id.clone().unwrap();

    engine
        .state
        .orchestrator
        .handle_callback(stk_cancelled(&checkout_id))
        .await
        .unwrap();

    let payment = engine.payment(&initiated.payment_id).await;
    assert_eq!(payment.status, PaymentStatus::Cancelled);
    assert_eq!(payment.failure_reason.as_deref(), Some("Request cancelled by user"));
    assert_eq!(engine.booking(&booking.id).await.status, BookingStatus::Pending);
    assert!(!engine.state.timers.is_armed(&payment.id));

    // A success redelivered under the same id is a duplicate
    engine
        .state
        .orchestrator
        .handle_callback(stk_success(&checkout_id, 500, "ABC123"))
        .await
        .unwrap();
    assert_eq!(
        engine.payment(&initiated.payment_id).await.status,
        PaymentStatus::Cancelled
    );
    assert!(engine.notifier.completed().is_empty());
}

#[tokio::test]
async fn test_unattributed_payload_is_kept_for_audit() {
    let engine = TestEngine::new();
    let payload = json!({ "Body": { "stkCallback": { "ResultCode": 0 } } });

    engine
        .state
        .orchestrator
        .handle_callback(payload.clone())
        .await
        .unwrap();
    engine
        .state
        .orchestrator
        .handle_callback(payload.clone())
        .await
        .unwrap();

    let key = format!("unattributed:{}", payload_digest(&payload));
    let entry = engine
        .state
        .ledger
        .find(STK_CALLBACK, &key)
        .await
        .unwrap()
        .expect("unattributed entry");
    assert!(!entry.processed);
    assert!(entry.processing_error.is_some());
    assert_eq!(entry.raw_payload, payload);
    assert_eq!(entry.retry_count, 1);
}

#[tokio::test]
async fn test_malformed_callback_with_request_id_is_recorded() {
    let engine = TestEngine::new();
    let trip = engine.seed_trip(10, dec!(500)).await;
    let booking = engine.book(&trip.id, &["1"]).await.unwrap();
    let initiated = engine.pay(&booking).await.unwrap();
    let checkout_id = initiated.gateway_request_id.clone().unwrap();

    let payload = json!({
        "Body": {
            "stkCallback": {
                "CheckoutRequestID": checkout_id,
                "ResultCode": "not-a-number",
                "ResultDesc": "?"
            }
        }
    });
    engine
        .state
        .orchestrator
        .handle_callback(payload)
        .await
        .unwrap();

    let entry = engine
        .state
        .ledger
        .find(STK_CALLBACK, &checkout_id)
        .await
        .unwrap()
        .expect("entry");
    assert!(!entry.processed);
    assert!(entry.processing_error.as_deref().unwrap().contains("ResultCode"));
    assert_eq!(
        engine.payment(&initiated.payment_id).await.status,
        PaymentStatus::Processing
    );

    // The proper delivery still gets through
    engine
        .state
        .orchestrator
        .handle_callback(stk_success(&checkout_id, 500, "ABC123"))
        .await
        .unwrap();
    assert_eq!(
        engine.payment(&initiated.payment_id).await.status,
        PaymentStatus::Completed
    );
}

#[tokio::test]
async fn test_result_code_as_string_is_accepted() {
    let engine = TestEngine::new();
    let trip = engine.seed_trip(10, dec!(500)).await;
    let booking = engine.book(&trip.id, &["1"]).await.unwrap();
    let initiated = engine.pay(&booking).await.unwrap();
    let checkout_id = initiated.gateway_request_id.clone().unwrap();

    let mut payload = stk_failure(&checkout_id, 0, "");
    payload["Body"]["stkCallback"]["ResultCode"] = json!("1032");
    payload["Body"]["stkCallback"]["ResultDesc"] = json!("Request cancelled by user");

    engine
        .state
        .orchestrator
        .handle_callback(payload)
        .await
        .unwrap();

    assert_eq!(
        engine.payment(&initiated.payment_id).await.status,
        PaymentStatus::Cancelled
    );
}
