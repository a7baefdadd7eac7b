// Contract tests for the payment and refund API
//
// Validates request/response shapes and error envelopes for:
// - POST /payments/initiate
// - GET /payments/status/{paymentId}
// - POST /payments/mpesa/callback
// - POST /refunds and the refund decision endpoints
// - GET /health

#[path = "../helpers/mod.rs"]
mod helpers;

use actix_web::{http::StatusCode, test, App};
use fleetpay::config::EngineSettings;
use fleetpay::modules::gateways::QueryOutcome;
use fleetpay::modules::payments::PaymentStatus;
use helpers::*;
use rust_decimal_macros::dec;
use serde_json::{json, Value};

fn initiate_payload(booking_id: &str, amount: &str) -> Value {
    json!({
        "bookingId": booking_id,
        "phone": TEST_PHONE,
        "amount": amount
    })
}

fn assert_ack(body: &Value) {
    assert_eq!(body["ResultCode"], 0);
    assert_eq!(body["ResultDesc"], "Success");
}

#[actix_web::test]
async fn test_initiate_payment_returns_processing_with_gateway_id() {
    let engine = TestEngine::new();
    let trip = engine.seed_trip(10, dec!(1500)).await;
    let booking = engine.book(&trip.id, &["1"]).await.unwrap();
    let app = test::init_service(App::new().configure(|cfg| engine.state.configure(cfg))).await;

    let req = test::TestRequest::post()
        .uri("/payments/initiate")
        .set_json(initiate_payload(&booking.id, "1500"))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["paymentId"].is_string());
    assert_eq!(body["gatewayRequestId"], "ws_CO_TEST_1");
    assert_eq!(body["status"], "processing");
    assert!(body["reference"].as_str().unwrap().starts_with("PAY"));
    assert!(body["message"].is_string());

    let pushes = engine.gateway.pushes();
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].phone_number, TEST_MSISDN);
    assert_eq!(pushes[0].amount, dec!(1500));
    assert_eq!(pushes[0].account_reference, body["reference"].as_str().unwrap());
}

#[actix_web::test]
async fn test_initiate_payment_error_envelopes() {
    let engine = TestEngine::new();
    let trip = engine.seed_trip(10, dec!(1500)).await;
    let booking = engine.book(&trip.id, &["1"]).await.unwrap();
    let app = test::init_service(App::new().configure(|cfg| engine.state.configure(cfg))).await;

    let cases = vec![
        ("unknown booking", initiate_payload("missing", "1500"), StatusCode::NOT_FOUND, "NOT_FOUND"),
        ("wrong amount", initiate_payload(&booking.id, "1000"), StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        ("zero amount", initiate_payload(&booking.id, "0"), StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        (
            "bad phone",
            json!({ "bookingId": booking.id, "phone": "0201234", "amount": "1500" }),
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
        ),
    ];

    for (name, payload, status, code) in cases {
        let req = test::TestRequest::post()
            .uri("/payments/initiate")
            .set_json(payload)
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), status, "{}", name);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["code"], code, "{}", name);
    }

    assert!(engine.gateway.pushes().is_empty());
}

#[actix_web::test]
async fn test_gateway_refusals_map_to_402_and_503() {
    let engine = TestEngine::new();
    let trip = engine.seed_trip(10, dec!(1500)).await;
    let booking = engine.book(&trip.id, &["1"]).await.unwrap();
    let app = test::init_service(App::new().configure(|cfg| engine.state.configure(cfg))).await;

    engine.gateway.set_mode(PushMode::Reject("Invalid Access Token".to_string()));
    let req = test::TestRequest::post()
        .uri("/payments/initiate")
        .set_json(initiate_payload(&booking.id, "1500"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::PAYMENT_REQUIRED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["code"], "PAYMENT_REJECTED");

    // The failed attempt does not block a new one
    engine.gateway.set_mode(PushMode::Unavailable);
    let req = test::TestRequest::post()
        .uri("/payments/initiate")
        .set_json(initiate_payload(&booking.id, "1500"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["code"], "GATEWAY_UNAVAILABLE");
}

#[actix_web::test]
async fn test_second_initiate_returns_409() {
    let engine = TestEngine::new();
    let trip = engine.seed_trip(10, dec!(1500)).await;
    let booking = engine.book(&trip.id, &["1"]).await.unwrap();
    engine.pay(&booking).await.unwrap();
    let app = test::init_service(App::new().configure(|cfg| engine.state.configure(cfg))).await;

    let req = test::TestRequest::post()
        .uri("/payments/initiate")
        .set_json(initiate_payload(&booking.id, "1500"))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["code"], "PAYMENT_ALREADY_IN_PROGRESS");
}

#[actix_web::test]
async fn test_status_endpoint_refreshes_from_gateway() {
    let engine = TestEngine::new();
    let trip = engine.seed_trip(10, dec!(1500)).await;
    let booking = engine.book(&trip.id, &["1"]).await.unwrap();
    let payment = engine.pay(&booking).await.unwrap();
    let app = test::init_service(App::new().configure(|cfg| engine.state.configure(cfg))).await;
    let uri = format!("/payments/status/{}", payment.payment_id);

    let req = test::TestRequest::get().uri(&uri).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "processing");
    assert_eq!(body["bookingId"], booking.id.as_str());
    assert_eq!(engine.gateway.query_count(), 1);

    engine.gateway.set_query_outcome(QueryOutcome::Completed {
        receipt: Some("QRY987".to_string()),
    });
    let req = test::TestRequest::get().uri(&uri).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "completed");
    assert_eq!(body["receipt"], "QRY987");

    // Settled payments are served from storage
    let req = test::TestRequest::get().uri(&uri).to_request();
    let _: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(engine.gateway.query_count(), 2);

    let req = test::TestRequest::get().uri("/payments/status/missing").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["code"], "PAYMENT_NOT_FOUND");
}

#[actix_web::test]
async fn test_callback_completes_payment_and_acks() {
    let engine = TestEngine::new();
    let trip = engine.seed_trip(10, dec!(1500)).await;
    let booking = engine.book(&trip.id, &["1"]).await.unwrap();
    let payment = engine.pay(&booking).await.unwrap();
    let checkout_id = payment.gateway_request_id.clone().unwrap();
    let app = test::init_service(App::new().configure(|cfg| engine.state.configure(cfg))).await;

    let req = test::TestRequest::post()
        .uri("/payments/mpesa/callback")
        .set_json(stk_success(&checkout_id, 1500, "ABC123"))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_ack(&body);

    let stored = engine.payment(&payment.payment_id).await;
    assert_eq!(stored.status, PaymentStatus::Completed);
    assert_eq!(stored.gateway_receipt.as_deref(), Some("ABC123"));
    assert_eq!(engine.booking(&booking.id).await.status.to_string(), "confirmed");
}

#[actix_web::test]
async fn test_callback_acks_garbage_and_unknown_ids() {
    let engine = TestEngine::new();
    let app = test::init_service(App::new().configure(|cfg| engine.state.configure(cfg))).await;

    let payloads = vec![
        "not json at all".to_string(),
        "{}".to_string(),
        json!({ "Body": { "stkCallback": { "ResultCode": 0 } } }).to_string(),
        stk_success("ws_CO_UNKNOWN", 100, "XYZ").to_string(),
    ];

    for payload in payloads {
        let req = test::TestRequest::post()
            .uri("/payments/mpesa/callback")
            .insert_header(("content-type", "application/json"))
            .set_payload(payload.clone())
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK, "{}", payload);
        let body: Value = test::read_body_json(resp).await;
        assert_ack(&body);
    }
}

#[actix_web::test]
async fn test_callback_with_wrong_token_is_acked_but_ignored() {
    let engine = TestEngine::with_settings(EngineSettings {
        callback_token: Some("s3cret".to_string()),
        ..EngineSettings::default()
    });
    let trip = engine.seed_trip(10, dec!(1500)).await;
    let booking = engine.book(&trip.id, &["1"]).await.unwrap();
    let payment = engine.pay(&booking).await.unwrap();
    let checkout_id = payment.gateway_request_id.clone().unwrap();
    let app = test::init_service(App::new().configure(|cfg| engine.state.configure(cfg))).await;

    for uri in ["/payments/mpesa/callback", "/payments/mpesa/callback?token=guess"] {
        let req = test::TestRequest::post()
            .uri(uri)
            .set_json(stk_success(&checkout_id, 1500, "ABC123"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
    assert_eq!(
        engine.payment(&payment.payment_id).await.status,
        PaymentStatus::Processing
    );

    let req = test::TestRequest::post()
        .uri("/payments/mpesa/callback?token=s3cret")
        .set_json(stk_success(&checkout_id, 1500, "ABC123"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        engine.payment(&payment.payment_id).await.status,
        PaymentStatus::Completed
    );
}

#[actix_web::test]
async fn test_refund_endpoints() {
    let engine = TestEngine::new();
    let trip = engine.seed_trip(10, dec!(1500)).await;
    let booking = engine.book(&trip.id, &["1"]).await.unwrap();
    let payment = engine.pay(&booking).await.unwrap();
    let checkout_id = payment.gateway_request_id.clone().unwrap();
    engine
        .state
        .orchestrator
        .handle_callback(stk_success(&checkout_id, 1500, "ABC123"))
        .await
        .unwrap();
    let app = test::init_service(App::new().configure(|cfg| engine.state.configure(cfg))).await;

    // Above the approval threshold
    let req = test::TestRequest::post()
        .uri("/refunds")
        .set_json(json!({
            "paymentId": payment.payment_id,
            "amount": "1200",
            "reason": "trip_cancelled_by_operator",
            "requestedBy": "ops@fleet.co.ke"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let refund: Value = test::read_body_json(resp).await;
    assert_eq!(refund["status"], "pending");
    assert_eq!(refund["requiresApproval"], true);
    assert!(refund["refundReference"].as_str().unwrap().starts_with("RFD"));
    let refund_id = refund["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri(&format!("/refunds/{}/approve", refund_id))
        .set_json(json!({ "approvedBy": "manager-7" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "processing");
    assert_eq!(body["approvedBy"], "manager-7");

    // Rejection is only possible while pending
    let req = test::TestRequest::post()
        .uri(&format!("/refunds/{}/reject", refund_id))
        .set_json(json!({ "reason": "changed my mind" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["code"], "INVALID_TRANSITION");

    let req = test::TestRequest::post()
        .uri(&format!("/refunds/{}/payout", refund_id))
        .set_json(json!({ "success": true, "payoutReference": "B2C-001" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "completed");
    assert_eq!(body["payoutReference"], "B2C-001");

    let req = test::TestRequest::get()
        .uri(&format!("/refunds/{}", refund_id))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "completed");

    // 1200 of 1500 is gone; 400 more is too much
    let req = test::TestRequest::post()
        .uri("/refunds")
        .set_json(json!({
            "paymentId": payment.payment_id,
            "amount": "400",
            "reason": "passenger_request"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["code"], "REFUND_EXCEEDS_ORIGINAL");
}

#[actix_web::test]
async fn test_refund_for_unpaid_payment_returns_409() {
    let engine = TestEngine::new();
    let trip = engine.seed_trip(10, dec!(1500)).await;
    let booking = engine.book(&trip.id, &["1"]).await.unwrap();
    let payment = engine.pay(&booking).await.unwrap();
    let app = test::init_service(App::new().configure(|cfg| engine.state.configure(cfg))).await;

    let req = test::TestRequest::post()
        .uri("/refunds")
        .set_json(json!({
            "paymentId": payment.payment_id,
            "amount": "100",
            "reason": "other"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["code"], "PAYMENT_NOT_COMPLETED");

    let req = test::TestRequest::get().uri("/refunds/missing").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_health_reports_armed_timers() {
    let engine = TestEngine::new();
    let trip = engine.seed_trip(10, dec!(1500)).await;
    let booking = engine.book(&trip.id, &["1"]).await.unwrap();
    engine.pay(&booking).await.unwrap();
    let app = test::init_service(App::new().configure(|cfg| engine.state.configure(cfg))).await;

    let req = test::TestRequest::get().uri("/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["armedPaymentTimers"], 1);
}
