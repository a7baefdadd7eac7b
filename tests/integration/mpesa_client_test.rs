// M-Pesa client tests against a fake Daraja server
//
// The fake serves the OAuth, STK push and STK query endpoints on a local
// port and counts what it receives, so token caching, retries and result
// mapping can be checked without the real sandbox.

use actix_web::{web, App, HttpRequest, HttpResponse};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use fleetpay::config::{MpesaConfig, MpesaEnvironment};
use fleetpay::core::AppError;
use fleetpay::modules::gateways::{MpesaClient, PushOutcome, PushPaymentGateway, PushRequest, QueryOutcome};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const BASIC_KEY_SECRET: &str = "Basic a2V5OnNlY3JldA==";

struct FakeDaraja {
    token_requests: AtomicUsize,
    push_requests: AtomicUsize,
    query_requests: AtomicUsize,
    reject_next_token: AtomicBool,
    token_expires_in: Mutex<Value>,
    push_response: Mutex<(u16, Value)>,
    query_response: Mutex<(u16, Value)>,
    last_push: Mutex<Option<Value>>,
    bearers: Mutex<Vec<String>>,
}

impl FakeDaraja {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            token_requests: AtomicUsize::new(0),
            push_requests: AtomicUsize::new(0),
            query_requests: AtomicUsize::new(0),
            reject_next_token: AtomicBool::new(false),
            token_expires_in: Mutex::new(json!("3599")),
            push_response: Mutex::new((200, accepted("ws_CO_191220191020363925"))),
            query_response: Mutex::new((200, query_result("0", "The service request is processed successfully."))),
            last_push: Mutex::new(None),
            bearers: Mutex::new(Vec::new()),
        })
    }

    fn respond_to_push(&self, status: u16, body: Value) {
        *self.push_response.lock().unwrap() = (status, body);
    }

    fn respond_to_query(&self, status: u16, body: Value) {
        *self.query_response.lock().unwrap() = (status, body);
    }

    fn bearer(&self, req: &HttpRequest) -> Option<String> {
        let header = req.headers().get("authorization")?.to_str().ok()?;
        let token = header.strip_prefix("Bearer ")?.to_string();
        self.bearers.lock().unwrap().push(token.clone());
        Some(token)
    }
}

fn accepted(checkout_request_id: &str) -> Value {
    json!({
        "MerchantRequestID": "29115-34620561-1",
        "CheckoutRequestID": checkout_request_id,
        "ResponseCode": "0",
        "ResponseDescription": "Success. Request accepted for processing",
        "CustomerMessage": "Success. Request accepted for processing"
    })
}

fn query_result(code: &str, description: &str) -> Value {
    json!({
        "ResponseCode": "0",
        "ResponseDescription": "The service request has been accepted successsfully",
        "MerchantRequestID": "29115-34620561-1",
        "CheckoutRequestID": "ws_CO_191220191020363925",
        "ResultCode": code,
        "ResultDesc": description
    })
}

fn reply(status: u16, body: Value) -> HttpResponse {
    let status = actix_web::http::StatusCode::from_u16(status).unwrap();
    HttpResponse::build(status).json(body)
}

async fn oauth(daraja: web::Data<Arc<FakeDaraja>>, req: HttpRequest) -> HttpResponse {
    let authorization = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if authorization != BASIC_KEY_SECRET || req.query_string() != "grant_type=client_credentials" {
        return reply(400, json!({ "errorCode": "400.008.01", "errorMessage": "Invalid Authentication passed" }));
    }

    let n = daraja.token_requests.fetch_add(1, Ordering::SeqCst) + 1;
    let expires_in = daraja.token_expires_in.lock().unwrap().clone();
    HttpResponse::Ok().json(json!({ "access_token": format!("token-{}", n), "expires_in": expires_in }))
}

async fn stk_push(daraja: web::Data<Arc<FakeDaraja>>, req: HttpRequest, body: web::Json<Value>) -> HttpResponse {
    daraja.push_requests.fetch_add(1, Ordering::SeqCst);
    if daraja.bearer(&req).is_none() || daraja.reject_next_token.swap(false, Ordering::SeqCst) {
        return reply(401, json!({ "errorCode": "404.001.03", "errorMessage": "Invalid Access Token" }));
    }

    *daraja.last_push.lock().unwrap() = Some(body.into_inner());
    let (status, body) = daraja.push_response.lock().unwrap().clone();
    reply(status, body)
}

async fn stk_query(daraja: web::Data<Arc<FakeDaraja>>, req: HttpRequest) -> HttpResponse {
    daraja.query_requests.fetch_add(1, Ordering::SeqCst);
    if daraja.bearer(&req).is_none() {
        return reply(401, json!({ "errorCode": "404.001.03", "errorMessage": "Invalid Access Token" }));
    }

    let (status, body) = daraja.query_response.lock().unwrap().clone();
    reply(status, body)
}

fn start_daraja(daraja: Arc<FakeDaraja>) -> actix_test::TestServer {
    actix_test::start(move || {
        App::new()
            .app_data(web::Data::new(daraja.clone()))
            .route("/oauth/v1/generate", web::get().to(oauth))
            .route("/mpesa/stkpush/v1/processrequest", web::post().to(stk_push))
            .route("/mpesa/stkpushquery/v1/query", web::post().to(stk_query))
    })
}

fn client(server: &actix_test::TestServer, max_retries: u32) -> MpesaClient {
    let config = MpesaConfig {
        environment: MpesaEnvironment::Sandbox,
        base_url: server.url("/"),
        consumer_key: "key".to_string(),
        consumer_secret: "secret".to_string(),
        shortcode: "174379".to_string(),
        passkey: "passkey".to_string(),
        callback_url: "https://fleet.example/payments/mpesa/callback".to_string(),
        callback_token: None,
        request_timeout_secs: 5,
        max_retries,
        token_refresh_margin_secs: 60,
    };
    MpesaClient::new(&config).unwrap()
}

fn push_request() -> PushRequest {
    PushRequest {
        phone_number: "254712345678".to_string(),
        amount: dec!(500),
        account_reference: "PAY-7QX2M9KD".to_string(),
        description: "Bus fare payment".to_string(),
    }
}

#[actix_web::test]
async fn test_push_accepted_and_body_shape() {
    let daraja = FakeDaraja::new();
    let server = start_daraja(daraja.clone());
    let mpesa = client(&server, 0);

    let outcome = mpesa.initiate_push(push_request()).await.unwrap();
    assert_eq!(
        outcome,
        PushOutcome::Accepted {
            checkout_request_id: "ws_CO_191220191020363925".to_string(),
            merchant_request_id: "29115-34620561-1".to_string(),
            customer_message: Some("Success. Request accepted for processing".to_string()),
        }
    );

    let body = daraja.last_push.lock().unwrap().clone().expect("push body");
    assert_eq!(body["BusinessShortCode"], "174379");
    assert_eq!(body["TransactionType"], "CustomerPayBillOnline");
    assert_eq!(body["Amount"], 500);
    assert_eq!(body["PartyA"], "254712345678");
    assert_eq!(body["PartyB"], "174379");
    assert_eq!(body["PhoneNumber"], "254712345678");
    assert_eq!(body["AccountReference"], "PAY-7QX2M9KD");
    assert_eq!(body["CallBackURL"], "https://fleet.example/payments/mpesa/callback");
    assert!(body["TransactionDesc"].as_str().unwrap().len() <= 13);

    let timestamp = body["Timestamp"].as_str().unwrap();
    assert_eq!(timestamp.len(), 14);
    let password = STANDARD.decode(body["Password"].as_str().unwrap()).unwrap();
    assert_eq!(
        String::from_utf8(password).unwrap(),
        format!("174379passkey{}", timestamp)
    );
}

#[actix_web::test]
async fn test_access_token_is_cached() {
    let daraja = FakeDaraja::new();
    let server = start_daraja(daraja.clone());
    let mpesa = client(&server, 0);

    mpesa.initiate_push(push_request()).await.unwrap();
    mpesa.initiate_push(push_request()).await.unwrap();
    mpesa.query_status("ws_CO_191220191020363925").await.unwrap();

    assert_eq!(daraja.token_requests.load(Ordering::SeqCst), 1);
    assert_eq!(
        daraja.bearers.lock().unwrap().clone(),
        vec!["token-1".to_string(); 3]
    );
}

#[actix_web::test]
async fn test_expired_token_is_refreshed_once() {
    let daraja = FakeDaraja::new();
    let server = start_daraja(daraja.clone());
    let mpesa = client(&server, 0);

    mpesa.initiate_push(push_request()).await.unwrap();
    daraja.reject_next_token.store(true, Ordering::SeqCst);

    let outcome = mpesa.initiate_push(push_request()).await.unwrap();
    assert!(matches!(outcome, PushOutcome::Accepted { .. }));
    assert_eq!(daraja.token_requests.load(Ordering::SeqCst), 2);
    assert_eq!(daraja.push_requests.load(Ordering::SeqCst), 3);
    assert_eq!(
        daraja.bearers.lock().unwrap().last().cloned(),
        Some("token-2".to_string())
    );
}

#[actix_web::test]
async fn test_push_rejections() {
    let daraja = FakeDaraja::new();
    let server = start_daraja(daraja.clone());
    let mpesa = client(&server, 0);

    daraja.respond_to_push(
        400,
        json!({
            "requestId": "11728-2929992-1",
            "errorCode": "400.002.02",
            "errorMessage": "Bad Request - Invalid PhoneNumber"
        }),
    );
    let outcome = mpesa.initiate_push(push_request()).await.unwrap();
    assert_eq!(
        outcome,
        PushOutcome::Rejected("Bad Request - Invalid PhoneNumber".to_string())
    );

    daraja.respond_to_push(
        200,
        json!({
            "MerchantRequestID": "29115-34620561-1",
            "CheckoutRequestID": "",
            "ResponseCode": "1",
            "ResponseDescription": "Unable to lock subscriber"
        }),
    );
    let outcome = mpesa.initiate_push(push_request()).await.unwrap();
    assert_eq!(outcome, PushOutcome::Rejected("Unable to lock subscriber".to_string()));
}

#[actix_web::test]
async fn test_server_error_is_unavailable() {
    let daraja = FakeDaraja::new();
    let server = start_daraja(daraja.clone());
    let mpesa = client(&server, 0);

    daraja.respond_to_push(500, json!({ "errorMessage": "System busy" }));
    let err = mpesa.initiate_push(push_request()).await.unwrap_err();

    assert!(matches!(err, AppError::GatewayUnavailable(ref msg) if msg.contains("System busy")));
    assert_eq!(daraja.push_requests.load(Ordering::SeqCst), 1);
}

#[actix_web::test]
async fn test_query_server_error_is_retried() {
    let daraja = FakeDaraja::new();
    let server = start_daraja(daraja.clone());
    let mpesa = client(&server, 1);

    daraja.respond_to_query(503, json!({ "errorMessage": "Service Unavailable" }));
    let err = mpesa.query_status("ws_CO_191220191020363925").await.unwrap_err();

    assert!(matches!(err, AppError::GatewayUnavailable(_)));
    assert_eq!(daraja.query_requests.load(Ordering::SeqCst), 2);
}

#[actix_web::test]
async fn test_push_is_never_resent_on_server_error() {
    let daraja = FakeDaraja::new();
    let server = start_daraja(daraja.clone());
    let mpesa = client(&server, 3);

    daraja.respond_to_push(503, json!({ "errorMessage": "Service Unavailable" }));
    let err = mpesa.initiate_push(push_request()).await.unwrap_err();

    assert!(matches!(err, AppError::GatewayUnavailable(_)));
    assert_eq!(daraja.push_requests.load(Ordering::SeqCst), 1);
}

#[actix_web::test]
async fn test_absurd_token_lifetime_does_not_break_requests() {
    for expires_in in [json!("99999999999999999"), json!(-1), json!(i64::MAX)] {
        let daraja = FakeDaraja::new();
        *daraja.token_expires_in.lock().unwrap() = expires_in;
        let server = start_daraja(daraja.clone());
        let mpesa = client(&server, 0);

        let outcome = mpesa.initiate_push(push_request()).await.unwrap();
        assert!(matches!(outcome, PushOutcome::Accepted { .. }));
        mpesa.query_status("ws_CO_191220191020363925").await.unwrap();
        assert_eq!(daraja.token_requests.load(Ordering::SeqCst), 1);
    }
}

#[actix_web::test]
async fn test_unreachable_gateway_is_unavailable() {
    let config = MpesaConfig {
        environment: MpesaEnvironment::Sandbox,
        base_url: "http://127.0.0.1:9".to_string(),
        consumer_key: "key".to_string(),
        consumer_secret: "secret".to_string(),
        shortcode: "174379".to_string(),
        passkey: "passkey".to_string(),
        callback_url: "https://fleet.example/payments/mpesa/callback".to_string(),
        callback_token: None,
        request_timeout_secs: 2,
        max_retries: 0,
        token_refresh_margin_secs: 60,
    };
    let mpesa = MpesaClient::new(&config).unwrap();

    let err = mpesa.initiate_push(push_request()).await.unwrap_err();
    assert!(matches!(err, AppError::GatewayUnavailable(_)));
}

#[actix_web::test]
async fn test_query_result_mapping() {
    let daraja = FakeDaraja::new();
    let server = start_daraja(daraja.clone());
    let mpesa = client(&server, 0);
    let id = "ws_CO_191220191020363925";

    assert_eq!(
        mpesa.query_status(id).await.unwrap(),
        QueryOutcome::Completed { receipt: None }
    );

    daraja.respond_to_query(200, query_result("1032", "Request cancelled by user"));
    assert_eq!(
        mpesa.query_status(id).await.unwrap(),
        QueryOutcome::Cancelled("Request cancelled by user".to_string())
    );

    daraja.respond_to_query(200, query_result("1", "The balance is insufficient for the transaction"));
    assert_eq!(
        mpesa.query_status(id).await.unwrap(),
        QueryOutcome::Failed("The balance is insufficient for the transaction".to_string())
    );

    daraja.respond_to_query(
        500,
        json!({
            "requestId": "",
            "errorCode": "500.001.1001",
            "errorMessage": "The transaction is being processed"
        }),
    );
    assert_eq!(mpesa.query_status(id).await.unwrap(), QueryOutcome::Pending);

    daraja.respond_to_query(400, json!({ "errorCode": "400.002.02", "errorMessage": "Bad Request - Invalid CheckoutRequestID" }));
    let err = mpesa.query_status(id).await.unwrap_err();
    assert!(matches!(err, AppError::Gateway(_)));
}

#[actix_web::test]
async fn test_bad_credentials_are_a_gateway_error() {
    let daraja = FakeDaraja::new();
    let server = start_daraja(daraja.clone());
    let config = MpesaConfig {
        environment: MpesaEnvironment::Sandbox,
        base_url: server.url("/"),
        consumer_key: "wrong".to_string(),
        consumer_secret: "secret".to_string(),
        shortcode: "174379".to_string(),
        passkey: "passkey".to_string(),
        callback_url: "https://fleet.example/payments/mpesa/callback".to_string(),
        callback_token: None,
        request_timeout_secs: 5,
        max_retries: 0,
        token_refresh_margin_secs: 60,
    };
    let mpesa = MpesaClient::new(&config).unwrap();

    let err = mpesa.initiate_push(push_request()).await.unwrap_err();
    assert!(matches!(err, AppError::Gateway(ref msg) if msg.contains("Invalid Authentication passed")));
    assert_eq!(daraja.push_requests.load(Ordering::SeqCst), 0);
}
