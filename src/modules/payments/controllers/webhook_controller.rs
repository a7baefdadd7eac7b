use std::sync::Arc;

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::Value;
use tracing::{error, warn};

use crate::modules::gateways::models::callback_ack;
use crate::modules::gateways::CallbackVerifier;
use crate::modules::payments::services::PaymentOrchestrator;

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub token: Option<String>,
}

/// M-Pesa STK push result callback
/// POST /payments/mpesa/callback
///
/// Always answers 200 with the gateway acknowledgement body. Rejected,
/// malformed and failed deliveries are logged and kept in the webhook
/// ledger; the gateway is never asked to retry.
pub async fn mpesa_callback(
    orchestrator: web::Data<Arc<PaymentOrchestrator>>,
    verifier: web::Data<CallbackVerifier>,
    req: HttpRequest,
    body: web::Bytes,
) -> HttpResponse {
    let token = web::Query::<CallbackQuery>::from_query(req.query_string())
        .ok()
        .and_then(|query| query.into_inner().token);

    if !verifier.verify(token.as_deref()) {
        warn!(
            peer = ?req.peer_addr(),
            "Rejected M-Pesa callback with invalid token"
        );
        return HttpResponse::Ok().json(callback_ack());
    }

    let payload = match serde_json::from_slice::<Value>(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, body = %String::from_utf8_lossy(&body), "Malformed M-Pesa callback body");
            Value::String(String::from_utf8_lossy(&body).into_owned())
        }
    };

    if let Err(e) = orchestrator.handle_callback(payload).await {
        error!(error = %e, "Failed to process M-Pesa callback");
    }

    HttpResponse::Ok().json(callback_ack())
}

/// Configure gateway callback routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/payments/mpesa/callback").route(web::post().to(mpesa_callback)));
}
