use std::sync::Arc;

use actix_web::{web, HttpResponse};

use crate::core::error::AppError;
use crate::modules::payments::models::InitiatePaymentRequest;
use crate::modules::payments::services::PaymentOrchestrator;

/// Start an STK push payment for a booking
/// POST /payments/initiate
pub async fn initiate_payment(
    orchestrator: web::Data<Arc<PaymentOrchestrator>>,
    request: web::Json<InitiatePaymentRequest>,
) -> Result<HttpResponse, AppError> {
    let response = orchestrator.initiate(request.into_inner()).await?;

    Ok(HttpResponse::Ok().json(response))
}

/// Payment status, refreshed from the gateway while processing
/// GET /payments/status/{payment_id}
pub async fn payment_status(
    orchestrator: web::Data<Arc<PaymentOrchestrator>>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let view = orchestrator.query_status(&path.into_inner()).await?;

    Ok(HttpResponse::Ok().json(view))
}

/// Configure payment routes
///
/// Resources rather than a `/payments` scope, so the callback route can be
/// registered separately.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/payments/initiate").route(web::post().to(initiate_payment)))
        .service(
            web::resource("/payments/status/{payment_id}").route(web::get().to(payment_status)),
        );
}
