use std::sync::Arc;

use actix_web::{web, HttpResponse};

use crate::core::error::AppError;
use crate::modules::refunds::models::{
    ApproveRefundRequest, CreateRefundRequest, PayoutResultRequest, RejectRefundRequest,
};
use crate::modules::refunds::services::RefundService;

/// Request a refund
/// POST /refunds
pub async fn create_refund(
    service: web::Data<Arc<RefundService>>,
    request: web::Json<CreateRefundRequest>,
) -> Result<HttpResponse, AppError> {
    let refund = service.initiate_refund(request.into_inner()).await?;

    Ok(HttpResponse::Created().json(refund))
}

/// GET /refunds/{id}
pub async fn get_refund(
    service: web::Data<Arc<RefundService>>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let refund = service.get_refund(&path.into_inner()).await?;

    Ok(HttpResponse::Ok().json(refund))
}

/// POST /refunds/{id}/approve
pub async fn approve_refund(
    service: web::Data<Arc<RefundService>>,
    path: web::Path<String>,
    request: web::Json<ApproveRefundRequest>,
) -> Result<HttpResponse, AppError> {
    let refund = service
        .approve_refund(&path.into_inner(), request.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(refund))
}

/// POST /refunds/{id}/reject
pub async fn reject_refund(
    service: web::Data<Arc<RefundService>>,
    path: web::Path<String>,
    request: web::Json<RejectRefundRequest>,
) -> Result<HttpResponse, AppError> {
    let refund = service
        .reject_refund(&path.into_inner(), request.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(refund))
}

/// Payout leg result
/// POST /refunds/{id}/payout
pub async fn confirm_payout(
    service: web::Data<Arc<RefundService>>,
    path: web::Path<String>,
    request: web::Json<PayoutResultRequest>,
) -> Result<HttpResponse, AppError> {
    let refund = service
        .confirm_payout(&path.into_inner(), request.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(refund))
}

/// Configure refund routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/refunds")
            .route("", web::post().to(create_refund))
            .route("/{id}", web::get().to(get_refund))
            .route("/{id}/approve", web::post().to(approve_refund))
            .route("/{id}/reject", web::post().to(reject_refund))
            .route("/{id}/payout", web::post().to(confirm_payout)),
    );
}
