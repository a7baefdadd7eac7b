use std::sync::Arc;

use actix_web::{web, HttpResponse};

use crate::core::error::AppError;
use crate::modules::bookings::models::CreateBookingRequest;
use crate::modules::bookings::services::BookingService;

/// Reserve seats
/// POST /bookings
pub async fn create_booking(
    service: web::Data<Arc<BookingService>>,
    request: web::Json<CreateBookingRequest>,
) -> Result<HttpResponse, AppError> {
    let booking = service.create_booking(request.into_inner()).await?;

    Ok(HttpResponse::Created().json(booking))
}

/// GET /bookings/{id}
pub async fn get_booking(
    service: web::Data<Arc<BookingService>>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let booking = service.get_booking(&path.into_inner()).await?;

    Ok(HttpResponse::Ok().json(booking))
}

/// Cancel a booking and release its seats
/// POST /bookings/{id}/cancel
pub async fn cancel_booking(
    service: web::Data<Arc<BookingService>>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let booking = service.cancel_booking(&path.into_inner()).await?;

    Ok(HttpResponse::Ok().json(booking))
}

/// Seat map of a trip
/// GET /trips/{id}/seats
pub async fn seat_availability(
    service: web::Data<Arc<BookingService>>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let view = service.seat_availability(&path.into_inner()).await?;

    Ok(HttpResponse::Ok().json(view))
}

/// Configure booking routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/bookings")
            .route("", web::post().to(create_booking))
            .route("/{id}", web::get().to(get_booking))
            .route("/{id}/cancel", web::post().to(cancel_booking)),
    )
    .service(web::scope("/trips").route("/{id}/seats", web::get().to(seat_availability)));
}
