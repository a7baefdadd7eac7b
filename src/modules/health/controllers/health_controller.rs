use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;

use crate::modules::payments::services::TimeoutScheduler;
use std::sync::Arc;

/// Health check response structure
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthChecks {
    pub database: String,
    pub application: String,
    /// Payment timers currently armed on this instance
    pub armed_payment_timers: Option<usize>,
}

/// Readiness probe response structure
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub checks: ReadinessChecks,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadinessChecks {
    /// `None` when running on the in-memory store
    pub database: Option<bool>,
    pub application: bool,
}

/// GET /health - Liveness probe
/// Does not check dependencies
pub async fn health_check(timers: Option<web::Data<Arc<TimeoutScheduler>>>) -> impl Responder {
    let response = HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        checks: HealthChecks {
            database: "not_checked".to_string(),
            application: "healthy".to_string(),
            armed_payment_timers: timers.map(|timers| timers.armed()),
        },
    };

    HttpResponse::Ok().json(response)
}

/// GET /ready - Readiness probe
/// Checks database connectivity when a pool is configured
pub async fn readiness_check(pool: Option<web::Data<MySqlPool>>) -> impl Responder {
    let database = match pool {
        Some(pool) => match sqlx::query("SELECT 1").fetch_one(pool.get_ref()).await {
            Ok(_) => Some(true),
            Err(e) => {
                tracing::error!(error = %e, "Database readiness check failed");
                Some(false)
            }
        },
        None => None,
    };

    let ready = database.unwrap_or(true);
    let response = ReadinessResponse {
        ready,
        checks: ReadinessChecks {
            database,
            application: true,
        },
    };

    if ready {
        HttpResponse::Ok().json(response)
    } else {
        HttpResponse::ServiceUnavailable().json(response)
    }
}

/// Configure health check routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health_check)))
        .service(web::resource("/ready").route(web::get().to(readiness_check)));
}
