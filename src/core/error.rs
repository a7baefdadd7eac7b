use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use rust_decimal::Decimal;

/// Application-wide Result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Main application error type
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    /// Validation errors for business rules
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Trip not found: {0}")]
    TripNotFound(String),

    /// Trip exists but is not open for booking (departed, completed, cancelled)
    #[error("Trip is not open for booking: {0}")]
    TripNotBookable(String),

    #[error("Insufficient seats: requested {requested}, available {available}")]
    InsufficientSeats { requested: u32, available: u32 },

    /// One or more requested seats are held by another active booking
    #[error("Seats already taken: {}", .0.join(", "))]
    SeatConflict(Vec<String>),

    #[error("Payment not found: {0}")]
    PaymentNotFound(String),

    #[error("Payment is not completed: {0}")]
    PaymentNotCompleted(String),

    /// A non-terminal payment already exists for the booking
    #[error("Payment already in progress: {0}")]
    PaymentAlreadyInProgress(String),

    /// Gateway answered but refused the push request
    #[error("Payment rejected by gateway: {0}")]
    PaymentRejected(String),

    #[error("Refund of {requested} exceeds refundable amount {refundable}")]
    RefundExceedsOriginal {
        requested: Decimal,
        refundable: Decimal,
    },

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// State conflict (invalid transition)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Payment gateway errors
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Gateway unreachable after bounded retries
    #[error("Gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// Unauthorized access
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Database operation errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP client errors
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("HTTP client error: {0}")]
    HttpMiddleware(#[from] reqwest_middleware::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable reason code
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::TripNotFound(_) => "TRIP_NOT_FOUND",
            AppError::TripNotBookable(_) => "TRIP_NOT_BOOKABLE",
            AppError::InsufficientSeats { .. } => "INSUFFICIENT_SEATS",
            AppError::SeatConflict(_) => "SEAT_CONFLICT",
            AppError::PaymentNotFound(_) => "PAYMENT_NOT_FOUND",
            AppError::PaymentNotCompleted(_) => "PAYMENT_NOT_COMPLETED",
            AppError::PaymentAlreadyInProgress(_) => "PAYMENT_ALREADY_IN_PROGRESS",
            AppError::PaymentRejected(_) => "PAYMENT_REJECTED",
            AppError::RefundExceedsOriginal { .. } => "REFUND_EXCEEDS_ORIGINAL",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "INVALID_TRANSITION",
            AppError::Gateway(_) => "GATEWAY_ERROR",
            AppError::GatewayUnavailable(_) => "GATEWAY_UNAVAILABLE",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::RateLimitExceeded(_) => "RATE_LIMIT_EXCEEDED",
            AppError::Json(_) => "MALFORMED_PAYLOAD",
            AppError::Configuration(_)
            | AppError::Database(_)
            | AppError::HttpClient(_)
            | AppError::HttpMiddleware(_)
            | AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Errors whose details must never reach a client
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            AppError::Configuration(_)
                | AppError::Database(_)
                | AppError::HttpClient(_)
                | AppError::HttpMiddleware(_)
                | AppError::Internal(_)
        )
    }

    /// Message safe to return to API callers
    pub fn public_message(&self) -> String {
        match self {
            _ if self.is_internal() => "An internal error occurred".to_string(),
            AppError::Json(_) => "Malformed JSON payload".to_string(),
            other => other.to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();

        if self.is_internal() {
            tracing::error!(error = %self, code = self.code(), "Internal error while handling request");
        }

        HttpResponse::build(status_code).json(serde_json::json!({
            "error": {
                "code": self.code(),
                "message": self.public_message(),
                "status": status_code.as_u16(),
            }
        }))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::TripNotFound(_) => StatusCode::NOT_FOUND,
            AppError::TripNotBookable(_) => StatusCode::CONFLICT,
            AppError::InsufficientSeats { .. } => StatusCode::CONFLICT,
            AppError::SeatConflict(_) => StatusCode::CONFLICT,
            AppError::PaymentNotFound(_) => StatusCode::NOT_FOUND,
            AppError::PaymentNotCompleted(_) => StatusCode::CONFLICT,
            AppError::PaymentAlreadyInProgress(_) => StatusCode::CONFLICT,
            AppError::PaymentRejected(_) => StatusCode::PAYMENT_REQUIRED,
            AppError::RefundExceedsOriginal { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Gateway(_) => StatusCode::BAD_GATEWAY,
            AppError::GatewayUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::RateLimitExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,
            AppError::HttpMiddleware(_) => StatusCode::BAD_GATEWAY,
            AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Helper functions for common error scenarios
impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        AppError::NotFound(resource.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        AppError::Conflict(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        AppError::Unauthorized(msg.into())
    }

    pub fn gateway(msg: impl Into<String>) -> Self {
        AppError::Gateway(msg.into())
    }

    pub fn gateway_unavailable(msg: impl Into<String>) -> Self {
        AppError::GatewayUnavailable(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }
}
