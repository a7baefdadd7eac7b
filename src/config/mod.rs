use crate::core::{AppError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub mod database;
pub mod server;

pub use database::DatabaseConfig;
pub use server::ServerConfig;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    /// Present only for the MySQL storage backend
    pub database: Option<DatabaseConfig>,
    pub server: ServerConfig,
    pub mpesa: MpesaConfig,
    pub booking: BookingConfig,
    pub payment: PaymentConfig,
    pub refund: RefundConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub log_level: String,
    pub log_format: LogFormat,
    pub storage_backend: StorageBackend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("Unknown log format: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Mysql,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mysql" => Ok(StorageBackend::Mysql),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(format!("Unknown storage backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MpesaEnvironment {
    Sandbox,
    Production,
}

impl MpesaEnvironment {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            MpesaEnvironment::Sandbox => "https://sandbox.safaricom.co.ke",
            MpesaEnvironment::Production => "https://api.safaricom.co.ke",
        }
    }
}

impl FromStr for MpesaEnvironment {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sandbox" => Ok(MpesaEnvironment::Sandbox),
            "production" => Ok(MpesaEnvironment::Production),
            other => Err(format!("Unknown M-Pesa environment: {}", other)),
        }
    }
}

/// Daraja (M-Pesa) credentials and client behavior
#[derive(Debug, Clone)]
pub struct MpesaConfig {
    pub environment: MpesaEnvironment,
    pub base_url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub shortcode: String,
    pub passkey: String,
    pub callback_url: String,
    /// Shared secret expected as `?token=` on inbound callbacks
    pub callback_token: Option<String>,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub token_refresh_margin_secs: u64,
}

impl MpesaConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone)]
pub struct BookingConfig {
    /// Hours a pending booking may stay unpaid before the sweeper cancels it
    pub payment_deadline_hours: i64,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            payment_deadline_hours: 24,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaymentConfig {
    /// Client-side timeout for an unanswered push request
    pub timeout: Duration,
    /// Maximum difference between requested amount and amount due
    pub amount_tolerance: Decimal,
    /// Interval of the background expiration sweep
    pub sweep_interval: Duration,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            amount_tolerance: Decimal::new(1, 2),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RefundConfig {
    /// Refunds strictly above this amount require manager approval
    pub approval_threshold: Decimal,
}

impl Default for RefundConfig {
    fn default() -> Self {
        Self {
            approval_threshold: Decimal::new(1000, 0),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub rate_limit_per_minute: u32,
    pub allowed_origins: Vec<String>,
}

/// Settings consumed by the booking, payment and refund services
#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    pub booking: BookingConfig,
    pub payment: PaymentConfig,
    pub refund: RefundConfig,
    pub callback_token: Option<String>,
}

/// Read an optional variable, falling back to `default`, and parse it
fn env_or<T: FromStr>(key: &str, default: &str) -> Result<T> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .trim()
        .parse()
        .map_err(|_| AppError::Configuration(format!("Invalid {}", key)))
}

fn env_required(key: &str) -> Result<String> {
    env::var(key).map_err(|_| AppError::Configuration(format!("{} not set", key)))
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let storage_backend: StorageBackend = env_or("STORAGE_BACKEND", "mysql")?;
        let environment: MpesaEnvironment = env_or("MPESA_ENVIRONMENT", "sandbox")?;

        let config = Config {
            app: AppConfig {
                env: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
                log_format: env_or("LOG_FORMAT", "pretty")?,
                storage_backend,
            },
            database: match storage_backend {
                StorageBackend::Mysql => Some(DatabaseConfig::from_env()?),
                StorageBackend::Memory => None,
            },
            server: ServerConfig::from_env()?,
            mpesa: MpesaConfig {
                environment,
                base_url: env::var("MPESA_BASE_URL")
                    .unwrap_or_else(|_| environment.default_base_url().to_string()),
                consumer_key: env_required("MPESA_CONSUMER_KEY")?,
                consumer_secret: env_required("MPESA_CONSUMER_SECRET")?,
                shortcode: env_required("MPESA_SHORTCODE")?,
                passkey: env_required("MPESA_PASSKEY")?,
                callback_url: env_required("MPESA_CALLBACK_URL")?,
                callback_token: env::var("MPESA_CALLBACK_TOKEN")
                    .ok()
                    .filter(|token| !token.trim().is_empty()),
                request_timeout_secs: env_or("MPESA_REQUEST_TIMEOUT_SECS", "30")?,
                max_retries: env_or("MPESA_MAX_RETRIES", "3")?,
                token_refresh_margin_secs: env_or("MPESA_TOKEN_REFRESH_MARGIN_SECS", "60")?,
            },
            booking: BookingConfig {
                payment_deadline_hours: env_or("BOOKING_PAYMENT_DEADLINE_HOURS", "24")?,
            },
            payment: PaymentConfig {
                timeout: Duration::from_secs(env_or("PAYMENT_TIMEOUT_SECS", "120")?),
                amount_tolerance: env_or("PAYMENT_AMOUNT_TOLERANCE", "0.01")?,
                sweep_interval: Duration::from_secs(env_or("PAYMENT_SWEEP_INTERVAL_SECS", "60")?),
            },
            refund: RefundConfig {
                approval_threshold: env_or("REFUND_APPROVAL_THRESHOLD", "1000")?,
            },
            security: SecurityConfig {
                rate_limit_per_minute: env_or("RATE_LIMIT_PER_MINUTE", "1000")?,
                allowed_origins: env::var("ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string())
                    .split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect(),
            },
        };

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.booking.payment_deadline_hours <= 0 {
            return Err(AppError::Configuration(
                "Booking payment deadline must be greater than 0".to_string(),
            ));
        }

        if self.payment.timeout.is_zero() || self.payment.sweep_interval.is_zero() {
            return Err(AppError::Configuration(
                "Payment timeout and sweep interval must be greater than 0".to_string(),
            ));
        }

        if self.payment.amount_tolerance < Decimal::ZERO {
            return Err(AppError::Configuration(
                "Payment amount tolerance cannot be negative".to_string(),
            ));
        }

        if self.refund.approval_threshold < Decimal::ZERO {
            return Err(AppError::Configuration(
                "Refund approval threshold cannot be negative".to_string(),
            ));
        }

        if self.security.rate_limit_per_minute == 0 {
            return Err(AppError::Configuration(
                "Rate limit must be greater than 0".to_string(),
            ));
        }

        if !self.mpesa.callback_url.starts_with("https://") && self.app.env == "production" {
            return Err(AppError::Configuration(
                "MPESA_CALLBACK_URL must use https in production".to_string(),
            ));
        }

        if self.mpesa.request_timeout_secs == 0 {
            return Err(AppError::Configuration(
                "M-Pesa request timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            booking: self.booking.clone(),
            payment: self.payment.clone(),
            refund: self.refund.clone(),
            callback_token: self.mpesa.callback_token.clone(),
        }
    }
}
