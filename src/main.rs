use std::sync::Arc;

use actix_web::{App, HttpServer};
use anyhow::Context;
use fleetpay::config::{Config, DatabaseConfig, LogFormat, StorageBackend};
use fleetpay::middleware::{cors, ErrorHandler, RateLimiter, RequestId};
use fleetpay::modules::gateways::MpesaClient;
use fleetpay::modules::notifications::LogNotifier;
use fleetpay::{AppState, MemoryStore, Repositories};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing(format: LogFormat, level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("fleetpay={},actix_web=info", level)));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    init_tracing(config.app.log_format, &config.app.log_level);

    tracing::info!(
        env = %config.app.env,
        storage = ?config.app.storage_backend,
        mpesa = ?config.mpesa.environment,
        bind = %config.server.bind_address(),
        "Starting fleetpay booking and payment engine"
    );

    let repos = match (&config.app.storage_backend, &config.database) {
        (StorageBackend::Mysql, Some(database)) => {
            let pool = database
                .create_pool()
                .await
                .context("Failed to create database pool")?;
            DatabaseConfig::run_migrations(&pool)
                .await
                .context("Failed to apply migrations")?;
            tracing::info!(max_connections = database.max_connections, "Database pool initialized");
            Repositories::mysql(pool)
        }
        _ => {
            tracing::warn!("Using in-memory storage; state is lost on restart");
            Repositories::memory(MemoryStore::new())
        }
    };

    let gateway = MpesaClient::new(&config.mpesa).context("Failed to build M-Pesa client")?;
    let state = AppState::new(
        repos,
        Arc::new(gateway),
        Arc::new(LogNotifier),
        config.engine_settings(),
    );
    if !state.verifier.is_enabled() {
        tracing::warn!("MPESA_CALLBACK_TOKEN not set; callbacks are matched by request id only");
    }

    let checker = Arc::new(state.expiration_checker(config.payment.sweep_interval));
    tokio::spawn(checker.start());

    let security = config.security.clone();
    let bind_address = config.server.bind_address();
    let server = HttpServer::new(move || {
        let state = state.clone();
        App::new()
            .wrap(RateLimiter::new(security.rate_limit_per_minute))
            .wrap(cors(&security.allowed_origins))
            .wrap(ErrorHandler)
            .wrap(RequestId)
            .wrap(TracingLogger::default())
            .configure(move |cfg| state.configure(cfg))
    })
    .workers(config.server.workers)
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind {}", bind_address))?
    .run();

    tracing::info!("Server started at http://{}", bind_address);

    server.await.context("HTTP server error")
}
