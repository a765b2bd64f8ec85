//! Notification Worker Service
//!
//! Delivers WhatsApp notifications for restaurant orders.
//!
//! ## Architecture
//!
//! ```text
//! Order backend ── POST /events/orders/{id}/* ──▶ NotificationTrigger
//!                                                    ↓
//!                                               QueueManager ─▶ PostgreSQL
//!                                                    ↓ (every 30 s)
//!                                            WhatsApp HTTP gateway
//! ```
//!
//! ## Background workers
//!
//! - Queue auto-processing
//! - Delivery monitor alerts
//! - Daily error-log retention cleanup

pub mod config;
pub mod database;
pub mod metrics;
pub mod routes;

use core_config::FromEnv;
use domain_notifications::{
    HttpOrderProvider, MessagingTransport, NotificationServices, PeriodicWorker,
    RandomVariantSelector, Stores, SystemClock, WhatsAppApiTransport,
};
use eyre::{Result, WrapErr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

use crate::config::WorkerConfig;
use crate::routes::AppState;

const ERROR_LOG_CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Run the notification worker
///
/// 1. Loads configuration and sets up structured logging
/// 2. Connects to PostgreSQL with retry, optionally running migrations
/// 3. Requeues notifications interrupted by a previous shutdown and
///    re-indexes opt-outs written under another encryption key
/// 4. Starts the background workers and the HTTP server
/// 5. On SIGINT/SIGTERM stops the workers and waits for in-flight passes
pub async fn run() -> Result<()> {
    let config = WorkerConfig::from_env().wrap_err("Failed to load configuration")?;
    core_config::tracing::init_tracing(&config.environment);
    metrics::init_metrics();

    info!(
        name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.environment,
        "Starting notification worker"
    );
    info!("Connecting to PostgreSQL...");
    let db = database::connect_with_retry(&config.database)
        .await
        .wrap_err("Failed to connect to PostgreSQL")?;
    if config.run_migrations {
        database::run_migrations(&db)
            .await
            .wrap_err("Failed to run migrations")?;
    }

    let transport: Arc<dyn MessagingTransport> = Arc::new(
        WhatsAppApiTransport::new(config.whatsapp.clone())
            .wrap_err("Failed to create WhatsApp transport")?,
    );
    let orders = Arc::new(
        HttpOrderProvider::new(config.orders_api_url.clone())
            .wrap_err("Failed to create order provider")?,
    );

    let services = NotificationServices::new(
        config.notifications.clone(),
        Stores::postgres(db.clone()),
        transport.clone(),
        orders,
        Arc::new(RandomVariantSelector),
        Arc::new(SystemClock),
    )
    .wrap_err("Failed to build notification services")?;
    if !services.cipher.is_enabled() {
        warn!("PHONE_ENCRYPTION_KEY not set, phone numbers are stored in plaintext");
    }

    match transport.health_check().await {
        Ok(true) => info!(transport = transport.name(), "WhatsApp instance connected"),
        Ok(false) => warn!(transport = transport.name(), "WhatsApp instance not connected"),
        Err(e) => warn!(transport = transport.name(), error = %e, "WhatsApp health check failed"),
    }

    services
        .queue
        .recover_interrupted()
        .await
        .wrap_err("Failed to recover interrupted notifications")?;
    services
        .opt_outs
        .reindex_lookups()
        .await
        .wrap_err("Failed to re-index opt-out records")?;
    services.queue.start_auto_processing();
    services.monitor.start_monitoring();

    let cleanup = PeriodicWorker::new("error-log-cleanup");
    let errors = services.errors.clone();
    cleanup.start(ERROR_LOG_CLEANUP_INTERVAL, move || {
        let errors = errors.clone();
        async move {
            if let Err(e) = errors.cleanup_old_logs().await {
                error!(error = %e, "Error log cleanup failed");
            }
        }
    });

    let app = routes::router(AppState {
        services: services.clone(),
        transport,
        db: Some(db.clone()),
    });

    let addr = config.server.address();
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind HTTP server to {}", addr))?;
    info!(address = %addr, "HTTP server listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    info!("Stopping background workers...");
    cleanup.stop();
    services.shutdown().await;
    cleanup.shutdown().await;

    if let Err(e) = db.close().await {
        warn!(error = %e, "Failed to close database connection");
    }

    served.wrap_err("HTTP server failed")?;
    info!("Notification worker stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        },
    }
}
