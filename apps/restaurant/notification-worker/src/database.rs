//! PostgreSQL connection and migrations.

use core_config::database::DatabaseConfig;
use migration::Migrator;
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use std::time::Duration;
use tracing::{info, warn};

const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(500);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(10);

fn connect_options(config: &DatabaseConfig) -> ConnectOptions {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .sqlx_logging(false);
    options
}

/// Connect with exponential backoff, making at most `connect_retries` attempts.
pub async fn connect_with_retry(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let options = connect_options(config);
    let mut delay = INITIAL_RETRY_DELAY;
    let mut attempt = 1;

    loop {
        match Database::connect(options.clone()).await {
            Ok(db) => {
                info!(attempt, "Successfully connected to PostgreSQL database");
                return Ok(db);
            }
            Err(e) if attempt < config.connect_retries => {
                warn!(
                    attempt,
                    max_attempts = config.connect_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Database connection failed, retrying"
                );
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(MAX_RETRY_DELAY);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

pub async fn run_migrations(db: &DatabaseConnection) -> Result<(), DbErr> {
    info!("Running notification database migrations...");
    Migrator::up(db, None).await?;
    info!("Migrations completed successfully");
    Ok(())
}
