//! Worker configuration loaded from the environment.

use core_config::database::DatabaseConfig;
use core_config::server::ServerConfig;
use core_config::{ConfigError, Environment, FromEnv, env_parse, env_required};
use domain_notifications::{NotificationConfig, WhatsAppConfig};

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub whatsapp: WhatsAppConfig,
    pub notifications: NotificationConfig,
    /// Base URL of the order backend
    pub orders_api_url: String,
    pub run_migrations: bool,
}

impl FromEnv for WorkerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            environment: Environment::from_env(),
            server: ServerConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            whatsapp: WhatsAppConfig::from_env()?,
            notifications: NotificationConfig::from_env()?,
            orders_api_url: env_required("ORDERS_API_URL")?,
            run_migrations: env_parse("RUN_MIGRATIONS", false)?,
        })
    }
}
