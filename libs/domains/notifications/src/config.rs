//! Tunables for every notification service, loaded from the environment.

use core_config::{ConfigError, FromEnv, env_list, env_optional, env_parse};
use std::str::FromStr;
use std::time::Duration;

use crate::cipher::CipherConfig;
use crate::models::NotificationType;
use strum::IntoEnumIterator;

#[derive(Debug, Clone, Default)]
pub struct NotificationConfig {
    pub queue: QueueConfig,
    pub compliance: ComplianceConfig,
    pub monitor: MonitorConfig,
    pub error_logger: ErrorLoggerConfig,
    pub templates: TemplateConfig,
    pub cipher: CipherConfig,
}

impl FromEnv for NotificationConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            queue: QueueConfig::from_env()?,
            compliance: ComplianceConfig::from_env()?,
            monitor: MonitorConfig::from_env()?,
            error_logger: ErrorLoggerConfig::from_env()?,
            templates: TemplateConfig::from_env()?,
            cipher: CipherConfig {
                key: env_optional("PHONE_ENCRYPTION_KEY"),
            },
        })
    }
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub batch_size: usize,
    /// Items sent concurrently within one group.
    pub max_concurrent: usize,
    /// Pause between concurrency groups.
    pub batch_delay_ms: u64,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
    pub auto_process_interval_secs: u64,
    /// Kick off a processing pass right after a successful enqueue.
    pub immediate_processing: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_concurrent: 3,
            batch_delay_ms: 1000,
            max_attempts: 3,
            base_delay_ms: 1000,
            backoff_multiplier: 2.0,
            max_delay_ms: 30_000,
            auto_process_interval_secs: 30,
            immediate_processing: true,
        }
    }
}

impl QueueConfig {
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn auto_process_interval(&self) -> Duration {
        Duration::from_secs(self.auto_process_interval_secs)
    }
}

impl FromEnv for QueueConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let d = Self::default();
        let config = Self {
            batch_size: env_parse("NOTIFY_BATCH_SIZE", d.batch_size)?,
            max_concurrent: env_parse("NOTIFY_MAX_CONCURRENT", d.max_concurrent)?,
            batch_delay_ms: env_parse("NOTIFY_BATCH_DELAY_MS", d.batch_delay_ms)?,
            max_attempts: env_parse("NOTIFY_MAX_ATTEMPTS", d.max_attempts)?,
            base_delay_ms: env_parse("NOTIFY_RETRY_BASE_DELAY_MS", d.base_delay_ms)?,
            backoff_multiplier: env_parse("NOTIFY_RETRY_MULTIPLIER", d.backoff_multiplier)?,
            max_delay_ms: env_parse("NOTIFY_RETRY_MAX_DELAY_MS", d.max_delay_ms)?,
            auto_process_interval_secs: env_parse(
                "NOTIFY_PROCESS_INTERVAL_SECS",
                d.auto_process_interval_secs,
            )?,
            immediate_processing: env_parse(
                "NOTIFY_IMMEDIATE_PROCESSING",
                d.immediate_processing,
            )?,
        };

        if config.batch_size == 0 || config.max_concurrent == 0 || config.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "NOTIFY_BATCH_SIZE/NOTIFY_MAX_CONCURRENT/NOTIFY_MAX_ATTEMPTS".into(),
                details: "must be greater than zero".into(),
            });
        }
        if config.backoff_multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                key: "NOTIFY_RETRY_MULTIPLIER".into(),
                details: "must be at least 1.0".into(),
            });
        }
        Ok(config)
    }
}

#[derive(Debug, Clone)]
pub struct ComplianceConfig {
    pub max_message_length: usize,
    pub recommended_message_length: usize,
    pub per_customer_hourly_limit: u64,
    pub global_hourly_limit: u64,
    /// First local hour in which sending is considered polite.
    pub allowed_start_hour: u32,
    /// Local hour at which the polite window closes.
    pub allowed_end_hour: u32,
    /// Offset of the restaurant's local time from UTC.
    pub utc_offset_hours: i32,
    pub allowed_types: Vec<NotificationType>,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            max_message_length: 4096,
            recommended_message_length: 1000,
            per_customer_hourly_limit: 10,
            global_hourly_limit: 1000,
            allowed_start_hour: 8,
            allowed_end_hour: 22,
            utc_offset_hours: -3,
            allowed_types: NotificationType::iter().collect(),
        }
    }
}

impl FromEnv for ComplianceConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let d = Self::default();
        let allowed_types = match env_list("NOTIFY_ALLOWED_TYPES") {
            Some(raw) => raw
                .iter()
                .map(|t| {
                    NotificationType::from_str(t).map_err(|_| ConfigError::InvalidValue {
                        key: "NOTIFY_ALLOWED_TYPES".into(),
                        details: format!("unknown notification type '{t}'"),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => d.allowed_types,
        };

        Ok(Self {
            max_message_length: env_parse("NOTIFY_MAX_MESSAGE_LENGTH", d.max_message_length)?,
            recommended_message_length: env_parse(
                "NOTIFY_RECOMMENDED_MESSAGE_LENGTH",
                d.recommended_message_length,
            )?,
            per_customer_hourly_limit: env_parse(
                "NOTIFY_CUSTOMER_HOURLY_LIMIT",
                d.per_customer_hourly_limit,
            )?,
            global_hourly_limit: env_parse("NOTIFY_GLOBAL_HOURLY_LIMIT", d.global_hourly_limit)?,
            allowed_start_hour: env_parse("NOTIFY_ALLOWED_START_HOUR", d.allowed_start_hour)?,
            allowed_end_hour: env_parse("NOTIFY_ALLOWED_END_HOUR", d.allowed_end_hour)?,
            utc_offset_hours: env_parse("NOTIFY_UTC_OFFSET_HOURS", d.utc_offset_hours)?,
            allowed_types,
        })
    }
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Below this many notifications in the last hour no alert is evaluated.
    pub min_sample_size: u64,
    /// Percent.
    pub failure_rate_threshold: f64,
    pub pending_threshold: u64,
    /// Percent of the last hour's notifications still pending.
    pub pending_ratio_threshold: f64,
    pub slow_delivery_secs: u64,
    pub check_interval_secs: u64,
    pub alert_dedup_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            min_sample_size: 10,
            failure_rate_threshold: 20.0,
            pending_threshold: 20,
            pending_ratio_threshold: 30.0,
            slow_delivery_secs: 300,
            check_interval_secs: 300,
            alert_dedup_secs: 3600,
        }
    }
}

impl MonitorConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

impl FromEnv for MonitorConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let d = Self::default();
        Ok(Self {
            min_sample_size: env_parse("NOTIFY_MONITOR_MIN_SAMPLE", d.min_sample_size)?,
            failure_rate_threshold: env_parse(
                "NOTIFY_MONITOR_FAILURE_RATE",
                d.failure_rate_threshold,
            )?,
            pending_threshold: env_parse("NOTIFY_MONITOR_PENDING", d.pending_threshold)?,
            pending_ratio_threshold: env_parse(
                "NOTIFY_MONITOR_PENDING_RATIO",
                d.pending_ratio_threshold,
            )?,
            slow_delivery_secs: env_parse("NOTIFY_MONITOR_SLOW_SECS", d.slow_delivery_secs)?,
            check_interval_secs: env_parse(
                "NOTIFY_MONITOR_INTERVAL_SECS",
                d.check_interval_secs,
            )?,
            alert_dedup_secs: env_parse("NOTIFY_ALERT_DEDUP_SECS", d.alert_dedup_secs)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ErrorLoggerConfig {
    pub hourly_error_threshold: u64,
    pub category_error_threshold: u64,
    pub retention_days: i64,
    pub alert_dedup_secs: u64,
}

impl Default for ErrorLoggerConfig {
    fn default() -> Self {
        Self {
            hourly_error_threshold: 50,
            category_error_threshold: 20,
            retention_days: 30,
            alert_dedup_secs: 3600,
        }
    }
}

impl FromEnv for ErrorLoggerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let d = Self::default();
        Ok(Self {
            hourly_error_threshold: env_parse(
                "NOTIFY_ERROR_HOURLY_THRESHOLD",
                d.hourly_error_threshold,
            )?,
            category_error_threshold: env_parse(
                "NOTIFY_ERROR_CATEGORY_THRESHOLD",
                d.category_error_threshold,
            )?,
            retention_days: env_parse("NOTIFY_ERROR_RETENTION_DAYS", d.retention_days)?,
            alert_dedup_secs: env_parse("NOTIFY_ALERT_DEDUP_SECS", d.alert_dedup_secs)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct TemplateConfig {
    pub cache_ttl_secs: u64,
    pub restaurant_name: String,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            restaurant_name: "Restaurante".to_string(),
        }
    }
}

impl TemplateConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl FromEnv for TemplateConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let d = Self::default();
        Ok(Self {
            cache_ttl_secs: env_parse("NOTIFY_TEMPLATE_CACHE_TTL_SECS", d.cache_ttl_secs)?,
            restaurant_name: env_optional("RESTAURANT_NAME").unwrap_or(d.restaurant_name),
        })
    }
}
