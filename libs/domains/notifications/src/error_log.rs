//! Categorized, sanitized operational error log with threshold alerting.

use chrono::Duration;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::alerts::AlertPublisher;
use crate::clock::Clock;
use crate::config::ErrorLoggerConfig;
use crate::error::NotificationResult;
use crate::metrics;
use crate::models::{AlertKind, ErrorCategory, ErrorLogEntry, ErrorSeverity, ErrorStats};
use crate::phone::mask_phone;
use crate::repository::ErrorLogRepository;

/// First matching rule wins.
const CATEGORY_RULES: &[(&[&str], ErrorCategory)] = &[
    (
        &[
            "unauthorized",
            "forbidden",
            "http 401",
            "http 403",
            "invalid api key",
            "authentication",
        ],
        ErrorCategory::Authentication,
    ),
    (
        &[
            "not configured",
            "configuration",
            "environment variable",
            "encryption key",
        ],
        ErrorCategory::Configuration,
    ),
    (
        &["rate limit", "rate-limit", "http 429", "too many requests", "throttl"],
        ErrorCategory::RateLimit,
    ),
    (
        &[
            "invalid phone",
            "invalid number",
            "phone number",
            "not on whatsapp",
            "not registered",
            "not a valid",
        ],
        ErrorCategory::PhoneValidation,
    ),
    (
        &["timeout", "timed out", "network", "dns", "enotfound", "socket"],
        ErrorCategory::Network,
    ),
    (
        &[
            "connection",
            "econnrefused",
            "econnreset",
            "disconnected",
            "unreachable",
        ],
        ErrorCategory::Connection,
    ),
    (
        &["database", "sql", "postgres", "constraint", "duplicate key"],
        ErrorCategory::Database,
    ),
    (
        &["send", "deliver", "message", "http 5"],
        ErrorCategory::MessageDelivery,
    ),
];

const NON_RETRYABLE: &[&str] = &[
    "invalid",
    "not registered",
    "not on whatsapp",
    "unauthorized",
    "forbidden",
    "not configured",
];

const RETRYABLE: &[&str] = &[
    "network",
    "timeout",
    "timed out",
    "connection",
    "econnrefused",
    "econnreset",
    "socket",
    "429",
    "rate limit",
    "too many requests",
    "temporary",
    "temporarily",
    "try again",
    "busy",
    "unavailable",
];

static SERVER_ERROR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b5\d{2}\b").expect("valid 5xx regex"));

/// Context keys whose values are message bodies. Compared after lowercasing
/// and removing `_` and `-`.
const REDACTED_KEYS: &[&str] = &[
    "message",
    "messagecontent",
    "messagebody",
    "content",
    "text",
    "body",
    "renderedmessage",
];

const REDACTED: &str = "[REDACTED]";

pub fn categorize(message: &str) -> ErrorCategory {
    let lowered = message.to_lowercase();
    CATEGORY_RULES
        .iter()
        .find(|(patterns, _)| patterns.iter().any(|p| lowered.contains(p)))
        .map(|(_, category)| *category)
        .unwrap_or(ErrorCategory::Unknown)
}

pub fn severity_for(category: ErrorCategory) -> ErrorSeverity {
    match category {
        ErrorCategory::Authentication | ErrorCategory::Configuration => ErrorSeverity::Critical,
        ErrorCategory::Connection => ErrorSeverity::High,
        ErrorCategory::PhoneValidation => ErrorSeverity::Low,
        _ => ErrorSeverity::Medium,
    }
}

/// Whether an error message describes a likely-transient failure.
pub fn is_retryable(message: &str) -> bool {
    let lowered = message.to_lowercase();
    if NON_RETRYABLE.iter().any(|p| lowered.contains(p)) {
        return false;
    }
    RETRYABLE.iter().any(|p| lowered.contains(p)) || SERVER_ERROR.is_match(&lowered)
}

/// Redact message bodies and mask phone numbers, recursively.
pub fn sanitize_context(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sanitized = map
                .iter()
                .map(|(key, value)| (key.clone(), sanitize_field(key, value)))
                .collect::<Map<_, _>>();
            Value::Object(sanitized)
        }
        Value::Array(items) => Value::Array(items.iter().map(sanitize_context).collect()),
        other => other.clone(),
    }
}

fn sanitize_field(key: &str, value: &Value) -> Value {
    let normalized: String = key
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .collect::<String>()
        .to_lowercase();

    if REDACTED_KEYS.contains(&normalized.as_str()) {
        return Value::String(REDACTED.to_string());
    }
    if normalized.contains("phone") || normalized == "number" {
        return match value {
            Value::String(phone) => Value::String(mask_phone(phone)),
            Value::Null => Value::Null,
            _ => Value::String(REDACTED.to_string()),
        };
    }
    sanitize_context(value)
}

/// Where an error happened.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    pub operation: Option<String>,
    pub order_id: Option<Uuid>,
    pub notification_id: Option<Uuid>,
    pub customer_phone: Option<String>,
    pub attempt: Option<u32>,
    /// Free-form details; sanitized before storage.
    pub extra: Value,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: Some(operation.into()),
            ..Self::default()
        }
    }

    pub fn order(mut self, order_id: Uuid) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn notification(mut self, notification_id: Uuid) -> Self {
        self.notification_id = Some(notification_id);
        self
    }

    pub fn phone(mut self, phone: impl Into<String>) -> Self {
        self.customer_phone = Some(phone.into());
        self
    }

    pub fn attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    pub fn extra(mut self, extra: Value) -> Self {
        self.extra = extra;
        self
    }

    fn to_json(&self) -> Value {
        let mut map = match &self.extra {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("extra".into(), other.clone());
                map
            }
        };
        if let Some(operation) = &self.operation {
            map.insert("operation".into(), json!(operation));
        }
        if let Some(attempt) = self.attempt {
            map.insert("attempt".into(), json!(attempt));
        }
        sanitize_context(&Value::Object(map))
    }
}

pub struct ErrorLogger {
    store: Arc<dyn ErrorLogRepository>,
    alerts: AlertPublisher,
    clock: Arc<dyn Clock>,
    config: ErrorLoggerConfig,
}

impl ErrorLogger {
    pub fn new(
        store: Arc<dyn ErrorLogRepository>,
        alerts: AlertPublisher,
        clock: Arc<dyn Clock>,
        config: ErrorLoggerConfig,
    ) -> Self {
        Self {
            store,
            alerts,
            clock,
            config,
        }
    }

    /// Classify, persist and alert on an error. Never fails: store problems
    /// are logged and the entry is still returned.
    pub async fn log_error(&self, message: &str, context: ErrorContext) -> ErrorLogEntry {
        let category = categorize(message);
        let severity = severity_for(category);
        let entry = ErrorLogEntry {
            id: Uuid::now_v7(),
            category,
            severity,
            error_message: message.to_string(),
            context: context.to_json(),
            order_id: context.order_id,
            customer_phone: context.customer_phone.as_deref().map(mask_phone),
            notification_id: context.notification_id,
            is_retryable: is_retryable(message),
            timestamp: self.clock.now(),
        };

        let order_id = entry.order_id.map(|id| id.to_string()).unwrap_or_default();
        match severity {
            ErrorSeverity::Critical | ErrorSeverity::High => error!(
                category = %category,
                severity = %severity,
                order_id = %order_id,
                retryable = entry.is_retryable,
                error = %message,
                "Notification error"
            ),
            ErrorSeverity::Medium => warn!(
                category = %category,
                severity = %severity,
                order_id = %order_id,
                retryable = entry.is_retryable,
                error = %message,
                "Notification error"
            ),
            ErrorSeverity::Low => info!(
                category = %category,
                severity = %severity,
                order_id = %order_id,
                error = %message,
                "Notification error"
            ),
        }
        metrics::error_logged(category);

        if let Err(e) = self.store.insert(&entry).await {
            error!(error = %e, "Failed to persist error log entry");
        }
        if let Err(e) = self.evaluate_alerts(&entry).await {
            error!(error = %e, "Failed to evaluate error alerts");
        }
        entry
    }

    async fn evaluate_alerts(&self, entry: &ErrorLogEntry) -> NotificationResult<()> {
        if entry.severity >= ErrorSeverity::High {
            self.alerts
                .raise(
                    AlertKind::CriticalError,
                    entry.severity,
                    format!("{} error: {}", entry.category, entry.error_message),
                    json!({
                        "category": entry.category,
                        "error_log_id": entry.id,
                        "order_id": entry.order_id,
                        "notification_id": entry.notification_id,
                    }),
                )
                .await?;
            return Ok(());
        }

        let window = Duration::hours(1);
        let dedup = Duration::seconds(self.config.alert_dedup_secs as i64);
        let recent = self.store.list_since(self.clock.now() - window).await?;

        let total = recent.len() as u64;
        if total > self.config.hourly_error_threshold {
            self.alerts
                .raise_deduplicated(
                    AlertKind::HighErrorRate,
                    ErrorSeverity::High,
                    format!("{} notification errors in the last hour", total),
                    json!({ "count": total, "threshold": self.config.hourly_error_threshold }),
                    dedup,
                )
                .await?;
        }

        let in_category = recent
            .iter()
            .filter(|e| e.category == entry.category)
            .count() as u64;
        if in_category > self.config.category_error_threshold {
            self.alerts
                .raise_deduplicated(
                    AlertKind::CategorySpike,
                    ErrorSeverity::Medium,
                    format!("{} {} errors in the last hour", in_category, entry.category),
                    json!({
                        "category": entry.category,
                        "count": in_category,
                        "threshold": self.config.category_error_threshold,
                    }),
                    dedup,
                )
                .await?;
        }
        Ok(())
    }

    pub async fn get_error_stats(
        &self,
        since: chrono::DateTime<chrono::Utc>,
    ) -> NotificationResult<ErrorStats> {
        let entries = self.store.list_since(since).await?;
        let mut stats = ErrorStats {
            total: entries.len() as u64,
            ..ErrorStats::default()
        };
        for entry in &entries {
            if entry.is_retryable {
                stats.retryable += 1;
            }
            *stats.by_category.entry(entry.category).or_insert(0) += 1;
            *stats.by_severity.entry(entry.severity).or_insert(0) += 1;
        }
        Ok(stats)
    }

    pub async fn get_order_errors(&self, order_id: Uuid) -> NotificationResult<Vec<ErrorLogEntry>> {
        self.store.list_by_order(order_id).await
    }

    /// Delete entries past the retention period. Returns the number deleted.
    pub async fn cleanup_old_logs(&self) -> NotificationResult<u64> {
        let cutoff = self.clock.now() - Duration::days(self.config.retention_days);
        let deleted = self.store.delete_older_than(cutoff).await?;
        info!(deleted, retention_days = self.config.retention_days, "Cleaned up old error logs");
        Ok(deleted)
    }
}
