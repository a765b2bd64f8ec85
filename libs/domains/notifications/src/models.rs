//! Data models for the notifications domain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use uuid::Uuid;

// ============================================================================
// Queue
// ============================================================================

/// Order lifecycle event a notification belongs to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationType {
    OrderCreated,
    PaymentConfirmed,
    Preparing,
    Ready,
    /// Free text supplied by an operator.
    Custom,
}

/// Delivery state of a queued notification.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationStatus {
    /// Waiting to be picked up by a processing pass.
    Pending,
    /// An attempt is in flight.
    Retrying,
    Sent,
    Failed,
    Cancelled,
}

impl NotificationStatus {
    /// Whether no processing pass will touch the row again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent | Self::Failed | Self::Cancelled)
    }
}

/// One row per notification attempt-series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedNotification {
    pub id: Uuid,
    pub order_id: Uuid,
    /// Encrypted when a key is configured, plaintext otherwise.
    pub customer_phone: String,
    /// Deterministic blind index of the normalized phone.
    pub phone_lookup: String,
    pub notification_type: NotificationType,
    pub message_content: String,
    pub status: NotificationStatus,
    pub attempts: u32,
    pub scheduled_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub whatsapp_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QueuedNotification {
    /// Create a new pending row scheduled for `now`.
    pub fn new_pending(
        order_id: Uuid,
        customer_phone: String,
        phone_lookup: String,
        notification_type: NotificationType,
        message_content: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            order_id,
            customer_phone,
            phone_lookup,
            notification_type,
            message_content,
            status: NotificationStatus::Pending,
            attempts: 0,
            scheduled_at: now,
            sent_at: None,
            error_message: None,
            whatsapp_message_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Outcome of one item in a processing pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessResult {
    pub id: Uuid,
    pub success: bool,
    pub error: Option<String>,
}

/// Counts by status plus today's delivery rate.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueStats {
    pub pending: u64,
    pub retrying: u64,
    pub sent: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub total: u64,
    pub sent_today: u64,
    pub total_today: u64,
    /// sent_today / total_today * 100, 0 when nothing was queued today.
    pub delivery_rate: f64,
}

// ============================================================================
// Opt-out
// ============================================================================

/// A customer's refusal of further notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptOutRecord {
    pub phone_lookup: String,
    /// Encrypted when a key is configured.
    pub customer_phone: String,
    pub opted_out_at: DateTime<Utc>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OptOutStats {
    pub today: u64,
    pub this_week: u64,
    pub this_month: u64,
    pub total: u64,
}

// ============================================================================
// Error log and alerts
// ============================================================================

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCategory {
    Connection,
    Authentication,
    MessageDelivery,
    PhoneValidation,
    RateLimit,
    Network,
    Database,
    Configuration,
    Unknown,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Append-only operational error record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    pub id: Uuid,
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub error_message: String,
    /// Sanitized: message bodies redacted, phones masked.
    pub context: serde_json::Value,
    pub order_id: Option<Uuid>,
    /// Masked, never the full number.
    pub customer_phone: Option<String>,
    pub notification_id: Option<Uuid>,
    pub is_retryable: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorStats {
    pub total: u64,
    pub retryable: u64,
    pub by_category: std::collections::HashMap<ErrorCategory, u64>,
    pub by_severity: std::collections::HashMap<ErrorSeverity, u64>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlertKind {
    CriticalError,
    HighErrorRate,
    CategorySpike,
    HighFailureRate,
    HighPendingCount,
    SlowDelivery,
}

/// Operational alert raised by the error logger or the delivery monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub kind: AlertKind,
    pub severity: ErrorSeverity,
    pub message: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        kind: AlertKind,
        severity: ErrorSeverity,
        message: impl Into<String>,
        details: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            kind,
            severity,
            message: message.into(),
            details,
            created_at: now,
        }
    }
}

// ============================================================================
// Templates
// ============================================================================

/// Template loaded from the template store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageTemplate {
    pub template_type: NotificationType,
    /// Handlebars source with `{{variable}}` placeholders.
    pub content: String,
    pub variables: Vec<String>,
    pub is_active: bool,
}

// ============================================================================
// Orders (owned by the order backend)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub item_name: String,
    pub quantity: u32,
    pub unit_price: f64,
}

/// Order snapshot as returned by the order data provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetails {
    pub id: Uuid,
    pub order_number: String,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub table_number: Option<String>,
    pub total_amount: f64,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Links embedded in the order-created message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderLinks {
    pub tracking_url: Option<String>,
    pub payment_url: Option<String>,
}

/// Order statuses that produce a notification when entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    InPreparation,
    Ready,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Notification sent when an order enters this status, if any.
    pub fn notification_type(&self) -> Option<NotificationType> {
        match self {
            OrderStatus::Paid => Some(NotificationType::PaymentConfirmed),
            OrderStatus::InPreparation => Some(NotificationType::Preparing),
            OrderStatus::Ready => Some(NotificationType::Ready),
            _ => None,
        }
    }
}
