//! Repository traits for each persisted entity, plus in-memory
//! implementations used in development and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::NotificationResult;
use crate::models::{
    Alert, AlertKind, ErrorLogEntry, MessageTemplate, NotificationStatus, NotificationType,
    OptOutRecord, QueuedNotification,
};

/// Persistence for queued notifications.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn insert(&self, notification: &QueuedNotification) -> NotificationResult<()>;

    /// Overwrite every mutable column of an existing row.
    async fn update(&self, notification: &QueuedNotification) -> NotificationResult<()>;

    async fn get(&self, id: Uuid) -> NotificationResult<Option<QueuedNotification>>;

    /// Pending rows with `attempts < max_attempts` and `scheduled_at <= now`,
    /// oldest `scheduled_at` first.
    async fn fetch_due(
        &self,
        now: DateTime<Utc>,
        max_attempts: u32,
        limit: usize,
    ) -> NotificationResult<Vec<QueuedNotification>>;

    /// All rows for an order, most recent first.
    async fn list_by_order(&self, order_id: Uuid) -> NotificationResult<Vec<QueuedNotification>>;

    async fn list_created_since(
        &self,
        since: DateTime<Utc>,
    ) -> NotificationResult<Vec<QueuedNotification>>;

    async fn count_by_status(&self) -> NotificationResult<HashMap<NotificationStatus, u64>>;

    /// Non-cancelled rows created since `since`, optionally for one phone.
    async fn count_created_since(
        &self,
        since: DateTime<Utc>,
        phone_lookup: Option<&str>,
    ) -> NotificationResult<u64>;

    /// Whether any row for (order, type) is in one of `statuses`.
    async fn exists_for_order(
        &self,
        order_id: Uuid,
        notification_type: NotificationType,
        statuses: &[NotificationStatus],
    ) -> NotificationResult<bool>;

    /// Cancel every pending row for a phone. Returns the number cancelled.
    async fn cancel_pending_for_phone(
        &self,
        phone_lookup: &str,
        now: DateTime<Utc>,
    ) -> NotificationResult<u64>;

    /// Cancel one row if it is still pending.
    async fn cancel_if_pending(&self, id: Uuid, now: DateTime<Utc>) -> NotificationResult<bool>;

    /// Move failed rows with `attempts < max_attempts` back to pending with
    /// zero attempts and no error message.
    async fn reset_failed(&self, max_attempts: u32, now: DateTime<Utc>) -> NotificationResult<u64>;

    /// Resolve rows left in flight by an interrupted pass: rows that had
    /// attempts left go back to pending, the rest end failed with
    /// [`INTERRUPTED_FINAL_ATTEMPT`].
    async fn recover_in_flight(
        &self,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> NotificationResult<RecoveredRows>;
}

/// Error message of rows interrupted while sending their last attempt.
pub const INTERRUPTED_FINAL_ATTEMPT: &str = "Interrupted after final attempt";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveredRows {
    pub requeued: u64,
    pub failed: u64,
}

impl RecoveredRows {
    pub fn total(&self) -> u64 {
        self.requeued + self.failed
    }
}

#[async_trait]
pub trait OptOutRepository: Send + Sync {
    /// Insert or replace the record keyed by `phone_lookup`.
    async fn upsert(&self, record: &OptOutRecord) -> NotificationResult<()>;

    async fn find(&self, phone_lookup: &str) -> NotificationResult<Option<OptOutRecord>>;

    async fn delete(&self, phone_lookup: &str) -> NotificationResult<bool>;

    /// Records opted out at or after `since`; all records when `None`.
    async fn count_since(&self, since: Option<DateTime<Utc>>) -> NotificationResult<u64>;

    async fn list_all(&self) -> NotificationResult<Vec<OptOutRecord>>;
}

#[async_trait]
pub trait ErrorLogRepository: Send + Sync {
    async fn insert(&self, entry: &ErrorLogEntry) -> NotificationResult<()>;

    async fn list_since(&self, since: DateTime<Utc>) -> NotificationResult<Vec<ErrorLogEntry>>;

    /// Most recent first.
    async fn list_by_order(&self, order_id: Uuid) -> NotificationResult<Vec<ErrorLogEntry>>;

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> NotificationResult<u64>;
}

#[async_trait]
pub trait AlertRepository: Send + Sync {
    async fn insert(&self, alert: &Alert) -> NotificationResult<()>;

    async fn exists_since(&self, kind: AlertKind, since: DateTime<Utc>) -> NotificationResult<bool>;

    async fn list_since(&self, since: DateTime<Utc>) -> NotificationResult<Vec<Alert>>;
}

#[async_trait]
pub trait TemplateRepository: Send + Sync {
    async fn find_active(
        &self,
        template_type: NotificationType,
    ) -> NotificationResult<Option<MessageTemplate>>;
}

/// All repositories the subsystem needs, shared by every service.
#[derive(Clone)]
pub struct Stores {
    pub notifications: Arc<dyn NotificationRepository>,
    pub opt_outs: Arc<dyn OptOutRepository>,
    pub error_logs: Arc<dyn ErrorLogRepository>,
    pub alerts: Arc<dyn AlertRepository>,
    pub templates: Arc<dyn TemplateRepository>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            notifications: Arc::new(InMemoryNotificationRepository::new()),
            opt_outs: Arc::new(InMemoryOptOutRepository::new()),
            error_logs: Arc::new(InMemoryErrorLogRepository::new()),
            alerts: Arc::new(InMemoryAlertRepository::new()),
            templates: Arc::new(InMemoryTemplateRepository::new()),
        }
    }
}

// ============================================================================
// In-memory implementations
// ============================================================================

#[derive(Debug, Default, Clone)]
pub struct InMemoryNotificationRepository {
    rows: Arc<RwLock<HashMap<Uuid, QueuedNotification>>>,
}

impl InMemoryNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every row, oldest first.
    pub async fn all(&self) -> Vec<QueuedNotification> {
        let rows = self.rows.read().await;
        let mut all: Vec<_> = rows.values().cloned().collect();
        all.sort_by_key(|n| (n.created_at, n.id));
        all
    }
}

#[async_trait]
impl NotificationRepository for InMemoryNotificationRepository {
    async fn insert(&self, notification: &QueuedNotification) -> NotificationResult<()> {
        self.rows
            .write()
            .await
            .insert(notification.id, notification.clone());
        Ok(())
    }

    async fn update(&self, notification: &QueuedNotification) -> NotificationResult<()> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&notification.id) {
            Some(row) => {
                *row = notification.clone();
                Ok(())
            }
            None => Err(crate::error::NotificationError::NotFound(notification.id)),
        }
    }

    async fn get(&self, id: Uuid) -> NotificationResult<Option<QueuedNotification>> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn fetch_due(
        &self,
        now: DateTime<Utc>,
        max_attempts: u32,
        limit: usize,
    ) -> NotificationResult<Vec<QueuedNotification>> {
        let rows = self.rows.read().await;
        let mut due: Vec<_> = rows
            .values()
            .filter(|n| {
                n.status == NotificationStatus::Pending
                    && n.attempts < max_attempts
                    && n.scheduled_at <= now
            })
            .cloned()
            .collect();
        due.sort_by_key(|n| (n.scheduled_at, n.id));
        due.truncate(limit);
        Ok(due)
    }

    async fn list_by_order(&self, order_id: Uuid) -> NotificationResult<Vec<QueuedNotification>> {
        let rows = self.rows.read().await;
        let mut result: Vec<_> = rows
            .values()
            .filter(|n| n.order_id == order_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(result)
    }

    async fn list_created_since(
        &self,
        since: DateTime<Utc>,
    ) -> NotificationResult<Vec<QueuedNotification>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|n| n.created_at >= since)
            .cloned()
            .collect())
    }

    async fn count_by_status(&self) -> NotificationResult<HashMap<NotificationStatus, u64>> {
        let rows = self.rows.read().await;
        let mut counts = HashMap::new();
        for n in rows.values() {
            *counts.entry(n.status).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn count_created_since(
        &self,
        since: DateTime<Utc>,
        phone_lookup: Option<&str>,
    ) -> NotificationResult<u64> {
        let rows = self.rows.read().await;
        let count = rows
            .values()
            .filter(|n| n.created_at >= since && n.status != NotificationStatus::Cancelled)
            .filter(|n| phone_lookup.is_none_or(|lookup| n.phone_lookup == lookup))
            .count();
        Ok(count as u64)
    }

    async fn exists_for_order(
        &self,
        order_id: Uuid,
        notification_type: NotificationType,
        statuses: &[NotificationStatus],
    ) -> NotificationResult<bool> {
        let rows = self.rows.read().await;
        Ok(rows.values().any(|n| {
            n.order_id == order_id
                && n.notification_type == notification_type
                && statuses.contains(&n.status)
        }))
    }

    async fn cancel_pending_for_phone(
        &self,
        phone_lookup: &str,
        now: DateTime<Utc>,
    ) -> NotificationResult<u64> {
        let mut rows = self.rows.write().await;
        let mut cancelled = 0;
        for n in rows.values_mut() {
            if n.phone_lookup == phone_lookup && n.status == NotificationStatus::Pending {
                n.status = NotificationStatus::Cancelled;
                n.updated_at = now;
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }

    async fn cancel_if_pending(&self, id: Uuid, now: DateTime<Utc>) -> NotificationResult<bool> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&id) {
            Some(n) if n.status == NotificationStatus::Pending => {
                n.status = NotificationStatus::Cancelled;
                n.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reset_failed(&self, max_attempts: u32, now: DateTime<Utc>) -> NotificationResult<u64> {
        let mut rows = self.rows.write().await;
        let mut reset = 0;
        for n in rows.values_mut() {
            if n.status == NotificationStatus::Failed && n.attempts < max_attempts {
                n.status = NotificationStatus::Pending;
                n.attempts = 0;
                n.error_message = None;
                n.scheduled_at = now;
                n.updated_at = now;
                reset += 1;
            }
        }
        Ok(reset)
    }

    async fn recover_in_flight(
        &self,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> NotificationResult<RecoveredRows> {
        let mut rows = self.rows.write().await;
        let mut recovered = RecoveredRows::default();
        for n in rows.values_mut() {
            if n.status != NotificationStatus::Retrying {
                continue;
            }
            if n.attempts >= max_attempts {
                n.status = NotificationStatus::Failed;
                n.error_message = Some(INTERRUPTED_FINAL_ATTEMPT.to_string());
                recovered.failed += 1;
            } else {
                n.status = NotificationStatus::Pending;
                recovered.requeued += 1;
            }
            n.updated_at = now;
        }
        Ok(recovered)
    }
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryOptOutRepository {
    records: Arc<RwLock<HashMap<String, OptOutRecord>>>,
}

impl InMemoryOptOutRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OptOutRepository for InMemoryOptOutRepository {
    async fn upsert(&self, record: &OptOutRecord) -> NotificationResult<()> {
        self.records
            .write()
            .await
            .insert(record.phone_lookup.clone(), record.clone());
        Ok(())
    }

    async fn find(&self, phone_lookup: &str) -> NotificationResult<Option<OptOutRecord>> {
        Ok(self.records.read().await.get(phone_lookup).cloned())
    }

    async fn delete(&self, phone_lookup: &str) -> NotificationResult<bool> {
        Ok(self.records.write().await.remove(phone_lookup).is_some())
    }

    async fn count_since(&self, since: Option<DateTime<Utc>>) -> NotificationResult<u64> {
        let records = self.records.read().await;
        let count = records
            .values()
            .filter(|r| since.is_none_or(|since| r.opted_out_at >= since))
            .count();
        Ok(count as u64)
    }

    async fn list_all(&self) -> NotificationResult<Vec<OptOutRecord>> {
        Ok(self.records.read().await.values().cloned().collect())
    }
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryErrorLogRepository {
    entries: Arc<RwLock<Vec<ErrorLogEntry>>>,
}

impl InMemoryErrorLogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<ErrorLogEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl ErrorLogRepository for InMemoryErrorLogRepository {
    async fn insert(&self, entry: &ErrorLogEntry) -> NotificationResult<()> {
        self.entries.write().await.push(entry.clone());
        Ok(())
    }

    async fn list_since(&self, since: DateTime<Utc>) -> NotificationResult<Vec<ErrorLogEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| e.timestamp >= since)
            .cloned()
            .collect())
    }

    async fn list_by_order(&self, order_id: Uuid) -> NotificationResult<Vec<ErrorLogEntry>> {
        let entries = self.entries.read().await;
        let mut result: Vec<_> = entries
            .iter()
            .filter(|e| e.order_id == Some(order_id))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(result)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> NotificationResult<u64> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| e.timestamp >= cutoff);
        Ok((before - entries.len()) as u64)
    }
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryAlertRepository {
    alerts: Arc<RwLock<Vec<Alert>>>,
}

impl InMemoryAlertRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<Alert> {
        self.alerts.read().await.clone()
    }
}

#[async_trait]
impl AlertRepository for InMemoryAlertRepository {
    async fn insert(&self, alert: &Alert) -> NotificationResult<()> {
        self.alerts.write().await.push(alert.clone());
        Ok(())
    }

    async fn exists_since(&self, kind: AlertKind, since: DateTime<Utc>) -> NotificationResult<bool> {
        let alerts = self.alerts.read().await;
        Ok(alerts
            .iter()
            .any(|a| a.kind == kind && a.created_at >= since))
    }

    async fn list_since(&self, since: DateTime<Utc>) -> NotificationResult<Vec<Alert>> {
        let alerts = self.alerts.read().await;
        Ok(alerts
            .iter()
            .filter(|a| a.created_at >= since)
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryTemplateRepository {
    templates: Arc<RwLock<HashMap<NotificationType, MessageTemplate>>>,
}

impl InMemoryTemplateRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, template: MessageTemplate) {
        self.templates
            .write()
            .await
            .insert(template.template_type, template);
    }
}

#[async_trait]
impl TemplateRepository for InMemoryTemplateRepository {
    async fn find_active(
        &self,
        template_type: NotificationType,
    ) -> NotificationResult<Option<MessageTemplate>> {
        let templates = self.templates.read().await;
        Ok(templates
            .get(&template_type)
            .filter(|t| t.is_active)
            .cloned())
    }
}
