//! Notification queue: validated enqueue and the batch processing loop.
//!
//! A processing pass fetches due pending rows oldest first, sends them in
//! small concurrent groups with a pause between groups, and then either
//! marks each row sent, reschedules it with exponential backoff, or marks it
//! failed. Only one pass runs at a time per process.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cipher::PhoneCipher;
use crate::clock::{Clock, start_of_day};
use crate::compliance::ComplianceChecker;
use crate::config::QueueConfig;
use crate::error::{EnqueueError, NotificationError, NotificationResult};
use crate::error_log::{ErrorContext, ErrorLogger};
use crate::metrics;
use crate::models::{
    NotificationStatus, NotificationType, OrderDetails, OrderLinks, ProcessResult,
    QueueStats, QueuedNotification,
};
use crate::opt_out::OptOutRegistry;
use crate::orders::OrderProvider;
use crate::phone::{mask_phone, normalize_phone};
use crate::repository::NotificationRepository;
use crate::templates::TemplateRenderer;
use crate::transport::MessagingTransport;
use crate::worker::PeriodicWorker;

/// A request to notify a customer about an order.
#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    pub order_id: Uuid,
    pub customer_phone: String,
    /// Overrides the order's customer name when non-empty.
    pub customer_name: String,
    pub notification_type: NotificationType,
    /// Pre-fetched order; fetched from the order provider when `None`.
    pub order: Option<OrderDetails>,
    pub links: OrderLinks,
    /// Sent verbatim instead of a rendered template.
    pub custom_message: Option<String>,
}

impl EnqueueRequest {
    pub fn new(
        order_id: Uuid,
        customer_phone: impl Into<String>,
        customer_name: impl Into<String>,
        notification_type: NotificationType,
    ) -> Self {
        Self {
            order_id,
            customer_phone: customer_phone.into(),
            customer_name: customer_name.into(),
            notification_type,
            order: None,
            links: OrderLinks::default(),
            custom_message: None,
        }
    }

    pub fn with_order(mut self, order: OrderDetails) -> Self {
        self.order = Some(order);
        self
    }

    pub fn with_links(mut self, links: OrderLinks) -> Self {
        self.links = links;
        self
    }

    pub fn with_custom_message(mut self, message: impl Into<String>) -> Self {
        self.custom_message = Some(message.into());
        self
    }
}

/// Collaborators of the [`QueueManager`].
#[derive(Clone)]
pub struct QueueDependencies {
    pub notifications: Arc<dyn NotificationRepository>,
    pub transport: Arc<dyn MessagingTransport>,
    pub orders: Arc<dyn OrderProvider>,
    pub templates: Arc<TemplateRenderer>,
    pub compliance: Arc<ComplianceChecker>,
    pub opt_outs: Arc<OptOutRegistry>,
    pub cipher: Arc<PhoneCipher>,
    pub errors: Arc<ErrorLogger>,
    pub clock: Arc<dyn Clock>,
}

/// Retry delay after the given (1-indexed) failed attempt.
pub fn backoff_delay(config: &QueueConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
    let raw = config.base_delay_ms as f64 * config.backoff_multiplier.powi(exponent);
    let capped = raw.min(config.max_delay_ms as f64).max(0.0);
    Duration::from_millis(capped as u64)
}

/// Resets the single-flight flag when a pass ends, however it ends.
struct PassGuard<'a>(&'a AtomicBool);

impl<'a> PassGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Clone)]
pub struct QueueManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: QueueConfig,
    deps: QueueDependencies,
    processing: AtomicBool,
    auto: PeriodicWorker,
    /// Passes started by enqueue when immediate processing is on.
    immediate: Mutex<JoinSet<()>>,
    closed: AtomicBool,
}

impl QueueManager {
    pub fn new(config: QueueConfig, deps: QueueDependencies) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                deps,
                processing: AtomicBool::new(false),
                auto: PeriodicWorker::new("notification-queue"),
                immediate: Mutex::new(JoinSet::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Validate, render and persist a notification.
    ///
    /// On any error no row is written.
    pub async fn enqueue(&self, request: EnqueueRequest) -> Result<Uuid, EnqueueError> {
        let deps = &self.inner.deps;
        let notification_type = request.notification_type;

        let phone = match normalize_phone(&request.customer_phone) {
            Ok(phone) => phone,
            Err(e) => {
                metrics::notification_rejected("invalid_phone");
                return Err(EnqueueError::InvalidPhone(e.to_string()));
            }
        };
        let phone_lookup = deps.cipher.lookup_key(phone.as_str());

        if deps.opt_outs.is_opted_out_lookup(&phone_lookup).await {
            info!(
                order_id = %request.order_id,
                phone = %mask_phone(phone.as_str()),
                "Customer opted out, notification not queued"
            );
            metrics::notification_rejected("opted_out");
            return Err(EnqueueError::OptedOut);
        }

        let message = self.render_message(&request).await.inspect_err(|_| {
            metrics::notification_rejected("render_failure");
        })?;

        let report = deps
            .compliance
            .check_full_compliance(&message, notification_type, &phone_lookup)
            .await?;
        for warning in &report.warnings {
            warn!(order_id = %request.order_id, notification_type = %notification_type, warning = %warning, "Compliance warning");
        }
        if !report.is_compliant {
            metrics::notification_rejected("compliance");
            return Err(EnqueueError::ComplianceViolation(report.violations));
        }

        let encrypted = deps
            .cipher
            .encrypt(phone.as_str())
            .map_err(NotificationError::from)?;
        let notification = QueuedNotification::new_pending(
            request.order_id,
            encrypted,
            phone_lookup,
            notification_type,
            message,
            deps.clock.now(),
        );
        deps.notifications.insert(&notification).await?;

        metrics::notification_enqueued(notification_type);
        info!(
            notification_id = %notification.id,
            order_id = %request.order_id,
            notification_type = %notification_type,
            phone = %mask_phone(phone.as_str()),
            "Notification queued"
        );

        self.trigger_processing();
        Ok(notification.id)
    }

    async fn render_message(&self, request: &EnqueueRequest) -> Result<String, EnqueueError> {
        if let Some(custom) = &request.custom_message {
            return Ok(custom.clone());
        }

        let mut order = match &request.order {
            Some(order) => order.clone(),
            None => self
                .inner
                .deps
                .orders
                .fetch_order(request.order_id)
                .await
                .map_err(|e| EnqueueError::RenderFailure(e.to_string()))?,
        };
        if !request.customer_name.trim().is_empty() {
            order.customer_name = request.customer_name.clone();
        }

        self.inner
            .deps
            .templates
            .render_for_order(request.notification_type, &order, &request.links)
            .await
            .map_err(|e| EnqueueError::RenderFailure(e.to_string()))
    }

    /// Start a pass in the background unless immediate processing is off.
    fn trigger_processing(&self) {
        if !self.inner.config.immediate_processing || self.inner.closed.load(Ordering::Acquire) {
            return;
        }
        let queue = self.clone();
        let mut passes = self.inner.immediate.lock().unwrap_or_else(PoisonError::into_inner);
        while passes.try_join_next().is_some() {}
        passes.spawn(async move {
            queue.process_pending_notifications().await;
        });
    }

    /// Run one processing pass. Returns immediately with no results when a
    /// pass is already running.
    pub async fn process_pending_notifications(&self) -> Vec<ProcessResult> {
        let Some(_guard) = PassGuard::acquire(&self.inner.processing) else {
            debug!("Processing pass already running, skipping");
            return Vec::new();
        };

        let config = &self.inner.config;
        let deps = &self.inner.deps;
        let batch = match deps
            .notifications
            .fetch_due(deps.clock.now(), config.max_attempts, config.batch_size)
            .await
        {
            Ok(batch) => batch,
            Err(e) => {
                error!(error = %e, "Failed to fetch pending notifications");
                deps.errors
                    .log_error(&e.to_string(), ErrorContext::new("fetch_pending_notifications"))
                    .await;
                return Vec::new();
            }
        };

        if batch.is_empty() {
            return Vec::new();
        }
        debug!(count = batch.len(), "Processing pending notifications");
        metrics::processing_pass(batch.len());

        let group_size = config.max_concurrent.max(1);
        let group_count = batch.len().div_ceil(group_size);
        let mut results = Vec::with_capacity(batch.len());

        for (index, group) in batch.chunks(group_size).enumerate() {
            let outcomes = join_all(group.iter().cloned().map(|n| self.process_one(n))).await;
            results.extend(outcomes);

            if index + 1 < group_count && config.batch_delay_ms > 0 {
                tokio::time::sleep(config.batch_delay()).await;
            }
        }

        let sent = results.iter().filter(|r| r.success).count();
        info!(processed = results.len(), sent, "Processing pass finished");
        results
    }

    async fn process_one(&self, mut notification: QueuedNotification) -> ProcessResult {
        let deps = &self.inner.deps;
        let id = notification.id;

        notification.attempts += 1;
        notification.status = NotificationStatus::Retrying;
        notification.updated_at = deps.clock.now();
        if let Err(e) = deps.notifications.update(&notification).await {
            error!(notification_id = %id, error = %e, "Failed to mark notification in flight");
            return ProcessResult {
                id,
                success: false,
                error: Some(e.to_string()),
            };
        }

        let phone = match deps.cipher.decrypt_safe(&notification.customer_phone) {
            Ok(phone) => phone,
            Err(e) => {
                let message = format!("Failed to decrypt customer phone: {}", e);
                return self.fail(notification, message, None, false).await;
            }
        };

        let started = Instant::now();
        match deps
            .transport
            .send_text(&phone, &notification.message_content)
            .await
        {
            Ok(sent) => {
                let now = deps.clock.now();
                notification.status = NotificationStatus::Sent;
                notification.sent_at = Some(now);
                notification.whatsapp_message_id = sent.message_id;
                notification.error_message = None;
                notification.updated_at = now;
                metrics::notification_sent(notification.notification_type, started.elapsed());

                if let Err(e) = deps.notifications.update(&notification).await {
                    error!(notification_id = %id, error = %e, "Message sent but status update failed");
                }
                info!(
                    notification_id = %id,
                    order_id = %notification.order_id,
                    attempt = notification.attempts,
                    "Notification sent"
                );
                ProcessResult {
                    id,
                    success: true,
                    error: None,
                }
            }
            Err(e) => {
                let elapsed = started.elapsed();
                self.fail(notification, e.0, Some((phone, elapsed)), true).await
            }
        }
    }

    /// Record a failed attempt: reschedule when retryable, otherwise fail
    /// the row for good.
    async fn fail(
        &self,
        mut notification: QueuedNotification,
        message: String,
        send: Option<(String, Duration)>,
        may_retry: bool,
    ) -> ProcessResult {
        let deps = &self.inner.deps;
        let config = &self.inner.config;
        let id = notification.id;

        let mut context = ErrorContext::new("send_notification")
            .order(notification.order_id)
            .notification(id)
            .attempt(notification.attempts)
            .extra(json!({
                "notification_type": notification.notification_type,
                "transport": deps.transport.name(),
                "max_attempts": config.max_attempts,
            }));
        if let Some((phone, _)) = &send {
            context = context.phone(phone.clone());
        }
        let entry = deps.errors.log_error(&message, context).await;

        let now: DateTime<Utc> = deps.clock.now();
        notification.updated_at = now;
        let retry = may_retry && entry.is_retryable && notification.attempts < config.max_attempts;
        if retry {
            let delay = backoff_delay(config, notification.attempts);
            notification.status = NotificationStatus::Pending;
            notification.scheduled_at = now
                + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
            metrics::notification_retried(notification.notification_type);
            warn!(
                notification_id = %id,
                attempt = notification.attempts,
                retry_in_ms = delay.as_millis() as u64,
                error = %message,
                "Notification send failed, retry scheduled"
            );
        } else {
            notification.status = NotificationStatus::Failed;
            notification.error_message = Some(message.clone());
            let elapsed = send.map(|(_, elapsed)| elapsed).unwrap_or_default();
            metrics::notification_failed(notification.notification_type, elapsed);
            error!(
                notification_id = %id,
                order_id = %notification.order_id,
                attempt = notification.attempts,
                error = %message,
                "Notification failed permanently"
            );
        }

        if let Err(e) = deps.notifications.update(&notification).await {
            error!(notification_id = %id, error = %e, "Failed to record notification failure");
        }
        ProcessResult {
            id,
            success: false,
            error: Some(message),
        }
    }

    /// Return failed rows that still have attempts left to the queue.
    pub async fn retry_failed_notifications(&self) -> NotificationResult<u64> {
        let deps = &self.inner.deps;
        let reset = deps
            .notifications
            .reset_failed(self.inner.config.max_attempts, deps.clock.now())
            .await?;
        info!(reset, "Failed notifications reset for retry");
        if reset > 0 {
            self.trigger_processing();
        }
        Ok(reset)
    }

    /// Cancel a notification that has not been picked up yet.
    pub async fn cancel_notification(&self, id: Uuid) -> NotificationResult<bool> {
        let deps = &self.inner.deps;
        let cancelled = deps
            .notifications
            .cancel_if_pending(id, deps.clock.now())
            .await?;
        if cancelled {
            info!(notification_id = %id, "Notification cancelled");
        }
        Ok(cancelled)
    }

    /// All notifications for an order, newest first, with phones decrypted.
    pub async fn get_order_notifications(
        &self,
        order_id: Uuid,
    ) -> NotificationResult<Vec<QueuedNotification>> {
        let deps = &self.inner.deps;
        let mut rows = deps.notifications.list_by_order(order_id).await?;
        for row in &mut rows {
            match deps.cipher.decrypt_safe(&row.customer_phone) {
                Ok(phone) => row.customer_phone = phone,
                Err(e) => {
                    warn!(notification_id = %row.id, error = %e, "Could not decrypt customer phone");
                }
            }
        }
        Ok(rows)
    }

    pub async fn get_queue_stats(&self) -> NotificationResult<QueueStats> {
        let deps = &self.inner.deps;
        let counts = deps.notifications.count_by_status().await?;
        let count = |status| counts.get(&status).copied().unwrap_or(0);

        let today = deps
            .notifications
            .list_created_since(start_of_day(deps.clock.now()))
            .await?;
        let total_today = today.len() as u64;
        let sent_today = today
            .iter()
            .filter(|n| n.status == NotificationStatus::Sent)
            .count() as u64;
        let delivery_rate = if total_today == 0 {
            0.0
        } else {
            (sent_today as f64 / total_today as f64 * 100.0).clamp(0.0, 100.0)
        };

        Ok(QueueStats {
            pending: count(NotificationStatus::Pending),
            retrying: count(NotificationStatus::Retrying),
            sent: count(NotificationStatus::Sent),
            failed: count(NotificationStatus::Failed),
            cancelled: count(NotificationStatus::Cancelled),
            total: counts.values().sum(),
            sent_today,
            total_today,
            delivery_rate,
        })
    }

    /// Put rows left in flight by a crashed pass back in the queue, or fail
    /// them when the interrupted send was their last attempt.
    pub async fn recover_interrupted(&self) -> NotificationResult<u64> {
        let deps = &self.inner.deps;
        let recovered = deps
            .notifications
            .recover_in_flight(self.inner.config.max_attempts, deps.clock.now())
            .await?;
        if recovered.total() > 0 {
            warn!(
                requeued = recovered.requeued,
                failed = recovered.failed,
                "Recovered notifications interrupted mid-send"
            );
        }
        Ok(recovered.total())
    }

    /// Run a processing pass on the configured interval.
    pub fn start_auto_processing(&self) -> bool {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        self.inner
            .auto
            .start(self.inner.config.auto_process_interval(), move || {
                let weak = weak.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        QueueManager { inner }.process_pending_notifications().await;
                    }
                }
            })
    }

    pub fn stop_auto_processing(&self) -> bool {
        self.inner.auto.stop()
    }

    pub fn is_auto_processing(&self) -> bool {
        self.inner.auto.is_running()
    }

    /// Stop auto-processing, refuse new immediate passes and wait for every
    /// in-flight pass.
    pub async fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.auto.shutdown().await;

        let mut passes = std::mem::take(
            &mut *self.inner.immediate.lock().unwrap_or_else(PoisonError::into_inner),
        );
        while let Some(joined) = passes.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Immediate processing pass panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> QueueConfig {
        QueueConfig::default()
    }

    #[test]
    fn test_backoff_sequence() {
        let config = config();
        assert_eq!(backoff_delay(&config, 1), Duration::from_millis(1000));
        assert_eq!(backoff_delay(&config, 2), Duration::from_millis(2000));
        assert_eq!(backoff_delay(&config, 3), Duration::from_millis(4000));
        assert_eq!(backoff_delay(&config, 5), Duration::from_millis(16000));
        assert_eq!(backoff_delay(&config, 6), Duration::from_millis(30000));
        assert_eq!(backoff_delay(&config, 40), Duration::from_millis(30000));
    }

    #[test]
    fn test_backoff_with_custom_multiplier() {
        let config = QueueConfig {
            base_delay_ms: 500,
            backoff_multiplier: 3.0,
            max_delay_ms: 10_000,
            ..QueueConfig::default()
        };
        assert_eq!(backoff_delay(&config, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(&config, 3), Duration::from_millis(4500));
        assert_eq!(backoff_delay(&config, 4), Duration::from_millis(10_000));
    }

    #[test]
    fn test_pass_guard_is_single_flight() {
        let flag = AtomicBool::new(false);
        let first = PassGuard::acquire(&flag);
        assert!(first.is_some());
        assert!(PassGuard::acquire(&flag).is_none());
        drop(first);
        assert!(PassGuard::acquire(&flag).is_some());
    }
}
