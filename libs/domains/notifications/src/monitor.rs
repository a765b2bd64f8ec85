//! Delivery statistics and threshold alerting over recent notifications.

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use strum::{Display, EnumString};
use tracing::{debug, error, info};

use crate::alerts::AlertPublisher;
use crate::clock::{Clock, start_of_day};
use crate::config::MonitorConfig;
use crate::error::NotificationResult;
use crate::models::{Alert, AlertKind, ErrorSeverity, NotificationStatus, NotificationType, QueuedNotification};
use crate::repository::NotificationRepository;
use crate::worker::PeriodicWorker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString)]
pub enum StatsPeriod {
    #[strum(serialize = "1h")]
    #[serde(rename = "1h")]
    LastHour,
    #[strum(serialize = "24h")]
    #[serde(rename = "24h")]
    Last24Hours,
    #[strum(serialize = "7d")]
    #[serde(rename = "7d")]
    Last7Days,
    #[strum(serialize = "30d")]
    #[serde(rename = "30d")]
    Last30Days,
}

impl StatsPeriod {
    pub fn duration(&self) -> Duration {
        match self {
            StatsPeriod::LastHour => Duration::hours(1),
            StatsPeriod::Last24Hours => Duration::hours(24),
            StatsPeriod::Last7Days => Duration::days(7),
            StatsPeriod::Last30Days => Duration::days(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryStats {
    pub period: StatsPeriod,
    pub total: u64,
    pub pending: u64,
    pub retrying: u64,
    pub sent: u64,
    pub failed: u64,
    pub cancelled: u64,
    /// sent / (sent + failed) * 100.
    pub delivery_rate: f64,
    /// failed / (sent + failed) * 100.
    pub failure_rate: f64,
    /// Mean of `sent_at - scheduled_at` over sent rows.
    pub average_delivery_secs: Option<f64>,
}

impl DeliveryStats {
    fn compute<'a>(period: StatsPeriod, rows: impl IntoIterator<Item = &'a QueuedNotification>) -> Self {
        let mut stats = DeliveryStats {
            period,
            total: 0,
            pending: 0,
            retrying: 0,
            sent: 0,
            failed: 0,
            cancelled: 0,
            delivery_rate: 0.0,
            failure_rate: 0.0,
            average_delivery_secs: None,
        };
        let mut delivery_secs = Vec::new();

        for row in rows {
            stats.total += 1;
            match row.status {
                NotificationStatus::Pending => stats.pending += 1,
                NotificationStatus::Retrying => stats.retrying += 1,
                NotificationStatus::Sent => stats.sent += 1,
                NotificationStatus::Failed => stats.failed += 1,
                NotificationStatus::Cancelled => stats.cancelled += 1,
            }
            if row.status == NotificationStatus::Sent
                && let Some(sent_at) = row.sent_at
            {
                delivery_secs.push((sent_at - row.scheduled_at).num_milliseconds() as f64 / 1000.0);
            }
        }

        let processed = stats.sent + stats.failed;
        if processed > 0 {
            stats.delivery_rate = stats.sent as f64 / processed as f64 * 100.0;
            stats.failure_rate = stats.failed as f64 / processed as f64 * 100.0;
        }
        if !delivery_secs.is_empty() {
            stats.average_delivery_secs =
                Some(delivery_secs.iter().sum::<f64>() / delivery_secs.len() as f64);
        }
        stats
    }

    /// Rows not yet in a terminal state.
    pub fn in_queue(&self) -> u64 {
        self.pending + self.retrying
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyTrend {
    pub date: NaiveDate,
    pub total: u64,
    pub sent: u64,
    pub failed: u64,
    pub delivery_rate: f64,
}

#[derive(Clone)]
pub struct DeliveryMonitor {
    inner: Arc<Inner>,
}

struct Inner {
    notifications: Arc<dyn NotificationRepository>,
    alerts: AlertPublisher,
    clock: Arc<dyn Clock>,
    config: MonitorConfig,
    worker: PeriodicWorker,
}

impl DeliveryMonitor {
    pub fn new(
        notifications: Arc<dyn NotificationRepository>,
        alerts: AlertPublisher,
        clock: Arc<dyn Clock>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                notifications,
                alerts,
                clock,
                config,
                worker: PeriodicWorker::new("delivery-monitor"),
            }),
        }
    }

    async fn rows_for(&self, period: StatsPeriod) -> NotificationResult<Vec<QueuedNotification>> {
        let since = self.inner.clock.now() - period.duration();
        self.inner.notifications.list_created_since(since).await
    }

    pub async fn get_delivery_stats(&self, period: StatsPeriod) -> NotificationResult<DeliveryStats> {
        let rows = self.rows_for(period).await?;
        Ok(DeliveryStats::compute(period, &rows))
    }

    pub async fn get_stats_by_type(
        &self,
        period: StatsPeriod,
    ) -> NotificationResult<HashMap<NotificationType, DeliveryStats>> {
        let rows = self.rows_for(period).await?;
        let mut grouped: HashMap<NotificationType, Vec<&QueuedNotification>> = HashMap::new();
        for row in &rows {
            grouped.entry(row.notification_type).or_default().push(row);
        }
        Ok(grouped
            .into_iter()
            .map(|(t, rows)| (t, DeliveryStats::compute(period, rows)))
            .collect())
    }

    /// Evaluate last-hour thresholds and raise deduplicated alerts.
    pub async fn check_and_alert(&self) -> NotificationResult<Vec<Alert>> {
        let config = &self.inner.config;
        let stats = self.get_delivery_stats(StatsPeriod::LastHour).await?;
        if stats.total < config.min_sample_size {
            debug!(sample = stats.total, min = config.min_sample_size, "Sample too small for delivery alerts");
            return Ok(Vec::new());
        }

        let dedup = Duration::seconds(config.alert_dedup_secs as i64);
        let mut raised = Vec::new();

        if stats.failure_rate > config.failure_rate_threshold {
            raised.extend(
                self.inner
                    .alerts
                    .raise_deduplicated(
                        AlertKind::HighFailureRate,
                        ErrorSeverity::High,
                        format!("Failure rate {:.1}% in the last hour", stats.failure_rate),
                        json!({
                            "failure_rate": stats.failure_rate,
                            "threshold": config.failure_rate_threshold,
                            "sent": stats.sent,
                            "failed": stats.failed,
                        }),
                        dedup,
                    )
                    .await?,
            );
        }

        let queued = stats.in_queue();
        let queued_ratio = queued as f64 / stats.total as f64 * 100.0;
        if queued > config.pending_threshold && queued_ratio > config.pending_ratio_threshold {
            raised.extend(
                self.inner
                    .alerts
                    .raise_deduplicated(
                        AlertKind::HighPendingCount,
                        ErrorSeverity::Medium,
                        format!("{} notifications still pending ({:.1}%)", queued, queued_ratio),
                        json!({
                            "pending": queued,
                            "ratio": queued_ratio,
                            "threshold": config.pending_threshold,
                            "ratio_threshold": config.pending_ratio_threshold,
                        }),
                        dedup,
                    )
                    .await?,
            );
        }

        if let Some(average) = stats.average_delivery_secs
            && average > config.slow_delivery_secs as f64
        {
            raised.extend(
                self.inner
                    .alerts
                    .raise_deduplicated(
                        AlertKind::SlowDelivery,
                        ErrorSeverity::Medium,
                        format!("Average delivery time {:.0}s in the last hour", average),
                        json!({
                            "average_delivery_secs": average,
                            "threshold_secs": config.slow_delivery_secs,
                        }),
                        dedup,
                    )
                    .await?,
            );
        }

        Ok(raised)
    }

    /// Sent and failed counts per UTC day, oldest first, ending today.
    pub async fn get_delivery_trends(&self, days: u32) -> NotificationResult<Vec<DailyTrend>> {
        let days = days.max(1);
        let today = start_of_day(self.inner.clock.now());
        let first = today - Duration::days(i64::from(days) - 1);
        let rows = self.inner.notifications.list_created_since(first).await?;

        let mut trends: Vec<DailyTrend> = (0..days)
            .map(|offset| DailyTrend {
                date: (first + Duration::days(i64::from(offset))).date_naive(),
                total: 0,
                sent: 0,
                failed: 0,
                delivery_rate: 0.0,
            })
            .collect();

        for row in &rows {
            let index = (row.created_at - first).num_days();
            let Some(bucket) = usize::try_from(index).ok().and_then(|i| trends.get_mut(i)) else {
                continue;
            };
            bucket.total += 1;
            match row.status {
                NotificationStatus::Sent => bucket.sent += 1,
                NotificationStatus::Failed => bucket.failed += 1,
                _ => {}
            }
        }

        for bucket in &mut trends {
            let processed = bucket.sent + bucket.failed;
            if processed > 0 {
                bucket.delivery_rate = bucket.sent as f64 / processed as f64 * 100.0;
            }
        }
        Ok(trends)
    }

    /// Run [`DeliveryMonitor::check_and_alert`] on the configured interval.
    pub fn start_monitoring(&self) -> bool {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let started = self
            .inner
            .worker
            .start(self.inner.config.check_interval(), move || {
                let weak = weak.clone();
                async move {
                    let Some(inner) = weak.upgrade() else {
                        return;
                    };
                    if let Err(e) = (DeliveryMonitor { inner }).check_and_alert().await {
                        error!(error = %e, "Delivery check failed");
                    }
                }
            });
        if started {
            info!(interval_secs = self.inner.config.check_interval_secs, "Delivery monitoring started");
        }
        started
    }

    pub fn stop_monitoring(&self) -> bool {
        self.inner.worker.stop()
    }

    pub async fn shutdown(&self) {
        self.inner.worker.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::repository::{InMemoryAlertRepository, InMemoryNotificationRepository};
    use chrono::{DateTime, Utc};
    use std::str::FromStr;
    use uuid::Uuid;

    struct Fixture {
        monitor: DeliveryMonitor,
        notifications: InMemoryNotificationRepository,
        alerts: InMemoryAlertRepository,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let notifications = InMemoryNotificationRepository::new();
        let alerts = InMemoryAlertRepository::new();
        let clock = Arc::new(ManualClock::at(2026, 3, 10, 12, 0));
        let monitor = DeliveryMonitor::new(
            Arc::new(notifications.clone()),
            AlertPublisher::new(Arc::new(alerts.clone()), clock.clone()),
            clock.clone(),
            MonitorConfig::default(),
        );
        Fixture {
            monitor,
            notifications,
            alerts,
            clock,
        }
    }

    async fn add(
        repo: &InMemoryNotificationRepository,
        status: NotificationStatus,
        notification_type: NotificationType,
        created_at: DateTime<Utc>,
        delivery_secs: i64,
    ) {
        let mut row = QueuedNotification::new_pending(
            Uuid::new_v4(),
            "enc".into(),
            "lookup".into(),
            notification_type,
            "msg".into(),
            created_at,
        );
        row.status = status;
        if status == NotificationStatus::Sent {
            row.sent_at = Some(created_at + Duration::seconds(delivery_secs));
        }
        repo.insert(&row).await.unwrap();
    }

    #[test]
    fn test_period_parsing() {
        assert_eq!(StatsPeriod::from_str("24h").unwrap(), StatsPeriod::Last24Hours);
        assert_eq!(StatsPeriod::Last7Days.to_string(), "7d");
        assert!(StatsPeriod::from_str("1y").is_err());
    }

    #[tokio::test]
    async fn test_rates_and_average_delivery_time() {
        let f = fixture();
        let now = f.clock.now();
        for secs in [10, 20, 30] {
            add(&f.notifications, NotificationStatus::Sent, NotificationType::Ready, now - Duration::minutes(5), secs).await;
        }
        add(&f.notifications, NotificationStatus::Failed, NotificationType::Preparing, now - Duration::minutes(5), 0).await;
        add(&f.notifications, NotificationStatus::Pending, NotificationType::Ready, now - Duration::minutes(5), 0).await;
        // Outside every window but 7d and 30d.
        add(&f.notifications, NotificationStatus::Failed, NotificationType::Ready, now - Duration::days(2), 0).await;

        let hour = f.monitor.get_delivery_stats(StatsPeriod::LastHour).await.unwrap();
        assert_eq!(hour.total, 5);
        assert_eq!(hour.delivery_rate, 75.0);
        assert_eq!(hour.failure_rate, 25.0);
        assert_eq!(hour.average_delivery_secs, Some(20.0));

        let week = f.monitor.get_delivery_stats(StatsPeriod::Last7Days).await.unwrap();
        assert_eq!(week.failed, 2);

        let by_type = f.monitor.get_stats_by_type(StatsPeriod::LastHour).await.unwrap();
        assert_eq!(by_type[&NotificationType::Ready].sent, 3);
        assert_eq!(by_type[&NotificationType::Preparing].failure_rate, 100.0);
    }

    #[tokio::test]
    async fn test_empty_window_has_zero_rates() {
        let f = fixture();
        let stats = f.monitor.get_delivery_stats(StatsPeriod::Last24Hours).await.unwrap();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.delivery_rate, 0.0);
        assert_eq!(stats.failure_rate, 0.0);
        assert!(stats.average_delivery_secs.is_none());
    }

    #[tokio::test]
    async fn test_small_sample_never_alerts() {
        let f = fixture();
        let now = f.clock.now();
        for _ in 0..9 {
            add(&f.notifications, NotificationStatus::Failed, NotificationType::Ready, now, 0).await;
        }
        assert!(f.monitor.check_and_alert().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_rate_alert_is_deduplicated() {
        let f = fixture();
        let now = f.clock.now();
        for _ in 0..7 {
            add(&f.notifications, NotificationStatus::Sent, NotificationType::Ready, now - Duration::minutes(1), 5).await;
        }
        for _ in 0..3 {
            add(&f.notifications, NotificationStatus::Failed, NotificationType::Ready, now - Duration::minutes(1), 0).await;
        }

        let alerts = f.monitor.check_and_alert().await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::HighFailureRate);

        f.clock.advance(Duration::minutes(30));
        assert!(f.monitor.check_and_alert().await.unwrap().is_empty());
        assert_eq!(f.alerts.all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_pending_and_slow_delivery_alerts() {
        let f = fixture();
        let now = f.clock.now();
        for _ in 0..21 {
            add(&f.notifications, NotificationStatus::Pending, NotificationType::Ready, now - Duration::minutes(20), 0).await;
        }
        for _ in 0..10 {
            add(&f.notifications, NotificationStatus::Sent, NotificationType::Ready, now - Duration::minutes(20), 400).await;
        }

        let kinds: Vec<_> = f
            .monitor
            .check_and_alert()
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.kind)
            .collect();
        assert_eq!(kinds, vec![AlertKind::HighPendingCount, AlertKind::SlowDelivery]);
    }

    #[tokio::test]
    async fn test_trends_bucket_by_day() {
        let f = fixture();
        let today = start_of_day(f.clock.now());
        add(&f.notifications, NotificationStatus::Sent, NotificationType::Ready, today + Duration::hours(1), 1).await;
        add(&f.notifications, NotificationStatus::Failed, NotificationType::Ready, today + Duration::hours(2), 0).await;
        add(&f.notifications, NotificationStatus::Sent, NotificationType::Ready, today - Duration::hours(3), 1).await;
        add(&f.notifications, NotificationStatus::Sent, NotificationType::Ready, today - Duration::days(5), 1).await;

        let trends = f.monitor.get_delivery_trends(3).await.unwrap();
        assert_eq!(trends.len(), 3);
        assert_eq!(trends[0].total, 0);
        assert_eq!(trends[1].sent, 1);
        assert_eq!(trends[1].delivery_rate, 100.0);
        assert_eq!(trends[2].total, 2);
        assert_eq!(trends[2].delivery_rate, 50.0);
        assert_eq!(trends[2].date, today.date_naive());
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitoring_lifecycle() {
        let f = fixture();
        assert!(f.monitor.start_monitoring());
        assert!(!f.monitor.start_monitoring());
        assert!(f.monitor.stop_monitoring());
        assert!(!f.monitor.stop_monitoring());
        f.monitor.shutdown().await;
    }
}
