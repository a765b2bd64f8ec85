//! Counters and histograms for the notification pipeline.
//!
//! Recording is a no-op until the binary installs a recorder.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

use crate::models::{AlertKind, ErrorCategory, NotificationType};

pub fn notification_enqueued(notification_type: NotificationType) {
    counter!(
        "notifications_enqueued_total",
        "type" => notification_type.to_string()
    )
    .increment(1);
}

/// Enqueue refused before a row was written.
pub fn notification_rejected(reason: &'static str) {
    counter!("notifications_rejected_total", "reason" => reason).increment(1);
}

pub fn notification_sent(notification_type: NotificationType, duration: Duration) {
    counter!(
        "notifications_sent_total",
        "type" => notification_type.to_string()
    )
    .increment(1);
    histogram!("notification_send_duration_seconds", "outcome" => "sent")
        .record(duration.as_secs_f64());
}

pub fn notification_retried(notification_type: NotificationType) {
    counter!(
        "notifications_retried_total",
        "type" => notification_type.to_string()
    )
    .increment(1);
}

pub fn notification_failed(notification_type: NotificationType, duration: Duration) {
    counter!(
        "notifications_failed_total",
        "type" => notification_type.to_string()
    )
    .increment(1);
    histogram!("notification_send_duration_seconds", "outcome" => "failed")
        .record(duration.as_secs_f64());
}

pub fn processing_pass(items: usize) {
    counter!("notification_processing_passes_total").increment(1);
    gauge!("notification_last_batch_size").set(items as f64);
}

pub fn error_logged(category: ErrorCategory) {
    counter!(
        "notification_errors_total",
        "category" => category.to_string()
    )
    .increment(1);
}

pub fn alert_raised(kind: AlertKind) {
    counter!("notification_alerts_total", "kind" => kind.to_string()).increment(1);
}
