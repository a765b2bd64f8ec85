//! Persisting and logging operational alerts.

use chrono::Duration;
use std::sync::Arc;
use tracing::{error, warn};

use crate::clock::Clock;
use crate::error::NotificationResult;
use crate::metrics;
use crate::models::{Alert, AlertKind, ErrorSeverity};
use crate::repository::AlertRepository;

#[derive(Clone)]
pub struct AlertPublisher {
    alerts: Arc<dyn AlertRepository>,
    clock: Arc<dyn Clock>,
}

impl AlertPublisher {
    pub fn new(alerts: Arc<dyn AlertRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { alerts, clock }
    }

    pub async fn raise(
        &self,
        kind: AlertKind,
        severity: ErrorSeverity,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> NotificationResult<Alert> {
        let alert = Alert::new(kind, severity, message, details, self.clock.now());
        self.alerts.insert(&alert).await?;
        metrics::alert_raised(kind);

        if severity >= ErrorSeverity::High {
            error!(alert_kind = %kind, severity = %severity, message = %alert.message, "ALERT");
        } else {
            warn!(alert_kind = %kind, severity = %severity, message = %alert.message, "ALERT");
        }
        Ok(alert)
    }

    /// Raise unless an alert of the same kind exists within `window`.
    ///
    /// Returns `None` when suppressed.
    pub async fn raise_deduplicated(
        &self,
        kind: AlertKind,
        severity: ErrorSeverity,
        message: impl Into<String>,
        details: serde_json::Value,
        window: Duration,
    ) -> NotificationResult<Option<Alert>> {
        let since = self.clock.now() - window;
        if self.alerts.exists_since(kind, since).await? {
            return Ok(None);
        }
        self.raise(kind, severity, message, details).await.map(Some)
    }
}
