//! Wiring of every notification service from its collaborators.

use std::sync::Arc;

use crate::alerts::AlertPublisher;
use crate::cipher::PhoneCipher;
use crate::clock::Clock;
use crate::compliance::ComplianceChecker;
use crate::config::NotificationConfig;
use crate::error::NotificationResult;
use crate::error_log::ErrorLogger;
use crate::monitor::DeliveryMonitor;
use crate::opt_out::OptOutRegistry;
use crate::orders::OrderProvider;
use crate::queue::{QueueDependencies, QueueManager};
use crate::repository::Stores;
use crate::templates::{TemplateRenderer, VariantSelector};
use crate::transport::MessagingTransport;
use crate::trigger::NotificationTrigger;

#[derive(Clone)]
pub struct NotificationServices {
    pub queue: QueueManager,
    pub trigger: Arc<NotificationTrigger>,
    pub monitor: DeliveryMonitor,
    pub errors: Arc<ErrorLogger>,
    pub opt_outs: Arc<OptOutRegistry>,
    pub compliance: Arc<ComplianceChecker>,
    pub templates: Arc<TemplateRenderer>,
    pub cipher: Arc<PhoneCipher>,
}

impl NotificationServices {
    /// Fails only on a malformed encryption key.
    pub fn new(
        config: NotificationConfig,
        stores: Stores,
        transport: Arc<dyn MessagingTransport>,
        orders: Arc<dyn OrderProvider>,
        selector: Arc<dyn VariantSelector>,
        clock: Arc<dyn Clock>,
    ) -> NotificationResult<Self> {
        let cipher = Arc::new(PhoneCipher::from_config(&config.cipher)?);
        let alerts = AlertPublisher::new(stores.alerts.clone(), clock.clone());

        let errors = Arc::new(ErrorLogger::new(
            stores.error_logs.clone(),
            alerts.clone(),
            clock.clone(),
            config.error_logger,
        ));
        let templates = Arc::new(TemplateRenderer::new(
            stores.templates.clone(),
            selector,
            clock.clone(),
            config.templates,
        ));
        let compliance = Arc::new(ComplianceChecker::new(
            config.compliance,
            stores.notifications.clone(),
            clock.clone(),
        ));
        let opt_outs = Arc::new(OptOutRegistry::new(
            stores.opt_outs.clone(),
            stores.notifications.clone(),
            cipher.clone(),
            clock.clone(),
        ));

        let queue = QueueManager::new(
            config.queue,
            QueueDependencies {
                notifications: stores.notifications.clone(),
                transport,
                orders: orders.clone(),
                templates: templates.clone(),
                compliance: compliance.clone(),
                opt_outs: opt_outs.clone(),
                cipher: cipher.clone(),
                errors: errors.clone(),
                clock: clock.clone(),
            },
        );
        let trigger = Arc::new(NotificationTrigger::new(
            queue.clone(),
            orders,
            stores.notifications.clone(),
            errors.clone(),
        ));
        let monitor = DeliveryMonitor::new(stores.notifications, alerts, clock, config.monitor);

        Ok(Self {
            queue,
            trigger,
            monitor,
            errors,
            opt_outs,
            compliance,
            templates,
            cipher,
        })
    }

    /// Stop every background worker and wait for in-flight work.
    pub async fn shutdown(&self) {
        self.queue.stop_auto_processing();
        self.monitor.stop_monitoring();
        self.queue.shutdown().await;
        self.monitor.shutdown().await;
    }
}
