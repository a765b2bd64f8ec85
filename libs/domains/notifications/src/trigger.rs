//! Entry point for order lifecycle events.
//!
//! Never fails: a notification problem must not abort the order transition
//! that caused it. Errors are logged and `None` is returned.

use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::EnqueueError;
use crate::error_log::{ErrorContext, ErrorLogger};
use crate::models::{NotificationStatus, NotificationType, OrderLinks, OrderStatus};
use crate::orders::OrderProvider;
use crate::queue::{EnqueueRequest, QueueManager};
use crate::repository::NotificationRepository;

/// Rows in these states mean the customer was or will be notified.
const ACTIVE_STATUSES: &[NotificationStatus] = &[
    NotificationStatus::Pending,
    NotificationStatus::Retrying,
    NotificationStatus::Sent,
];

pub struct NotificationTrigger {
    queue: QueueManager,
    orders: Arc<dyn OrderProvider>,
    notifications: Arc<dyn NotificationRepository>,
    errors: Arc<ErrorLogger>,
}

impl NotificationTrigger {
    pub fn new(
        queue: QueueManager,
        orders: Arc<dyn OrderProvider>,
        notifications: Arc<dyn NotificationRepository>,
        errors: Arc<ErrorLogger>,
    ) -> Self {
        Self {
            queue,
            orders,
            notifications,
            errors,
        }
    }

    pub async fn on_order_created_with_links(&self, order_id: Uuid, links: OrderLinks) -> Option<Uuid> {
        self.notify(order_id, NotificationType::OrderCreated, links).await
    }

    pub async fn on_payment_confirmed(&self, order_id: Uuid) -> Option<Uuid> {
        self.notify(order_id, NotificationType::PaymentConfirmed, OrderLinks::default())
            .await
    }

    pub async fn on_order_preparing(&self, order_id: Uuid) -> Option<Uuid> {
        self.notify(order_id, NotificationType::Preparing, OrderLinks::default())
            .await
    }

    pub async fn on_order_ready(&self, order_id: Uuid) -> Option<Uuid> {
        self.notify(order_id, NotificationType::Ready, OrderLinks::default())
            .await
    }

    /// Dispatch on the new status: `paid`, `in_preparation` and `ready`
    /// notify; anything else, or no actual change, does nothing.
    pub async fn on_order_status_change(
        &self,
        order_id: Uuid,
        new_status: &str,
        old_status: Option<&str>,
    ) -> Option<Uuid> {
        if old_status.is_some_and(|old| old.eq_ignore_ascii_case(new_status)) {
            debug!(order_id = %order_id, status = new_status, "Order status unchanged");
            return None;
        }
        let Ok(status) = OrderStatus::from_str(&new_status.to_ascii_lowercase()) else {
            debug!(order_id = %order_id, status = new_status, "Unknown order status");
            return None;
        };

        match status {
            OrderStatus::Paid => self.on_payment_confirmed(order_id).await,
            OrderStatus::InPreparation => self.on_order_preparing(order_id).await,
            OrderStatus::Ready => self.on_order_ready(order_id).await,
            _ => None,
        }
    }

    async fn notify(
        &self,
        order_id: Uuid,
        notification_type: NotificationType,
        links: OrderLinks,
    ) -> Option<Uuid> {
        let context = || {
            ErrorContext::new(format!("trigger_{}", notification_type))
                .order(order_id)
        };

        match self
            .notifications
            .exists_for_order(order_id, notification_type, ACTIVE_STATUSES)
            .await
        {
            Ok(true) => {
                info!(order_id = %order_id, notification_type = %notification_type, "Notification already queued for order");
                return None;
            }
            Ok(false) => {}
            Err(e) => {
                self.errors.log_error(&e.to_string(), context()).await;
                return None;
            }
        }

        let order = match self.orders.fetch_order(order_id).await {
            Ok(order) => order,
            Err(e) => {
                self.errors.log_error(&e.to_string(), context()).await;
                return None;
            }
        };

        let Some(phone) = order.customer_phone.clone().filter(|p| !p.trim().is_empty()) else {
            info!(order_id = %order_id, "Order has no customer phone, skipping notification");
            return None;
        };

        let request = EnqueueRequest::new(
            order_id,
            phone.clone(),
            order.customer_name.clone(),
            notification_type,
        )
        .with_order(order)
        .with_links(links);

        match self.queue.enqueue(request).await {
            Ok(id) => Some(id),
            Err(EnqueueError::OptedOut) => None,
            Err(e) => {
                self.errors
                    .log_error(&e.to_string(), context().phone(phone))
                    .await;
                None
            }
        }
    }
}
