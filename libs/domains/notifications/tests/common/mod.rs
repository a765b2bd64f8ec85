//! Shared harness: in-memory stores, a scripted transport and a frozen clock.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain_notifications::repository::{
    InMemoryAlertRepository, InMemoryErrorLogRepository, InMemoryNotificationRepository,
    InMemoryOptOutRepository, InMemoryTemplateRepository,
};
use domain_notifications::{
    CipherConfig, FixedVariantSelector, InMemoryOrderProvider, ManualClock, MessagingTransport,
    NotificationConfig, NotificationResult, NotificationServices, OrderDetails, OrderItem,
    SentMessage, Stores, TransportError,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

pub const PHONE: &str = "(11) 98765-4321";
pub const NORMALIZED_PHONE: &str = "5511987654321";
pub const KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

#[derive(Debug, Clone)]
pub struct SendRecord {
    pub number: String,
    pub text: String,
    pub started: tokio::time::Instant,
}

/// Transport that succeeds unless outcomes are scripted.
#[derive(Default)]
pub struct FakeTransport {
    sends: Mutex<Vec<SendRecord>>,
    script: Mutex<VecDeque<Result<(), String>>>,
    latency: Mutex<Option<Duration>>,
}

impl FakeTransport {
    /// Queue outcomes for the next sends; later sends succeed.
    pub fn script(&self, outcomes: impl IntoIterator<Item = Result<(), String>>) {
        self.script.lock().unwrap().extend(outcomes);
    }

    pub fn fail_always(&self, message: &str, times: usize) {
        self.script((0..times).map(|_| Err(message.to_string())));
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    pub fn sends(&self) -> Vec<SendRecord> {
        self.sends.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessagingTransport for FakeTransport {
    async fn send_text(&self, number: &str, text: &str) -> Result<SentMessage, TransportError> {
        let record = SendRecord {
            number: number.to_string(),
            text: text.to_string(),
            started: tokio::time::Instant::now(),
        };
        let index = {
            let mut sends = self.sends.lock().unwrap();
            sends.push(record);
            sends.len()
        };

        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let outcome = self.script.lock().unwrap().pop_front().unwrap_or(Ok(()));
        match outcome {
            Ok(()) => Ok(SentMessage {
                message_id: Some(format!("wamid.{}", index)),
            }),
            Err(message) => Err(TransportError::new(message)),
        }
    }

    fn name(&self) -> &'static str {
        "fake"
    }

    async fn health_check(&self) -> NotificationResult<bool> {
        Ok(true)
    }
}

pub struct Harness {
    pub services: NotificationServices,
    pub notifications: Arc<InMemoryNotificationRepository>,
    pub opt_outs: Arc<InMemoryOptOutRepository>,
    pub error_logs: Arc<InMemoryErrorLogRepository>,
    pub alerts: Arc<InMemoryAlertRepository>,
    pub templates: Arc<InMemoryTemplateRepository>,
    pub transport: Arc<FakeTransport>,
    pub orders: Arc<InMemoryOrderProvider>,
    pub clock: Arc<ManualClock>,
}

/// Defaults with immediate processing off so passes run only when a test asks.
pub fn test_config() -> NotificationConfig {
    let mut config = NotificationConfig::default();
    config.queue.immediate_processing = false;
    config.cipher = CipherConfig {
        key: Some(KEY_HEX.to_string()),
    };
    config
}

pub fn harness() -> Harness {
    harness_with(test_config())
}

pub fn harness_with(config: NotificationConfig) -> Harness {
    let notifications = Arc::new(InMemoryNotificationRepository::new());
    let opt_outs = Arc::new(InMemoryOptOutRepository::new());
    let error_logs = Arc::new(InMemoryErrorLogRepository::new());
    let alerts = Arc::new(InMemoryAlertRepository::new());
    let templates = Arc::new(InMemoryTemplateRepository::new());
    let transport = Arc::new(FakeTransport::default());
    let orders = Arc::new(InMemoryOrderProvider::new());
    // 15:00 UTC is 12:00 in the restaurant's timezone.
    let clock = Arc::new(ManualClock::at(2026, 3, 10, 15, 0));

    let stores = Stores {
        notifications: notifications.clone(),
        opt_outs: opt_outs.clone(),
        error_logs: error_logs.clone(),
        alerts: alerts.clone(),
        templates: templates.clone(),
    };
    let services = NotificationServices::new(
        config,
        stores,
        transport.clone(),
        orders.clone(),
        Arc::new(FixedVariantSelector(0)),
        clock.clone(),
    )
    .expect("valid test configuration");

    Harness {
        services,
        notifications,
        opt_outs,
        error_logs,
        alerts,
        templates,
        transport,
        orders,
        clock,
    }
}

pub fn now(h: &Harness) -> DateTime<Utc> {
    use domain_notifications::Clock;
    h.clock.now()
}

pub fn order(id: Uuid) -> OrderDetails {
    OrderDetails {
        id,
        order_number: "A-042".into(),
        customer_name: "Maria".into(),
        customer_phone: Some(PHONE.into()),
        table_number: Some("7".into()),
        total_amount: 35.5,
        items: vec![
            OrderItem {
                item_name: "Feijoada".into(),
                quantity: 1,
                unit_price: 29.9,
            },
            OrderItem {
                item_name: "Guaraná".into(),
                quantity: 1,
                unit_price: 5.6,
            },
        ],
        status: "paid".into(),
        created_at: Utc::now(),
    }
}

/// Register an order with the provider and return its id.
pub async fn seed_order(h: &Harness) -> Uuid {
    let id = Uuid::new_v4();
    h.orders.put(order(id)).await;
    id
}
