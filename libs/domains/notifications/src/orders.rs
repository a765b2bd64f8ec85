//! Order data provider, owned by the order backend.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::{NotificationError, NotificationResult};
use crate::models::OrderDetails;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderProvider: Send + Sync {
    /// Fails with [`NotificationError::OrderNotFound`] for unknown ids.
    async fn fetch_order(&self, order_id: Uuid) -> NotificationResult<OrderDetails>;
}

/// Reads orders from the order backend's REST API.
pub struct HttpOrderProvider {
    base_url: String,
    client: Client,
}

impl HttpOrderProvider {
    pub fn new(base_url: impl Into<String>) -> NotificationResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NotificationError::ConfigError(format!("HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn order_url(&self, order_id: Uuid) -> String {
        format!("{}/orders/{}", self.base_url, order_id)
    }
}

#[async_trait]
impl OrderProvider for HttpOrderProvider {
    async fn fetch_order(&self, order_id: Uuid) -> NotificationResult<OrderDetails> {
        debug!(order_id = %order_id, "Fetching order");
        let response = self.client.get(self.order_url(order_id)).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(NotificationError::OrderNotFound(order_id)),
            status if status.is_success() => Ok(response.json::<OrderDetails>().await?),
            status => Err(NotificationError::OrderLookup(format!(
                "order backend returned HTTP {}",
                status.as_u16()
            ))),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryOrderProvider {
    orders: Arc<RwLock<HashMap<Uuid, OrderDetails>>>,
}

impl InMemoryOrderProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, order: OrderDetails) {
        self.orders.write().await.insert(order.id, order);
    }
}

#[async_trait]
impl OrderProvider for InMemoryOrderProvider {
    async fn fetch_order(&self, order_id: Uuid) -> NotificationResult<OrderDetails> {
        self.orders
            .read()
            .await
            .get(&order_id)
            .cloned()
            .ok_or(NotificationError::OrderNotFound(order_id))
    }
}
