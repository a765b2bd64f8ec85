//! Message template rendering.
//!
//! Active templates come from the [`TemplateRepository`] and are cached per
//! type. When the store has nothing usable, a built-in template is picked
//! from several phrasing variants by a [`VariantSelector`].

mod fallback;

use chrono::{DateTime, Utc};
use handlebars::Handlebars;
use rand::Rng;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::TemplateConfig;
use crate::error::NotificationResult;
use crate::models::{MessageTemplate, NotificationType, OrderDetails, OrderLinks};
use crate::repository::TemplateRepository;

/// Picks one of `count` phrasing variants.
pub trait VariantSelector: Send + Sync {
    /// Returns an index in `0..count`. `count` is never zero.
    fn select(&self, count: usize) -> usize;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RandomVariantSelector;

impl VariantSelector for RandomVariantSelector {
    fn select(&self, count: usize) -> usize {
        rand::rng().random_range(0..count)
    }
}

/// Always picks the same variant, clamped to the available range.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedVariantSelector(pub usize);

impl VariantSelector for FixedVariantSelector {
    fn select(&self, count: usize) -> usize {
        self.0.min(count.saturating_sub(1))
    }
}

/// Variables available to every template.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TemplateContext {
    pub customer_name: String,
    pub order_number: String,
    pub order_id: String,
    pub table_number: Option<String>,
    /// Two decimals, no currency symbol.
    pub total: String,
    /// One line per item.
    pub items: String,
    pub item_count: usize,
    pub tracking_link: Option<String>,
    pub payment_link: Option<String>,
    pub restaurant_name: String,
}

impl TemplateContext {
    pub fn from_order(order: &OrderDetails, links: &OrderLinks, restaurant_name: &str) -> Self {
        let items = order
            .items
            .iter()
            .map(|item| {
                format!(
                    "• {}x {} (R$ {:.2})",
                    item.quantity,
                    item.item_name,
                    item.unit_price * f64::from(item.quantity)
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        Self {
            customer_name: order.customer_name.clone(),
            order_number: order.order_number.clone(),
            order_id: order.id.to_string(),
            table_number: order.table_number.clone(),
            total: format!("{:.2}", order.total_amount),
            items,
            item_count: order.items.iter().map(|i| i.quantity as usize).sum(),
            tracking_link: links.tracking_url.clone(),
            payment_link: links.payment_url.clone(),
            restaurant_name: restaurant_name.to_string(),
        }
    }
}

struct CachedTemplate {
    template: Option<MessageTemplate>,
    fetched_at: DateTime<Utc>,
}

pub struct TemplateRenderer {
    handlebars: Handlebars<'static>,
    store: Arc<dyn TemplateRepository>,
    selector: Arc<dyn VariantSelector>,
    clock: Arc<dyn Clock>,
    config: TemplateConfig,
    cache: RwLock<HashMap<NotificationType, CachedTemplate>>,
}

impl TemplateRenderer {
    pub fn new(
        store: Arc<dyn TemplateRepository>,
        selector: Arc<dyn VariantSelector>,
        clock: Arc<dyn Clock>,
        config: TemplateConfig,
    ) -> Self {
        let mut handlebars = Handlebars::new();
        // Plain text over WhatsApp: nothing to escape.
        handlebars.register_escape_fn(handlebars::no_escape);

        Self {
            handlebars,
            store,
            selector,
            clock,
            config,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn restaurant_name(&self) -> &str {
        &self.config.restaurant_name
    }

    /// Render the message for an order event.
    pub async fn render_for_order(
        &self,
        template_type: NotificationType,
        order: &OrderDetails,
        links: &OrderLinks,
    ) -> NotificationResult<String> {
        let context = TemplateContext::from_order(order, links, &self.config.restaurant_name);
        self.render(template_type, &context).await
    }

    pub async fn render(
        &self,
        template_type: NotificationType,
        context: &TemplateContext,
    ) -> NotificationResult<String> {
        if let Some(template) = self.active_template(template_type).await {
            match self.handlebars.render_template(&template.content, context) {
                Ok(rendered) => return Ok(rendered.trim().to_string()),
                Err(e) => warn!(
                    template_type = %template_type,
                    error = %e,
                    "Stored template failed to render, using built-in template"
                ),
            }
        }

        let variants = fallback::variants(template_type);
        let index = self.selector.select(variants.len()).min(variants.len() - 1);
        debug!(template_type = %template_type, variant = index, "Rendering built-in template");

        let rendered = self.handlebars.render_template(variants[index], context)?;
        Ok(rendered.trim().to_string())
    }

    /// Drop every cached template so the next render hits the store.
    pub async fn invalidate_cache(&self) {
        self.cache.write().await.clear();
    }

    async fn active_template(&self, template_type: NotificationType) -> Option<MessageTemplate> {
        let now = self.clock.now();
        let ttl = chrono::Duration::seconds(self.config.cache_ttl_secs as i64);

        if let Some(cached) = self.cache.read().await.get(&template_type)
            && now - cached.fetched_at < ttl
        {
            return cached.template.clone();
        }

        match self.store.find_active(template_type).await {
            Ok(template) => {
                self.cache.write().await.insert(
                    template_type,
                    CachedTemplate {
                        template: template.clone(),
                        fetched_at: now,
                    },
                );
                template
            }
            Err(e) => {
                // Not cached, so the store is retried on the next render.
                warn!(template_type = %template_type, error = %e, "Template store unavailable");
                None
            }
        }
    }
}
