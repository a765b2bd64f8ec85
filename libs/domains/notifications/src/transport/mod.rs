//! Messaging transport the queue sends through.
//!
//! Failures carry only a message; the queue classifies them by text.

mod whatsapp;

pub use whatsapp::{WhatsAppApiTransport, WhatsAppConfig};

use async_trait::async_trait;
use thiserror::Error;

use crate::error::NotificationResult;

/// A message accepted by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Transport-assigned id, when the provider returns one.
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessagingTransport: Send + Sync {
    /// Send a plain text message to a normalized phone number.
    async fn send_text(&self, number: &str, text: &str) -> Result<SentMessage, TransportError>;

    /// Provider name for logging.
    fn name(&self) -> &'static str;

    /// Whether the provider session is connected and able to send.
    async fn health_check(&self) -> NotificationResult<bool>;
}
