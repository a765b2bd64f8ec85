//! Error types for the notifications domain.

use thiserror::Error;
use uuid::Uuid;

/// Result type for notification operations.
pub type NotificationResult<T> = Result<T, NotificationError>;

/// Errors that can occur in the notifications domain.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// Persistent store failure.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Messaging transport failure outside of a send attempt (health check, setup).
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Template rendering error.
    #[error("Template rendering error: {0}")]
    TemplateError(String),

    /// Phone encryption or decryption failure.
    #[error("Cipher error: {0}")]
    CipherError(String),

    /// Phone number failed validation.
    #[error("Invalid phone number: {0}")]
    InvalidPhone(String),

    /// The order data provider does not know the order.
    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    /// The order data provider could not be reached or returned garbage.
    #[error("Order lookup failed: {0}")]
    OrderLookup(String),

    /// Notification row not found.
    #[error("Notification not found: {0}")]
    NotFound(Uuid),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Typed outcome of a rejected enqueue call.
///
/// Every variant means no row was persisted.
#[derive(Debug, Error)]
pub enum EnqueueError {
    #[error("Invalid phone number: {0}")]
    InvalidPhone(String),

    #[error("Customer has opted out of notifications")]
    OptedOut,

    #[error("Compliance violation: {}", .0.join("; "))]
    ComplianceViolation(Vec<String>),

    #[error("Failed to render message: {0}")]
    RenderFailure(String),

    #[error(transparent)]
    Store(#[from] NotificationError),
}

impl From<sea_orm::DbErr> for NotificationError {
    fn from(err: sea_orm::DbErr) -> Self {
        NotificationError::DatabaseError(err.to_string())
    }
}

impl From<handlebars::RenderError> for NotificationError {
    fn from(err: handlebars::RenderError) -> Self {
        NotificationError::TemplateError(err.to_string())
    }
}

impl From<reqwest::Error> for NotificationError {
    fn from(err: reqwest::Error) -> Self {
        NotificationError::OrderLookup(err.to_string())
    }
}

impl From<serde_json::Error> for NotificationError {
    fn from(err: serde_json::Error) -> Self {
        NotificationError::Internal(format!("JSON serialization error: {}", err))
    }
}

impl From<core_config::ConfigError> for NotificationError {
    fn from(err: core_config::ConfigError) -> Self {
        NotificationError::ConfigError(err.to_string())
    }
}
