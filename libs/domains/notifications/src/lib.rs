//! Notifications Domain
//!
//! WhatsApp delivery of order lifecycle notifications for the restaurant.
//!
//! # Features
//!
//! - Brazilian mobile number validation and normalization
//! - Phone encryption at rest with a blind index for lookups
//! - Template rendering with cached store templates and built-in fallbacks
//! - Compliance checks and per-customer/global rate limits
//! - Customer opt-out
//! - Retry with exponential backoff
//! - Error categorization, delivery statistics and alerting
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  Order Events   │  ← status changes from the order backend
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │    Trigger      │  ← dedup, order lookup
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │  QueueManager   │  ← opt-out, render, compliance, encrypt, persist
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │ Processing pass │  ← batches, backoff, terminal failure
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │   Transport     │  ← WhatsApp HTTP gateway
//! └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use domain_notifications::{NotificationServices, Stores, RandomVariantSelector, SystemClock};
//!
//! let services = NotificationServices::new(
//!     config,
//!     Stores::postgres(db),
//!     transport,
//!     orders,
//!     Arc::new(RandomVariantSelector),
//!     Arc::new(SystemClock),
//! )?;
//! services.queue.start_auto_processing();
//! services.trigger.on_order_status_change(order_id, "ready", Some("in_preparation")).await;
//! ```

pub mod alerts;
pub mod cipher;
pub mod clock;
pub mod compliance;
pub mod config;
pub mod entity;
pub mod error;
pub mod error_log;
pub mod metrics;
pub mod models;
pub mod monitor;
pub mod opt_out;
pub mod orders;
pub mod phone;
pub mod postgres;
pub mod queue;
pub mod repository;
pub mod services;
pub mod templates;
pub mod transport;
pub mod trigger;
pub mod worker;

// Re-export commonly used types
pub use cipher::{CipherConfig, PhoneCipher};
pub use clock::{Clock, ManualClock, SystemClock};
pub use compliance::{ComplianceChecker, ComplianceReport};
pub use config::NotificationConfig;
pub use error::{EnqueueError, NotificationError, NotificationResult};
pub use error_log::{ErrorContext, ErrorLogger};
pub use models::{
    Alert, AlertKind, ErrorCategory, ErrorLogEntry, ErrorSeverity, NotificationStatus,
    NotificationType, OrderDetails, OrderItem, OrderLinks, OrderStatus, ProcessResult,
    QueueStats, QueuedNotification,
};
pub use monitor::{DeliveryMonitor, DeliveryStats, StatsPeriod};
pub use opt_out::OptOutRegistry;
pub use orders::{HttpOrderProvider, InMemoryOrderProvider, OrderProvider};
pub use phone::{PhoneNumber, normalize_phone};
pub use queue::{EnqueueRequest, QueueManager, backoff_delay};
pub use repository::Stores;
pub use services::NotificationServices;
pub use templates::{FixedVariantSelector, RandomVariantSelector, TemplateRenderer, VariantSelector};
pub use transport::{MessagingTransport, SentMessage, TransportError, WhatsAppApiTransport, WhatsAppConfig};
pub use trigger::NotificationTrigger;
pub use worker::PeriodicWorker;
