//! Pre-enqueue policy checks on message content, type, timing and volume.
//!
//! Violations block the enqueue. Warnings are logged and never block.

use chrono::{DateTime, Duration, FixedOffset, Timelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::sync::Arc;

use crate::clock::Clock;
use crate::config::ComplianceConfig;
use crate::error::NotificationResult;
use crate::models::NotificationType;
use crate::repository::NotificationRepository;

static URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bhttps?://\S+").expect("valid url regex"));
static REPEATED_PUNCTUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[!?]{2,}|\.{4,}").expect("valid punctuation regex"));

const SPAM_KEYWORDS: &[&str] = &[
    "grátis",
    "gratis",
    "promoção imperdível",
    "clique aqui",
    "ganhe dinheiro",
    "compre agora",
    "oferta exclusiva",
    "última chance",
    "100% garantido",
];

const MAX_URLS: usize = 3;
const MAX_REPEATED_PUNCTUATION: usize = 2;
const CAPS_RATIO_LIMIT: f64 = 0.5;
const CAPS_MIN_LENGTH: usize = 20;
const RATE_WARNING_RATIO: f64 = 0.8;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComplianceReport {
    pub is_compliant: bool,
    pub violations: Vec<String>,
    pub warnings: Vec<String>,
}

impl ComplianceReport {
    fn new(violations: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            is_compliant: violations.is_empty(),
            violations,
            warnings,
        }
    }

    fn merge(mut self, other: ComplianceReport) -> Self {
        self.violations.extend(other.violations);
        self.warnings.extend(other.warnings);
        self.is_compliant = self.violations.is_empty();
        self
    }
}

pub struct ComplianceChecker {
    config: ComplianceConfig,
    notifications: Arc<dyn NotificationRepository>,
    clock: Arc<dyn Clock>,
}

impl ComplianceChecker {
    pub fn new(
        config: ComplianceConfig,
        notifications: Arc<dyn NotificationRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            notifications,
            clock,
        }
    }

    pub fn check_message_compliance(&self, message: &str) -> ComplianceReport {
        let mut violations = Vec::new();
        let mut warnings = Vec::new();

        let trimmed = message.trim();
        if trimmed.is_empty() {
            violations.push("Message is empty".to_string());
            return ComplianceReport::new(violations, warnings);
        }

        let length = message.chars().count();
        if length > self.config.max_message_length {
            violations.push(format!(
                "Message exceeds maximum length ({} > {} characters)",
                length, self.config.max_message_length
            ));
        } else if length > self.config.recommended_message_length {
            warnings.push(format!(
                "Message is longer than the recommended {} characters ({})",
                self.config.recommended_message_length, length
            ));
        }

        if length > CAPS_MIN_LENGTH {
            let letters = message.chars().filter(|c| c.is_alphabetic()).count();
            let upper = message.chars().filter(|c| c.is_uppercase()).count();
            if letters > 0 && upper as f64 / letters as f64 > CAPS_RATIO_LIMIT {
                warnings.push("Message uses excessive capital letters".to_string());
            }
        }

        if REPEATED_PUNCTUATION.find_iter(message).count() > MAX_REPEATED_PUNCTUATION {
            warnings.push("Message uses excessive repeated punctuation".to_string());
        }

        let urls = URL.find_iter(message).count();
        if urls > MAX_URLS {
            warnings.push(format!("Message contains {} links (more than {})", urls, MAX_URLS));
        }

        let lowered = message.to_lowercase();
        for keyword in SPAM_KEYWORDS {
            if lowered.contains(keyword) {
                warnings.push(format!("Message contains promotional keyword '{}'", keyword));
            }
        }

        ComplianceReport::new(violations, warnings)
    }

    pub fn check_notification_type(&self, notification_type: NotificationType) -> ComplianceReport {
        if self.config.allowed_types.contains(&notification_type) {
            ComplianceReport::new(vec![], vec![])
        } else {
            ComplianceReport::new(
                vec![format!("Notification type '{}' is not allowed", notification_type)],
                vec![],
            )
        }
    }

    /// Sending outside the local polite window is only ever a warning.
    pub fn check_time_window(&self, now: DateTime<Utc>) -> ComplianceReport {
        let hour = self.local_hour(now);
        let mut warnings = Vec::new();
        if hour < self.config.allowed_start_hour || hour >= self.config.allowed_end_hour {
            warnings.push(format!(
                "Sending outside the recommended window ({:02}:00-{:02}:00, local hour {:02})",
                self.config.allowed_start_hour, self.config.allowed_end_hour, hour
            ));
        }
        ComplianceReport::new(vec![], warnings)
    }

    /// Rolling one-hour volume for one customer and for the whole system.
    pub async fn check_rate_limits(&self, phone_lookup: &str) -> NotificationResult<ComplianceReport> {
        let since = self.clock.now() - Duration::hours(1);
        let customer = self
            .notifications
            .count_created_since(since, Some(phone_lookup))
            .await?;
        let global = self.notifications.count_created_since(since, None).await?;

        let mut violations = Vec::new();
        let mut warnings = Vec::new();
        rate_check(
            "Customer",
            customer,
            self.config.per_customer_hourly_limit,
            &mut violations,
            &mut warnings,
        );
        rate_check(
            "Global",
            global,
            self.config.global_hourly_limit,
            &mut violations,
            &mut warnings,
        );
        Ok(ComplianceReport::new(violations, warnings))
    }

    pub async fn check_full_compliance(
        &self,
        message: &str,
        notification_type: NotificationType,
        phone_lookup: &str,
    ) -> NotificationResult<ComplianceReport> {
        let report = self
            .check_message_compliance(message)
            .merge(self.check_notification_type(notification_type))
            .merge(self.check_time_window(self.clock.now()))
            .merge(self.check_rate_limits(phone_lookup).await?);
        Ok(report)
    }

    fn local_hour(&self, now: DateTime<Utc>) -> u32 {
        match FixedOffset::east_opt(self.config.utc_offset_hours * 3600) {
            Some(offset) => now.with_timezone(&offset).hour(),
            None => now.hour(),
        }
    }
}

fn rate_check(
    scope: &str,
    count: u64,
    limit: u64,
    violations: &mut Vec<String>,
    warnings: &mut Vec<String>,
) {
    if count >= limit {
        violations.push(format!(
            "{} rate limit exceeded ({}/{} messages in the last hour)",
            scope, count, limit
        ));
    } else if count as f64 >= limit as f64 * RATE_WARNING_RATIO {
        warnings.push(format!(
            "{} rate limit nearly reached ({}/{} messages in the last hour)",
            scope, count, limit
        ));
    }
}
