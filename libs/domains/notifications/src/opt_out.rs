//! Registry of customers who refused notifications.

use chrono::{DateTime, Datelike, Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::cipher::{PhoneCipher, looks_encrypted};
use crate::clock::{Clock, start_of_day};
use crate::error::{NotificationError, NotificationResult};
use crate::models::{OptOutRecord, OptOutStats};
use crate::phone::{mask_phone, normalize_phone};
use crate::repository::{NotificationRepository, OptOutRepository};

pub struct OptOutRegistry {
    opt_outs: Arc<dyn OptOutRepository>,
    notifications: Arc<dyn NotificationRepository>,
    cipher: Arc<PhoneCipher>,
    clock: Arc<dyn Clock>,
}

impl OptOutRegistry {
    pub fn new(
        opt_outs: Arc<dyn OptOutRepository>,
        notifications: Arc<dyn NotificationRepository>,
        cipher: Arc<PhoneCipher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            opt_outs,
            notifications,
            cipher,
            clock,
        }
    }

    /// Whether an explicit opt-out record exists for the phone.
    ///
    /// Fails open: invalid input or a store error reports `false`.
    pub async fn is_opted_out(&self, phone: &str) -> bool {
        let Ok(normalized) = normalize_phone(phone) else {
            return false;
        };
        self.is_opted_out_lookup(&self.cipher.lookup_key(normalized.as_str()))
            .await
    }

    /// Same as [`OptOutRegistry::is_opted_out`] for an already computed lookup key.
    pub async fn is_opted_out_lookup(&self, phone_lookup: &str) -> bool {
        match self.opt_outs.find(phone_lookup).await {
            Ok(record) => record.is_some(),
            Err(e) => {
                warn!(error = %e, "Opt-out lookup failed, treating as opted in");
                false
            }
        }
    }

    /// Record an opt-out and cancel the phone's pending notifications.
    ///
    /// Returns how many notifications were cancelled.
    pub async fn opt_out(&self, phone: &str, reason: Option<String>) -> NotificationResult<u64> {
        let normalized =
            normalize_phone(phone).map_err(|e| NotificationError::InvalidPhone(e.to_string()))?;
        let now = self.clock.now();
        let phone_lookup = self.cipher.lookup_key(normalized.as_str());

        let record = OptOutRecord {
            phone_lookup: phone_lookup.clone(),
            customer_phone: self.cipher.encrypt(normalized.as_str())?,
            opted_out_at: now,
            reason,
        };
        self.opt_outs.upsert(&record).await?;

        let cancelled = self
            .notifications
            .cancel_pending_for_phone(&phone_lookup, now)
            .await?;

        info!(
            phone = %mask_phone(normalized.as_str()),
            cancelled,
            "Customer opted out of notifications"
        );
        Ok(cancelled)
    }

    /// Remove the opt-out record. Cancelled notifications stay cancelled.
    pub async fn opt_in(&self, phone: &str) -> NotificationResult<bool> {
        let normalized =
            normalize_phone(phone).map_err(|e| NotificationError::InvalidPhone(e.to_string()))?;
        let removed = self
            .opt_outs
            .delete(&self.cipher.lookup_key(normalized.as_str()))
            .await?;
        info!(phone = %mask_phone(normalized.as_str()), removed, "Customer opted in");
        Ok(removed)
    }

    /// Rewrite records whose lookup key was computed under a different
    /// cipher configuration, such as records written before
    /// `PHONE_ENCRYPTION_KEY` was set. Plaintext phones are encrypted on the
    /// way. Records that cannot be decrypted are left alone.
    ///
    /// Returns how many records were re-indexed.
    pub async fn reindex_lookups(&self) -> NotificationResult<u64> {
        let mut reindexed = 0;
        for record in self.opt_outs.list_all().await? {
            let normalized = match self
                .cipher
                .decrypt_safe(&record.customer_phone)
                .map_err(NotificationError::from)
                .and_then(|phone| {
                    normalize_phone(&phone).map_err(|e| NotificationError::InvalidPhone(e.to_string()))
                }) {
                Ok(normalized) => normalized,
                Err(e) => {
                    warn!(error = %e, "Skipping opt-out record that cannot be re-indexed");
                    continue;
                }
            };

            let phone_lookup = self.cipher.lookup_key(normalized.as_str());
            let needs_encryption =
                self.cipher.is_enabled() && !looks_encrypted(&record.customer_phone);
            if phone_lookup == record.phone_lookup && !needs_encryption {
                continue;
            }

            let updated = OptOutRecord {
                phone_lookup: phone_lookup.clone(),
                customer_phone: self.cipher.encrypt(normalized.as_str())?,
                opted_out_at: record.opted_out_at,
                reason: record.reason.clone(),
            };
            self.opt_outs.upsert(&updated).await?;
            if phone_lookup != record.phone_lookup {
                self.opt_outs.delete(&record.phone_lookup).await?;
            }
            reindexed += 1;
        }

        if reindexed > 0 {
            info!(reindexed, "Re-indexed opt-out records");
        }
        Ok(reindexed)
    }

    /// Opt-out counts by UTC calendar period. Weeks start on Monday.
    pub async fn get_statistics(&self) -> NotificationResult<OptOutStats> {
        let now = self.clock.now();
        let today = start_of_day(now);
        let week = start_of_week(now);
        let month = start_of_month(now);

        Ok(OptOutStats {
            today: self.opt_outs.count_since(Some(today)).await?,
            this_week: self.opt_outs.count_since(Some(week)).await?,
            this_month: self.opt_outs.count_since(Some(month)).await?,
            total: self.opt_outs.count_since(None).await?,
        })
    }
}

fn start_of_week(now: DateTime<Utc>) -> DateTime<Utc> {
    let days_from_monday = i64::from(now.weekday().num_days_from_monday());
    start_of_day(now) - Duration::days(days_from_monday)
}

fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    let today = start_of_day(now);
    today - Duration::days(i64::from(now.day0()))
}
