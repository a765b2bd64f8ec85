//! PostgreSQL repositories backed by Sea-ORM.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::entity::{alert, error_log, notification, opt_out, template};
use crate::error::{NotificationError, NotificationResult};
use crate::models::{
    Alert, AlertKind, ErrorLogEntry, MessageTemplate, NotificationStatus, NotificationType,
    OptOutRecord, QueuedNotification,
};
use crate::repository::{
    AlertRepository, ErrorLogRepository, INTERRUPTED_FINAL_ATTEMPT, NotificationRepository,
    OptOutRepository, RecoveredRows, Stores, TemplateRepository,
};

fn ts(at: DateTime<Utc>) -> DateTime<FixedOffset> {
    at.into()
}

impl Stores {
    /// Every repository over one shared connection pool.
    pub fn postgres(db: DatabaseConnection) -> Self {
        Self {
            notifications: Arc::new(PgNotificationRepository::new(db.clone())),
            opt_outs: Arc::new(PgOptOutRepository::new(db.clone())),
            error_logs: Arc::new(PgErrorLogRepository::new(db.clone())),
            alerts: Arc::new(PgAlertRepository::new(db.clone())),
            templates: Arc::new(PgTemplateRepository::new(db)),
        }
    }
}

// ============================================================================
// Notifications
// ============================================================================

#[derive(Clone)]
pub struct PgNotificationRepository {
    db: DatabaseConnection,
}

impl PgNotificationRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn to_notifications(models: Vec<notification::Model>) -> NotificationResult<Vec<QueuedNotification>> {
    models.into_iter().map(QueuedNotification::try_from).collect()
}

#[async_trait]
impl NotificationRepository for PgNotificationRepository {
    async fn insert(&self, n: &QueuedNotification) -> NotificationResult<()> {
        notification::Entity::insert(notification::ActiveModel::from(n))
            .exec_without_returning(&self.db)
            .await?;
        tracing::debug!(notification_id = %n.id, order_id = %n.order_id, "Inserted notification");
        Ok(())
    }

    async fn update(&self, n: &QueuedNotification) -> NotificationResult<()> {
        match notification::ActiveModel::from(n).update(&self.db).await {
            Ok(_) => Ok(()),
            Err(DbErr::RecordNotUpdated) => Err(NotificationError::NotFound(n.id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: Uuid) -> NotificationResult<Option<QueuedNotification>> {
        notification::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(QueuedNotification::try_from)
            .transpose()
    }

    async fn fetch_due(
        &self,
        now: DateTime<Utc>,
        max_attempts: u32,
        limit: usize,
    ) -> NotificationResult<Vec<QueuedNotification>> {
        let models = notification::Entity::find()
            .filter(notification::Column::Status.eq(NotificationStatus::Pending.to_string()))
            .filter(notification::Column::Attempts.lt(i32::try_from(max_attempts).unwrap_or(i32::MAX)))
            .filter(notification::Column::ScheduledAt.lte(ts(now)))
            .order_by_asc(notification::Column::ScheduledAt)
            .order_by_asc(notification::Column::Id)
            .limit(limit as u64)
            .all(&self.db)
            .await?;
        to_notifications(models)
    }

    async fn list_by_order(&self, order_id: Uuid) -> NotificationResult<Vec<QueuedNotification>> {
        let models = notification::Entity::find()
            .filter(notification::Column::OrderId.eq(order_id))
            .order_by_desc(notification::Column::CreatedAt)
            .order_by_desc(notification::Column::Id)
            .all(&self.db)
            .await?;
        to_notifications(models)
    }

    async fn list_created_since(
        &self,
        since: DateTime<Utc>,
    ) -> NotificationResult<Vec<QueuedNotification>> {
        let models = notification::Entity::find()
            .filter(notification::Column::CreatedAt.gte(ts(since)))
            .all(&self.db)
            .await?;
        to_notifications(models)
    }

    async fn count_by_status(&self) -> NotificationResult<HashMap<NotificationStatus, u64>> {
        let rows: Vec<(String, i64)> = notification::Entity::find()
            .select_only()
            .column(notification::Column::Status)
            .column_as(notification::Column::Id.count(), "count")
            .group_by(notification::Column::Status)
            .into_tuple()
            .all(&self.db)
            .await?;

        let mut counts = HashMap::new();
        for (status, count) in rows {
            match NotificationStatus::from_str(&status) {
                Ok(status) => {
                    counts.insert(status, count.max(0) as u64);
                }
                Err(_) => tracing::warn!(status = %status, "Skipping unknown notification status"),
            }
        }
        Ok(counts)
    }

    async fn count_created_since(
        &self,
        since: DateTime<Utc>,
        phone_lookup: Option<&str>,
    ) -> NotificationResult<u64> {
        let mut query = notification::Entity::find()
            .filter(notification::Column::CreatedAt.gte(ts(since)))
            .filter(notification::Column::Status.ne(NotificationStatus::Cancelled.to_string()));
        if let Some(lookup) = phone_lookup {
            query = query.filter(notification::Column::PhoneLookup.eq(lookup));
        }
        Ok(query.count(&self.db).await?)
    }

    async fn exists_for_order(
        &self,
        order_id: Uuid,
        notification_type: NotificationType,
        statuses: &[NotificationStatus],
    ) -> NotificationResult<bool> {
        let count = notification::Entity::find()
            .filter(notification::Column::OrderId.eq(order_id))
            .filter(notification::Column::NotificationType.eq(notification_type.to_string()))
            .filter(notification::Column::Status.is_in(statuses.iter().map(|s| s.to_string())))
            .count(&self.db)
            .await?;
        Ok(count > 0)
    }

    async fn cancel_pending_for_phone(
        &self,
        phone_lookup: &str,
        now: DateTime<Utc>,
    ) -> NotificationResult<u64> {
        let result = notification::Entity::update_many()
            .col_expr(
                notification::Column::Status,
                Expr::value(NotificationStatus::Cancelled.to_string()),
            )
            .col_expr(notification::Column::UpdatedAt, Expr::value(ts(now)))
            .filter(notification::Column::PhoneLookup.eq(phone_lookup))
            .filter(notification::Column::Status.eq(NotificationStatus::Pending.to_string()))
            .exec(&self.db)
            .await?;

        tracing::info!(cancelled = result.rows_affected, "Cancelled pending notifications for opted-out phone");
        Ok(result.rows_affected)
    }

    async fn cancel_if_pending(&self, id: Uuid, now: DateTime<Utc>) -> NotificationResult<bool> {
        let result = notification::Entity::update_many()
            .col_expr(
                notification::Column::Status,
                Expr::value(NotificationStatus::Cancelled.to_string()),
            )
            .col_expr(notification::Column::UpdatedAt, Expr::value(ts(now)))
            .filter(notification::Column::Id.eq(id))
            .filter(notification::Column::Status.eq(NotificationStatus::Pending.to_string()))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    async fn reset_failed(&self, max_attempts: u32, now: DateTime<Utc>) -> NotificationResult<u64> {
        let result = notification::Entity::update_many()
            .col_expr(
                notification::Column::Status,
                Expr::value(NotificationStatus::Pending.to_string()),
            )
            .col_expr(notification::Column::Attempts, Expr::value(0))
            .col_expr(notification::Column::ErrorMessage, Expr::value(Option::<String>::None))
            .col_expr(notification::Column::ScheduledAt, Expr::value(ts(now)))
            .col_expr(notification::Column::UpdatedAt, Expr::value(ts(now)))
            .filter(notification::Column::Status.eq(NotificationStatus::Failed.to_string()))
            .filter(notification::Column::Attempts.lt(i32::try_from(max_attempts).unwrap_or(i32::MAX)))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }

    async fn recover_in_flight(
        &self,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> NotificationResult<RecoveredRows> {
        let max_attempts = i32::try_from(max_attempts).unwrap_or(i32::MAX);
        let txn = self.db.begin().await?;

        let failed = notification::Entity::update_many()
            .col_expr(
                notification::Column::Status,
                Expr::value(NotificationStatus::Failed.to_string()),
            )
            .col_expr(
                notification::Column::ErrorMessage,
                Expr::value(INTERRUPTED_FINAL_ATTEMPT),
            )
            .col_expr(notification::Column::UpdatedAt, Expr::value(ts(now)))
            .filter(notification::Column::Status.eq(NotificationStatus::Retrying.to_string()))
            .filter(notification::Column::Attempts.gte(max_attempts))
            .exec(&txn)
            .await?;

        let requeued = notification::Entity::update_many()
            .col_expr(
                notification::Column::Status,
                Expr::value(NotificationStatus::Pending.to_string()),
            )
            .col_expr(notification::Column::UpdatedAt, Expr::value(ts(now)))
            .filter(notification::Column::Status.eq(NotificationStatus::Retrying.to_string()))
            .exec(&txn)
            .await?;

        txn.commit().await?;
        Ok(RecoveredRows {
            requeued: requeued.rows_affected,
            failed: failed.rows_affected,
        })
    }
}

// ============================================================================
// Opt-outs
// ============================================================================

#[derive(Clone)]
pub struct PgOptOutRepository {
    db: DatabaseConnection,
}

impl PgOptOutRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OptOutRepository for PgOptOutRepository {
    async fn upsert(&self, record: &OptOutRecord) -> NotificationResult<()> {
        opt_out::Entity::insert(opt_out::ActiveModel::from(record))
            .on_conflict(
                OnConflict::column(opt_out::Column::PhoneLookup)
                    .update_columns([
                        opt_out::Column::CustomerPhone,
                        opt_out::Column::OptedOutAt,
                        opt_out::Column::Reason,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }

    async fn find(&self, phone_lookup: &str) -> NotificationResult<Option<OptOutRecord>> {
        Ok(opt_out::Entity::find_by_id(phone_lookup.to_string())
            .one(&self.db)
            .await?
            .map(OptOutRecord::from))
    }

    async fn delete(&self, phone_lookup: &str) -> NotificationResult<bool> {
        let result = opt_out::Entity::delete_by_id(phone_lookup.to_string())
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    async fn count_since(&self, since: Option<DateTime<Utc>>) -> NotificationResult<u64> {
        let mut query = opt_out::Entity::find();
        if let Some(since) = since {
            query = query.filter(opt_out::Column::OptedOutAt.gte(ts(since)));
        }
        Ok(query.count(&self.db).await?)
    }

    async fn list_all(&self) -> NotificationResult<Vec<OptOutRecord>> {
        Ok(opt_out::Entity::find()
            .order_by_asc(opt_out::Column::OptedOutAt)
            .all(&self.db)
            .await?
            .into_iter()
            .map(OptOutRecord::from)
            .collect())
    }
}

// ============================================================================
// Error logs
// ============================================================================

#[derive(Clone)]
pub struct PgErrorLogRepository {
    db: DatabaseConnection,
}

impl PgErrorLogRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ErrorLogRepository for PgErrorLogRepository {
    async fn insert(&self, entry: &ErrorLogEntry) -> NotificationResult<()> {
        error_log::Entity::insert(error_log::ActiveModel::from(entry))
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }

    async fn list_since(&self, since: DateTime<Utc>) -> NotificationResult<Vec<ErrorLogEntry>> {
        error_log::Entity::find()
            .filter(error_log::Column::Timestamp.gte(ts(since)))
            .order_by_desc(error_log::Column::Timestamp)
            .all(&self.db)
            .await?
            .into_iter()
            .map(ErrorLogEntry::try_from)
            .collect()
    }

    async fn list_by_order(&self, order_id: Uuid) -> NotificationResult<Vec<ErrorLogEntry>> {
        error_log::Entity::find()
            .filter(error_log::Column::OrderId.eq(order_id))
            .order_by_desc(error_log::Column::Timestamp)
            .all(&self.db)
            .await?
            .into_iter()
            .map(ErrorLogEntry::try_from)
            .collect()
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> NotificationResult<u64> {
        let result = error_log::Entity::delete_many()
            .filter(error_log::Column::Timestamp.lt(ts(cutoff)))
            .exec(&self.db)
            .await?;

        tracing::info!(deleted = result.rows_affected, "Deleted old error logs");
        Ok(result.rows_affected)
    }
}

// ============================================================================
// Alerts
// ============================================================================

#[derive(Clone)]
pub struct PgAlertRepository {
    db: DatabaseConnection,
}

impl PgAlertRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AlertRepository for PgAlertRepository {
    async fn insert(&self, alert: &Alert) -> NotificationResult<()> {
        alert::Entity::insert(alert::ActiveModel::from(alert))
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }

    async fn exists_since(&self, kind: AlertKind, since: DateTime<Utc>) -> NotificationResult<bool> {
        let count = alert::Entity::find()
            .filter(alert::Column::Kind.eq(kind.to_string()))
            .filter(alert::Column::CreatedAt.gte(ts(since)))
            .count(&self.db)
            .await?;
        Ok(count > 0)
    }

    async fn list_since(&self, since: DateTime<Utc>) -> NotificationResult<Vec<Alert>> {
        alert::Entity::find()
            .filter(alert::Column::CreatedAt.gte(ts(since)))
            .order_by_desc(alert::Column::CreatedAt)
            .all(&self.db)
            .await?
            .into_iter()
            .map(Alert::try_from)
            .collect()
    }
}

// ============================================================================
// Templates
// ============================================================================

#[derive(Clone)]
pub struct PgTemplateRepository {
    db: DatabaseConnection,
}

impl PgTemplateRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TemplateRepository for PgTemplateRepository {
    async fn find_active(
        &self,
        template_type: NotificationType,
    ) -> NotificationResult<Option<MessageTemplate>> {
        template::Entity::find()
            .filter(template::Column::TemplateType.eq(template_type.to_string()))
            .filter(template::Column::IsActive.eq(true))
            .order_by_desc(template::Column::UpdatedAt)
            .one(&self.db)
            .await?
            .map(MessageTemplate::try_from)
            .transpose()
    }
}
