use sea_orm::ActiveValue::Set;
use sea_orm::entity::prelude::*;

use super::parse_column;
use crate::error::NotificationError;
use crate::models::ErrorLogEntry;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "notification_error_logs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub category: String,
    pub severity: String,
    #[sea_orm(column_type = "Text")]
    pub error_message: String,
    pub context: Json,
    pub order_id: Option<Uuid>,
    pub customer_phone: Option<String>,
    pub notification_id: Option<Uuid>,
    pub is_retryable: bool,
    pub timestamp: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for ErrorLogEntry {
    type Error = NotificationError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            category: parse_column("category", &model.category)?,
            severity: parse_column("severity", &model.severity)?,
            error_message: model.error_message,
            context: model.context,
            order_id: model.order_id,
            customer_phone: model.customer_phone,
            notification_id: model.notification_id,
            is_retryable: model.is_retryable,
            timestamp: model.timestamp.into(),
        })
    }
}

impl From<&ErrorLogEntry> for ActiveModel {
    fn from(entry: &ErrorLogEntry) -> Self {
        ActiveModel {
            id: Set(entry.id),
            category: Set(entry.category.to_string()),
            severity: Set(entry.severity.to_string()),
            error_message: Set(entry.error_message.clone()),
            context: Set(entry.context.clone()),
            order_id: Set(entry.order_id),
            customer_phone: Set(entry.customer_phone.clone()),
            notification_id: Set(entry.notification_id),
            is_retryable: Set(entry.is_retryable),
            timestamp: Set(entry.timestamp.into()),
        }
    }
}
