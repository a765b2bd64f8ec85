use sea_orm::ActiveValue::Set;
use sea_orm::entity::prelude::*;

use super::parse_column;
use crate::error::NotificationError;
use crate::models::QueuedNotification;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "whatsapp_notifications")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: Uuid,
    #[sea_orm(column_type = "Text")]
    pub customer_phone: String,
    pub phone_lookup: String,
    pub notification_type: String,
    #[sea_orm(column_type = "Text")]
    pub message_content: String,
    pub status: String,
    pub attempts: i32,
    pub scheduled_at: DateTimeWithTimeZone,
    pub sent_at: Option<DateTimeWithTimeZone>,
    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,
    pub whatsapp_message_id: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for QueuedNotification {
    type Error = NotificationError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            order_id: model.order_id,
            customer_phone: model.customer_phone,
            phone_lookup: model.phone_lookup,
            notification_type: parse_column("notification_type", &model.notification_type)?,
            message_content: model.message_content,
            status: parse_column("status", &model.status)?,
            attempts: u32::try_from(model.attempts).unwrap_or(0),
            scheduled_at: model.scheduled_at.into(),
            sent_at: model.sent_at.map(Into::into),
            error_message: model.error_message,
            whatsapp_message_id: model.whatsapp_message_id,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        })
    }
}

impl From<&QueuedNotification> for ActiveModel {
    fn from(n: &QueuedNotification) -> Self {
        ActiveModel {
            id: Set(n.id),
            order_id: Set(n.order_id),
            customer_phone: Set(n.customer_phone.clone()),
            phone_lookup: Set(n.phone_lookup.clone()),
            notification_type: Set(n.notification_type.to_string()),
            message_content: Set(n.message_content.clone()),
            status: Set(n.status.to_string()),
            attempts: Set(i32::try_from(n.attempts).unwrap_or(i32::MAX)),
            scheduled_at: Set(n.scheduled_at.into()),
            sent_at: Set(n.sent_at.map(Into::into)),
            error_message: Set(n.error_message.clone()),
            whatsapp_message_id: Set(n.whatsapp_message_id.clone()),
            created_at: Set(n.created_at.into()),
            updated_at: Set(n.updated_at.into()),
        }
    }
}
