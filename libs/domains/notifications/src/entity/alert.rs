use sea_orm::ActiveValue::Set;
use sea_orm::entity::prelude::*;

use super::parse_column;
use crate::error::NotificationError;
use crate::models::Alert;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "notification_alerts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub kind: String,
    pub severity: String,
    #[sea_orm(column_type = "Text")]
    pub message: String,
    pub details: Json,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for Alert {
    type Error = NotificationError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            kind: parse_column("kind", &model.kind)?,
            severity: parse_column("severity", &model.severity)?,
            message: model.message,
            details: model.details,
            created_at: model.created_at.into(),
        })
    }
}

impl From<&Alert> for ActiveModel {
    fn from(alert: &Alert) -> Self {
        ActiveModel {
            id: Set(alert.id),
            kind: Set(alert.kind.to_string()),
            severity: Set(alert.severity.to_string()),
            message: Set(alert.message.clone()),
            details: Set(alert.details.clone()),
            created_at: Set(alert.created_at.into()),
        }
    }
}
