use sea_orm::entity::prelude::*;

use super::parse_column;
use crate::error::NotificationError;
use crate::models::MessageTemplate;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "message_templates")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub template_type: String,
    #[sea_orm(column_type = "Text")]
    pub content: String,
    pub variables: Json,
    pub is_active: bool,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for MessageTemplate {
    type Error = NotificationError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            template_type: parse_column("template_type", &model.template_type)?,
            content: model.content,
            variables: serde_json::from_value(model.variables).unwrap_or_default(),
            is_active: model.is_active,
        })
    }
}
