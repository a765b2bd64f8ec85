use sea_orm::ActiveValue::Set;
use sea_orm::entity::prelude::*;

use crate::models::OptOutRecord;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "notification_opt_outs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub phone_lookup: String,
    #[sea_orm(column_type = "Text")]
    pub customer_phone: String,
    pub opted_out_at: DateTimeWithTimeZone,
    #[sea_orm(column_type = "Text", nullable)]
    pub reason: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for OptOutRecord {
    fn from(model: Model) -> Self {
        Self {
            phone_lookup: model.phone_lookup,
            customer_phone: model.customer_phone,
            opted_out_at: model.opted_out_at.into(),
            reason: model.reason,
        }
    }
}

impl From<&OptOutRecord> for ActiveModel {
    fn from(record: &OptOutRecord) -> Self {
        ActiveModel {
            phone_lookup: Set(record.phone_lookup.clone()),
            customer_phone: Set(record.customer_phone.clone()),
            opted_out_at: Set(record.opted_out_at.into()),
            reason: Set(record.reason.clone()),
        }
    }
}
