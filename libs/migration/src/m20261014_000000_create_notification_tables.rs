use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Outbound queue
        manager
            .create_table(
                Table::create()
                    .table(WhatsappNotifications::Table)
                    .if_not_exists()
                    .col(pk_uuid(WhatsappNotifications::Id))
                    .col(ColumnDef::new(WhatsappNotifications::OrderId).uuid().not_null())
                    .col(text(WhatsappNotifications::CustomerPhone))
                    .col(
                        ColumnDef::new(WhatsappNotifications::PhoneLookup)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WhatsappNotifications::NotificationType)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(text(WhatsappNotifications::MessageContent))
                    .col(
                        ColumnDef::new(WhatsappNotifications::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(WhatsappNotifications::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        timestamp_with_time_zone(WhatsappNotifications::ScheduledAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(timestamp_with_time_zone_null(WhatsappNotifications::SentAt))
                    .col(text_null(WhatsappNotifications::ErrorMessage))
                    .col(string_null(WhatsappNotifications::WhatsappMessageId))
                    .col(
                        timestamp_with_time_zone(WhatsappNotifications::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(WhatsappNotifications::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(NotificationOptOuts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(NotificationOptOuts::PhoneLookup)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(text(NotificationOptOuts::CustomerPhone))
                    .col(
                        timestamp_with_time_zone(NotificationOptOuts::OptedOutAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(text_null(NotificationOptOuts::Reason))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(NotificationErrorLogs::Table)
                    .if_not_exists()
                    .col(pk_uuid(NotificationErrorLogs::Id))
                    .col(
                        ColumnDef::new(NotificationErrorLogs::Category)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(NotificationErrorLogs::Severity)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(text(NotificationErrorLogs::ErrorMessage))
                    .col(json_binary(NotificationErrorLogs::Context))
                    .col(ColumnDef::new(NotificationErrorLogs::OrderId).uuid().null())
                    .col(string_null(NotificationErrorLogs::CustomerPhone))
                    .col(ColumnDef::new(NotificationErrorLogs::NotificationId).uuid().null())
                    .col(
                        ColumnDef::new(NotificationErrorLogs::IsRetryable)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        timestamp_with_time_zone(NotificationErrorLogs::Timestamp)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(NotificationAlerts::Table)
                    .if_not_exists()
                    .col(pk_uuid(NotificationAlerts::Id))
                    .col(
                        ColumnDef::new(NotificationAlerts::Kind)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(NotificationAlerts::Severity)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(text(NotificationAlerts::Message))
                    .col(json_binary(NotificationAlerts::Details))
                    .col(
                        timestamp_with_time_zone(NotificationAlerts::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(MessageTemplates::Table)
                    .if_not_exists()
                    .col(pk_uuid(MessageTemplates::Id))
                    .col(
                        ColumnDef::new(MessageTemplates::TemplateType)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(text(MessageTemplates::Content))
                    .col(json_binary(MessageTemplates::Variables).default("[]"))
                    .col(
                        ColumnDef::new(MessageTemplates::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        timestamp_with_time_zone(MessageTemplates::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Create indexes
        manager
            .create_index(
                Index::create()
                    .name("idx_whatsapp_notifications_due")
                    .table(WhatsappNotifications::Table)
                    .col(WhatsappNotifications::Status)
                    .col(WhatsappNotifications::ScheduledAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_whatsapp_notifications_order")
                    .table(WhatsappNotifications::Table)
                    .col(WhatsappNotifications::OrderId)
                    .col(WhatsappNotifications::NotificationType)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_whatsapp_notifications_phone_lookup")
                    .table(WhatsappNotifications::Table)
                    .col(WhatsappNotifications::PhoneLookup)
                    .col(WhatsappNotifications::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_whatsapp_notifications_created_at")
                    .table(WhatsappNotifications::Table)
                    .col(WhatsappNotifications::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_notification_error_logs_timestamp")
                    .table(NotificationErrorLogs::Table)
                    .col(NotificationErrorLogs::Timestamp)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_notification_error_logs_order_id")
                    .table(NotificationErrorLogs::Table)
                    .col(NotificationErrorLogs::OrderId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_notification_alerts_kind_created_at")
                    .table(NotificationAlerts::Table)
                    .col(NotificationAlerts::Kind)
                    .col(NotificationAlerts::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_message_templates_type_active")
                    .table(MessageTemplates::Table)
                    .col(MessageTemplates::TemplateType)
                    .col(MessageTemplates::IsActive)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(MessageTemplates::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(NotificationAlerts::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(NotificationErrorLogs::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(NotificationOptOuts::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(WhatsappNotifications::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum WhatsappNotifications {
    Table,
    Id,
    OrderId,
    CustomerPhone,
    PhoneLookup,
    NotificationType,
    MessageContent,
    Status,
    Attempts,
    ScheduledAt,
    SentAt,
    ErrorMessage,
    WhatsappMessageId,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum NotificationOptOuts {
    Table,
    PhoneLookup,
    CustomerPhone,
    OptedOutAt,
    Reason,
}

#[derive(DeriveIden)]
enum NotificationErrorLogs {
    Table,
    Id,
    Category,
    Severity,
    ErrorMessage,
    Context,
    OrderId,
    CustomerPhone,
    NotificationId,
    IsRetryable,
    Timestamp,
}

#[derive(DeriveIden)]
enum NotificationAlerts {
    Table,
    Id,
    Kind,
    Severity,
    Message,
    Details,
    CreatedAt,
}

#[derive(DeriveIden)]
enum MessageTemplates {
    Table,
    Id,
    TemplateType,
    Content,
    Variables,
    IsActive,
    UpdatedAt,
}
