use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SavedSearchEmailQueue::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SavedSearchEmailQueue::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(SavedSearchEmailQueue::RecipientEmail)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SavedSearchEmailQueue::RecipientId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SavedSearchEmailQueue::PostId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SavedSearchEmailQueue::SavedSearchId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SavedSearchEmailQueue::PostType)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(text(SavedSearchEmailQueue::Subject))
                    .col(text(SavedSearchEmailQueue::Message))
                    .col(
                        ColumnDef::new(SavedSearchEmailQueue::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(SavedSearchEmailQueue::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        timestamp_with_time_zone(SavedSearchEmailQueue::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(timestamp_with_time_zone_null(SavedSearchEmailQueue::ClaimedAt))
                    .col(timestamp_with_time_zone_null(SavedSearchEmailQueue::ProcessedAt))
                    .col(text_null(SavedSearchEmailQueue::ErrorMessage))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_saved_search_email_queue_status")
                    .table(SavedSearchEmailQueue::Table)
                    .col(SavedSearchEmailQueue::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_saved_search_email_queue_created_at")
                    .table(SavedSearchEmailQueue::Table)
                    .col(SavedSearchEmailQueue::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_saved_search_email_queue_recipient_id")
                    .table(SavedSearchEmailQueue::Table)
                    .col(SavedSearchEmailQueue::RecipientId)
                    .to_owned(),
            )
            .await?;

        // Serves the duplicate check on enqueue
        manager
            .create_index(
                Index::create()
                    .name("idx_saved_search_email_queue_post_search")
                    .table(SavedSearchEmailQueue::Table)
                    .col(SavedSearchEmailQueue::PostId)
                    .col(SavedSearchEmailQueue::SavedSearchId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SavedSearchEmailQueue::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum SavedSearchEmailQueue {
    Table,
    Id,
    RecipientEmail,
    RecipientId,
    PostId,
    SavedSearchId,
    PostType,
    Subject,
    Message,
    Status,
    Attempts,
    CreatedAt,
    ClaimedAt,
    ProcessedAt,
    ErrorMessage,
}
