//! Migration to create the build_records table.
//!
//! A build record packages exactly one ready generation job into an image
//! artifact; the job_id unique constraint enforces the 1:1 relationship.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(BuildRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BuildRecords::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(BuildRecords::JobId).uuid().not_null())
                    .col(ColumnDef::new(BuildRecords::ImageName).text().not_null())
                    .col(
                        ColumnDef::new(BuildRecords::ImageTag)
                            .text()
                            .not_null()
                            .default("latest"),
                    )
                    .col(
                        ColumnDef::new(BuildRecords::BuildLog)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(BuildRecords::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(BuildRecords::ErrorMessage).text().null())
                    .col(
                        ColumnDef::new(BuildRecords::StartedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(BuildRecords::FinishedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(BuildRecords::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(BuildRecords::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_build_records_job_id")
                            .from(BuildRecords::Table, BuildRecords::JobId)
                            .to(GenerationJobs::Table, GenerationJobs::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_build_records_job_id")
                    .table(BuildRecords::Table)
                    .col(BuildRecords::JobId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_build_records_job_id").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(BuildRecords::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum BuildRecords {
    Table,
    Id,
    JobId,
    ImageName,
    ImageTag,
    BuildLog,
    Status,
    ErrorMessage,
    StartedAt,
    FinishedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum GenerationJobs {
    Table,
    Id,
}
