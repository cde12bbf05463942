//! Migration to create the generation_jobs table.
//!
//! A generation job is one attempt to render server source for a
//! (registration, language, framework) target.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(GenerationJobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(GenerationJobs::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(GenerationJobs::RegistrationId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(GenerationJobs::Language).text().not_null())
                    .col(ColumnDef::new(GenerationJobs::Framework).text().not_null())
                    .col(
                        ColumnDef::new(GenerationJobs::Features)
                            .json_binary()
                            .not_null(),
                    )
                    .col(ColumnDef::new(GenerationJobs::Config).json_binary().null())
                    .col(
                        ColumnDef::new(GenerationJobs::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(GenerationJobs::GenerationLog)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(GenerationJobs::ArtifactPath).text().null())
                    .col(
                        ColumnDef::new(GenerationJobs::FileCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(GenerationJobs::ErrorMessage).text().null())
                    .col(
                        ColumnDef::new(GenerationJobs::StartedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(GenerationJobs::FinishedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(GenerationJobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(GenerationJobs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_generation_jobs_registration_id")
                            .from(GenerationJobs::Table, GenerationJobs::RegistrationId)
                            .to(ApiRegistrations::Table, ApiRegistrations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_generation_jobs_registration_target_status")
                    .table(GenerationJobs::Table)
                    .col(GenerationJobs::RegistrationId)
                    .col(GenerationJobs::Language)
                    .col(GenerationJobs::Framework)
                    .col(GenerationJobs::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_generation_jobs_registration_target_status")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(GenerationJobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum GenerationJobs {
    Table,
    Id,
    RegistrationId,
    Language,
    Framework,
    Features,
    Config,
    Status,
    GenerationLog,
    ArtifactPath,
    FileCount,
    ErrorMessage,
    StartedAt,
    FinishedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ApiRegistrations {
    Table,
    Id,
}
