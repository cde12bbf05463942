//! Migration to create the deployments table.
//!
//! Deployments reference a build record's image but carry no foreign key:
//! a deployment outlives the generation job and build that produced it.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Deployments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Deployments::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Deployments::BuildRecordId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Deployments::ContainerName)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Deployments::ImageRef).text().not_null())
                    .col(
                        ColumnDef::new(Deployments::CpuLimit)
                            .double()
                            .not_null()
                            .default(1.0),
                    )
                    .col(
                        ColumnDef::new(Deployments::MemoryLimitMb)
                            .integer()
                            .not_null()
                            .default(256),
                    )
                    .col(
                        ColumnDef::new(Deployments::ReplicaCount)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(ColumnDef::new(Deployments::Port).integer().not_null())
                    .col(
                        ColumnDef::new(Deployments::ContainerPort)
                            .integer()
                            .not_null()
                            .default(8000),
                    )
                    .col(ColumnDef::new(Deployments::EnvVars).json_binary().null())
                    .col(
                        ColumnDef::new(Deployments::HealthCheckPath)
                            .text()
                            .not_null()
                            .default("/health"),
                    )
                    .col(
                        ColumnDef::new(Deployments::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(Deployments::Health)
                            .text()
                            .not_null()
                            .default("unknown"),
                    )
                    .col(
                        ColumnDef::new(Deployments::LastHealthCheckAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Deployments::ErrorMessage).text().null())
                    .col(
                        ColumnDef::new(Deployments::StartedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Deployments::StoppedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Deployments::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Deployments::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_deployments_build_record_id")
                    .table(Deployments::Table)
                    .col(Deployments::BuildRecordId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_deployments_status")
                    .table(Deployments::Table)
                    .col(Deployments::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_deployments_status").to_owned())
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_deployments_build_record_id")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(Deployments::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Deployments {
    Table,
    Id,
    BuildRecordId,
    ContainerName,
    ImageRef,
    CpuLimit,
    MemoryLimitMb,
    ReplicaCount,
    Port,
    ContainerPort,
    EnvVars,
    HealthCheckPath,
    Status,
    Health,
    LastHealthCheckAt,
    ErrorMessage,
    StartedAt,
    StoppedAt,
    CreatedAt,
    UpdatedAt,
}
