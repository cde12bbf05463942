//! Migration to create the api_registrations table.
//!
//! An api_registration is a user-owned description of an external HTTP or
//! GraphQL API, with its base URL, auth descriptor and validation lifecycle.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ApiRegistrations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ApiRegistrations::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ApiRegistrations::OwnerId).uuid().not_null())
                    .col(ColumnDef::new(ApiRegistrations::Name).text().not_null())
                    .col(ColumnDef::new(ApiRegistrations::BaseUrl).text().not_null())
                    .col(ColumnDef::new(ApiRegistrations::ApiKind).text().not_null())
                    .col(
                        ColumnDef::new(ApiRegistrations::AuthType)
                            .text()
                            .not_null()
                            .default("none"),
                    )
                    .col(ColumnDef::new(ApiRegistrations::AuthBlob).binary().null())
                    .col(
                        ColumnDef::new(ApiRegistrations::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(ApiRegistrations::LastValidatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ApiRegistrations::ValidationError)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ApiRegistrations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ApiRegistrations::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // (owner_id, name) uniqueness per the data model
        manager
            .create_index(
                Index::create()
                    .name("idx_api_registrations_owner_name")
                    .table(ApiRegistrations::Table)
                    .col(ApiRegistrations::OwnerId)
                    .col(ApiRegistrations::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_api_registrations_owner_status")
                    .table(ApiRegistrations::Table)
                    .col(ApiRegistrations::OwnerId)
                    .col(ApiRegistrations::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_api_registrations_owner_status")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_api_registrations_owner_name")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(ApiRegistrations::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ApiRegistrations {
    Table,
    Id,
    OwnerId,
    Name,
    BaseUrl,
    ApiKind,
    AuthType,
    AuthBlob,
    Status,
    LastValidatedAt,
    ValidationError,
    CreatedAt,
    UpdatedAt,
}
