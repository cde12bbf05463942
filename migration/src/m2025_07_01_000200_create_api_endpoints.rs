//! Migration to create the api_endpoints table.
//!
//! Endpoints are owned by their registration and cascade-delete with it.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ApiEndpoints::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ApiEndpoints::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ApiEndpoints::RegistrationId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ApiEndpoints::Name).text().not_null())
                    .col(ColumnDef::new(ApiEndpoints::Method).text().not_null())
                    .col(ColumnDef::new(ApiEndpoints::Path).text().not_null())
                    .col(
                        ColumnDef::new(ApiEndpoints::RequestSchema)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ApiEndpoints::ResponseSchema)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ApiEndpoints::QueryParams)
                            .json_binary()
                            .null(),
                    )
                    .col(ColumnDef::new(ApiEndpoints::PathParams).json_binary().null())
                    .col(ColumnDef::new(ApiEndpoints::Headers).json_binary().null())
                    .col(
                        ColumnDef::new(ApiEndpoints::RequiresAuth)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(ApiEndpoints::RateLimit).integer().null())
                    .col(
                        ColumnDef::new(ApiEndpoints::TimeoutSeconds)
                            .integer()
                            .not_null()
                            .default(30),
                    )
                    .col(
                        ColumnDef::new(ApiEndpoints::CacheTtlSeconds)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ApiEndpoints::ContentType)
                            .text()
                            .not_null()
                            .default("application/json"),
                    )
                    .col(
                        ColumnDef::new(ApiEndpoints::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ApiEndpoints::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_api_endpoints_registration_id")
                            .from(ApiEndpoints::Table, ApiEndpoints::RegistrationId)
                            .to(ApiRegistrations::Table, ApiRegistrations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // (registration, path, method) uniqueness per the data model
        manager
            .create_index(
                Index::create()
                    .name("idx_api_endpoints_registration_path_method")
                    .table(ApiEndpoints::Table)
                    .col(ApiEndpoints::RegistrationId)
                    .col(ApiEndpoints::Path)
                    .col(ApiEndpoints::Method)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_api_endpoints_registration_path_method")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(ApiEndpoints::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ApiEndpoints {
    Table,
    Id,
    RegistrationId,
    Name,
    Method,
    Path,
    RequestSchema,
    ResponseSchema,
    QueryParams,
    PathParams,
    Headers,
    RequiresAuth,
    RateLimit,
    TimeoutSeconds,
    CacheTtlSeconds,
    ContentType,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ApiRegistrations {
    Table,
    Id,
}
