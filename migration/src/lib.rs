//! Database migrations for mcpforge.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_07_01_000100_create_api_registrations;
mod m2025_07_01_000200_create_api_endpoints;
mod m2025_07_01_000300_create_generation_jobs;
mod m2025_07_01_000400_create_build_records;
mod m2025_07_01_000500_create_deployments;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_07_01_000100_create_api_registrations::Migration),
            Box::new(m2025_07_01_000200_create_api_endpoints::Migration),
            Box::new(m2025_07_01_000300_create_generation_jobs::Migration),
            Box::new(m2025_07_01_000400_create_build_records::Migration),
            Box::new(m2025_07_01_000500_create_deployments::Migration),
        ]
    }
}
