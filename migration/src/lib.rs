//! Database migrations for the showcase catalogue.
//!
//! Creates the `repositories` and `technologies` tables used by the embedded
//! SQLite backend.

pub use sea_orm_migration::prelude::*;

mod m2025_02_01_000001_create_repositories;
mod m2025_02_01_000002_create_technologies;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_02_01_000001_create_repositories::Migration),
            Box::new(m2025_02_01_000002_create_technologies::Migration),
        ]
    }
}
