//! Repository entity model
//!
//! SeaORM entity for the `repositories` table. One row per tracked GitHub
//! repository; `metadata` holds the project metadata object serialized as JSON.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "repositories")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Normalized repository url (unique)
    #[sea_orm(unique)]
    pub repo_url: String,

    pub name: String,

    /// Login of the owning user or organization
    pub owner: String,

    pub description: Option<String>,

    pub stars: i64,

    pub forks: i64,

    /// Primary language reported by GitHub
    pub language: Option<String>,

    /// Upstream `updated_at` formatted as `YYYY-MM-DD`
    pub last_updated: Option<String>,

    /// When this row was last written from upstream data
    pub last_synced: DateTimeUtc,

    /// Serialized metadata object
    pub metadata: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
