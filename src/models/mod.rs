//! # Data Models
//!
//! SeaORM entities for the embedded store plus the backend-neutral records
//! the reconciler and every store implementation exchange.

pub mod record;
pub mod repository;
pub mod technology;

pub use record::{RepositoryDraft, RepositoryRecord, TechnologyCount};
pub use repository::Entity as Repository;
pub use technology::Entity as Technology;
