pub mod connection;
pub mod fact_source;
pub mod fixtures;
pub mod memory;
pub mod migrations;

pub use connection::{connect, connect_with_settings, DbPool};
pub use fact_source::SqlFactSource;
pub use fixtures::{DemoDataset, SeedSummary};
pub use memory::InMemoryFactSource;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}
