pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_from_config, connect_with_settings, ping, DbPool};
pub use fixtures::{DemoCatalog, SeedResult, VerificationResult};
pub use repositories::{
    CatalogRepository, ConversationRepository, InMemoryCatalogRepository,
    InMemoryConversationRepository, InMemoryOrderRepository, OrderRepository, RepositoryError,
    SqlCatalogRepository, SqlConversationRepository, SqlOrderRepository,
};
