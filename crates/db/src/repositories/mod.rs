use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use orderdesk_core::domain::conversation::{Conversation, ConversationId, Message};
use orderdesk_core::domain::order::{Order, OrderId};
use orderdesk_core::domain::product::{Product, ProductId};
use orderdesk_core::errors::ApplicationError;
use orderdesk_core::ordering::{OrderLineRequest, OrderOutcome};

pub mod catalog;
pub mod conversation;
pub mod memory;
pub mod order;

pub use catalog::SqlCatalogRepository;
pub use conversation::SqlConversationRepository;
pub use memory::{
    InMemoryCatalogRepository, InMemoryConversationRepository, InMemoryOrderRepository,
};
pub use order::SqlOrderRepository;

pub const DEFAULT_ORDER_RETRY_ATTEMPTS: u32 = 5;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("{entity} `{id}` was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("order could not be committed after {attempts} attempts due to contention")]
    Conflict { attempts: u32 },
}

impl RepositoryError {
    pub(crate) fn decode(error: impl std::fmt::Display) -> Self {
        Self::Decode(error.to_string())
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound { entity, id } => ApplicationError::NotFound { entity, id },
            RepositoryError::Validation(message) => ApplicationError::Validation(message),
            other => ApplicationError::Persistence(other.to_string()),
        }
    }
}

/// Read access to the product catalog. Stock only moves through
/// [`OrderRepository::create_order`].
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn list_products(&self) -> Result<Vec<Product>, RepositoryError>;

    async fn find_product(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError>;

    /// Case-insensitive substring search over name and description.
    async fn search_products(&self, query: &str) -> Result<Vec<Product>, RepositoryError>;

    /// Inserts or replaces a catalog entry. Used by fixtures and tests.
    async fn save_product(&self, product: Product) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Validates availability and, when every line can be served, records the
    /// order and decrements stock in one atomic step. Business unavailability
    /// is returned as [`OrderOutcome::Rejected`], never as an error.
    async fn create_order(
        &self,
        customer_id: &str,
        items: &[OrderLineRequest],
    ) -> Result<OrderOutcome, RepositoryError>;

    async fn find_order(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError>;

    async fn list_orders(&self) -> Result<Vec<Order>, RepositoryError>;

    async fn list_orders_for_customer(
        &self,
        customer_id: &str,
    ) -> Result<Vec<Order>, RepositoryError>;
}

/// Append-only transcript store keyed by sender.
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Returns the sender's transcript, creating it seeded with one system
    /// message when absent.
    async fn get_or_create(
        &self,
        sender_id: &str,
        system_prompt: &str,
    ) -> Result<Conversation, RepositoryError>;

    async fn append(
        &self,
        conversation_id: &ConversationId,
        message: Message,
    ) -> Result<Message, RepositoryError>;

    async fn find_by_sender(&self, sender_id: &str)
        -> Result<Option<Conversation>, RepositoryError>;
}

pub(crate) fn validate_product(product: &Product) -> Result<(), RepositoryError> {
    if product.id.0.trim().is_empty() {
        return Err(RepositoryError::Validation("product id must not be empty".to_string()));
    }
    if product.price < Decimal::ZERO {
        return Err(RepositoryError::Validation(format!(
            "price for product `{}` must not be negative",
            product.id
        )));
    }
    Ok(())
}

pub(crate) fn validate_order_request(
    customer_id: &str,
    items: &[OrderLineRequest],
) -> Result<(), RepositoryError> {
    if customer_id.trim().is_empty() {
        return Err(RepositoryError::Validation("customer id must not be empty".to_string()));
    }
    if items.is_empty() {
        return Err(RepositoryError::Validation("order must contain at least one item".to_string()));
    }
    if let Some(item) = items.iter().find(|item| item.quantity == 0) {
        return Err(RepositoryError::Validation(format!(
            "quantity for product `{}` must be positive",
            item.product_id
        )));
    }
    Ok(())
}
