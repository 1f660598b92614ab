use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use orderdesk_core::domain::conversation::{Conversation, ConversationId, Message};
use orderdesk_core::domain::order::{Order, OrderId, OrderStatus};
use orderdesk_core::domain::product::{Product, ProductId};
use orderdesk_core::ordering::{plan_order, referenced_products, OrderLineRequest, OrderOutcome};

use super::{
    validate_order_request, validate_product, CatalogRepository, ConversationRepository,
    OrderRepository, RepositoryError,
};

type SharedCatalog = Arc<RwLock<BTreeMap<ProductId, Product>>>;

#[derive(Default, Clone)]
pub struct InMemoryCatalogRepository {
    products: SharedCatalog,
}

impl InMemoryCatalogRepository {
    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let products = products.into_iter().map(|product| (product.id.clone(), product)).collect();
        Self { products: Arc::new(RwLock::new(products)) }
    }
}

#[async_trait::async_trait]
impl CatalogRepository for InMemoryCatalogRepository {
    async fn list_products(&self) -> Result<Vec<Product>, RepositoryError> {
        let products = self.products.read().await;
        Ok(products.values().cloned().collect())
    }

    async fn find_product(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError> {
        let products = self.products.read().await;
        Ok(products.get(id).cloned())
    }

    async fn search_products(&self, query: &str) -> Result<Vec<Product>, RepositoryError> {
        let products = self.products.read().await;
        Ok(products.values().filter(|product| product.matches_query(query)).cloned().collect())
    }

    async fn save_product(&self, product: Product) -> Result<(), RepositoryError> {
        validate_product(&product)?;
        let mut products = self.products.write().await;
        products.insert(product.id.clone(), product);
        Ok(())
    }
}

/// Shares the catalog map with an [`InMemoryCatalogRepository`]; the write
/// lock on that map makes plan-and-decrement atomic.
pub struct InMemoryOrderRepository {
    catalog: SharedCatalog,
    orders: RwLock<Vec<Order>>,
}

impl InMemoryOrderRepository {
    pub fn new(catalog: &InMemoryCatalogRepository) -> Self {
        Self { catalog: Arc::clone(&catalog.products), orders: RwLock::new(Vec::new()) }
    }
}

#[async_trait::async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create_order(
        &self,
        customer_id: &str,
        items: &[OrderLineRequest],
    ) -> Result<OrderOutcome, RepositoryError> {
        validate_order_request(customer_id, items)?;

        let mut products = self.catalog.write().await;
        let snapshot: HashMap<ProductId, Product> = referenced_products(items)
            .into_iter()
            .filter_map(|id| products.get(&id).cloned().map(|product| (id, product)))
            .collect();

        let plan = match plan_order(items, &snapshot) {
            Ok(plan) => plan,
            Err(unavailable) => return Ok(OrderOutcome::Rejected { unavailable }),
        };

        for (product_id, quantity) in &plan.decrements {
            if let Some(product) = products.get_mut(product_id) {
                product.stock -= quantity;
            }
        }

        let order_id = OrderId::generate();
        self.orders.write().await.push(Order {
            id: order_id.clone(),
            customer_id: customer_id.to_string(),
            total: plan.total,
            status: OrderStatus::Pending,
            items: plan.order_items(),
            created_at: Utc::now(),
        });

        Ok(OrderOutcome::Created(plan.receipt(order_id)))
    }

    async fn find_order(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        let orders = self.orders.read().await;
        Ok(orders.iter().find(|order| &order.id == id).cloned())
    }

    async fn list_orders(&self) -> Result<Vec<Order>, RepositoryError> {
        Ok(self.orders.read().await.clone())
    }

    async fn list_orders_for_customer(
        &self,
        customer_id: &str,
    ) -> Result<Vec<Order>, RepositoryError> {
        let orders = self.orders.read().await;
        Ok(orders.iter().filter(|order| order.customer_id == customer_id).cloned().collect())
    }
}

#[derive(Default)]
pub struct InMemoryConversationRepository {
    conversations: RwLock<HashMap<String, Conversation>>,
}

#[async_trait::async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn get_or_create(
        &self,
        sender_id: &str,
        system_prompt: &str,
    ) -> Result<Conversation, RepositoryError> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations.entry(sender_id.to_string()).or_insert_with(|| {
            Conversation {
                id: ConversationId::generate(),
                sender_id: sender_id.to_string(),
                messages: vec![Message::system(system_prompt)],
                created_at: Utc::now(),
            }
        });
        Ok(conversation.clone())
    }

    async fn append(
        &self,
        conversation_id: &ConversationId,
        message: Message,
    ) -> Result<Message, RepositoryError> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations
            .values_mut()
            .find(|conversation| &conversation.id == conversation_id)
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "conversation",
                id: conversation_id.0.clone(),
            })?;

        if !conversation.accepts(&message) {
            return Err(RepositoryError::Validation(format!(
                "{} message cannot be appended at position {}",
                message.role.as_str(),
                conversation.messages.len()
            )));
        }
        conversation.messages.push(message.clone());
        Ok(message)
    }

    async fn find_by_sender(
        &self,
        sender_id: &str,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let conversations = self.conversations.read().await;
        Ok(conversations.get(sender_id).cloned())
    }
}
