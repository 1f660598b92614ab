//! Catalog and ordering tools offered to the model.
//!
//! Business outcomes (unknown product, short stock) are returned as data so the
//! model can explain them to the customer. Only repository failures surface as
//! [`ToolError`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};

use orderdesk_core::domain::product::{Product, ProductId};
use orderdesk_core::matcher::ProductMatcher;
use orderdesk_core::ordering::{
    referenced_products, OrderLineRequest, OrderOutcome, UnavailableItem, UnavailableReason,
};
use orderdesk_db::{CatalogRepository, OrderRepository};

use crate::tools::{
    optional_string_arg, positive_arg, string_arg, FieldSpec, FieldType, RegistryError, Tool,
    ToolContext, ToolError, ToolRegistry, ToolSpec,
};

pub const SEARCH_PRODUCTS: &str = "search_products";
pub const PRODUCT_DETAIL: &str = "product_detail";
pub const EXTRACT_PRODUCTS: &str = "extract_products";
pub const CHECK_AVAILABILITY: &str = "check_availability";
pub const CREATE_ORDER: &str = "create_order";

/// Registers every ordering tool against the given stores.
pub fn order_tool_registry(
    catalog: Arc<dyn CatalogRepository>,
    orders: Arc<dyn OrderRepository>,
    matcher: Arc<ProductMatcher>,
) -> Result<ToolRegistry, RegistryError> {
    let mut registry = ToolRegistry::default();
    registry.register(SearchProductsTool { catalog: Arc::clone(&catalog) })?;
    registry.register(ProductDetailTool { catalog: Arc::clone(&catalog) })?;
    registry.register(ExtractProductsTool { catalog: Arc::clone(&catalog), matcher })?;
    registry.register(CheckAvailabilityTool { catalog })?;
    registry.register(CreateOrderTool { orders })?;
    Ok(registry)
}

fn order_lines_field(description: &'static str) -> FieldSpec {
    FieldSpec::required(
        "items",
        FieldType::ObjectArray(vec![
            FieldSpec::required("productId", FieldType::String, "ID do produto"),
            FieldSpec::required("quantity", FieldType::PositiveInteger, "Quantidade desejada"),
        ]),
        description,
    )
}

fn order_lines(args: &Value) -> Result<Vec<OrderLineRequest>, ToolError> {
    let items = args
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| ToolError::Validation("`items` must be an array".to_string()))?;

    items
        .iter()
        .map(|item| -> Result<OrderLineRequest, ToolError> {
            Ok(OrderLineRequest::new(string_arg(item, "productId")?, positive_arg(item, "quantity")?))
        })
        .collect()
}

fn to_value(value: impl Serialize) -> Result<Value, ToolError> {
    serde_json::to_value(value)
        .map_err(|error| ToolError::Backend(format!("failed to encode tool output: {error}")))
}

pub struct SearchProductsTool {
    catalog: Arc<dyn CatalogRepository>,
}

#[async_trait]
impl Tool for SearchProductsTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: SEARCH_PRODUCTS,
            description: "Pesquisa produtos pelo nome ou descrição",
            fields: vec![FieldSpec::required(
                "query",
                FieldType::String,
                "Termos de pesquisa para encontrar produtos",
            )],
        }
    }

    async fn execute(&self, _ctx: &ToolContext, args: Value) -> Result<Value, ToolError> {
        let products = self.catalog.search_products(string_arg(&args, "query")?).await?;
        Ok(json!({ "products": to_value(products)? }))
    }
}

pub struct ProductDetailTool {
    catalog: Arc<dyn CatalogRepository>,
}

#[async_trait]
impl Tool for ProductDetailTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: PRODUCT_DETAIL,
            description: "Obtém informações detalhadas de um produto específico pelo ID",
            fields: vec![FieldSpec::required("productId", FieldType::String, "ID do produto")],
        }
    }

    async fn execute(&self, _ctx: &ToolContext, args: Value) -> Result<Value, ToolError> {
        let product_id = string_arg(&args, "productId")?;
        match self.catalog.find_product(&ProductId(product_id.to_string())).await? {
            Some(product) => Ok(json!({ "product": to_value(product)? })),
            None => Ok(json!({ "error": format!("Produto com ID {product_id} não encontrado") })),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MatchedProduct {
    id: ProductId,
    name: String,
    price: Decimal,
    quantity: u32,
    subtotal: Decimal,
    available: bool,
    stock: u32,
    confidence: f64,
}

pub struct ExtractProductsTool {
    catalog: Arc<dyn CatalogRepository>,
    matcher: Arc<ProductMatcher>,
}

#[async_trait]
impl Tool for ExtractProductsTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: EXTRACT_PRODUCTS,
            description: "Extrai menções a produtos e suas quantidades de um texto",
            fields: vec![FieldSpec::required("text", FieldType::String, "Texto da mensagem do cliente")],
        }
    }

    async fn execute(&self, _ctx: &ToolContext, args: Value) -> Result<Value, ToolError> {
        let text = string_arg(&args, "text")?;
        let catalog = self.catalog.list_products().await?;

        let matched = self
            .matcher
            .match_products(text, &catalog)
            .into_iter()
            .map(|candidate| MatchedProduct {
                subtotal: candidate.product.price * Decimal::from(candidate.quantity),
                available: candidate.product.has_stock_for(candidate.quantity),
                stock: candidate.product.stock,
                quantity: candidate.quantity,
                confidence: candidate.confidence,
                price: candidate.product.price,
                name: candidate.product.name,
                id: candidate.product.id,
            })
            .collect::<Vec<_>>();

        Ok(json!({ "matchedProducts": to_value(matched)? }))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AvailabilityResult {
    product_id: ProductId,
    found: bool,
    available: bool,
    requested: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    in_stock: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    price: Option<Decimal>,
}

pub struct CheckAvailabilityTool {
    catalog: Arc<dyn CatalogRepository>,
}

#[async_trait]
impl Tool for CheckAvailabilityTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: CHECK_AVAILABILITY,
            description: "Verifica se produtos estão disponíveis em estoque nas quantidades desejadas",
            fields: vec![order_lines_field("Itens a verificar")],
        }
    }

    async fn execute(&self, _ctx: &ToolContext, args: Value) -> Result<Value, ToolError> {
        let lines = order_lines(&args)?;

        let mut products: HashMap<ProductId, Product> = HashMap::new();
        for product_id in referenced_products(&lines) {
            if let Some(product) = self.catalog.find_product(&product_id).await? {
                products.insert(product_id, product);
            }
        }

        let results = lines
            .iter()
            .map(|line| match products.get(&line.product_id) {
                Some(product) => AvailabilityResult {
                    product_id: line.product_id.clone(),
                    found: true,
                    available: product.has_stock_for(line.quantity),
                    requested: line.quantity,
                    name: Some(product.name.clone()),
                    in_stock: Some(product.stock),
                    price: Some(product.price),
                },
                None => AvailabilityResult {
                    product_id: line.product_id.clone(),
                    found: false,
                    available: false,
                    requested: line.quantity,
                    name: None,
                    in_stock: None,
                    price: None,
                },
            })
            .collect::<Vec<_>>();

        Ok(json!({ "results": to_value(results)? }))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatedOrderLine {
    product_id: ProductId,
    product: String,
    quantity: u32,
    price: Decimal,
    subtotal: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UnavailableProduct {
    id: ProductId,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    reason: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    available: Option<u32>,
}

impl From<UnavailableItem> for UnavailableProduct {
    fn from(item: UnavailableItem) -> Self {
        let (reason, available) = match item.reason {
            UnavailableReason::NotFound => ("not_found", None),
            UnavailableReason::InsufficientStock { available } => {
                ("insufficient_stock", Some(available))
            }
        };
        Self { id: item.product_id, name: item.name, reason, available }
    }
}

pub struct CreateOrderTool {
    orders: Arc<dyn OrderRepository>,
}

#[async_trait]
impl Tool for CreateOrderTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: CREATE_ORDER,
            description: "Cria um novo pedido com os itens especificados",
            fields: vec![
                FieldSpec::optional(
                    "customerId",
                    FieldType::String,
                    "ID do cliente (número do WhatsApp); padrão é o remetente",
                ),
                order_lines_field("Itens do pedido"),
            ],
        }
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<Value, ToolError> {
        let customer_id = optional_string_arg(&args, "customerId")
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(ctx.sender_id.as_str());
        let lines = order_lines(&args)?;

        match self.orders.create_order(customer_id, &lines).await? {
            OrderOutcome::Created(receipt) => {
                let items = receipt
                    .items
                    .into_iter()
                    .map(|line| CreatedOrderLine {
                        product_id: line.product_id,
                        product: line.product_name,
                        quantity: line.quantity,
                        price: line.unit_price,
                        subtotal: line.subtotal,
                    })
                    .collect::<Vec<_>>();

                Ok(json!({
                    "success": true,
                    "order": {
                        "id": receipt.order_id.0,
                        "total": to_value(receipt.total)?,
                        "items": to_value(items)?,
                    },
                }))
            }
            OrderOutcome::Rejected { unavailable } => {
                let unavailable =
                    unavailable.into_iter().map(UnavailableProduct::from).collect::<Vec<_>>();
                Ok(json!({ "success": false, "unavailableProducts": to_value(unavailable)? }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;
    use serde_json::json;

    use orderdesk_core::domain::product::{Product, ProductId};
    use orderdesk_core::matcher::ProductMatcher;
    use orderdesk_db::{
        CatalogRepository, InMemoryCatalogRepository, InMemoryOrderRepository, OrderRepository,
    };

    use super::order_tool_registry;
    use crate::tools::{ToolContext, ToolError, ToolRegistry};

    fn product(id: &str, name: &str, cents: i64, stock: u32) -> Product {
        Product {
            id: ProductId(id.to_string()),
            name: name.to_string(),
            description: format!("{name} tradicional"),
            price: Decimal::new(cents, 2),
            stock,
        }
    }

    struct Fixture {
        catalog: InMemoryCatalogRepository,
        orders: Arc<InMemoryOrderRepository>,
        registry: ToolRegistry,
    }

    fn fixture() -> Fixture {
        let catalog = InMemoryCatalogRepository::with_products([
            product("p-arroz", "Arroz Integral", 899, 10),
            product("p-cafe", "Cafe Torrado", 1000, 5),
        ]);
        let orders = Arc::new(InMemoryOrderRepository::new(&catalog));
        let registry = order_tool_registry(
            Arc::new(catalog.clone()),
            Arc::clone(&orders) as Arc<dyn OrderRepository>,
            Arc::new(ProductMatcher::default()),
        )
        .expect("registry");
        Fixture { catalog, orders, registry }
    }

    fn ctx() -> ToolContext {
        ToolContext { sender_id: "5511988887777".to_string(), correlation_id: "turn-1".to_string() }
    }

    #[test]
    fn registers_all_five_tools() {
        let fixture = fixture();
        assert_eq!(
            fixture.registry.names(),
            vec![
                "check_availability",
                "create_order",
                "extract_products",
                "product_detail",
                "search_products"
            ]
        );
    }

    #[tokio::test]
    async fn search_and_detail_report_products_or_not_found_payload() {
        let fixture = fixture();

        let found =
            fixture.registry.dispatch(&ctx(), "search_products", json!({"query": "CAFE"})).await.expect("search");
        assert_eq!(found["products"].as_array().map(Vec::len), Some(1));
        assert_eq!(found["products"][0]["id"], "p-cafe");

        let missing = fixture
            .registry
            .dispatch(&ctx(), "product_detail", json!({"productId": "p-nope"}))
            .await
            .expect("detail");
        assert_eq!(missing["error"], "Produto com ID p-nope não encontrado");
    }

    #[tokio::test]
    async fn extract_products_reports_subtotal_and_availability() {
        let fixture = fixture();

        let output = fixture
            .registry
            .dispatch(&ctx(), "extract_products", json!({"text": "quero 2kg de arroz integral"}))
            .await
            .expect("extract");

        let matched = &output["matchedProducts"];
        assert_eq!(matched.as_array().map(Vec::len), Some(1));
        assert_eq!(matched[0]["id"], "p-arroz");
        assert_eq!(matched[0]["quantity"], 2);
        assert_eq!(matched[0]["subtotal"], "17.98");
        assert_eq!(matched[0]["available"], true);
    }

    #[tokio::test]
    async fn check_availability_flags_unknown_ids_without_failing() {
        let fixture = fixture();

        let output = fixture
            .registry
            .dispatch(
                &ctx(),
                "check_availability",
                json!({"items": [
                    {"productId": "p-cafe", "quantity": 6},
                    {"productId": "p-ghost", "quantity": 1}
                ]}),
            )
            .await
            .expect("check");

        assert_eq!(output["results"][0]["found"], true);
        assert_eq!(output["results"][0]["available"], false);
        assert_eq!(output["results"][0]["inStock"], 5);
        assert_eq!(output["results"][1], json!({"productId": "p-ghost", "found": false, "available": false, "requested": 1}));
    }

    #[tokio::test]
    async fn create_order_defaults_customer_to_sender() {
        let fixture = fixture();

        let output = fixture
            .registry
            .dispatch(&ctx(), "create_order", json!({"items": [{"productId": "p-cafe", "quantity": 2}]}))
            .await
            .expect("create");

        assert_eq!(output["success"], true);
        assert_eq!(output["order"]["total"], "20.00");
        assert_eq!(output["order"]["items"][0]["product"], "Cafe Torrado");
        assert_eq!(output["order"]["items"][0]["subtotal"], "20.00");

        let stored = fixture.orders.list_orders_for_customer("5511988887777").await.expect("list");
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn create_order_rejection_is_data_and_moves_no_stock() {
        let fixture = fixture();

        let output = fixture
            .registry
            .dispatch(
                &ctx(),
                "create_order",
                json!({"customerId": "loja-1", "items": [
                    {"productId": "p-arroz", "quantity": 1},
                    {"productId": "p-cafe", "quantity": 9}
                ]}),
            )
            .await
            .expect("create");

        assert_eq!(output["success"], false);
        assert_eq!(
            output["unavailableProducts"],
            json!([{"id": "p-cafe", "name": "Cafe Torrado", "reason": "insufficient_stock", "available": 5}])
        );

        let arroz = fixture
            .catalog
            .find_product(&ProductId("p-arroz".to_string()))
            .await
            .expect("find")
            .expect("product");
        assert_eq!(arroz.stock, 10);
        assert!(fixture.orders.list_orders().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn malformed_quantities_never_reach_the_store() {
        let fixture = fixture();

        let result = fixture
            .registry
            .dispatch(&ctx(), "create_order", json!({"items": [{"productId": "p-cafe", "quantity": 0}]}))
            .await;

        assert!(matches!(result, Err(ToolError::Validation(_))));
        assert!(fixture.orders.list_orders().await.expect("list").is_empty());
    }
}
