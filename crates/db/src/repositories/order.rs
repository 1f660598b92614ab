use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};
use tracing::{debug, info, warn};

use orderdesk_core::domain::order::{Order, OrderId, OrderItem, OrderStatus};
use orderdesk_core::domain::product::{Product, ProductId};
use orderdesk_core::ordering::{
    plan_order, referenced_products, OrderLineRequest, OrderOutcome, OrderPlan,
};

use super::catalog::{parse_decimal, product_from_row};
use super::{validate_order_request, OrderRepository, RepositoryError, DEFAULT_ORDER_RETRY_ATTEMPTS};
use crate::connection::is_contention;
use crate::DbPool;

const RETRY_BACKOFF_STEP: Duration = Duration::from_millis(15);

pub struct SqlOrderRepository {
    pool: DbPool,
    retry_attempts: u32,
}

enum Attempt {
    Finished(OrderOutcome),
    LostRace,
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool, retry_attempts: DEFAULT_ORDER_RETRY_ATTEMPTS }
    }

    pub fn with_retry_attempts(mut self, retry_attempts: u32) -> Self {
        self.retry_attempts = retry_attempts.max(1);
        self
    }

    async fn attempt_create(
        &self,
        customer_id: &str,
        items: &[OrderLineRequest],
    ) -> Result<Attempt, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let snapshot = load_snapshot(&mut tx, &referenced_products(items)).await?;
        let plan = match plan_order(items, &snapshot) {
            Ok(plan) => plan,
            Err(unavailable) => {
                tx.rollback().await?;
                return Ok(Attempt::Finished(OrderOutcome::Rejected { unavailable }));
            }
        };

        if !apply_decrements(&mut tx, &plan).await? {
            tx.rollback().await?;
            return Ok(Attempt::LostRace);
        }

        let order_id = OrderId::generate();
        insert_order(&mut tx, &order_id, customer_id, &plan).await?;
        tx.commit().await?;

        Ok(Attempt::Finished(OrderOutcome::Created(plan.receipt(order_id))))
    }

    async fn load_items(&self, order_id: &str) -> Result<Vec<OrderItem>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT product_id, quantity, price FROM order_item WHERE order_id = ? ORDER BY line_no",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(order_item_from_row).collect()
    }

    async fn hydrate(&self, rows: Vec<SqliteRow>) -> Result<Vec<Order>, RepositoryError> {
        let mut orders = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut order = order_header_from_row(row)?;
            order.items = self.load_items(&order.id.0).await?;
            orders.push(order);
        }
        Ok(orders)
    }
}

async fn load_snapshot(
    tx: &mut Transaction<'_, Sqlite>,
    product_ids: &[ProductId],
) -> Result<HashMap<ProductId, Product>, RepositoryError> {
    let mut snapshot = HashMap::with_capacity(product_ids.len());
    for product_id in product_ids {
        let row = sqlx::query("SELECT id, name, description, price, stock FROM product WHERE id = ?")
            .bind(&product_id.0)
            .fetch_optional(&mut **tx)
            .await?;
        if let Some(row) = row {
            let product = product_from_row(&row)?;
            snapshot.insert(product.id.clone(), product);
        }
    }
    Ok(snapshot)
}

/// Returns false when another writer drained stock after the snapshot was read.
async fn apply_decrements(
    tx: &mut Transaction<'_, Sqlite>,
    plan: &OrderPlan,
) -> Result<bool, RepositoryError> {
    let now = Utc::now().to_rfc3339();
    for (product_id, quantity) in &plan.decrements {
        let quantity = i64::from(*quantity);
        let updated = sqlx::query(
            "UPDATE product SET stock = stock - ?, updated_at = ? WHERE id = ? AND stock >= ?",
        )
        .bind(quantity)
        .bind(&now)
        .bind(&product_id.0)
        .bind(quantity)
        .execute(&mut **tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Ok(false);
        }
    }
    Ok(true)
}

async fn insert_order(
    tx: &mut Transaction<'_, Sqlite>,
    order_id: &OrderId,
    customer_id: &str,
    plan: &OrderPlan,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO customer_order (id, customer_id, total, status, created_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&order_id.0)
    .bind(customer_id)
    .bind(plan.total.to_string())
    .bind(OrderStatus::Pending.as_str())
    .bind(Utc::now().to_rfc3339())
    .execute(&mut **tx)
    .await?;

    for (line_no, line) in plan.items.iter().enumerate() {
        sqlx::query(
            "INSERT INTO order_item (order_id, line_no, product_id, quantity, price)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&order_id.0)
        .bind(line_no as i64)
        .bind(&line.product_id.0)
        .bind(i64::from(line.quantity))
        .bind(line.unit_price.to_string())
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

fn order_header_from_row(row: &SqliteRow) -> Result<Order, RepositoryError> {
    let id: String = row.try_get("id").map_err(RepositoryError::decode)?;
    let customer_id: String = row.try_get("customer_id").map_err(RepositoryError::decode)?;
    let total: String = row.try_get("total").map_err(RepositoryError::decode)?;
    let status: String = row.try_get("status").map_err(RepositoryError::decode)?;
    let created_at: String = row.try_get("created_at").map_err(RepositoryError::decode)?;

    Ok(Order {
        id: OrderId(id),
        customer_id,
        total: parse_decimal("customer_order.total", &total)?,
        status: OrderStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown order status `{status}`")))?,
        items: Vec::new(),
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|value| value.with_timezone(&Utc))
            .map_err(RepositoryError::decode)?,
    })
}

fn order_item_from_row(row: &SqliteRow) -> Result<OrderItem, RepositoryError> {
    let product_id: String = row.try_get("product_id").map_err(RepositoryError::decode)?;
    let quantity: i64 = row.try_get("quantity").map_err(RepositoryError::decode)?;
    let price: String = row.try_get("price").map_err(RepositoryError::decode)?;

    Ok(OrderItem {
        product_id: ProductId(product_id),
        quantity: u32::try_from(quantity)
            .map_err(|_| RepositoryError::Decode(format!("order_item.quantity out of range: {quantity}")))?,
        price: parse_decimal("order_item.price", &price)?,
    })
}

#[async_trait::async_trait]
impl OrderRepository for SqlOrderRepository {
    async fn create_order(
        &self,
        customer_id: &str,
        items: &[OrderLineRequest],
    ) -> Result<OrderOutcome, RepositoryError> {
        validate_order_request(customer_id, items)?;

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.attempt_create(customer_id, items).await {
                Ok(Attempt::Finished(outcome)) => {
                    match &outcome {
                        OrderOutcome::Created(receipt) => info!(
                            event_name = "order.create.committed",
                            order_id = %receipt.order_id,
                            customer_id,
                            total = %receipt.total,
                            attempt,
                            "order committed"
                        ),
                        OrderOutcome::Rejected { unavailable } => info!(
                            event_name = "order.create.rejected",
                            customer_id,
                            unavailable = unavailable.len(),
                            "order rejected for unavailable items"
                        ),
                    }
                    return Ok(outcome);
                }
                Ok(Attempt::LostRace) => {
                    debug!(event_name = "order.create.lost_race", customer_id, attempt);
                }
                Err(RepositoryError::Database(error)) if is_contention(&error) => {
                    debug!(
                        event_name = "order.create.contended",
                        customer_id,
                        attempt,
                        error = %error
                    );
                }
                Err(error) => return Err(error),
            }

            if attempt >= self.retry_attempts {
                warn!(
                    event_name = "order.create.exhausted",
                    customer_id,
                    attempts = attempt,
                    "order retries exhausted"
                );
                return Err(RepositoryError::Conflict { attempts: attempt });
            }
            tokio::time::sleep(RETRY_BACKOFF_STEP * attempt).await;
        }
    }

    async fn find_order(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, customer_id, total, status, created_at FROM customer_order WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_orders(&self) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, customer_id, total, status, created_at FROM customer_order ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }

    async fn list_orders_for_customer(
        &self,
        customer_id: &str,
    ) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, customer_id, total, status, created_at
             FROM customer_order WHERE customer_id = ? ORDER BY rowid",
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }
}
