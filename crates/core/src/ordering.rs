//! Pure order planning shared by every order store.
//!
//! `plan_order` classifies the requested lines against a stock snapshot and,
//! when everything is available, prices the order from that snapshot. Stores
//! apply the resulting decrements atomically and re-plan on contention.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order::{OrderId, OrderItem};
use crate::domain::product::{Product, ProductId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl OrderLineRequest {
    pub fn new(product_id: impl Into<String>, quantity: u32) -> Self {
        Self { product_id: ProductId(product_id.into()), quantity }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UnavailableReason {
    NotFound,
    InsufficientStock { available: u32 },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnavailableItem {
    pub product_id: ProductId,
    pub name: Option<String>,
    #[serde(flatten)]
    pub reason: UnavailableReason,
}

/// A fully priced order plus the stock decrement each product needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderPlan {
    pub items: Vec<PlannedLine>,
    pub total: Decimal,
    pub decrements: BTreeMap<ProductId, u32>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedLine {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

impl PlannedLine {
    pub fn subtotal(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

impl OrderPlan {
    pub fn order_items(&self) -> Vec<OrderItem> {
        self.items
            .iter()
            .map(|line| OrderItem {
                product_id: line.product_id.clone(),
                quantity: line.quantity,
                price: line.unit_price,
            })
            .collect()
    }

    pub fn receipt(&self, order_id: OrderId) -> OrderReceipt {
        OrderReceipt {
            order_id,
            total: self.total,
            items: self
                .items
                .iter()
                .map(|line| ReceiptLine {
                    product_id: line.product_id.clone(),
                    product_name: line.product_name.clone(),
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                    subtotal: line.subtotal(),
                })
                .collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptLine {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub order_id: OrderId,
    pub total: Decimal,
    pub items: Vec<ReceiptLine>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OrderOutcome {
    Created(OrderReceipt),
    Rejected { unavailable: Vec<UnavailableItem> },
}

impl OrderOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Distinct product ids in first-seen order.
pub fn referenced_products(items: &[OrderLineRequest]) -> Vec<ProductId> {
    let mut seen = Vec::new();
    for item in items {
        if !seen.contains(&item.product_id) {
            seen.push(item.product_id.clone());
        }
    }
    seen
}

/// Validates all lines against `snapshot`. Stock is compared with the total
/// quantity requested per product, so split lines cannot oversell together.
pub fn plan_order(
    items: &[OrderLineRequest],
    snapshot: &HashMap<ProductId, Product>,
) -> Result<OrderPlan, Vec<UnavailableItem>> {
    let mut requested: BTreeMap<ProductId, u64> = BTreeMap::new();
    for item in items {
        *requested.entry(item.product_id.clone()).or_insert(0) += u64::from(item.quantity);
    }

    let mut unavailable = Vec::new();
    for product_id in referenced_products(items) {
        let wanted = requested.get(&product_id).copied().unwrap_or(0);
        match snapshot.get(&product_id) {
            None => unavailable.push(UnavailableItem {
                product_id,
                name: None,
                reason: UnavailableReason::NotFound,
            }),
            Some(product) if u64::from(product.stock) < wanted => unavailable.push(UnavailableItem {
                product_id,
                name: Some(product.name.clone()),
                reason: UnavailableReason::InsufficientStock { available: product.stock },
            }),
            Some(_) => {}
        }
    }
    if !unavailable.is_empty() {
        return Err(unavailable);
    }

    let mut lines = Vec::with_capacity(items.len());
    for item in items {
        let Some(product) = snapshot.get(&item.product_id) else { continue };
        lines.push(PlannedLine {
            product_id: item.product_id.clone(),
            product_name: product.name.clone(),
            quantity: item.quantity,
            unit_price: product.price,
        });
    }

    let total = lines.iter().map(PlannedLine::subtotal).sum();
    // Every wanted sum is bounded by a u32 stock value here.
    let decrements = requested
        .into_iter()
        .map(|(product_id, wanted)| (product_id, u32::try_from(wanted).unwrap_or(u32::MAX)))
        .collect();

    Ok(OrderPlan { items: lines, total, decrements })
}
