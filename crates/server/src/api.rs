//! Read-only catalog and order listings.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use orderdesk_core::domain::order::{Order, OrderId};
use orderdesk_core::domain::product::{Product, ProductId};
use orderdesk_core::errors::{ApplicationError, InterfaceError};
use orderdesk_db::{CatalogRepository, OrderRepository, RepositoryError};

#[derive(Clone)]
pub struct ApiState {
    pub catalog: Arc<dyn CatalogRepository>,
    pub orders: Arc<dyn OrderRepository>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ProductQuery {
    pub q: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct OrderQuery {
    pub customer_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiErrorBody {
    pub error: String,
    pub message: String,
    pub correlation_id: String,
}

#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        Self(error.into_interface(uuid::Uuid::new_v4().to_string()))
    }
}

impl From<RepositoryError> for ApiError {
    fn from(error: RepositoryError) -> Self {
        ApplicationError::from(error).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self.0 {
            InterfaceError::BadRequest { .. } => (StatusCode::BAD_REQUEST, "bad_request"),
            InterfaceError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            InterfaceError::ServiceUnavailable { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
            }
            InterfaceError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if status.is_server_error() {
            warn!(
                event_name = "api.request.failed",
                correlation_id = %self.0.correlation_id(),
                error = %self.0,
                "api request failed"
            );
        }

        let body = ApiErrorBody {
            error: kind.to_string(),
            message: self.0.user_message().to_string(),
            correlation_id: self.0.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/products", get(list_products))
        .route("/api/v1/products/{id}", get(get_product))
        .route("/api/v1/orders", get(list_orders))
        .route("/api/v1/orders/{id}", get(get_order))
        .with_state(state)
}

async fn list_products(
    State(state): State<ApiState>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let products = match query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        Some(q) => state.catalog.search_products(q).await?,
        None => state.catalog.list_products().await?,
    };
    Ok(Json(products))
}

async fn get_product(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    let product = state
        .catalog
        .find_product(&ProductId(id.clone()))
        .await?
        .ok_or_else(|| ApplicationError::not_found("product", id))?;
    Ok(Json(product))
}

async fn list_orders(
    State(state): State<ApiState>,
    Query(query): Query<OrderQuery>,
) -> Result<Json<Vec<Order>>, ApiError> {
    let orders = match query.customer_id.as_deref().filter(|id| !id.is_empty()) {
        Some(customer_id) => state.orders.list_orders_for_customer(customer_id).await?,
        None => state.orders.list_orders().await?,
    };
    Ok(Json(orders))
}

async fn get_order(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order = state
        .orders
        .find_order(&OrderId(id.clone()))
        .await?
        .ok_or_else(|| ApplicationError::not_found("order", id))?;
    Ok(Json(order))
}
