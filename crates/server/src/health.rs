//! Readiness report for the order desk.
//!
//! The service is `unavailable` (503) when the database cannot be reached or
//! embedded migrations are still pending. An empty or sold-out catalog keeps
//! the webhook usable but is reported as `degraded`: the agent can chat but
//! cannot sell anything.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use orderdesk_db::{migrations::pending_versions, ping, CatalogRepository, DbPool};
use serde::Serialize;
use tracing::warn;

#[derive(Clone)]
pub struct HealthState {
    pub db_pool: DbPool,
    pub catalog: Arc<dyn CatalogRepository>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    Degraded,
    Unavailable,
    Skipped,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SchemaCheck {
    pub status: Readiness,
    pub pending_migrations: Vec<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CatalogCheck {
    pub status: Readiness,
    pub products: usize,
    pub in_stock: usize,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: Readiness,
    pub database: Readiness,
    pub schema: SchemaCheck,
    pub catalog: CatalogCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let payload = readiness(&state).await;
    if payload.status != Readiness::Ready {
        warn!(
            event_name = "system.health.not_ready",
            status = ?payload.status,
            pending_migrations = payload.schema.pending_migrations.len(),
            products = payload.catalog.products,
            "readiness check did not pass"
        );
    }

    let status_code = match payload.status {
        Readiness::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (status_code, Json(payload))
}

async fn readiness(state: &HealthState) -> HealthResponse {
    let checked_at = Utc::now().to_rfc3339();

    if ping(&state.db_pool).await.is_err() {
        return HealthResponse {
            status: Readiness::Unavailable,
            database: Readiness::Unavailable,
            schema: SchemaCheck { status: Readiness::Skipped, pending_migrations: Vec::new() },
            catalog: skipped_catalog("database is unreachable"),
            checked_at,
        };
    }

    let schema = match pending_versions(&state.db_pool).await {
        Ok(pending) if pending.is_empty() => {
            SchemaCheck { status: Readiness::Ready, pending_migrations: pending }
        }
        Ok(pending) => SchemaCheck { status: Readiness::Unavailable, pending_migrations: pending },
        Err(_) => SchemaCheck { status: Readiness::Unavailable, pending_migrations: Vec::new() },
    };
    if schema.status != Readiness::Ready {
        return HealthResponse {
            status: Readiness::Unavailable,
            database: Readiness::Ready,
            schema,
            catalog: skipped_catalog("schema is not migrated (run `orderdesk migrate`)"),
            checked_at,
        };
    }

    let catalog = catalog_check(state.catalog.as_ref()).await;
    let status = match catalog.status {
        Readiness::Ready => Readiness::Ready,
        Readiness::Unavailable => Readiness::Unavailable,
        _ => Readiness::Degraded,
    };

    HealthResponse { status, database: Readiness::Ready, schema, catalog, checked_at }
}

async fn catalog_check(catalog: &dyn CatalogRepository) -> CatalogCheck {
    let products = match catalog.list_products().await {
        Ok(products) => products,
        Err(error) => {
            return CatalogCheck {
                status: Readiness::Unavailable,
                products: 0,
                in_stock: 0,
                detail: format!("catalog query failed: {error}"),
            };
        }
    };

    let in_stock = products.iter().filter(|product| product.stock > 0).count();
    let (status, detail) = match (products.len(), in_stock) {
        (0, _) => (
            Readiness::Degraded,
            "catalog is empty (run `orderdesk seed` to load the demo catalog)".to_string(),
        ),
        (_, 0) => (Readiness::Degraded, "every product is out of stock".to_string()),
        (total, available) => {
            (Readiness::Ready, format!("{available} of {total} products can be ordered"))
        }
    };

    CatalogCheck { status, products: products.len(), in_stock, detail }
}

fn skipped_catalog(reason: &str) -> CatalogCheck {
    CatalogCheck { status: Readiness::Skipped, products: 0, in_stock: 0, detail: reason.to_string() }
}
