use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Expected rows of the demo catalog, kept in step with the SQL fixture.
const DEMO_PRODUCTS: &[DemoProductContract] = &[
    DemoProductContract { id: "prod-arroz-integral", name: "Arroz Integral", price: "8.99", stock: 120 },
    DemoProductContract { id: "prod-feijao-preto", name: "Feijao Preto", price: "7.49", stock: 80 },
    DemoProductContract { id: "prod-oleo-soja", name: "Oleo de Soja", price: "6.79", stock: 60 },
    DemoProductContract { id: "prod-cafe-torrado", name: "Cafe Torrado", price: "18.90", stock: 45 },
    DemoProductContract { id: "prod-acucar-cristal", name: "Acucar Cristal", price: "5.35", stock: 90 },
    DemoProductContract { id: "prod-leite-integral", name: "Leite Integral", price: "4.99", stock: 200 },
    DemoProductContract {
        id: "prod-macarrao-espaguete",
        name: "Macarrao Espaguete",
        price: "4.29",
        stock: 0,
    },
];

#[derive(Debug, Clone, Copy)]
struct DemoProductContract {
    id: &'static str,
    name: &'static str,
    price: &'static str,
    stock: i64,
}

/// Deterministic grocery catalog for local runs and end-to-end checks.
pub struct DemoCatalog;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedResult {
    pub products_seeded: Vec<&'static str>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

impl DemoCatalog {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_catalog.sql");

    /// Inserts missing demo products. Existing rows, including their current
    /// stock, are left untouched.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult { products_seeded: DEMO_PRODUCTS.iter().map(|product| product.id).collect() })
    }

    /// Checks each demo product exists with its contracted name and price.
    /// Stock is only checked for being non-negative since orders move it.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::with_capacity(DEMO_PRODUCTS.len());

        for expected in DEMO_PRODUCTS {
            let row = sqlx::query_as::<_, (String, String, i64)>(
                "SELECT name, price, stock FROM product WHERE id = ?",
            )
            .bind(expected.id)
            .fetch_optional(pool)
            .await?;

            let matches = match row {
                Some((name, price, stock)) => {
                    name == expected.name && same_price(&price, expected.price)? && stock >= 0
                }
                None => false,
            };
            checks.push((expected.id, matches));
        }

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes demo products that no order references.
    pub async fn clean(pool: &DbPool) -> Result<u64, RepositoryError> {
        let mut removed = 0;
        let mut tx = pool.begin().await?;
        for product in DEMO_PRODUCTS {
            removed += sqlx::query(
                "DELETE FROM product WHERE id = ?
                 AND NOT EXISTS (SELECT 1 FROM order_item WHERE product_id = product.id)",
            )
            .bind(product.id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }
        tx.commit().await?;
        Ok(removed)
    }

    pub fn expected_stock(product_id: &str) -> Option<i64> {
        DEMO_PRODUCTS.iter().find(|product| product.id == product_id).map(|product| product.stock)
    }
}

fn same_price(stored: &str, expected: &str) -> Result<bool, RepositoryError> {
    let stored = Decimal::from_str(stored).map_err(RepositoryError::decode)?;
    let expected = Decimal::from_str(expected).map_err(RepositoryError::decode)?;
    Ok(stored == expected)
}

#[cfg(test)]
mod tests {
    use super::DemoCatalog;
    use crate::repositories::{CatalogRepository, SqlCatalogRepository};
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        pool
    }

    #[tokio::test]
    async fn load_is_idempotent_and_verifies() {
        let pool = setup_pool().await;

        let first = DemoCatalog::load(&pool).await.expect("first load");
        DemoCatalog::load(&pool).await.expect("second load");
        let verification = DemoCatalog::verify(&pool).await.expect("verify");

        assert_eq!(first.products_seeded.len(), 7);
        assert!(verification.all_present, "checks: {:?}", verification.checks);

        let products = SqlCatalogRepository::new(pool.clone()).list_products().await.expect("list");
        assert_eq!(products.len(), 7);
        let out_of_stock = products.iter().filter(|product| product.stock == 0).count();
        assert_eq!(out_of_stock, 1);
    }

    #[tokio::test]
    async fn verify_reports_missing_products() {
        let pool = setup_pool().await;

        let verification = DemoCatalog::verify(&pool).await.expect("verify");
        assert!(!verification.all_present);
        assert!(verification.checks.iter().all(|(_, ok)| !ok));
    }

    #[tokio::test]
    async fn clean_removes_unreferenced_demo_rows() {
        let pool = setup_pool().await;
        DemoCatalog::load(&pool).await.expect("load");

        let removed = DemoCatalog::clean(&pool).await.expect("clean");
        assert_eq!(removed, 7);
        assert_eq!(DemoCatalog::expected_stock("prod-cafe-torrado"), Some(45));
    }
}
