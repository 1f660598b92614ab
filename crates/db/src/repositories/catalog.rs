use std::str::FromStr;

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use orderdesk_core::domain::product::{Product, ProductId};

use super::{validate_product, CatalogRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCatalogRepository {
    pool: DbPool,
}

impl SqlCatalogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn product_from_row(row: &SqliteRow) -> Result<Product, RepositoryError> {
    let id: String = row.try_get("id").map_err(RepositoryError::decode)?;
    let name: String = row.try_get("name").map_err(RepositoryError::decode)?;
    let description: String = row.try_get("description").map_err(RepositoryError::decode)?;
    let price: String = row.try_get("price").map_err(RepositoryError::decode)?;
    let stock: i64 = row.try_get("stock").map_err(RepositoryError::decode)?;

    Ok(Product {
        id: ProductId(id),
        name,
        description,
        price: parse_decimal("product.price", &price)?,
        stock: u32::try_from(stock)
            .map_err(|_| RepositoryError::Decode(format!("product.stock out of range: {stock}")))?,
    })
}

pub(crate) fn parse_decimal(column: &str, raw: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(raw)
        .map_err(|error| RepositoryError::Decode(format!("{column} `{raw}` is not a decimal: {error}")))
}

#[async_trait::async_trait]
impl CatalogRepository for SqlCatalogRepository {
    async fn list_products(&self) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, description, price, stock FROM product ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(product_from_row).collect()
    }

    async fn find_product(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query("SELECT id, name, description, price, stock FROM product WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(product_from_row).transpose()
    }

    async fn search_products(&self, query: &str) -> Result<Vec<Product>, RepositoryError> {
        // SQLite's lower() is ASCII-only, so filtering happens on decoded rows.
        let products = self.list_products().await?;
        Ok(products.into_iter().filter(|product| product.matches_query(query)).collect())
    }

    async fn save_product(&self, product: Product) -> Result<(), RepositoryError> {
        validate_product(&product)?;
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO product (id, name, description, price, stock, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 description = excluded.description,
                 price = excluded.price,
                 stock = excluded.stock,
                 updated_at = excluded.updated_at",
        )
        .bind(&product.id.0)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.to_string())
        .bind(i64::from(product.stock))
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use orderdesk_core::domain::product::{Product, ProductId};

    use super::SqlCatalogRepository;
    use crate::repositories::{CatalogRepository, RepositoryError};
    use crate::{connect_with_settings, migrations, DbPool};

    type TestResult<T = ()> = Result<T, String>;

    async fn setup_pool() -> TestResult<DbPool> {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .map_err(|error| format!("connect test pool: {error}"))?;
        migrations::run_pending(&pool).await.map_err(|error| format!("run migrations: {error}"))?;
        Ok(pool)
    }

    fn product(id: &str, name: &str, description: &str, cents: i64, stock: u32) -> Product {
        Product {
            id: ProductId(id.to_string()),
            name: name.to_string(),
            description: description.to_string(),
            price: Decimal::new(cents, 2),
            stock,
        }
    }

    #[tokio::test]
    async fn saved_products_round_trip_with_exact_prices() -> TestResult {
        let pool = setup_pool().await?;
        let repo = SqlCatalogRepository::new(pool.clone());
        let arroz = product("p-arroz", "Arroz Integral", "Pacote 1kg", 899, 12);

        repo.save_product(arroz.clone()).await.map_err(|error| error.to_string())?;
        let found = repo
            .find_product(&arroz.id)
            .await
            .map_err(|error| error.to_string())?
            .ok_or_else(|| "saved product should be found".to_string())?;

        if found != arroz {
            return Err(format!("round trip mismatch: {found:?}"));
        }
        let missing = repo
            .find_product(&ProductId("p-ghost".to_string()))
            .await
            .map_err(|error| error.to_string())?;
        if missing.is_some() {
            return Err("unknown id should not resolve".to_string());
        }

        pool.close().await;
        Ok(())
    }

    #[tokio::test]
    async fn search_matches_name_or_description_ignoring_case() -> TestResult {
        let pool = setup_pool().await?;
        let repo = SqlCatalogRepository::new(pool.clone());
        for item in [
            product("p-arroz", "Arroz Integral", "Pacote 1kg", 899, 12),
            product("p-feijao", "Feijao Preto", "Selecionado, pacote 1kg", 749, 3),
            product("p-oleo", "Oleo de Soja", "Garrafa 900ml", 679, 0),
        ] {
            repo.save_product(item).await.map_err(|error| error.to_string())?;
        }

        let by_description = repo.search_products("PACOTE").await.map_err(|e| e.to_string())?;
        let ids = by_description.iter().map(|p| p.id.0.as_str()).collect::<Vec<_>>();
        if ids != vec!["p-arroz", "p-feijao"] {
            return Err(format!("unexpected search result: {ids:?}"));
        }

        let everything = repo.search_products("").await.map_err(|e| e.to_string())?;
        if everything.len() != 3 {
            return Err("empty query should list the whole catalog".to_string());
        }

        pool.close().await;
        Ok(())
    }

    #[tokio::test]
    async fn negative_prices_are_rejected_before_writing() -> TestResult {
        let pool = setup_pool().await?;
        let repo = SqlCatalogRepository::new(pool.clone());

        let result = repo.save_product(product("p-oleo", "Oleo de Soja", "900ml", -1, 4)).await;
        let rejected = matches!(
            result,
            Err(RepositoryError::Validation(ref message)) if message.contains("p-oleo")
        );
        if !rejected {
            return Err(format!("negative price should fail validation: {result:?}"));
        }
        let stored = repo.list_products().await.map_err(|error| error.to_string())?;
        if !stored.is_empty() {
            return Err(format!("nothing should be written: {stored:?}"));
        }

        repo.save_product(product("p-brinde", "Brinde", "", 0, 1))
            .await
            .map_err(|error| format!("free products are allowed: {error}"))?;

        pool.close().await;
        Ok(())
    }
}
