use orderdesk_core::domain::product::Product;
use orderdesk_db::{CatalogRepository, SqlCatalogRepository};

use crate::commands::{connect_and_migrate, prepare, CommandResult, EXIT_DB_CONNECTIVITY};

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("catalog") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connect_and_migrate(&config).await?;
        let products = SqlCatalogRepository::new(pool.clone())
            .list_products()
            .await
            .map_err(|error| ("catalog_query", error.to_string(), EXIT_DB_CONNECTIVITY));
        pool.close().await;
        products
    });

    match result {
        Ok(products) => CommandResult::success("catalog", render_listing(&products)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("catalog", error_class, message, exit_code)
        }
    }
}

fn render_listing(products: &[Product]) -> String {
    if products.is_empty() {
        return "catalog is empty (run `orderdesk seed` to load the demo catalog)".to_string();
    }

    let mut lines = vec![format!("{} products:", products.len())];
    lines.extend(products.iter().map(|product| {
        let availability = match product.stock {
            0 => "out of stock".to_string(),
            stock => format!("stock {stock}"),
        };
        format!("  - {}: {} R$ {} ({availability})", product.id.0, product.name, product.price)
    }));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use orderdesk_core::domain::product::{Product, ProductId};
    use rust_decimal::Decimal;

    use super::render_listing;

    #[test]
    fn listing_marks_out_of_stock_products() {
        let products = vec![
            Product {
                id: ProductId("prod-cafe-torrado".to_string()),
                name: "Cafe Torrado".to_string(),
                description: "Pacote de 500g".to_string(),
                price: Decimal::new(1890, 2),
                stock: 45,
            },
            Product {
                id: ProductId("prod-macarrao-espaguete".to_string()),
                name: "Macarrao Espaguete".to_string(),
                description: "Pacote de 500g".to_string(),
                price: Decimal::new(429, 2),
                stock: 0,
            },
        ];

        assert_eq!(
            render_listing(&products),
            "2 products:\n  - prod-cafe-torrado: Cafe Torrado R$ 18.90 (stock 45)\n  - prod-macarrao-espaguete: Macarrao Espaguete R$ 4.29 (out of stock)"
        );
    }

    #[test]
    fn empty_catalog_points_to_seed() {
        assert!(render_listing(&[]).contains("orderdesk seed"));
    }
}
