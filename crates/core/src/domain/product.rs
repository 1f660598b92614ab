use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub String);

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub stock: u32,
}

impl Product {
    pub fn has_stock_for(&self, quantity: u32) -> bool {
        self.stock >= quantity
    }

    /// Case-insensitive substring match over name and description.
    pub fn matches_query(&self, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        self.name.to_lowercase().contains(&needle)
            || self.description.to_lowercase().contains(&needle)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{Product, ProductId};

    fn product() -> Product {
        Product {
            id: ProductId("p-arroz".to_string()),
            name: "Arroz Integral".to_string(),
            description: "Pacote de 1kg de arroz integral tipo 1".to_string(),
            price: Decimal::new(899, 2),
            stock: 4,
        }
    }

    #[test]
    fn query_matches_name_and_description_case_insensitively() {
        let product = product();
        assert!(product.matches_query("ARROZ"));
        assert!(product.matches_query("tipo 1"));
        assert!(!product.matches_query("feijao"));
    }

    #[test]
    fn stock_check_is_inclusive() {
        let product = product();
        assert!(product.has_stock_for(4));
        assert!(!product.has_stock_for(5));
    }
}
