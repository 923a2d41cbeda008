use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ims_core::error::{ensure_non_negative, ensure_not_blank};
use ims_core::{AggregateRoot, CategoryId, DomainResult, ProductId};

/// Threshold applied when a product is created without one.
pub const DEFAULT_MINIMUM_STOCK_THRESHOLD: i64 = 10;

/// Canonical form used for SKU uniqueness checks.
pub fn normalize_sku(sku: &str) -> String {
    sku.trim().to_ascii_uppercase()
}

/// Input for creating a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub sku: String,
    pub category_id: Option<CategoryId>,
    pub brand: Option<String>,
    pub model: Option<String>,
    /// Price in smallest currency unit (cents).
    pub unit_price: u64,
    pub cost_price: Option<u64>,
    pub minimum_stock_threshold: Option<i64>,
    #[serde(default)]
    pub specifications: BTreeMap<String, String>,
}

/// Partial update. The SKU is fixed at creation and cannot be changed here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<Option<CategoryId>>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub unit_price: Option<u64>,
    pub cost_price: Option<u64>,
    pub minimum_stock_threshold: Option<i64>,
    pub specifications: Option<BTreeMap<String, String>>,
}

/// Aggregate root: Product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    name: String,
    description: Option<String>,
    sku: String,
    category_id: Option<CategoryId>,
    brand: Option<String>,
    model: Option<String>,
    unit_price: u64,
    cost_price: Option<u64>,
    minimum_stock_threshold: i64,
    specifications: BTreeMap<String, String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
}

impl Product {
    pub fn create(id: ProductId, input: NewProduct, now: DateTime<Utc>) -> DomainResult<Self> {
        ensure_not_blank("name", &input.name)?;
        ensure_not_blank("sku", &input.sku)?;
        let threshold = input
            .minimum_stock_threshold
            .unwrap_or(DEFAULT_MINIMUM_STOCK_THRESHOLD);
        ensure_non_negative("minimum_stock_threshold", threshold)?;

        Ok(Self {
            id,
            name: input.name.trim().to_string(),
            description: input.description,
            sku: input.sku.trim().to_string(),
            category_id: input.category_id,
            brand: input.brand,
            model: input.model,
            unit_price: input.unit_price,
            cost_price: input.cost_price,
            minimum_stock_threshold: threshold,
            specifications: input.specifications,
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    /// Apply a partial update; validation happens before any field changes.
    pub fn apply_update(&mut self, update: ProductUpdate, now: DateTime<Utc>) -> DomainResult<()> {
        if let Some(name) = &update.name {
            ensure_not_blank("name", name)?;
        }
        if let Some(threshold) = update.minimum_stock_threshold {
            ensure_non_negative("minimum_stock_threshold", threshold)?;
        }

        if let Some(name) = update.name {
            self.name = name.trim().to_string();
        }
        if let Some(description) = update.description {
            self.description = Some(description);
        }
        if let Some(category_id) = update.category_id {
            self.category_id = category_id;
        }
        if let Some(brand) = update.brand {
            self.brand = Some(brand);
        }
        if let Some(model) = update.model {
            self.model = Some(model);
        }
        if let Some(price) = update.unit_price {
            self.unit_price = price;
        }
        if let Some(cost) = update.cost_price {
            self.cost_price = Some(cost);
        }
        if let Some(threshold) = update.minimum_stock_threshold {
            self.minimum_stock_threshold = threshold;
        }
        if let Some(specs) = update.specifications {
            self.specifications = specs;
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn category_id(&self) -> Option<CategoryId> {
        self.category_id
    }

    pub fn brand(&self) -> Option<&str> {
        self.brand.as_deref()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn unit_price(&self) -> u64 {
        self.unit_price
    }

    pub fn cost_price(&self) -> Option<u64> {
        self.cost_price
    }

    pub fn minimum_stock_threshold(&self) -> i64 {
        self.minimum_stock_threshold
    }

    pub fn specifications(&self) -> &BTreeMap<String, String> {
        &self.specifications
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Case-insensitive match against name, description and model.
    pub fn matches_search(&self, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        let hit = |s: &str| s.to_lowercase().contains(&needle);
        hit(&self.name)
            || self.description.as_deref().is_some_and(hit)
            || self.model.as_deref().is_some_and(hit)
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ims_core::DomainError;

    fn test_input() -> NewProduct {
        NewProduct {
            name: "Cordless Drill".to_string(),
            sku: " drl-100 ".to_string(),
            model: Some("X200".to_string()),
            unit_price: 12_999,
            ..Default::default()
        }
    }

    #[test]
    fn create_applies_default_threshold() {
        let product = Product::create(ProductId::new(), test_input(), Utc::now()).unwrap();
        assert_eq!(product.minimum_stock_threshold(), DEFAULT_MINIMUM_STOCK_THRESHOLD);
        assert_eq!(product.sku(), "drl-100");
        assert_eq!(product.version(), 0);
    }

    #[test]
    fn create_rejects_blank_sku() {
        let input = NewProduct {
            sku: "  ".to_string(),
            ..test_input()
        };
        let err = Product::create(ProductId::new(), input, Utc::now()).unwrap_err();
        match err {
            DomainError::InvalidArgument(msg) if msg.contains("sku") => {}
            _ => panic!("Expected InvalidArgument for blank SKU"),
        }
    }

    #[test]
    fn create_rejects_negative_threshold() {
        let input = NewProduct {
            minimum_stock_threshold: Some(-1),
            ..test_input()
        };
        assert!(matches!(
            Product::create(ProductId::new(), input, Utc::now()),
            Err(DomainError::InvalidArgument(_))
        ));
    }

    #[test]
    fn update_leaves_sku_untouched_and_is_all_or_nothing() {
        let mut product = Product::create(ProductId::new(), test_input(), Utc::now()).unwrap();
        let before = product.clone();

        let bad = ProductUpdate {
            unit_price: Some(1),
            minimum_stock_threshold: Some(-5),
            ..Default::default()
        };
        assert!(product.apply_update(bad, Utc::now()).is_err());
        assert_eq!(product, before);

        let good = ProductUpdate {
            name: Some("Hammer Drill".to_string()),
            minimum_stock_threshold: Some(25),
            ..Default::default()
        };
        product.apply_update(good, Utc::now()).unwrap();
        assert_eq!(product.name(), "Hammer Drill");
        assert_eq!(product.minimum_stock_threshold(), 25);
        assert_eq!(product.sku(), before.sku());
    }

    #[test]
    fn search_matches_name_description_and_model() {
        let product = Product::create(ProductId::new(), test_input(), Utc::now()).unwrap();
        assert!(product.matches_search("drill"));
        assert!(product.matches_search("x2"));
        assert!(!product.matches_search("saw"));
    }

    #[test]
    fn sku_normalization_is_case_insensitive() {
        assert_eq!(normalize_sku(" abc-1 "), normalize_sku("ABC-1"));
    }
}
