//! Catalog domain module.
//!
//! Business rules for products and categories, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage).

pub mod category;
pub mod product;

pub use category::{Category, CategoryUpdate, NewCategory};
pub use product::{
    DEFAULT_MINIMUM_STOCK_THRESHOLD, NewProduct, Product, ProductUpdate, normalize_sku,
};
