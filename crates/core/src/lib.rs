//! `ims-core`: shared building blocks for the inventory domain.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod error;
pub mod id;

pub use aggregate::{AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{
    AlertId, CategoryId, InventoryId, ProductId, PurchaseOrderId, PurchaseOrderItemId,
    SalesOrderId, UserId, WarehouseId,
};
