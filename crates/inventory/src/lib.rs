//! Inventory domain module.
//!
//! Warehouses and the per (product, warehouse) stock record with its three
//! quantity buckets. Pure domain logic (no IO, no HTTP, no storage).

pub mod stock;
pub mod warehouse;

pub use stock::{Inventory, StockLevels, StockStatus};
pub use warehouse::{NewWarehouse, Warehouse, WarehouseUpdate};
