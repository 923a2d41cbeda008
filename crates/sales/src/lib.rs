//! Sales domain module.
//!
//! Customer orders and their status machine, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage).

pub mod order;

pub use order::{
    NewSalesOrder, NewSalesOrderItem, SalesOrder, SalesOrderItem, SalesOrderStatus, StockEffect,
};
