//! Purchasing domain module.
//!
//! Purchase orders and their PENDING -> APPROVED -> RECEIVED lifecycle,
//! implemented purely as deterministic domain logic (no IO, no HTTP, no storage).

pub mod order;

pub use order::{
    NewPurchaseOrder, NewPurchaseOrderItem, PurchaseOrder, PurchaseOrderItem,
    PurchaseOrderStatus, ReceiptLine, ReceivedItem,
};
