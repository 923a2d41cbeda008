//! Low-stock alert domain module.
//!
//! The alert record with its status machine, and the reorder sizing rules used
//! when an alert is raised. Pure domain logic (no IO, no HTTP, no storage).

pub mod alert;
pub mod reorder;

pub use alert::{Alert, AlertStatus, RaiseAlert};
pub use reorder::{ReorderPolicy, ReorderSuggestion};
