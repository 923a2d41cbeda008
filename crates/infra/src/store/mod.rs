//! Record storage abstractions.
//!
//! Stores hold whole records keyed by id and enforce optimistic concurrency
//! through each record's version. Uniqueness rules are checked atomically
//! with the write via [`RecordStore::insert_unless`] / [`RecordStore::update_unless`].

pub mod record_store;

pub use record_store::{InMemoryRecordStore, RecordStore, StoreError};
