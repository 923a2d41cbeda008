//! Inventory ledger: every stock mutation for a (product, warehouse) row.
//!
//! Each operation is one unit of work against a single row: read, validate,
//! write with the version read (optimistic concurrency), retrying on a stale
//! write. After a successful write the registered [`StockObserver`] runs as a
//! post-commit hook; its failures are logged and recorded, never returned.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use ims_core::{AggregateRoot, DomainError, ExpectedVersion, InventoryId, ProductId, WarehouseId};
use ims_inventory::{Inventory, StockLevels};

use super::Stores;
use super::error::{ServiceError, ServiceResult, unique};
use crate::store::{RecordStore, StoreError};

/// Post-commit hook invoked after every successful ledger write.
pub trait StockObserver: Send + Sync {
    fn stock_changed(&self, product_id: ProductId, warehouse_id: WarehouseId) -> ServiceResult<()>;
}

/// A suppressed post-commit hook failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookFailure {
    pub operation: &'static str,
    pub inventory_id: InventoryId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub error: String,
    pub at: DateTime<Utc>,
}

pub struct InventoryLedger {
    stores: Stores,
    observer: Option<Arc<dyn StockObserver>>,
    max_attempts: u32,
    failure_capacity: usize,
    failures: Mutex<VecDeque<HookFailure>>,
}

impl InventoryLedger {
    pub fn new(stores: Stores, max_attempts: u32, failure_capacity: usize) -> Self {
        Self {
            stores,
            observer: None,
            max_attempts: max_attempts.max(1),
            failure_capacity,
            failures: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn StockObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Create the inventory row for a (product, warehouse) pair.
    pub fn create(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        initial_quantity: i64,
    ) -> ServiceResult<Inventory> {
        if self.stores.products.get(&product_id)?.is_none() {
            return Err(ServiceError::not_found("product", product_id));
        }
        if self.stores.warehouses.get(&warehouse_id)?.is_none() {
            return Err(ServiceError::not_found("warehouse", warehouse_id));
        }

        let row = Inventory::create(
            InventoryId::new(),
            product_id,
            warehouse_id,
            initial_quantity,
            Utc::now(),
        )?;
        let same_pair =
            |r: &Inventory| r.product_id() == product_id && r.warehouse_id() == warehouse_id;
        let saved = unique(self.stores.inventory.insert_unless(row, &same_pair), || {
            format!("inventory for product {product_id} already exists in warehouse {warehouse_id}")
        })?;

        info!(
            inventory_id = %saved.id_typed(),
            product_id = %product_id,
            warehouse_id = %warehouse_id,
            available = saved.available(),
            "inventory created"
        );
        self.after_commit("create", &saved);
        Ok(saved)
    }

    pub fn reserve(&self, inventory_id: InventoryId, quantity: i64) -> ServiceResult<Inventory> {
        self.mutate(inventory_id, "reserve", |row, now| row.reserve(quantity, now))
    }

    pub fn release(&self, inventory_id: InventoryId, quantity: i64) -> ServiceResult<Inventory> {
        self.mutate(inventory_id, "release", |row, now| row.release(quantity, now))
    }

    pub fn mark_damaged(&self, inventory_id: InventoryId, quantity: i64) -> ServiceResult<Inventory> {
        self.mutate(inventory_id, "mark_damaged", |row, now| {
            row.mark_damaged(quantity, now)
        })
    }

    /// Credit incoming goods to available stock.
    pub fn receive(&self, inventory_id: InventoryId, quantity: i64) -> ServiceResult<Inventory> {
        self.mutate(inventory_id, "receive", |row, now| row.receive(quantity, now))
    }

    /// Consume reserved stock that has left the warehouse.
    pub fn fulfill(&self, inventory_id: InventoryId, quantity: i64) -> ServiceResult<Inventory> {
        self.mutate(inventory_id, "fulfill", |row, now| row.fulfill(quantity, now))
    }

    /// Overwrite all three buckets; only negativity is rejected.
    pub fn set_stock(
        &self,
        inventory_id: InventoryId,
        available: i64,
        reserved: i64,
        damaged: i64,
    ) -> ServiceResult<Inventory> {
        let levels = StockLevels::new(available, reserved, damaged)?;
        self.mutate(inventory_id, "set_stock", |row, now| row.set_levels(levels, now))
    }

    pub fn delete(&self, inventory_id: InventoryId) -> ServiceResult<Inventory> {
        let removed = self
            .stores
            .inventory
            .delete(&inventory_id)?
            .ok_or_else(|| ServiceError::not_found("inventory", inventory_id))?;
        info!(inventory_id = %inventory_id, "inventory deleted");
        self.after_commit("delete", &removed);
        Ok(removed)
    }

    pub fn reserve_for(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: i64,
    ) -> ServiceResult<Inventory> {
        let row = self.require_pair(product_id, warehouse_id)?;
        self.reserve(row.id_typed(), quantity)
    }

    pub fn release_for(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: i64,
    ) -> ServiceResult<Inventory> {
        let row = self.require_pair(product_id, warehouse_id)?;
        self.release(row.id_typed(), quantity)
    }

    pub fn fulfill_for(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: i64,
    ) -> ServiceResult<Inventory> {
        let row = self.require_pair(product_id, warehouse_id)?;
        self.fulfill(row.id_typed(), quantity)
    }

    pub fn get(&self, inventory_id: InventoryId) -> ServiceResult<Inventory> {
        self.stores
            .inventory
            .get(&inventory_id)?
            .ok_or_else(|| ServiceError::not_found("inventory", inventory_id))
    }

    pub fn list(&self) -> ServiceResult<Vec<Inventory>> {
        Ok(self.stores.inventory.list()?)
    }

    pub fn by_product(&self, product_id: ProductId) -> ServiceResult<Vec<Inventory>> {
        Ok(self
            .stores
            .inventory
            .find(&|r| r.product_id() == product_id)?)
    }

    pub fn by_warehouse(&self, warehouse_id: WarehouseId) -> ServiceResult<Vec<Inventory>> {
        Ok(self
            .stores
            .inventory
            .find(&|r| r.warehouse_id() == warehouse_id)?)
    }

    pub fn by_pair(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> ServiceResult<Option<Inventory>> {
        let rows = self
            .stores
            .inventory
            .find(&|r| r.product_id() == product_id && r.warehouse_id() == warehouse_id)?;
        Ok(rows.into_iter().next())
    }

    pub fn require_pair(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> ServiceResult<Inventory> {
        self.by_pair(product_id, warehouse_id)?.ok_or_else(|| {
            ServiceError::NotFound(format!(
                "no inventory for product {product_id} in warehouse {warehouse_id}"
            ))
        })
    }

    /// Available quantity of a product across all warehouses.
    pub fn total_available(&self, product_id: ProductId) -> ServiceResult<i64> {
        Ok(self
            .by_product(product_id)?
            .iter()
            .map(Inventory::available)
            .sum())
    }

    /// Rows whose available quantity is at or below their product's threshold.
    pub fn low_stock(&self) -> ServiceResult<Vec<Inventory>> {
        let products = self.stores.products.list()?;
        let threshold = |p: ProductId| {
            products
                .iter()
                .find(|prod| prod.id_typed() == p)
                .map(|prod| prod.minimum_stock_threshold())
        };
        Ok(self.stores.inventory.find(&|r| {
            threshold(r.product_id()).is_some_and(|t| r.is_low_stock(t))
        })?)
    }

    /// Suppressed post-commit failures, oldest first.
    pub fn hook_failures(&self) -> Vec<HookFailure> {
        match self.failures.lock() {
            Ok(f) => f.iter().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    fn mutate<F>(&self, inventory_id: InventoryId, operation: &'static str, apply: F) -> ServiceResult<Inventory>
    where
        F: Fn(&mut Inventory, DateTime<Utc>) -> Result<(), DomainError>,
    {
        for attempt in 1..=self.max_attempts {
            let current = self.get(inventory_id)?;
            let version = current.version();
            let mut next = current;
            apply(&mut next, Utc::now())?;

            match self
                .stores
                .inventory
                .update(next, ExpectedVersion::Exact(version))
            {
                Ok(saved) => {
                    debug!(
                        operation,
                        inventory_id = %inventory_id,
                        available = saved.available(),
                        reserved = saved.reserved(),
                        damaged = saved.damaged(),
                        "inventory updated"
                    );
                    self.after_commit(operation, &saved);
                    return Ok(saved);
                }
                Err(StoreError::Conflict(msg)) => {
                    debug!(operation, inventory_id = %inventory_id, attempt, %msg, "stale inventory write; retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(operation, inventory_id = %inventory_id, attempts = self.max_attempts, "inventory write kept conflicting");
        Err(ServiceError::Conflict(format!(
            "inventory {inventory_id} changed concurrently {} times during {operation}",
            self.max_attempts
        )))
    }

    fn after_commit(&self, operation: &'static str, row: &Inventory) {
        let Some(observer) = &self.observer else {
            return;
        };
        if let Err(e) = observer.stock_changed(row.product_id(), row.warehouse_id()) {
            warn!(
                operation,
                inventory_id = %row.id_typed(),
                product_id = %row.product_id(),
                warehouse_id = %row.warehouse_id(),
                error = %e,
                "post-commit alert check failed"
            );
            self.record_failure(HookFailure {
                operation,
                inventory_id: row.id_typed(),
                product_id: row.product_id(),
                warehouse_id: row.warehouse_id(),
                error: e.to_string(),
                at: Utc::now(),
            });
        }
    }

    fn record_failure(&self, failure: HookFailure) {
        if self.failure_capacity == 0 {
            return;
        }
        if let Ok(mut failures) = self.failures.lock() {
            while failures.len() >= self.failure_capacity {
                failures.pop_front();
            }
            failures.push_back(failure);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use ims_core::WarehouseId;
    use ims_inventory::{NewWarehouse, Warehouse};
    use ims_products::{NewProduct, Product};

    struct CountingObserver {
        calls: AtomicUsize,
        fail: bool,
    }

    impl StockObserver for CountingObserver {
        fn stock_changed(&self, _: ProductId, _: WarehouseId) -> ServiceResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ServiceError::Internal("alert store offline".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn seed(stores: &Stores) -> (ProductId, WarehouseId) {
        let product = Product::create(
            ProductId::new(),
            NewProduct {
                name: "Bolt".to_string(),
                sku: "BOLT-1".to_string(),
                unit_price: 25,
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap();
        let warehouse = Warehouse::create(
            WarehouseId::new(),
            NewWarehouse {
                name: "Main".to_string(),
                location: "Dock 1".to_string(),
                contact_details: None,
            },
        )
        .unwrap();
        let p = stores.products.insert(product).unwrap();
        let w = stores.warehouses.insert(warehouse).unwrap();
        (p.id_typed(), w.id)
    }

    fn test_ledger(fail: bool) -> (InventoryLedger, Arc<CountingObserver>, ProductId, WarehouseId) {
        let stores = Stores::in_memory();
        let (p, w) = seed(&stores);
        let observer = Arc::new(CountingObserver {
            calls: AtomicUsize::new(0),
            fail,
        });
        let ledger = InventoryLedger::new(stores, 3, 2).with_observer(observer.clone());
        (ledger, observer, p, w)
    }

    #[test]
    fn create_requires_existing_product_and_warehouse() {
        let (ledger, _, p, w) = test_ledger(false);
        assert!(matches!(
            ledger.create(ProductId::new(), w, 5),
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            ledger.create(p, WarehouseId::new(), 5),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[test]
    fn duplicate_pair_is_rejected() {
        let (ledger, _, p, w) = test_ledger(false);
        ledger.create(p, w, 5).unwrap();
        match ledger.create(p, w, 7) {
            Err(ServiceError::AlreadyExists(msg)) if msg.contains("already exists") => {}
            other => panic!("Expected AlreadyExists, got {other:?}"),
        }
    }

    #[test]
    fn reserve_and_release_round_trip() {
        let (ledger, observer, p, w) = test_ledger(false);
        let row = ledger.create(p, w, 20).unwrap();

        let reserved = ledger.reserve(row.id_typed(), 8).unwrap();
        assert_eq!((reserved.available(), reserved.reserved()), (12, 8));
        let released = ledger.release(row.id_typed(), 8).unwrap();
        assert_eq!((released.available(), released.reserved()), (20, 0));
        assert_eq!(observer.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn failed_validation_does_not_write_or_notify() {
        let (ledger, observer, p, w) = test_ledger(false);
        let row = ledger.create(p, w, 3).unwrap();
        assert!(matches!(
            ledger.reserve(row.id_typed(), 4),
            Err(ServiceError::InsufficientStock(_))
        ));
        assert!(matches!(
            ledger.set_stock(row.id_typed(), -1, 0, 0),
            Err(ServiceError::InvalidArgument(_))
        ));
        let after = ledger.get(row.id_typed()).unwrap();
        assert_eq!(after.available(), 3);
        assert_eq!(after.version(), 1);
        assert_eq!(observer.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn hook_failures_are_suppressed_and_recorded() {
        let (ledger, _, p, w) = test_ledger(true);
        let row = ledger.create(p, w, 10).unwrap();
        ledger.mark_damaged(row.id_typed(), 2).unwrap();
        ledger.receive(row.id_typed(), 5).unwrap();

        let current = ledger.get(row.id_typed()).unwrap();
        assert_eq!(current.available(), 13);
        assert_eq!(current.damaged(), 2);

        // Capacity is 2: the oldest entry was evicted.
        let failures = ledger.hook_failures();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].operation, "mark_damaged");
        assert_eq!(failures[1].operation, "receive");
        assert!(failures[1].error.contains("alert store offline"));
    }

    #[test]
    fn set_stock_overwrites_buckets() {
        let (ledger, _, p, w) = test_ledger(false);
        let row = ledger.create(p, w, 10).unwrap();
        ledger.reserve(row.id_typed(), 4).unwrap();
        let set = ledger.set_stock(row.id_typed(), 2, 0, 1).unwrap();
        assert_eq!(set.levels(), StockLevels::new(2, 0, 1).unwrap());
    }

    #[test]
    fn pair_helpers_and_queries() {
        let (ledger, _, p, w) = test_ledger(false);
        ledger.create(p, w, 10).unwrap();
        ledger.reserve_for(p, w, 4).unwrap();
        ledger.fulfill_for(p, w, 3).unwrap();
        ledger.release_for(p, w, 1).unwrap();

        let row = ledger.require_pair(p, w).unwrap();
        assert_eq!(row.levels(), StockLevels::new(7, 0, 0).unwrap());
        assert_eq!(ledger.total_available(p).unwrap(), 7);
        assert_eq!(ledger.by_warehouse(w).unwrap().len(), 1);
        assert!(ledger.low_stock().unwrap().len() == 1);
        assert!(matches!(
            ledger.reserve_for(p, WarehouseId::new(), 1),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[test]
    fn concurrent_reservations_never_oversell() {
        let (ledger, _, p, w) = test_ledger(false);
        let ledger = Arc::new(InventoryLedger {
            max_attempts: 1_000,
            ..ledger
        });
        let row = ledger.create(p, w, 50).unwrap();
        let id = row.id_typed();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = ledger.clone();
                std::thread::spawn(move || {
                    (0..10)
                        .filter(|_| ledger.reserve(id, 1).is_ok())
                        .count()
                })
            })
            .collect();
        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        let after = ledger.get(id).unwrap();
        assert_eq!(granted, 50);
        assert_eq!(after.available(), 0);
        assert_eq!(after.reserved(), 50);
    }
}
