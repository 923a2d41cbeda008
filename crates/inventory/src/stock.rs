use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ims_core::error::ensure_non_negative;
use ims_core::{AggregateRoot, DomainError, DomainResult, InventoryId, ProductId, WarehouseId};

/// The three mutually exclusive stock buckets of an inventory row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StockLevels {
    pub available: i64,
    pub reserved: i64,
    pub damaged: i64,
}

impl StockLevels {
    pub fn new(available: i64, reserved: i64, damaged: i64) -> DomainResult<Self> {
        ensure_non_negative("available", available)?;
        ensure_non_negative("reserved", reserved)?;
        ensure_non_negative("damaged", damaged)?;
        available
            .checked_add(reserved)
            .and_then(|t| t.checked_add(damaged))
            .ok_or_else(|| DomainError::invalid_argument("total stock quantity out of range"))?;
        Ok(Self {
            available,
            reserved,
            damaged,
        })
    }

    pub fn total(&self) -> i64 {
        self.available
            .saturating_add(self.reserved)
            .saturating_add(self.damaged)
    }
}

/// Roll-up classification of a product's available stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    InStock,
    LowStock,
    OutOfStock,
}

impl StockStatus {
    pub fn classify(available: i64, threshold: i64) -> Self {
        if available <= 0 {
            StockStatus::OutOfStock
        } else if available <= threshold {
            StockStatus::LowStock
        } else {
            StockStatus::InStock
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StockStatus::InStock => "In Stock",
            StockStatus::LowStock => "Low Stock",
            StockStatus::OutOfStock => "Out of Stock",
        }
    }
}

/// Aggregate root: Inventory, one per (product, warehouse) pair.
///
/// # Invariants
/// - `available`, `reserved` and `damaged` are never negative.
/// - `last_updated` moves on every successful mutation.
/// - A failed mutation leaves the record untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    id: InventoryId,
    product_id: ProductId,
    warehouse_id: WarehouseId,
    levels: StockLevels,
    last_updated: DateTime<Utc>,
    version: u64,
}

impl Inventory {
    pub fn create(
        id: InventoryId,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        initial_quantity: i64,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        ensure_non_negative("initial quantity", initial_quantity)?;
        Ok(Self {
            id,
            product_id,
            warehouse_id,
            levels: StockLevels {
                available: initial_quantity,
                reserved: 0,
                damaged: 0,
            },
            last_updated: now,
            version: 0,
        })
    }

    pub fn id_typed(&self) -> InventoryId {
        self.id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn warehouse_id(&self) -> WarehouseId {
        self.warehouse_id
    }

    pub fn levels(&self) -> StockLevels {
        self.levels
    }

    pub fn available(&self) -> i64 {
        self.levels.available
    }

    pub fn reserved(&self) -> i64 {
        self.levels.reserved
    }

    pub fn damaged(&self) -> i64 {
        self.levels.damaged
    }

    pub fn total_quantity(&self) -> i64 {
        self.levels.total()
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn is_low_stock(&self, threshold: i64) -> bool {
        self.levels.available <= threshold
    }

    /// Move `quantity` from available to reserved.
    pub fn reserve(&mut self, quantity: i64, now: DateTime<Utc>) -> DomainResult<()> {
        ensure_non_negative("quantity", quantity)?;
        if quantity > self.levels.available {
            return Err(DomainError::insufficient_stock(format!(
                "cannot reserve {quantity}: only {} available",
                self.levels.available
            )));
        }
        self.levels.available -= quantity;
        self.levels.reserved += quantity;
        self.touch(now);
        Ok(())
    }

    /// Move `quantity` from reserved back to available.
    pub fn release(&mut self, quantity: i64, now: DateTime<Utc>) -> DomainResult<()> {
        ensure_non_negative("quantity", quantity)?;
        if quantity > self.levels.reserved {
            return Err(DomainError::invalid_state(format!(
                "cannot release {quantity}: only {} reserved",
                self.levels.reserved
            )));
        }
        self.levels.reserved -= quantity;
        self.levels.available += quantity;
        self.touch(now);
        Ok(())
    }

    /// Move `quantity` from available to damaged.
    pub fn mark_damaged(&mut self, quantity: i64, now: DateTime<Utc>) -> DomainResult<()> {
        ensure_non_negative("quantity", quantity)?;
        if quantity > self.levels.available {
            return Err(DomainError::insufficient_stock(format!(
                "cannot mark {quantity} damaged: only {} available",
                self.levels.available
            )));
        }
        self.levels.available -= quantity;
        self.levels.damaged += quantity;
        self.touch(now);
        Ok(())
    }

    /// Add incoming goods to available stock.
    pub fn receive(&mut self, quantity: i64, now: DateTime<Utc>) -> DomainResult<()> {
        ensure_non_negative("quantity", quantity)?;
        // Bucket moves keep the total, so bounding it here bounds every bucket.
        self.levels
            .total()
            .checked_add(quantity)
            .ok_or_else(|| DomainError::invalid_argument("total stock quantity out of range"))?;
        self.levels.available += quantity;
        self.touch(now);
        Ok(())
    }

    /// Consume reserved stock as it leaves the warehouse.
    pub fn fulfill(&mut self, quantity: i64, now: DateTime<Utc>) -> DomainResult<()> {
        ensure_non_negative("quantity", quantity)?;
        if quantity > self.levels.reserved {
            return Err(DomainError::insufficient_stock(format!(
                "cannot ship {quantity}: only {} reserved",
                self.levels.reserved
            )));
        }
        self.levels.reserved -= quantity;
        self.touch(now);
        Ok(())
    }

    /// Overwrite all three buckets. Only the non-negativity rule applies;
    /// no comparison with the previous levels is made.
    pub fn set_levels(&mut self, levels: StockLevels, now: DateTime<Utc>) -> DomainResult<()> {
        let levels = StockLevels::new(levels.available, levels.reserved, levels.damaged)?;
        self.levels = levels;
        self.touch(now);
        Ok(())
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.last_updated = now;
    }
}

impl AggregateRoot for Inventory {
    type Id = InventoryId;

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
