use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ims_core::error::ensure_not_blank;
use ims_core::{AggregateRoot, DomainError, DomainResult, ProductId, SalesOrderId, WarehouseId};

/// Sales order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SalesOrderStatus {
    Pending,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
}

impl core::fmt::Display for SalesOrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            SalesOrderStatus::Pending => "PENDING",
            SalesOrderStatus::Confirmed => "CONFIRMED",
            SalesOrderStatus::Shipped => "SHIPPED",
            SalesOrderStatus::Delivered => "DELIVERED",
            SalesOrderStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// What a status change does to the order's stock in its warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockEffect {
    /// Hold each line's quantity (available -> reserved).
    Reserve,
    /// Give held quantities back (reserved -> available).
    Release,
    /// Held quantities leave the warehouse.
    Fulfill,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSalesOrderItem {
    pub product_id: ProductId,
    pub quantity: i64,
    /// Price in smallest currency unit (cents).
    pub unit_price: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSalesOrder {
    pub warehouse_id: WarehouseId,
    pub customer_name: String,
    pub customer_email: String,
    pub shipping_address: Option<String>,
    pub billing_address: Option<String>,
    pub notes: Option<String>,
    pub items: Vec<NewSalesOrderItem>,
}

/// Order line: product, quantity, unit price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrderItem {
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: u64,
}

/// Aggregate root: SalesOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrder {
    id: SalesOrderId,
    warehouse_id: WarehouseId,
    customer_name: String,
    customer_email: String,
    shipping_address: Option<String>,
    billing_address: Option<String>,
    notes: Option<String>,
    status: SalesOrderStatus,
    items: Vec<SalesOrderItem>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
}

impl SalesOrder {
    pub fn create(id: SalesOrderId, input: NewSalesOrder, now: DateTime<Utc>) -> DomainResult<Self> {
        ensure_not_blank("customer name", &input.customer_name)?;
        ensure_not_blank("customer email", &input.customer_email)?;
        if !input.customer_email.contains('@') {
            return Err(DomainError::invalid_argument(format!(
                "customer email '{}' is not valid",
                input.customer_email
            )));
        }
        if input.items.is_empty() {
            return Err(DomainError::invalid_argument(
                "sales order must contain at least one item",
            ));
        }
        for item in &input.items {
            if item.quantity < 1 {
                return Err(DomainError::invalid_argument(format!(
                    "quantity must be at least 1 (product {})",
                    item.product_id
                )));
            }
        }

        Ok(Self {
            id,
            warehouse_id: input.warehouse_id,
            customer_name: input.customer_name.trim().to_string(),
            customer_email: input.customer_email.trim().to_string(),
            shipping_address: input.shipping_address,
            billing_address: input.billing_address,
            notes: input.notes,
            status: SalesOrderStatus::Pending,
            items: input
                .items
                .into_iter()
                .map(|i| SalesOrderItem {
                    product_id: i.product_id,
                    quantity: i.quantity,
                    unit_price: i.unit_price,
                })
                .collect(),
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    pub fn id_typed(&self) -> SalesOrderId {
        self.id
    }

    pub fn warehouse_id(&self) -> WarehouseId {
        self.warehouse_id
    }

    pub fn customer_name(&self) -> &str {
        &self.customer_name
    }

    pub fn customer_email(&self) -> &str {
        &self.customer_email
    }

    pub fn shipping_address(&self) -> Option<&str> {
        self.shipping_address.as_deref()
    }

    pub fn billing_address(&self) -> Option<&str> {
        self.billing_address.as_deref()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn status(&self) -> SalesOrderStatus {
        self.status
    }

    pub fn items(&self) -> &[SalesOrderItem] {
        &self.items
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn total_amount(&self) -> u64 {
        self.items.iter().fold(0u64, |acc, i| {
            acc.saturating_add(i.unit_price.saturating_mul(i.quantity.max(0) as u64))
        })
    }

    /// Validate a move to `next` and return its stock effect.
    /// `Ok(None)` means the order is already in that state.
    pub fn check_transition(&self, next: SalesOrderStatus) -> DomainResult<Option<StockEffect>> {
        use SalesOrderStatus::*;

        if self.status == next {
            return Ok(None);
        }
        let effect = match (self.status, next) {
            (Pending, Confirmed) => StockEffect::Reserve,
            (Pending, Cancelled) => StockEffect::None,
            (Confirmed, Cancelled) => StockEffect::Release,
            (Confirmed, Shipped) => StockEffect::Fulfill,
            (Shipped, Delivered) => StockEffect::None,
            (Confirmed, Pending) => {
                return Err(DomainError::invalid_state(
                    "CONFIRMED orders cannot be moved back to PENDING",
                ));
            }
            (Delivered, _) | (Cancelled, _) => {
                return Err(DomainError::invalid_state(format!(
                    "cannot change status of {} orders",
                    self.status
                )));
            }
            (from, to) => {
                return Err(DomainError::invalid_state(format!(
                    "sales order cannot move from {from} to {to}"
                )));
            }
        };
        Ok(Some(effect))
    }

    pub fn transition(
        &mut self,
        next: SalesOrderStatus,
        now: DateTime<Utc>,
    ) -> DomainResult<Option<StockEffect>> {
        let effect = self.check_transition(next)?;
        if effect.is_some() {
            self.status = next;
            self.updated_at = now;
        }
        Ok(effect)
    }

    /// Undo a confirmation whose stock reservation could not be completed.
    pub fn revert_confirmation(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_confirmed()?;
        self.status = SalesOrderStatus::Pending;
        self.updated_at = now;
        Ok(())
    }

    pub fn ensure_confirmed(&self) -> DomainResult<()> {
        if self.status != SalesOrderStatus::Confirmed {
            return Err(DomainError::invalid_state(format!(
                "order {} is not CONFIRMED (current: {})",
                self.id, self.status
            )));
        }
        Ok(())
    }
}

impl AggregateRoot for SalesOrder {
    type Id = SalesOrderId;

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
