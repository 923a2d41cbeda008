//! Purchase order workflow: PENDING -> APPROVED -> RECEIVED.
//!
//! Receiving credits the order's warehouse through the ledger. The order
//! record is claimed first (versioned write) so two concurrent receipts of the
//! same order cannot both credit stock.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use ims_auth::Principal;
use ims_auth::permissions::PURCHASE_ORDERS_MANAGE;
use ims_auth::principal::SYSTEM_USERNAME;
use ims_core::{AggregateRoot, ExpectedVersion, InventoryId, PurchaseOrderId, WarehouseId};
use ims_purchasing::{
    NewPurchaseOrder, PurchaseOrder, PurchaseOrderStatus, ReceiptLine, ReceivedItem,
};

use super::error::{ServiceError, ServiceResult};
use super::ledger::InventoryLedger;
use super::{Stores, require};
use crate::store::RecordStore;

const MISSING_INVENTORY: &str = "No inventory found for this product in the warehouse";

/// Result of one auto-approval pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AutoApproveReport {
    pub considered: usize,
    pub received: usize,
    pub failed: usize,
}

pub struct PurchaseOrderService {
    stores: Stores,
    ledger: Arc<InventoryLedger>,
    auto_approve_after: Duration,
}

impl PurchaseOrderService {
    pub fn new(stores: Stores, ledger: Arc<InventoryLedger>, auto_approve_after: Duration) -> Self {
        Self {
            stores,
            ledger,
            auto_approve_after,
        }
    }

    pub fn create(&self, principal: &Principal, input: NewPurchaseOrder) -> ServiceResult<PurchaseOrder> {
        require(principal, PURCHASE_ORDERS_MANAGE)?;

        if self.stores.warehouses.get(&input.warehouse_id)?.is_none() {
            return Err(ServiceError::not_found("warehouse", input.warehouse_id));
        }
        for item in &input.items {
            if self.stores.products.get(&item.product_id)?.is_none() {
                return Err(ServiceError::not_found("product", item.product_id));
            }
        }

        let order = PurchaseOrder::create(PurchaseOrderId::new(), input, Utc::now())?;
        let saved = self.stores.purchase_orders.insert(order)?;
        info!(
            order_id = %saved.id_typed(),
            supplier = saved.supplier_name(),
            items = saved.items().len(),
            total_cents = saved.total_amount(),
            user = %principal.username,
            "purchase order created"
        );
        Ok(saved)
    }

    pub fn update_status(
        &self,
        principal: &Principal,
        order_id: PurchaseOrderId,
        next: PurchaseOrderStatus,
    ) -> ServiceResult<PurchaseOrder> {
        require(principal, PURCHASE_ORDERS_MANAGE)?;
        self.apply_status(order_id, next, &principal.username)
    }

    /// Record absolute received quantities for an APPROVED order.
    pub fn receive_items(
        &self,
        principal: &Principal,
        order_id: PurchaseOrderId,
        received: &[ReceivedItem],
    ) -> ServiceResult<PurchaseOrder> {
        require(principal, PURCHASE_ORDERS_MANAGE)?;

        let mut order = self.get(order_id)?;
        let version = order.version();
        let receipts = order.record_receipt(received, Utc::now())?;
        let targets = self.credit_targets(order.warehouse_id(), &receipts)?;

        let saved = self
            .stores
            .purchase_orders
            .update(order, ExpectedVersion::Exact(version))?;
        info!(
            order_id = %order_id,
            lines = receipts.len(),
            status = %saved.status(),
            user = %principal.username,
            "purchase order items received"
        );
        self.credit(&saved, targets)?;
        Ok(saved)
    }

    pub fn delete(&self, principal: &Principal, order_id: PurchaseOrderId) -> ServiceResult<()> {
        require(principal, PURCHASE_ORDERS_MANAGE)?;

        let removed = self.stores.purchase_orders.delete_where(&|o| {
            o.id_typed() == order_id && o.status() == PurchaseOrderStatus::Pending
        })?;
        if removed.is_empty() {
            // Either missing or no longer PENDING.
            self.get(order_id)?.ensure_deletable()?;
        }
        info!(order_id = %order_id, user = %principal.username, "purchase order deleted");
        Ok(())
    }

    /// Advance every PENDING order older than the configured age straight
    /// through APPROVED to RECEIVED. Per-order failures are logged and counted.
    pub fn auto_approve_pending(&self, now: DateTime<Utc>) -> ServiceResult<AutoApproveReport> {
        let after = self.auto_approve_after;
        let due = self
            .stores
            .purchase_orders
            .find(&|o| o.is_due_for_auto_approval(now, after))?;

        let mut report = AutoApproveReport {
            considered: due.len(),
            ..AutoApproveReport::default()
        };
        for order in due {
            let order_id = order.id_typed();
            let outcome = self
                .apply_status(order_id, PurchaseOrderStatus::Approved, SYSTEM_USERNAME)
                .and_then(|_| {
                    self.apply_status(order_id, PurchaseOrderStatus::Received, SYSTEM_USERNAME)
                });
            match outcome {
                Ok(_) => report.received += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(order_id = %order_id, error = %e, "auto-approval failed");
                }
            }
        }

        if report.considered > 0 {
            info!(
                considered = report.considered,
                received = report.received,
                failed = report.failed,
                "auto-approval pass finished"
            );
        }
        Ok(report)
    }

    pub fn get(&self, order_id: PurchaseOrderId) -> ServiceResult<PurchaseOrder> {
        self.stores
            .purchase_orders
            .get(&order_id)?
            .ok_or_else(|| ServiceError::not_found("purchase order", order_id))
    }

    pub fn list(&self) -> ServiceResult<Vec<PurchaseOrder>> {
        Ok(self.stores.purchase_orders.list()?)
    }

    pub fn by_status(&self, status: PurchaseOrderStatus) -> ServiceResult<Vec<PurchaseOrder>> {
        Ok(self.stores.purchase_orders.find(&|o| o.status() == status)?)
    }

    pub fn by_warehouse(&self, warehouse_id: WarehouseId) -> ServiceResult<Vec<PurchaseOrder>> {
        Ok(self
            .stores
            .purchase_orders
            .find(&|o| o.warehouse_id() == warehouse_id)?)
    }

    /// Orders created within `[start, end]`.
    pub fn created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ServiceResult<Vec<PurchaseOrder>> {
        Ok(self
            .stores
            .purchase_orders
            .find(&|o| o.created_at() >= start && o.created_at() <= end)?)
    }

    fn apply_status(
        &self,
        order_id: PurchaseOrderId,
        next: PurchaseOrderStatus,
        actor: &str,
    ) -> ServiceResult<PurchaseOrder> {
        let mut order = self.get(order_id)?;
        let version = order.version();
        if !order.check_transition(next)? {
            return Ok(order);
        }
        let from = order.status();
        let receipts = order.transition(next, Utc::now())?;
        let targets = self.credit_targets(order.warehouse_id(), &receipts)?;

        let saved = self
            .stores
            .purchase_orders
            .update(order, ExpectedVersion::Exact(version))?;
        info!(order_id = %order_id, %from, to = %next, user = actor, "purchase order status changed");
        self.credit(&saved, targets)?;
        Ok(saved)
    }

    /// Resolve the inventory row for every receipt line before anything is written.
    fn credit_targets(
        &self,
        warehouse_id: WarehouseId,
        receipts: &[ReceiptLine],
    ) -> ServiceResult<Vec<(InventoryId, ReceiptLine)>> {
        receipts
            .iter()
            .map(|line| {
                let row = self
                    .ledger
                    .by_pair(line.product_id, warehouse_id)?
                    .ok_or_else(|| ServiceError::InvalidState(MISSING_INVENTORY.to_string()))?;
                Ok((row.id_typed(), *line))
            })
            .collect()
    }

    fn credit(
        &self,
        order: &PurchaseOrder,
        targets: Vec<(InventoryId, ReceiptLine)>,
    ) -> ServiceResult<()> {
        let mut failed = 0;
        for (inventory_id, line) in targets {
            if let Err(e) = self.ledger.receive(inventory_id, line.quantity) {
                failed += 1;
                error!(
                    order_id = %order.id_typed(),
                    item_id = %line.item_id,
                    inventory_id = %inventory_id,
                    quantity = line.quantity,
                    error = %e,
                    "failed to credit received stock"
                );
            }
        }
        if failed > 0 {
            return Err(ServiceError::Internal(format!(
                "purchase order {} recorded but {failed} line(s) were not credited to stock",
                order.id_typed()
            )));
        }
        Ok(())
    }
}
