use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use ims_core::error::{ensure_non_negative, ensure_not_blank};
use ims_core::{
    AggregateRoot, DomainError, DomainResult, ProductId, PurchaseOrderId, PurchaseOrderItemId,
    WarehouseId,
};

/// Purchase order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseOrderStatus {
    Pending,
    Approved,
    Received,
}

impl core::fmt::Display for PurchaseOrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PurchaseOrderStatus::Pending => write!(f, "PENDING"),
            PurchaseOrderStatus::Approved => write!(f, "APPROVED"),
            PurchaseOrderStatus::Received => write!(f, "RECEIVED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPurchaseOrderItem {
    pub product_id: ProductId,
    pub quantity_ordered: i64,
    /// Price in smallest currency unit (cents).
    pub unit_price: u64,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPurchaseOrder {
    pub warehouse_id: WarehouseId,
    pub supplier_name: String,
    pub contact_info: Option<String>,
    pub notes: Option<String>,
    pub items: Vec<NewPurchaseOrderItem>,
}

/// Purchase order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderItem {
    pub id: PurchaseOrderItemId,
    pub product_id: ProductId,
    pub quantity_ordered: i64,
    pub unit_price: u64,
    pub quantity_received: i64,
    pub notes: Option<String>,
}

impl PurchaseOrderItem {
    pub fn outstanding(&self) -> i64 {
        self.quantity_ordered - self.quantity_received
    }

    pub fn is_fully_received(&self) -> bool {
        self.quantity_received >= self.quantity_ordered
    }

    pub fn line_total(&self) -> u64 {
        self.unit_price.saturating_mul(self.quantity_ordered.max(0) as u64)
    }
}

/// Absolute received quantity reported for one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedItem {
    pub item_id: PurchaseOrderItemId,
    pub quantity_received: i64,
}

/// Stock to credit to the order's warehouse as a result of a receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptLine {
    pub item_id: PurchaseOrderItemId,
    pub product_id: ProductId,
    pub quantity: i64,
}

/// Aggregate root: PurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    id: PurchaseOrderId,
    warehouse_id: WarehouseId,
    supplier_name: String,
    contact_info: Option<String>,
    notes: Option<String>,
    status: PurchaseOrderStatus,
    items: Vec<PurchaseOrderItem>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
}

impl PurchaseOrder {
    pub fn create(
        id: PurchaseOrderId,
        input: NewPurchaseOrder,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        ensure_not_blank("supplier name", &input.supplier_name)?;
        if input.items.is_empty() {
            return Err(DomainError::invalid_argument(
                "purchase order must contain at least one item",
            ));
        }
        for item in &input.items {
            if item.quantity_ordered < 1 {
                return Err(DomainError::invalid_argument(format!(
                    "quantity ordered must be at least 1 (product {})",
                    item.product_id
                )));
            }
        }

        let items = input
            .items
            .into_iter()
            .map(|item| PurchaseOrderItem {
                id: PurchaseOrderItemId::new(),
                product_id: item.product_id,
                quantity_ordered: item.quantity_ordered,
                unit_price: item.unit_price,
                quantity_received: 0,
                notes: item.notes,
            })
            .collect();

        Ok(Self {
            id,
            warehouse_id: input.warehouse_id,
            supplier_name: input.supplier_name.trim().to_string(),
            contact_info: input.contact_info,
            notes: input.notes,
            status: PurchaseOrderStatus::Pending,
            items,
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    pub fn id_typed(&self) -> PurchaseOrderId {
        self.id
    }

    pub fn warehouse_id(&self) -> WarehouseId {
        self.warehouse_id
    }

    pub fn supplier_name(&self) -> &str {
        &self.supplier_name
    }

    pub fn contact_info(&self) -> Option<&str> {
        self.contact_info.as_deref()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn status(&self) -> PurchaseOrderStatus {
        self.status
    }

    pub fn items(&self) -> &[PurchaseOrderItem] {
        &self.items
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Sum of `quantity_ordered * unit_price` over all lines, in cents.
    pub fn total_amount(&self) -> u64 {
        self.items
            .iter()
            .fold(0u64, |acc, item| acc.saturating_add(item.line_total()))
    }

    pub fn is_fully_received(&self) -> bool {
        self.items.iter().all(PurchaseOrderItem::is_fully_received)
    }

    /// Strictly older than `age` at `now` and still PENDING.
    pub fn is_due_for_auto_approval(&self, now: DateTime<Utc>, age: Duration) -> bool {
        self.status == PurchaseOrderStatus::Pending && self.created_at < now - age
    }

    /// Validate a move to `next`. `Ok(false)` means the order is already there.
    pub fn check_transition(&self, next: PurchaseOrderStatus) -> DomainResult<bool> {
        use PurchaseOrderStatus::*;

        if self.status == next {
            return Ok(false);
        }
        match (self.status, next) {
            (Pending, Approved) | (Approved, Received) => Ok(true),
            (Pending, _) => Err(DomainError::invalid_state(
                "PENDING orders can only be moved to APPROVED",
            )),
            (Approved, _) => Err(DomainError::invalid_state(
                "APPROVED orders can only be moved to RECEIVED",
            )),
            (Received, _) => Err(DomainError::invalid_state(
                "cannot change status of RECEIVED orders",
            )),
        }
    }

    /// Apply a status change.
    ///
    /// Entering RECEIVED marks every line as fully received and returns the
    /// outstanding quantities that must be credited to stock.
    pub fn transition(
        &mut self,
        next: PurchaseOrderStatus,
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<ReceiptLine>> {
        if !self.check_transition(next)? {
            return Ok(Vec::new());
        }

        let mut receipts = Vec::new();
        if next == PurchaseOrderStatus::Received {
            for item in &mut self.items {
                let outstanding = item.outstanding();
                if outstanding > 0 {
                    receipts.push(ReceiptLine {
                        item_id: item.id,
                        product_id: item.product_id,
                        quantity: outstanding,
                    });
                }
                item.quantity_received = item.quantity_ordered;
            }
        }

        self.status = next;
        self.updated_at = now;
        Ok(receipts)
    }

    /// Record absolute received quantities for some lines of an APPROVED order.
    ///
    /// Returns the per-line increase to credit to stock. When every line is
    /// fully received the order moves to RECEIVED.
    pub fn record_receipt(
        &mut self,
        received: &[ReceivedItem],
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<ReceiptLine>> {
        if self.status != PurchaseOrderStatus::Approved {
            return Err(DomainError::invalid_state(format!(
                "items can only be received on APPROVED orders (current: {})",
                self.status
            )));
        }

        let index: HashMap<PurchaseOrderItemId, usize> = self
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.id, i))
            .collect();

        // Validate the whole payload before touching any line.
        let mut updates: Vec<(usize, i64)> = Vec::with_capacity(received.len());
        for r in received {
            ensure_non_negative("quantity received", r.quantity_received)?;
            let idx = *index.get(&r.item_id).ok_or_else(|| {
                DomainError::not_found(format!(
                    "item {} does not belong to purchase order {}",
                    r.item_id, self.id
                ))
            })?;
            if updates.iter().any(|(i, _)| *i == idx) {
                return Err(DomainError::invalid_argument(format!(
                    "item {} listed more than once",
                    r.item_id
                )));
            }
            let item = &self.items[idx];
            if r.quantity_received > item.quantity_ordered {
                return Err(DomainError::invalid_argument(format!(
                    "received quantity {} exceeds ordered quantity {} for item {}",
                    r.quantity_received, item.quantity_ordered, item.id
                )));
            }
            if r.quantity_received < item.quantity_received {
                return Err(DomainError::invalid_argument(format!(
                    "received quantity for item {} cannot decrease ({} -> {})",
                    item.id, item.quantity_received, r.quantity_received
                )));
            }
            updates.push((idx, r.quantity_received));
        }

        let mut receipts = Vec::new();
        for (idx, quantity) in updates {
            let item = &mut self.items[idx];
            let delta = quantity - item.quantity_received;
            item.quantity_received = quantity;
            if delta > 0 {
                receipts.push(ReceiptLine {
                    item_id: item.id,
                    product_id: item.product_id,
                    quantity: delta,
                });
            }
        }

        if self.is_fully_received() {
            self.status = PurchaseOrderStatus::Received;
        }
        self.updated_at = now;
        Ok(receipts)
    }

    pub fn ensure_deletable(&self) -> DomainResult<()> {
        if self.status != PurchaseOrderStatus::Pending {
            return Err(DomainError::invalid_state(format!(
                "only PENDING purchase orders can be deleted (current: {})",
                self.status
            )));
        }
        Ok(())
    }
}

impl AggregateRoot for PurchaseOrder {
    type Id = PurchaseOrderId;

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

#[cfg(test)]
mod tests {
    use super::*;

    fn test_item(quantity: i64, price: u64) -> NewPurchaseOrderItem {
        NewPurchaseOrderItem {
            product_id: ProductId::new(),
            quantity_ordered: quantity,
            unit_price: price,
            notes: None,
        }
    }

    fn test_order(items: Vec<NewPurchaseOrderItem>) -> PurchaseOrder {
        PurchaseOrder::create(
            PurchaseOrderId::new(),
            NewPurchaseOrder {
                warehouse_id: WarehouseId::new(),
                supplier_name: "Acme Supply".to_string(),
                contact_info: None,
                notes: None,
                items,
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn create_starts_pending_with_nothing_received() {
        let order = test_order(vec![test_item(4, 250), test_item(2, 1_000)]);
        assert_eq!(order.status(), PurchaseOrderStatus::Pending);
        assert!(order.items().iter().all(|i| i.quantity_received == 0));
        assert_eq!(order.total_amount(), 3_000);
    }

    #[test]
    fn create_rejects_empty_or_zero_quantity_items() {
        let base = NewPurchaseOrder {
            warehouse_id: WarehouseId::new(),
            supplier_name: "Acme".to_string(),
            contact_info: None,
            notes: None,
            items: vec![],
        };
        assert!(matches!(
            PurchaseOrder::create(PurchaseOrderId::new(), base.clone(), Utc::now()),
            Err(DomainError::InvalidArgument(_))
        ));

        let zero = NewPurchaseOrder {
            items: vec![test_item(0, 10)],
            ..base
        };
        assert!(matches!(
            PurchaseOrder::create(PurchaseOrderId::new(), zero, Utc::now()),
            Err(DomainError::InvalidArgument(_))
        ));
    }

    #[test]
    fn pending_cannot_jump_to_received() {
        let mut order = test_order(vec![test_item(5, 100)]);
        match order.transition(PurchaseOrderStatus::Received, Utc::now()) {
            Err(DomainError::InvalidState(msg)) if msg.contains("PENDING") => {}
            other => panic!("Expected InvalidState, got {other:?}"),
        }
        assert_eq!(order.status(), PurchaseOrderStatus::Pending);
    }

    #[test]
    fn approve_then_receive_returns_all_lines() {
        let mut order = test_order(vec![test_item(5, 100), test_item(7, 100)]);
        assert!(order
            .transition(PurchaseOrderStatus::Approved, Utc::now())
            .unwrap()
            .is_empty());
        let receipts = order
            .transition(PurchaseOrderStatus::Received, Utc::now())
            .unwrap();
        assert_eq!(receipts.iter().map(|r| r.quantity).sum::<i64>(), 12);
        assert!(order.is_fully_received());
    }

    #[test]
    fn same_state_is_noop_and_received_is_terminal() {
        let mut order = test_order(vec![test_item(1, 100)]);
        assert!(!order.check_transition(PurchaseOrderStatus::Pending).unwrap());
        order.transition(PurchaseOrderStatus::Approved, Utc::now()).unwrap();
        assert!(matches!(
            order.transition(PurchaseOrderStatus::Pending, Utc::now()),
            Err(DomainError::InvalidState(_))
        ));
        order.transition(PurchaseOrderStatus::Received, Utc::now()).unwrap();
        assert!(order
            .transition(PurchaseOrderStatus::Received, Utc::now())
            .unwrap()
            .is_empty());
        match order.transition(PurchaseOrderStatus::Approved, Utc::now()) {
            Err(DomainError::InvalidState(msg)) if msg.contains("RECEIVED") => {}
            other => panic!("Expected InvalidState, got {other:?}"),
        }
    }

    #[test]
    fn partial_receipt_credits_delta_and_completes_order() {
        let mut order = test_order(vec![test_item(10, 100), test_item(4, 100)]);
        order.transition(PurchaseOrderStatus::Approved, Utc::now()).unwrap();
        let first = order.items()[0].id;
        let second = order.items()[1].id;

        let receipts = order
            .record_receipt(
                &[ReceivedItem {
                    item_id: first,
                    quantity_received: 6,
                }],
                Utc::now(),
            )
            .unwrap();
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].quantity, 6);
        assert_eq!(order.status(), PurchaseOrderStatus::Approved);

        let receipts = order
            .record_receipt(
                &[
                    ReceivedItem {
                        item_id: first,
                        quantity_received: 10,
                    },
                    ReceivedItem {
                        item_id: second,
                        quantity_received: 4,
                    },
                ],
                Utc::now(),
            )
            .unwrap();
        assert_eq!(receipts.iter().map(|r| r.quantity).sum::<i64>(), 8);
        assert_eq!(order.status(), PurchaseOrderStatus::Received);
    }

    #[test]
    fn receipt_over_ordered_is_rejected_without_changes() {
        let mut order = test_order(vec![test_item(3, 100), test_item(3, 100)]);
        order.transition(PurchaseOrderStatus::Approved, Utc::now()).unwrap();
        let before = order.clone();
        let payload = [
            ReceivedItem {
                item_id: order.items()[0].id,
                quantity_received: 2,
            },
            ReceivedItem {
                item_id: order.items()[1].id,
                quantity_received: 4,
            },
        ];
        match order.record_receipt(&payload, Utc::now()) {
            Err(DomainError::InvalidArgument(msg)) if msg.contains("exceeds") => {}
            other => panic!("Expected InvalidArgument, got {other:?}"),
        }
        assert_eq!(order, before);
    }

    #[test]
    fn receipt_requires_approved() {
        let mut order = test_order(vec![test_item(3, 100)]);
        let item_id = order.items()[0].id;
        assert!(matches!(
            order.record_receipt(
                &[ReceivedItem {
                    item_id,
                    quantity_received: 1
                }],
                Utc::now()
            ),
            Err(DomainError::InvalidState(_))
        ));
    }

    #[test]
    fn full_receive_after_partial_credits_only_outstanding() {
        let mut order = test_order(vec![test_item(10, 100)]);
        order.transition(PurchaseOrderStatus::Approved, Utc::now()).unwrap();
        let item_id = order.items()[0].id;
        order
            .record_receipt(
                &[ReceivedItem {
                    item_id,
                    quantity_received: 7,
                }],
                Utc::now(),
            )
            .unwrap();
        let receipts = order
            .transition(PurchaseOrderStatus::Received, Utc::now())
            .unwrap();
        assert_eq!(receipts[0].quantity, 3);
    }

    #[test]
    fn auto_approval_age_is_strict() {
        let order = test_order(vec![test_item(1, 100)]);
        let age = Duration::seconds(60);
        assert!(!order.is_due_for_auto_approval(order.created_at() + Duration::seconds(10), age));
        assert!(!order.is_due_for_auto_approval(order.created_at() + age, age));
        assert!(order.is_due_for_auto_approval(order.created_at() + Duration::seconds(120), age));
    }

    #[test]
    fn only_pending_orders_are_deletable() {
        let mut order = test_order(vec![test_item(1, 100)]);
        assert!(order.ensure_deletable().is_ok());
        order.transition(PurchaseOrderStatus::Approved, Utc::now()).unwrap();
        assert!(matches!(order.ensure_deletable(), Err(DomainError::InvalidState(_))));
    }
}
