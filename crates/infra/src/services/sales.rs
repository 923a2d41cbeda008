//! Sales order workflow.
//!
//! Entering CONFIRMED reserves every line in the order's warehouse; a failed
//! reservation rolls back the lines already held and returns the order to
//! PENDING. Cancelling a confirmed order releases the hold, shipping consumes it.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use ims_auth::Principal;
use ims_auth::permissions::{SALES_ORDERS_CREATE, SALES_ORDERS_MANAGE};
use ims_core::{AggregateRoot, ExpectedVersion, InventoryId, ProductId, SalesOrderId};
use ims_sales::{NewSalesOrder, SalesOrder, SalesOrderStatus, StockEffect};

use super::error::{ServiceError, ServiceResult};
use super::ledger::InventoryLedger;
use super::{Stores, require};
use crate::store::RecordStore;

pub struct SalesOrderService {
    stores: Stores,
    ledger: Arc<InventoryLedger>,
}

impl SalesOrderService {
    pub fn new(stores: Stores, ledger: Arc<InventoryLedger>) -> Self {
        Self { stores, ledger }
    }

    /// Place an order. Stock is checked but not held until confirmation.
    pub fn create(&self, principal: &Principal, input: NewSalesOrder) -> ServiceResult<SalesOrder> {
        require(principal, SALES_ORDERS_CREATE)?;

        if self.stores.warehouses.get(&input.warehouse_id)?.is_none() {
            return Err(ServiceError::not_found("warehouse", input.warehouse_id));
        }

        let order = SalesOrder::create(SalesOrderId::new(), input, Utc::now())?;
        for (product_id, quantity) in requested_by_product(&order)? {
            let product = self
                .stores
                .products
                .get(&product_id)?
                .ok_or_else(|| ServiceError::not_found("product", product_id))?;
            let row = self
                .ledger
                .by_pair(product_id, order.warehouse_id())?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("inventory not found for product {product_id}"))
                })?;
            if row.available() < quantity {
                return Err(ServiceError::InsufficientStock(format!(
                    "insufficient stock for product {}: requested {quantity}, available {}",
                    product.name(),
                    row.available()
                )));
            }
        }

        let saved = self.stores.sales_orders.insert(order)?;
        info!(
            order_id = %saved.id_typed(),
            customer = saved.customer_email(),
            total_cents = saved.total_amount(),
            user = %principal.username,
            "sales order created"
        );
        Ok(saved)
    }

    pub fn update_status(
        &self,
        principal: &Principal,
        order_id: SalesOrderId,
        next: SalesOrderStatus,
    ) -> ServiceResult<SalesOrder> {
        require(principal, SALES_ORDERS_MANAGE)?;

        let mut order = self.get(order_id)?;
        let version = order.version();
        let from = order.status();
        let Some(effect) = order.check_transition(next)? else {
            return Ok(order);
        };
        // Rows to settle are resolved and checked before the status is written.
        let targets = match effect {
            StockEffect::Release | StockEffect::Fulfill => self.settlement_targets(&order, effect)?,
            StockEffect::Reserve | StockEffect::None => Vec::new(),
        };
        order.transition(next, Utc::now())?;
        let saved = self
            .stores
            .sales_orders
            .update(order, ExpectedVersion::Exact(version))?;
        info!(order_id = %order_id, %from, to = %next, user = %principal.username, "sales order status changed");

        match effect {
            StockEffect::Reserve => {
                if let Err(e) = self.process_confirmed_order(&saved) {
                    self.revert_confirmation(&saved)?;
                    return Err(e);
                }
            }
            StockEffect::Release | StockEffect::Fulfill => self.settle(&saved, effect, targets)?,
            StockEffect::None => {}
        }
        Ok(saved)
    }

    /// Reserve every line of a CONFIRMED order. All or nothing: on failure
    /// the lines already reserved are released again.
    pub fn process_confirmed_order(&self, order: &SalesOrder) -> ServiceResult<()> {
        order.ensure_confirmed()?;
        let warehouse_id = order.warehouse_id();

        let mut held: Vec<(ProductId, i64)> = Vec::with_capacity(order.items().len());
        for item in order.items() {
            match self
                .ledger
                .reserve_for(item.product_id, warehouse_id, item.quantity)
            {
                Ok(_) => held.push((item.product_id, item.quantity)),
                Err(e) => {
                    warn!(
                        order_id = %order.id_typed(),
                        product_id = %item.product_id,
                        quantity = item.quantity,
                        error = %e,
                        "reservation failed; rolling back order"
                    );
                    for (product_id, quantity) in held {
                        if let Err(e) = self.ledger.release_for(product_id, warehouse_id, quantity) {
                            error!(
                                order_id = %order.id_typed(),
                                product_id = %product_id,
                                quantity,
                                error = %e,
                                "failed to roll back reservation"
                            );
                        }
                    }
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Unconditional; reservations held by the order are not released.
    pub fn delete(&self, principal: &Principal, order_id: SalesOrderId) -> ServiceResult<()> {
        require(principal, SALES_ORDERS_MANAGE)?;
        self.stores
            .sales_orders
            .delete(&order_id)?
            .ok_or_else(|| ServiceError::not_found("sales order", order_id))?;
        info!(order_id = %order_id, user = %principal.username, "sales order deleted");
        Ok(())
    }

    pub fn get(&self, order_id: SalesOrderId) -> ServiceResult<SalesOrder> {
        self.stores
            .sales_orders
            .get(&order_id)?
            .ok_or_else(|| ServiceError::not_found("sales order", order_id))
    }

    pub fn list(&self) -> ServiceResult<Vec<SalesOrder>> {
        Ok(self.stores.sales_orders.list()?)
    }

    pub fn by_customer(&self, email: &str) -> ServiceResult<Vec<SalesOrder>> {
        let email = email.trim().to_lowercase();
        Ok(self
            .stores
            .sales_orders
            .find(&|o| o.customer_email().to_lowercase() == email)?)
    }

    pub fn by_status(&self, status: SalesOrderStatus) -> ServiceResult<Vec<SalesOrder>> {
        Ok(self.stores.sales_orders.find(&|o| o.status() == status)?)
    }

    fn revert_confirmation(&self, order: &SalesOrder) -> ServiceResult<()> {
        let mut current = self.get(order.id_typed())?;
        let version = current.version();
        current.revert_confirmation(Utc::now())?;
        self.stores
            .sales_orders
            .update(current, ExpectedVersion::Exact(version))?;
        Ok(())
    }

    fn settlement_targets(
        &self,
        order: &SalesOrder,
        effect: StockEffect,
    ) -> ServiceResult<Vec<(InventoryId, i64)>> {
        let now = Utc::now();
        let mut targets = Vec::new();
        for (product_id, quantity) in requested_by_product(order)? {
            let row = self
                .ledger
                .by_pair(product_id, order.warehouse_id())?
                .ok_or_else(|| {
                    ServiceError::InvalidState(format!(
                        "no inventory for product {product_id} in warehouse {}",
                        order.warehouse_id()
                    ))
                })?;
            let mut check = row.clone();
            match effect {
                StockEffect::Release => check.release(quantity, now)?,
                StockEffect::Fulfill => check.fulfill(quantity, now)?,
                StockEffect::Reserve | StockEffect::None => {}
            }
            targets.push((row.id_typed(), quantity));
        }
        Ok(targets)
    }

    fn settle(
        &self,
        order: &SalesOrder,
        effect: StockEffect,
        targets: Vec<(InventoryId, i64)>,
    ) -> ServiceResult<()> {
        let mut failed = 0;
        for (inventory_id, quantity) in targets {
            let (operation, result) = match effect {
                StockEffect::Release => ("release", self.ledger.release(inventory_id, quantity)),
                StockEffect::Fulfill => ("fulfill", self.ledger.fulfill(inventory_id, quantity)),
                StockEffect::Reserve | StockEffect::None => continue,
            };
            if let Err(e) = result {
                failed += 1;
                error!(
                    order_id = %order.id_typed(),
                    inventory_id = %inventory_id,
                    quantity,
                    operation,
                    error = %e,
                    "stock settlement failed for order line"
                );
            }
        }
        if failed > 0 {
            return Err(ServiceError::Internal(format!(
                "sales order {} recorded as {} but {failed} line(s) were not settled",
                order.id_typed(),
                order.status()
            )));
        }
        Ok(())
    }
}

/// Total quantity per product across an order's lines.
fn requested_by_product(order: &SalesOrder) -> ServiceResult<BTreeMap<ProductId, i64>> {
    let mut requested: BTreeMap<ProductId, i64> = BTreeMap::new();
    for item in order.items() {
        let total = requested.entry(item.product_id).or_default();
        *total = total.checked_add(item.quantity).ok_or_else(|| {
            ServiceError::InvalidArgument(format!(
                "requested quantity for product {} is out of range",
                item.product_id
            ))
        })?;
    }
    Ok(requested)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::Services;
    use crate::services::testing::{admin, customer, product, services, warehouse};
    use ims_core::WarehouseId;
    use ims_inventory::StockLevels;
    use ims_sales::NewSalesOrderItem;

    struct Fixture {
        services: Services,
        warehouse_id: WarehouseId,
        lamp: ProductId,
        desk: ProductId,
    }

    fn test_fixture() -> Fixture {
        let services = services();
        let warehouse_id = warehouse(&services.stores, "Store");
        let lamp = product(&services.stores, "LAMP", 2_500, 2);
        let desk = product(&services.stores, "DESK", 20_000, 2);
        services.ledger.create(lamp, warehouse_id, 10).unwrap();
        services.ledger.create(desk, warehouse_id, 4).unwrap();
        Fixture {
            services,
            warehouse_id,
            lamp,
            desk,
        }
    }

    fn test_input(f: &Fixture, lamps: i64, desks: i64) -> NewSalesOrder {
        NewSalesOrder {
            warehouse_id: f.warehouse_id,
            customer_name: "Dana".to_string(),
            customer_email: "dana@example.com".to_string(),
            shipping_address: None,
            billing_address: None,
            notes: None,
            items: vec![
                NewSalesOrderItem { product_id: f.lamp, quantity: lamps, unit_price: 2_500 },
                NewSalesOrderItem { product_id: f.desk, quantity: desks, unit_price: 20_000 },
            ],
        }
    }

    fn levels(f: &Fixture, product_id: ProductId) -> StockLevels {
        f.services
            .ledger
            .require_pair(product_id, f.warehouse_id)
            .unwrap()
            .levels()
    }

    #[test]
    fn insufficient_stock_rejects_without_mutation() {
        let f = test_fixture();
        let before = levels(&f, f.desk);
        match f.services.sales.create(&customer(), test_input(&f, 1, 5)) {
            Err(ServiceError::InsufficientStock(msg)) if msg.contains("requested 5") => {}
            other => panic!("Expected InsufficientStock, got {other:?}"),
        }
        assert_eq!(levels(&f, f.desk), before);
        assert!(f.services.sales.list().unwrap().is_empty());
    }

    #[test]
    fn duplicate_lines_are_checked_together() {
        let f = test_fixture();
        let mut input = test_input(&f, 6, 1);
        input.items.push(NewSalesOrderItem { product_id: f.lamp, quantity: 6, unit_price: 2_500 });
        assert!(matches!(
            f.services.sales.create(&customer(), input),
            Err(ServiceError::InsufficientStock(_))
        ));
    }

    #[test]
    fn oversized_duplicate_lines_are_rejected() {
        let f = test_fixture();
        let mut input = test_input(&f, i64::MAX, 1);
        input.items.push(NewSalesOrderItem { product_id: f.lamp, quantity: i64::MAX, unit_price: 2_500 });
        assert!(matches!(
            f.services.sales.create(&customer(), input),
            Err(ServiceError::InvalidArgument(_))
        ));
        assert!(f.services.sales.list().unwrap().is_empty());
        assert_eq!(levels(&f, f.lamp), StockLevels::new(10, 0, 0).unwrap());
    }

    #[test]
    fn shipping_without_reservation_keeps_order_confirmed() {
        let f = test_fixture();
        let sales = &f.services.sales;
        let order = sales.create(&customer(), test_input(&f, 3, 1)).unwrap();
        sales
            .update_status(&admin(), order.id_typed(), SalesOrderStatus::Confirmed)
            .unwrap();
        // Someone overwrites the lamp row and drops its hold.
        let lamp_row = f.services.ledger.require_pair(f.lamp, f.warehouse_id).unwrap();
        f.services.ledger.set_stock(lamp_row.id_typed(), 7, 0, 0).unwrap();

        assert!(matches!(
            sales.update_status(&admin(), order.id_typed(), SalesOrderStatus::Shipped),
            Err(ServiceError::InsufficientStock(_))
        ));
        assert!(matches!(
            sales.update_status(&admin(), order.id_typed(), SalesOrderStatus::Cancelled),
            Err(ServiceError::InvalidState(_))
        ));
        assert_eq!(sales.get(order.id_typed()).unwrap().status(), SalesOrderStatus::Confirmed);
        assert_eq!(levels(&f, f.lamp), StockLevels::new(7, 0, 0).unwrap());
        assert_eq!(levels(&f, f.desk), StockLevels::new(3, 1, 0).unwrap());
    }

    #[test]
    fn confirm_reserves_and_cancel_releases() {
        let f = test_fixture();
        let order = f.services.sales.create(&customer(), test_input(&f, 3, 1)).unwrap();
        assert_eq!(order.status(), SalesOrderStatus::Pending);
        assert_eq!(levels(&f, f.lamp).available, 10);

        f.services
            .sales
            .update_status(&admin(), order.id_typed(), SalesOrderStatus::Confirmed)
            .unwrap();
        assert_eq!(levels(&f, f.lamp), StockLevels::new(7, 3, 0).unwrap());
        assert_eq!(levels(&f, f.desk), StockLevels::new(3, 1, 0).unwrap());

        match f
            .services
            .sales
            .update_status(&admin(), order.id_typed(), SalesOrderStatus::Pending)
        {
            Err(ServiceError::InvalidState(msg)) if msg.contains("back to PENDING") => {}
            other => panic!("Expected InvalidState, got {other:?}"),
        }

        f.services
            .sales
            .update_status(&admin(), order.id_typed(), SalesOrderStatus::Cancelled)
            .unwrap();
        assert_eq!(levels(&f, f.lamp), StockLevels::new(10, 0, 0).unwrap());
        assert_eq!(levels(&f, f.desk), StockLevels::new(4, 0, 0).unwrap());
    }

    #[test]
    fn shipping_consumes_reservation() {
        let f = test_fixture();
        let order = f.services.sales.create(&customer(), test_input(&f, 2, 2)).unwrap();
        let sales = &f.services.sales;
        sales
            .update_status(&admin(), order.id_typed(), SalesOrderStatus::Confirmed)
            .unwrap();
        sales
            .update_status(&admin(), order.id_typed(), SalesOrderStatus::Shipped)
            .unwrap();
        sales
            .update_status(&admin(), order.id_typed(), SalesOrderStatus::Delivered)
            .unwrap();
        assert_eq!(levels(&f, f.lamp), StockLevels::new(8, 0, 0).unwrap());
        assert_eq!(levels(&f, f.desk), StockLevels::new(2, 0, 0).unwrap());
        assert!(matches!(
            sales.update_status(&admin(), order.id_typed(), SalesOrderStatus::Cancelled),
            Err(ServiceError::InvalidState(_))
        ));
    }

    #[test]
    fn failed_reservation_rolls_back_to_pending() {
        let f = test_fixture();
        let order = f.services.sales.create(&customer(), test_input(&f, 3, 2)).unwrap();
        // Desks sell out between order placement and confirmation.
        f.services.ledger.reserve_for(f.desk, f.warehouse_id, 3).unwrap();

        let result = f
            .services
            .sales
            .update_status(&admin(), order.id_typed(), SalesOrderStatus::Confirmed);
        assert!(matches!(result, Err(ServiceError::InsufficientStock(_))));

        let current = f.services.sales.get(order.id_typed()).unwrap();
        assert_eq!(current.status(), SalesOrderStatus::Pending);
        assert_eq!(levels(&f, f.lamp), StockLevels::new(10, 0, 0).unwrap());
        assert_eq!(levels(&f, f.desk), StockLevels::new(1, 3, 0).unwrap());
    }

    #[test]
    fn processing_requires_confirmed_order() {
        let f = test_fixture();
        let order = f.services.sales.create(&customer(), test_input(&f, 1, 1)).unwrap();
        assert!(matches!(
            f.services.sales.process_confirmed_order(&order),
            Err(ServiceError::InvalidState(_))
        ));
    }

    #[test]
    fn customers_cannot_manage_orders_and_delete_is_unconditional() {
        let f = test_fixture();
        let order = f.services.sales.create(&customer(), test_input(&f, 1, 1)).unwrap();
        assert!(matches!(
            f.services
                .sales
                .update_status(&customer(), order.id_typed(), SalesOrderStatus::Confirmed),
            Err(ServiceError::Unauthorized(_))
        ));
        f.services
            .sales
            .update_status(&admin(), order.id_typed(), SalesOrderStatus::Confirmed)
            .unwrap();
        f.services.sales.delete(&admin(), order.id_typed()).unwrap();
        assert!(f.services.sales.by_customer("DANA@example.com").unwrap().is_empty());
        // The hold stays with the inventory row.
        assert_eq!(levels(&f, f.lamp).reserved, 1);
    }
}
