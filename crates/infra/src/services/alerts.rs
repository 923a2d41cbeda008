//! Low-stock alert reconciliation.
//!
//! Keeps the alert table in line with inventory: at most one ACTIVE alert per
//! (product, warehouse), raised when available stock falls to the product's
//! threshold and resolved once it climbs back above it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use ims_alerts::{Alert, AlertStatus, RaiseAlert, ReorderPolicy};
use ims_auth::Principal;
use ims_auth::permissions::ALERTS_MANAGE;
use ims_core::{AggregateRoot, AlertId, ExpectedVersion, ProductId, WarehouseId};
use ims_inventory::Inventory;
use ims_products::Product;

use super::error::{ServiceError, ServiceResult, unique};
use super::ledger::StockObserver;
use super::{Stores, require};
use crate::store::{RecordStore, StoreError};

const HOOK_CREATED_NOTE: &str = "Automatically generated alert for low stock product";
const SWEEP_CREATED_NOTE: &str = "Automatically generated low stock alert with reorder suggestions";
const RESTORED_NOTE: &str = "Stock restored above threshold - automatically resolved";
const REFRESH_RESOLVED_NOTE: &str = "Resolved automatically - stock level above threshold";
const MISSING_INVENTORY: &str = "No inventory found for this product in the warehouse";
const REMOVED_NOTE: &str = "Inventory removed - automatically resolved";

/// What a single reconciliation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Created(AlertId),
    Resolved(usize),
    Unchanged,
}

/// Result of a full sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub created: usize,
    pub resolved: usize,
    pub failed: usize,
}

/// Manual alert creation input.
#[derive(Debug, Clone, Default)]
pub struct NewAlert {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    /// Defaults to the product's minimum stock threshold.
    pub threshold: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LowStockDetail {
    pub product_id: ProductId,
    pub product_name: String,
    pub warehouse_id: WarehouseId,
    pub warehouse_name: String,
    pub current_stock: i64,
    pub threshold: i64,
}

/// Snapshot of low-stock inventory against active alerts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LowStockDiagnostics {
    pub total_inventories: usize,
    pub low_stock_inventories: usize,
    pub low_stock: Vec<LowStockDetail>,
    pub active_alerts: usize,
}

pub struct AlertReconciler {
    stores: Stores,
    policy: ReorderPolicy,
}

impl AlertReconciler {
    pub fn new(stores: Stores, policy: ReorderPolicy) -> Self {
        Self { stores, policy }
    }

    pub fn policy(&self) -> &ReorderPolicy {
        &self.policy
    }

    /// Raise or resolve the alert for one (product, warehouse) pair.
    pub fn reconcile(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> ServiceResult<ReconcileOutcome> {
        let product = self.product(product_id)?;
        let Some(row) = self.inventory_for(product_id, warehouse_id)? else {
            return Ok(ReconcileOutcome::Unchanged);
        };
        self.reconcile_row(&product, &row, HOOK_CREATED_NOTE, Utc::now())
    }

    /// Batch pass over every inventory row.
    ///
    /// A failing row is logged and counted; the pass carries on.
    pub fn sweep(&self) -> ServiceResult<SweepReport> {
        let now = Utc::now();
        let products: HashMap<ProductId, Product> = self
            .stores
            .products
            .list()?
            .into_iter()
            .map(|p| (p.id_typed(), p))
            .collect();
        let rows = self.stores.inventory.list()?;

        let mut report = SweepReport {
            scanned: rows.len(),
            ..SweepReport::default()
        };
        for row in &rows {
            let outcome = match products.get(&row.product_id()) {
                Some(product) => self.reconcile_row(product, row, SWEEP_CREATED_NOTE, now),
                None => Err(ServiceError::not_found("product", row.product_id())),
            };
            match outcome {
                Ok(ReconcileOutcome::Created(_)) => report.created += 1,
                Ok(ReconcileOutcome::Resolved(n)) => report.resolved += n,
                Ok(ReconcileOutcome::Unchanged) => {}
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        inventory_id = %row.id_typed(),
                        product_id = %row.product_id(),
                        error = %e,
                        "low stock check failed for inventory row"
                    );
                }
            }
        }

        info!(
            scanned = report.scanned,
            created = report.created,
            resolved = report.resolved,
            failed = report.failed,
            "low stock sweep finished"
        );
        Ok(report)
    }

    /// Update the stock snapshot of open alerts for a pair, resolving those
    /// whose threshold is now exceeded. Returns how many alerts were written.
    pub fn refresh_open_alerts(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        stock_level: i64,
    ) -> ServiceResult<usize> {
        let open = self.stores.alerts.find(&|a| {
            a.product_id() == product_id && a.warehouse_id() == warehouse_id && a.status().is_open()
        })?;

        let now = Utc::now();
        let mut written = 0;
        for alert in open {
            let version = alert.version();
            let mut next = alert;
            if stock_level > next.threshold() {
                next.refresh_stock(stock_level, &self.policy, now)?;
                next.resolve(REFRESH_RESOLVED_NOTE, now)?;
            } else if next.current_stock() != stock_level {
                next.refresh_stock(stock_level, &self.policy, now)?;
            } else {
                continue;
            }
            if self.save(next, version)?.is_some() {
                written += 1;
            }
        }
        Ok(written)
    }

    /// Resolve the open alerts of a pair whose inventory row no longer exists.
    pub fn resolve_orphaned(&self, product_id: ProductId, warehouse_id: WarehouseId) -> ServiceResult<usize> {
        if self.inventory_for(product_id, warehouse_id)?.is_some() {
            return Ok(0);
        }
        let open = self.stores.alerts.find(&|a| {
            a.product_id() == product_id && a.warehouse_id() == warehouse_id && a.status().is_open()
        })?;

        let now = Utc::now();
        let mut resolved = 0;
        for alert in open {
            let version = alert.version();
            let mut next = alert;
            next.resolve(REMOVED_NOTE, now)?;
            if let Some(saved) = self.save(next, version)? {
                info!(alert_id = %saved.id_typed(), %product_id, %warehouse_id, "alert resolved; inventory removed");
                resolved += 1;
            }
        }
        Ok(resolved)
    }

    pub fn create_alert(&self, principal: &Principal, input: NewAlert) -> ServiceResult<Alert> {
        require(principal, ALERTS_MANAGE)?;

        let product = self.product(input.product_id)?;
        if self.stores.warehouses.get(&input.warehouse_id)?.is_none() {
            return Err(ServiceError::not_found("warehouse", input.warehouse_id));
        }
        let row = self
            .inventory_for(input.product_id, input.warehouse_id)?
            .ok_or_else(|| ServiceError::InvalidState(MISSING_INVENTORY.to_string()))?;

        let alert = Alert::raise(
            AlertId::new(),
            RaiseAlert {
                product_id: input.product_id,
                warehouse_id: input.warehouse_id,
                threshold: input
                    .threshold
                    .unwrap_or_else(|| product.minimum_stock_threshold()),
                current_stock: row.available(),
                unit_price_cents: product.unit_price(),
                notes: input.notes,
            },
            &self.policy,
            Utc::now(),
        )?;
        let saved = unique(self.insert_active(alert), || {
            "Active alert already exists for this product in the warehouse".to_string()
        })?;
        info!(alert_id = %saved.id_typed(), user = %principal.username, "alert created");
        Ok(saved)
    }

    pub fn acknowledge(&self, principal: &Principal, alert_id: AlertId) -> ServiceResult<Alert> {
        require(principal, ALERTS_MANAGE)?;
        self.modify(alert_id, |alert, now| alert.acknowledge(now))
    }

    pub fn resolve(
        &self,
        principal: &Principal,
        alert_id: AlertId,
        note: Option<&str>,
    ) -> ServiceResult<Alert> {
        require(principal, ALERTS_MANAGE)?;
        self.modify(alert_id, |alert, now| alert.resolve(note.unwrap_or_default(), now))
    }

    /// Move an alert to `status`, replacing its notes when `notes` is given.
    pub fn update_status(
        &self,
        principal: &Principal,
        alert_id: AlertId,
        status: AlertStatus,
        notes: Option<String>,
    ) -> ServiceResult<Alert> {
        require(principal, ALERTS_MANAGE)?;
        self.modify(alert_id, |alert, now| {
            alert.transition(status, now)?;
            alert.replace_notes(notes);
            Ok(())
        })
    }

    pub fn delete(&self, principal: &Principal, alert_id: AlertId) -> ServiceResult<()> {
        require(principal, ALERTS_MANAGE)?;
        let alert = self.get(alert_id)?;
        alert.ensure_deletable()?;
        self.stores.alerts.delete(&alert_id)?;
        info!(alert_id = %alert_id, user = %principal.username, "alert deleted");
        Ok(())
    }

    pub fn get(&self, alert_id: AlertId) -> ServiceResult<Alert> {
        self.stores
            .alerts
            .get(&alert_id)?
            .ok_or_else(|| ServiceError::not_found("alert", alert_id))
    }

    pub fn list(&self) -> ServiceResult<Vec<Alert>> {
        Ok(self.stores.alerts.list()?)
    }

    pub fn active(&self) -> ServiceResult<Vec<Alert>> {
        self.by_status(AlertStatus::Active)
    }

    pub fn by_status(&self, status: AlertStatus) -> ServiceResult<Vec<Alert>> {
        Ok(self.stores.alerts.find(&|a| a.status() == status)?)
    }

    pub fn by_product(&self, product_id: ProductId) -> ServiceResult<Vec<Alert>> {
        Ok(self.stores.alerts.find(&|a| a.product_id() == product_id)?)
    }

    pub fn by_warehouse(&self, warehouse_id: WarehouseId) -> ServiceResult<Vec<Alert>> {
        Ok(self
            .stores
            .alerts
            .find(&|a| a.warehouse_id() == warehouse_id)?)
    }

    pub fn created_after(&self, since: DateTime<Utc>) -> ServiceResult<Vec<Alert>> {
        Ok(self.stores.alerts.find(&|a| a.created_at() > since)?)
    }

    pub fn active_below_threshold(&self) -> ServiceResult<Vec<Alert>> {
        Ok(self
            .stores
            .alerts
            .find(&|a| a.is_active() && a.current_stock() <= a.threshold())?)
    }

    pub fn count_active(&self) -> ServiceResult<usize> {
        Ok(self.active()?.len())
    }

    pub fn diagnostics(&self) -> ServiceResult<LowStockDiagnostics> {
        let products: HashMap<ProductId, Product> = self
            .stores
            .products
            .list()?
            .into_iter()
            .map(|p| (p.id_typed(), p))
            .collect();
        let warehouses: HashMap<WarehouseId, String> = self
            .stores
            .warehouses
            .list()?
            .into_iter()
            .map(|w| (w.id, w.name))
            .collect();
        let rows = self.stores.inventory.list()?;

        let low_stock: Vec<LowStockDetail> = rows
            .iter()
            .filter_map(|row| {
                let product = products.get(&row.product_id())?;
                if !row.is_low_stock(product.minimum_stock_threshold()) {
                    return None;
                }
                Some(LowStockDetail {
                    product_id: row.product_id(),
                    product_name: product.name().to_string(),
                    warehouse_id: row.warehouse_id(),
                    warehouse_name: warehouses
                        .get(&row.warehouse_id())
                        .cloned()
                        .unwrap_or_default(),
                    current_stock: row.available(),
                    threshold: product.minimum_stock_threshold(),
                })
            })
            .collect();

        Ok(LowStockDiagnostics {
            total_inventories: rows.len(),
            low_stock_inventories: low_stock.len(),
            low_stock,
            active_alerts: self.count_active()?,
        })
    }

    fn reconcile_row(
        &self,
        product: &Product,
        row: &Inventory,
        created_note: &str,
        now: DateTime<Utc>,
    ) -> ServiceResult<ReconcileOutcome> {
        let threshold = product.minimum_stock_threshold();

        if row.is_low_stock(threshold) {
            let alert = Alert::raise(
                AlertId::new(),
                RaiseAlert {
                    product_id: row.product_id(),
                    warehouse_id: row.warehouse_id(),
                    threshold,
                    current_stock: row.available(),
                    unit_price_cents: product.unit_price(),
                    notes: Some(created_note.to_string()),
                },
                &self.policy,
                now,
            )?;
            return match self.insert_active(alert) {
                Ok(saved) => {
                    info!(
                        alert_id = %saved.id_typed(),
                        product_id = %row.product_id(),
                        warehouse_id = %row.warehouse_id(),
                        current_stock = row.available(),
                        threshold,
                        suggested = saved.suggested_reorder_quantity(),
                        "low stock alert raised"
                    );
                    Ok(ReconcileOutcome::Created(saved.id_typed()))
                }
                Err(StoreError::AlreadyExists(_)) => Ok(ReconcileOutcome::Unchanged),
                Err(e) => Err(e.into()),
            };
        }

        let active = self.stores.alerts.find(&|a| {
            a.is_active() && a.product_id() == row.product_id() && a.warehouse_id() == row.warehouse_id()
        })?;
        let mut resolved = 0;
        for alert in active {
            let version = alert.version();
            let mut next = alert;
            next.resolve(RESTORED_NOTE, now)?;
            if let Some(saved) = self.save(next, version)? {
                info!(alert_id = %saved.id_typed(), available = row.available(), threshold, "low stock alert resolved");
                resolved += 1;
            }
        }
        Ok(if resolved > 0 {
            ReconcileOutcome::Resolved(resolved)
        } else {
            ReconcileOutcome::Unchanged
        })
    }

    fn insert_active(&self, alert: Alert) -> Result<Alert, StoreError> {
        let (product_id, warehouse_id) = (alert.product_id(), alert.warehouse_id());
        self.stores.alerts.insert_unless(alert, &|a| {
            a.is_active() && a.product_id() == product_id && a.warehouse_id() == warehouse_id
        })
    }

    /// Write with the version read; a concurrent writer wins and `None` is returned.
    fn save(&self, alert: Alert, version: u64) -> ServiceResult<Option<Alert>> {
        let alert_id = alert.id_typed();
        match self.stores.alerts.update(alert, ExpectedVersion::Exact(version)) {
            Ok(saved) => Ok(Some(saved)),
            Err(StoreError::Conflict(_)) | Err(StoreError::NotFound(_)) => {
                debug!(alert_id = %alert_id, "alert changed concurrently; skipping");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn modify<F>(&self, alert_id: AlertId, apply: F) -> ServiceResult<Alert>
    where
        F: FnOnce(&mut Alert, DateTime<Utc>) -> ims_core::DomainResult<()>,
    {
        let mut alert = self.get(alert_id)?;
        let version = alert.version();
        apply(&mut alert, Utc::now())?;
        Ok(self
            .stores
            .alerts
            .update(alert, ExpectedVersion::Exact(version))?)
    }

    fn product(&self, product_id: ProductId) -> ServiceResult<Product> {
        self.stores
            .products
            .get(&product_id)?
            .ok_or_else(|| ServiceError::not_found("product", product_id))
    }

    fn inventory_for(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> ServiceResult<Option<Inventory>> {
        Ok(self
            .stores
            .inventory
            .find(&|r| r.product_id() == product_id && r.warehouse_id() == warehouse_id)?
            .into_iter()
            .next())
    }
}

impl StockObserver for AlertReconciler {
    fn stock_changed(&self, product_id: ProductId, warehouse_id: WarehouseId) -> ServiceResult<()> {
        let Some(row) = self.inventory_for(product_id, warehouse_id)? else {
            self.resolve_orphaned(product_id, warehouse_id)?;
            return Ok(());
        };
        self.reconcile(product_id, warehouse_id)?;
        self.refresh_open_alerts(product_id, warehouse_id, row.available())?;
        Ok(())
    }
}
