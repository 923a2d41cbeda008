//! Read-only dashboard roll-ups.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;

use ims_alerts::AlertStatus;
use ims_core::{ProductId, WarehouseId};
use ims_inventory::Inventory;
use ims_products::Product;
use ims_purchasing::PurchaseOrderStatus;

use super::Stores;
use super::error::ServiceResult;
use crate::store::RecordStore;

const FREQUENT_ALERTS_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InventoryOverview {
    pub total_products: usize,
    /// Sum of available quantity times unit price, in cents.
    pub total_stock_value: u64,
    pub low_stock_items: usize,
    pub out_of_stock_items: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InventoryTurnover {
    pub total_received: i64,
    pub average_inventory_level: f64,
    pub turnover_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReorderRecommendation {
    pub product_id: ProductId,
    pub product_name: String,
    pub warehouse_id: WarehouseId,
    pub current_stock: i64,
    pub threshold: i64,
    pub recommended_quantity: i64,
    pub estimated_cost: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WarehouseUtilization {
    pub warehouse_id: WarehouseId,
    pub warehouse_name: String,
    pub total_products: usize,
    pub low_stock_items: usize,
    pub total_value: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrequentAlert {
    pub product_id: ProductId,
    pub product_name: String,
    pub alert_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertMetrics {
    pub status_counts: BTreeMap<String, usize>,
    pub frequent_alerts: Vec<FrequentAlert>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgingItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
    pub value: u64,
    pub last_updated: DateTime<Utc>,
}

pub struct DashboardService {
    stores: Stores,
}

impl DashboardService {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    pub fn overview(&self) -> ServiceResult<InventoryOverview> {
        let products = self.products()?;
        let rows = self.stores.inventory.list()?;
        Ok(InventoryOverview {
            total_products: products.len(),
            total_stock_value: rows.iter().map(|r| value(r, &products)).sum(),
            low_stock_items: rows
                .iter()
                .filter(|r| is_low(r, &products))
                .count(),
            out_of_stock_items: rows.iter().filter(|r| r.available() == 0).count(),
        })
    }

    /// Units received by RECEIVED orders created since `since`, against the
    /// mean available level of all inventory rows.
    pub fn turnover(&self, since: DateTime<Utc>) -> ServiceResult<InventoryTurnover> {
        let total_received: i64 = self
            .stores
            .purchase_orders
            .find(&|o| o.status() == PurchaseOrderStatus::Received && o.created_at() > since)?
            .iter()
            .flat_map(|o| o.items())
            .map(|i| i.quantity_received)
            .sum();

        let rows = self.stores.inventory.list()?;
        let average_inventory_level = if rows.is_empty() {
            0.0
        } else {
            rows.iter().map(|r| r.available() as f64).sum::<f64>() / rows.len() as f64
        };
        let turnover_ratio = if average_inventory_level > 0.0 {
            total_received as f64 / average_inventory_level
        } else {
            0.0
        };
        Ok(InventoryTurnover {
            total_received,
            average_inventory_level,
            turnover_ratio,
        })
    }

    /// Low-stock rows with the quantity needed to reach twice the threshold.
    pub fn reorder_recommendations(&self) -> ServiceResult<Vec<ReorderRecommendation>> {
        let products = self.products()?;
        let rows = self.stores.inventory.list()?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let product = products.get(&row.product_id())?;
                let threshold = product.minimum_stock_threshold();
                if !row.is_low_stock(threshold) {
                    return None;
                }
                let recommended_quantity = threshold * 2 - row.available();
                Some(ReorderRecommendation {
                    product_id: row.product_id(),
                    product_name: product.name().to_string(),
                    warehouse_id: row.warehouse_id(),
                    current_stock: row.available(),
                    threshold,
                    recommended_quantity,
                    estimated_cost: cents(recommended_quantity, product.unit_price()),
                })
            })
            .collect())
    }

    pub fn warehouse_utilization(&self) -> ServiceResult<Vec<WarehouseUtilization>> {
        let products = self.products()?;
        let rows = self.stores.inventory.list()?;
        Ok(self
            .stores
            .warehouses
            .list()?
            .into_iter()
            .map(|w| {
                let held: Vec<&Inventory> = rows.iter().filter(|r| r.warehouse_id() == w.id).collect();
                WarehouseUtilization {
                    warehouse_id: w.id,
                    total_products: held.len(),
                    low_stock_items: held.iter().filter(|r| is_low(r, &products)).count(),
                    total_value: held.iter().map(|r| value(r, &products)).sum(),
                    warehouse_name: w.name,
                }
            })
            .collect())
    }

    pub fn alert_metrics(&self) -> ServiceResult<AlertMetrics> {
        let products = self.products()?;
        let alerts = self.stores.alerts.list()?;

        let mut status_counts: BTreeMap<String, usize> = [
            AlertStatus::Active,
            AlertStatus::Acknowledged,
            AlertStatus::Resolved,
        ]
        .iter()
        .map(|s| (s.to_string(), 0))
        .collect();
        let mut per_product: HashMap<ProductId, usize> = HashMap::new();
        for alert in &alerts {
            *status_counts.entry(alert.status().to_string()).or_default() += 1;
            *per_product.entry(alert.product_id()).or_default() += 1;
        }

        let mut frequent_alerts: Vec<FrequentAlert> = per_product
            .into_iter()
            .map(|(product_id, alert_count)| FrequentAlert {
                product_id,
                product_name: products
                    .get(&product_id)
                    .map(|p| p.name().to_string())
                    .unwrap_or_default(),
                alert_count,
            })
            .collect();
        frequent_alerts.sort_by(|a, b| {
            b.alert_count
                .cmp(&a.alert_count)
                .then_with(|| a.product_name.cmp(&b.product_name))
        });
        frequent_alerts.truncate(FREQUENT_ALERTS_LIMIT);

        Ok(AlertMetrics {
            status_counts,
            frequent_alerts,
        })
    }

    /// Rows still holding stock, least recently touched first.
    pub fn inventory_aging(&self) -> ServiceResult<Vec<AgingItem>> {
        let products = self.products()?;
        let mut items: Vec<AgingItem> = self
            .stores
            .inventory
            .find(&|r| r.available() > 0)?
            .iter()
            .map(|row| AgingItem {
                product_id: row.product_id(),
                product_name: products
                    .get(&row.product_id())
                    .map(|p| p.name().to_string())
                    .unwrap_or_default(),
                warehouse_id: row.warehouse_id(),
                quantity: row.available(),
                value: value(row, &products),
                last_updated: row.last_updated(),
            })
            .collect();
        items.sort_by_key(|i| i.last_updated);
        Ok(items)
    }

    fn products(&self) -> ServiceResult<HashMap<ProductId, Product>> {
        Ok(self
            .stores
            .products
            .list()?
            .into_iter()
            .map(|p| (p.id_typed(), p))
            .collect())
    }
}

fn cents(quantity: i64, unit_price: u64) -> u64 {
    unit_price.saturating_mul(quantity.max(0) as u64)
}

fn value(row: &Inventory, products: &HashMap<ProductId, Product>) -> u64 {
    products
        .get(&row.product_id())
        .map_or(0, |p| cents(row.available(), p.unit_price()))
}

fn is_low(row: &Inventory, products: &HashMap<ProductId, Product>) -> bool {
    products
        .get(&row.product_id())
        .is_some_and(|p| row.is_low_stock(p.minimum_stock_threshold()))
}
