//! Catalog management: products, categories and warehouses.
//!
//! Deletions that the record model expresses as ownership (a warehouse owns
//! its inventory rows and orders, a product its inventory rows and alerts)
//! cascade explicitly here.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use ims_auth::Principal;
use ims_auth::permissions::CATALOG_MANAGE;
use ims_core::{AggregateRoot, CategoryId, ExpectedVersion, ProductId, WarehouseId};
use ims_inventory::{NewWarehouse, StockStatus, Warehouse, WarehouseUpdate};
use ims_products::{
    Category, CategoryUpdate, NewCategory, NewProduct, Product, ProductUpdate, normalize_sku,
};

use super::alerts::AlertReconciler;
use super::error::{ServiceError, ServiceResult, unique};
use super::ledger::InventoryLedger;
use super::{Stores, require};
use crate::store::RecordStore;

/// Optional stock to open alongside a new product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitialStock {
    pub warehouse_id: WarehouseId,
    /// Defaults to the product's minimum stock threshold.
    pub quantity: Option<i64>,
}

/// A product with its stock summed over every warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductStock {
    pub product: Product,
    pub available: i64,
    pub reserved: i64,
    pub damaged: i64,
    pub status: StockStatus,
}

/// Counts of what a warehouse deletion removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WarehouseRemoval {
    pub inventory: usize,
    pub purchase_orders: usize,
    pub sales_orders: usize,
    pub alerts: usize,
}

pub struct CatalogService {
    stores: Stores,
    ledger: Arc<InventoryLedger>,
    alerts: Arc<AlertReconciler>,
}

impl CatalogService {
    pub fn new(stores: Stores, ledger: Arc<InventoryLedger>, alerts: Arc<AlertReconciler>) -> Self {
        Self {
            stores,
            ledger,
            alerts,
        }
    }

    // ---- products ----

    pub fn create_product(
        &self,
        principal: &Principal,
        input: NewProduct,
        initial_stock: Option<InitialStock>,
    ) -> ServiceResult<Product> {
        require(principal, CATALOG_MANAGE)?;

        if let Some(category_id) = input.category_id {
            self.get_category(category_id)?;
        }
        if let Some(stock) = &initial_stock {
            self.get_warehouse(stock.warehouse_id)?;
        }

        let product = Product::create(ProductId::new(), input, Utc::now())?;
        let key = normalize_sku(product.sku());
        let saved = unique(
            self.stores
                .products
                .insert_unless(product, &|p| normalize_sku(p.sku()) == key),
            || format!("product with SKU {key} already exists"),
        )?;

        if let Some(stock) = initial_stock {
            let quantity = stock
                .quantity
                .unwrap_or_else(|| saved.minimum_stock_threshold());
            if let Err(e) = self
                .ledger
                .create(saved.id_typed(), stock.warehouse_id, quantity)
            {
                self.stores.products.delete(&saved.id_typed())?;
                return Err(e);
            }
        }

        info!(product_id = %saved.id_typed(), sku = saved.sku(), user = %principal.username, "product created");
        Ok(saved)
    }

    /// Partial update. A threshold change re-evaluates the product's alerts.
    pub fn update_product(
        &self,
        principal: &Principal,
        product_id: ProductId,
        update: ProductUpdate,
    ) -> ServiceResult<Product> {
        require(principal, CATALOG_MANAGE)?;

        if let Some(Some(category_id)) = update.category_id {
            self.get_category(category_id)?;
        }
        let mut product = self.get_product(product_id)?;
        let version = product.version();
        let previous_threshold = product.minimum_stock_threshold();
        product.apply_update(update, Utc::now())?;
        let saved = self
            .stores
            .products
            .update(product, ExpectedVersion::Exact(version))?;

        if saved.minimum_stock_threshold() != previous_threshold {
            for row in self.ledger.by_product(product_id)? {
                if let Err(e) = self.alerts.reconcile(product_id, row.warehouse_id()) {
                    warn!(product_id = %product_id, warehouse_id = %row.warehouse_id(), error = %e, "alert re-evaluation failed");
                }
            }
        }
        info!(product_id = %product_id, user = %principal.username, "product updated");
        Ok(saved)
    }

    /// Removes the product together with its inventory rows and alerts.
    pub fn delete_product(&self, principal: &Principal, product_id: ProductId) -> ServiceResult<()> {
        require(principal, CATALOG_MANAGE)?;
        self.get_product(product_id)?;

        let inventory = self
            .stores
            .inventory
            .delete_where(&|r| r.product_id() == product_id)?;
        let alerts = self
            .stores
            .alerts
            .delete_where(&|a| a.product_id() == product_id)?;
        self.stores.products.delete(&product_id)?;
        info!(
            product_id = %product_id,
            inventory_rows = inventory.len(),
            alerts = alerts.len(),
            user = %principal.username,
            "product deleted"
        );
        Ok(())
    }

    pub fn get_product(&self, product_id: ProductId) -> ServiceResult<Product> {
        self.stores
            .products
            .get(&product_id)?
            .ok_or_else(|| ServiceError::not_found("product", product_id))
    }

    pub fn product_by_sku(&self, sku: &str) -> ServiceResult<Product> {
        let key = normalize_sku(sku);
        self.stores
            .products
            .find(&|p| normalize_sku(p.sku()) == key)?
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::NotFound(format!("product with SKU {key}")))
    }

    pub fn list_products(&self) -> ServiceResult<Vec<Product>> {
        Ok(self.stores.products.list()?)
    }

    pub fn products_by_category_name(&self, name: &str) -> ServiceResult<Vec<Product>> {
        let key = name.trim().to_lowercase();
        let ids: HashSet<CategoryId> = self
            .stores
            .categories
            .find(&|c| c.name_key() == key)?
            .into_iter()
            .map(|c| c.id)
            .collect();
        Ok(self
            .stores
            .products
            .find(&|p| p.category_id().is_some_and(|c| ids.contains(&c)))?)
    }

    /// Case-insensitive match on name, description or model.
    pub fn search_products(&self, query: &str) -> ServiceResult<Vec<Product>> {
        Ok(self.stores.products.find(&|p| p.matches_search(query))?)
    }

    pub fn product_stock(&self, product_id: ProductId) -> ServiceResult<ProductStock> {
        let product = self.get_product(product_id)?;
        self.roll_up(product)
    }

    pub fn catalog_stock(&self) -> ServiceResult<Vec<ProductStock>> {
        self.list_products()?
            .into_iter()
            .map(|p| self.roll_up(p))
            .collect()
    }

    fn roll_up(&self, product: Product) -> ServiceResult<ProductStock> {
        let rows = self.ledger.by_product(product.id_typed())?;
        let (available, reserved, damaged) = rows.iter().fold((0, 0, 0), |(a, r, d), row| {
            (a + row.available(), r + row.reserved(), d + row.damaged())
        });
        Ok(ProductStock {
            status: StockStatus::classify(available, product.minimum_stock_threshold()),
            product,
            available,
            reserved,
            damaged,
        })
    }

    // ---- categories ----

    pub fn create_category(&self, principal: &Principal, input: NewCategory) -> ServiceResult<Category> {
        require(principal, CATALOG_MANAGE)?;
        let category = Category::create(CategoryId::new(), input, Utc::now())?;
        let key = category.name_key();
        let saved = unique(
            self.stores
                .categories
                .insert_unless(category, &|c| c.name_key() == key),
            || format!("category '{key}' already exists"),
        )?;
        info!(category_id = %saved.id, name = %saved.name, "category created");
        Ok(saved)
    }

    pub fn update_category(
        &self,
        principal: &Principal,
        category_id: CategoryId,
        update: CategoryUpdate,
    ) -> ServiceResult<Category> {
        require(principal, CATALOG_MANAGE)?;
        let mut category = self.get_category(category_id)?;
        let version = category.version();
        category.apply_update(update, Utc::now())?;
        let key = category.name_key();
        unique(
            self.stores.categories.update_unless(
                category,
                ExpectedVersion::Exact(version),
                &|c| c.id != category_id && c.name_key() == key,
            ),
            || format!("category '{key}' already exists"),
        )
    }

    /// Refused while products still reference the category.
    pub fn delete_category(&self, principal: &Principal, category_id: CategoryId) -> ServiceResult<()> {
        require(principal, CATALOG_MANAGE)?;
        self.get_category(category_id)?;
        let in_use = self
            .stores
            .products
            .find(&|p| p.category_id() == Some(category_id))?;
        if !in_use.is_empty() {
            return Err(ServiceError::InvalidState(format!(
                "category {category_id} is used by {} product(s)",
                in_use.len()
            )));
        }
        self.stores.categories.delete(&category_id)?;
        info!(category_id = %category_id, "category deleted");
        Ok(())
    }

    pub fn deactivate_category(
        &self,
        principal: &Principal,
        category_id: CategoryId,
    ) -> ServiceResult<Category> {
        require(principal, CATALOG_MANAGE)?;
        let mut category = self.get_category(category_id)?;
        let version = category.version();
        category.deactivate(Utc::now());
        Ok(self
            .stores
            .categories
            .update(category, ExpectedVersion::Exact(version))?)
    }

    pub fn get_category(&self, category_id: CategoryId) -> ServiceResult<Category> {
        self.stores
            .categories
            .get(&category_id)?
            .ok_or_else(|| ServiceError::not_found("category", category_id))
    }

    pub fn list_categories(&self) -> ServiceResult<Vec<Category>> {
        let mut categories = self.stores.categories.list()?;
        categories.sort_by(|a, b| {
            a.display_order
                .unwrap_or(i32::MAX)
                .cmp(&b.display_order.unwrap_or(i32::MAX))
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(categories)
    }

    pub fn active_categories(&self) -> ServiceResult<Vec<Category>> {
        let mut categories = self.list_categories()?;
        categories.retain(|c| c.active);
        Ok(categories)
    }

    // ---- warehouses ----

    pub fn create_warehouse(&self, principal: &Principal, input: NewWarehouse) -> ServiceResult<Warehouse> {
        require(principal, CATALOG_MANAGE)?;
        let saved = self
            .stores
            .warehouses
            .insert(Warehouse::create(WarehouseId::new(), input)?)?;
        info!(warehouse_id = %saved.id, name = %saved.name, "warehouse created");
        Ok(saved)
    }

    pub fn update_warehouse(
        &self,
        principal: &Principal,
        warehouse_id: WarehouseId,
        update: WarehouseUpdate,
    ) -> ServiceResult<Warehouse> {
        require(principal, CATALOG_MANAGE)?;
        let mut warehouse = self.get_warehouse(warehouse_id)?;
        let version = warehouse.version();
        warehouse.apply_update(update)?;
        Ok(self
            .stores
            .warehouses
            .update(warehouse, ExpectedVersion::Exact(version))?)
    }

    /// Removes the warehouse and everything it owns.
    pub fn delete_warehouse(
        &self,
        principal: &Principal,
        warehouse_id: WarehouseId,
    ) -> ServiceResult<WarehouseRemoval> {
        require(principal, CATALOG_MANAGE)?;
        self.get_warehouse(warehouse_id)?;

        let removal = WarehouseRemoval {
            inventory: self
                .stores
                .inventory
                .delete_where(&|r| r.warehouse_id() == warehouse_id)?
                .len(),
            purchase_orders: self
                .stores
                .purchase_orders
                .delete_where(&|o| o.warehouse_id() == warehouse_id)?
                .len(),
            sales_orders: self
                .stores
                .sales_orders
                .delete_where(&|o| o.warehouse_id() == warehouse_id)?
                .len(),
            alerts: self
                .stores
                .alerts
                .delete_where(&|a| a.warehouse_id() == warehouse_id)?
                .len(),
        };
        self.stores.warehouses.delete(&warehouse_id)?;
        info!(
            warehouse_id = %warehouse_id,
            inventory = removal.inventory,
            purchase_orders = removal.purchase_orders,
            sales_orders = removal.sales_orders,
            alerts = removal.alerts,
            user = %principal.username,
            "warehouse deleted"
        );
        Ok(removal)
    }

    pub fn get_warehouse(&self, warehouse_id: WarehouseId) -> ServiceResult<Warehouse> {
        self.stores
            .warehouses
            .get(&warehouse_id)?
            .ok_or_else(|| ServiceError::not_found("warehouse", warehouse_id))
    }

    pub fn list_warehouses(&self) -> ServiceResult<Vec<Warehouse>> {
        Ok(self.stores.warehouses.list()?)
    }

    pub fn has_products(&self, warehouse_id: WarehouseId) -> ServiceResult<bool> {
        Ok(!self.ledger.by_warehouse(warehouse_id)?.is_empty())
    }

    pub fn has_products_with_stock(&self, warehouse_id: WarehouseId) -> ServiceResult<bool> {
        Ok(self
            .ledger
            .by_warehouse(warehouse_id)?
            .iter()
            .any(|r| r.available() > 0))
    }
}
