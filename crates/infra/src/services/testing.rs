//! Fixtures shared by the service tests.

use chrono::Utc;

use ims_auth::{Principal, Role};
use ims_core::{ProductId, WarehouseId};
use ims_inventory::{NewWarehouse, Warehouse};
use ims_products::{NewProduct, Product};

use super::{Services, Stores};
use crate::config::AppConfig;
use crate::store::RecordStore;

pub(crate) fn services() -> Services {
    Services::in_memory(&AppConfig::default())
}

pub(crate) fn admin() -> Principal {
    Principal::new(None, "admin", Role::Admin)
}

pub(crate) fn customer() -> Principal {
    Principal::new(None, "carol", Role::Customer)
}

pub(crate) fn product(stores: &Stores, sku: &str, unit_price: u64, threshold: i64) -> ProductId {
    let product = Product::create(
        ProductId::new(),
        NewProduct {
            name: format!("Product {sku}"),
            sku: sku.to_string(),
            unit_price,
            minimum_stock_threshold: Some(threshold),
            ..Default::default()
        },
        Utc::now(),
    )
    .unwrap();
    stores.products.insert(product).unwrap().id_typed()
}

pub(crate) fn warehouse(stores: &Stores, name: &str) -> WarehouseId {
    let warehouse = Warehouse::create(
        WarehouseId::new(),
        NewWarehouse {
            name: name.to_string(),
            location: format!("{name} site"),
            contact_details: None,
        },
    )
    .unwrap();
    stores.warehouses.insert(warehouse).unwrap().id
}
