//! Application services: the stock ledger, alert reconciliation, order
//! workflows, catalog/user management and dashboard read models.
//!
//! Services are synchronous and thread-safe; they share record stores
//! through [`Stores`] and are wired together by [`Services::new`].

pub mod alerts;
pub mod catalog;
pub mod dashboard;
pub mod error;
pub mod ledger;
pub mod purchasing;
pub mod sales;
pub mod users;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use ims_alerts::Alert;
use ims_auth::{Permission, Principal, User, authorize};
use ims_inventory::{Inventory, Warehouse};
use ims_products::{Category, Product};
use ims_purchasing::PurchaseOrder;
use ims_sales::SalesOrder;

use crate::config::AppConfig;
use crate::store::{InMemoryRecordStore, RecordStore};

pub use alerts::{AlertReconciler, ReconcileOutcome, SweepReport};
pub use catalog::CatalogService;
pub use dashboard::DashboardService;
pub use error::{ServiceError, ServiceResult};
pub use ledger::{HookFailure, InventoryLedger, StockObserver};
pub use purchasing::{AutoApproveReport, PurchaseOrderService};
pub use sales::SalesOrderService;
pub use users::UserService;

/// One store per record type.
#[derive(Clone)]
pub struct Stores {
    pub products: Arc<dyn RecordStore<Product>>,
    pub categories: Arc<dyn RecordStore<Category>>,
    pub warehouses: Arc<dyn RecordStore<Warehouse>>,
    pub inventory: Arc<dyn RecordStore<Inventory>>,
    pub alerts: Arc<dyn RecordStore<Alert>>,
    pub purchase_orders: Arc<dyn RecordStore<PurchaseOrder>>,
    pub sales_orders: Arc<dyn RecordStore<SalesOrder>>,
    pub users: Arc<dyn RecordStore<User>>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            products: InMemoryRecordStore::<Product>::arc(),
            categories: InMemoryRecordStore::<Category>::arc(),
            warehouses: InMemoryRecordStore::<Warehouse>::arc(),
            inventory: InMemoryRecordStore::<Inventory>::arc(),
            alerts: InMemoryRecordStore::<Alert>::arc(),
            purchase_orders: InMemoryRecordStore::<PurchaseOrder>::arc(),
            sales_orders: InMemoryRecordStore::<SalesOrder>::arc(),
            users: InMemoryRecordStore::<User>::arc(),
        }
    }
}

/// Fully wired service graph.
#[derive(Clone)]
pub struct Services {
    pub stores: Stores,
    pub ledger: Arc<InventoryLedger>,
    pub alerts: Arc<AlertReconciler>,
    pub purchasing: Arc<PurchaseOrderService>,
    pub sales: Arc<SalesOrderService>,
    pub catalog: Arc<CatalogService>,
    pub users: Arc<UserService>,
    pub dashboard: Arc<DashboardService>,
}

impl Services {
    pub fn new(stores: Stores, config: &AppConfig) -> Self {
        let alerts = Arc::new(AlertReconciler::new(
            stores.clone(),
            config.alerts.reorder_policy(),
        ));
        let ledger = Arc::new(
            InventoryLedger::new(
                stores.clone(),
                config.ledger.max_write_attempts,
                config.alerts.hook_failure_capacity,
            )
            .with_observer(alerts.clone()),
        );
        let purchasing = Arc::new(PurchaseOrderService::new(
            stores.clone(),
            ledger.clone(),
            config.scheduler.auto_approve_after(),
        ));
        let sales = Arc::new(SalesOrderService::new(stores.clone(), ledger.clone()));
        let catalog = Arc::new(CatalogService::new(
            stores.clone(),
            ledger.clone(),
            alerts.clone(),
        ));
        let users = Arc::new(UserService::new(stores.clone()));
        let dashboard = Arc::new(DashboardService::new(stores.clone()));

        Self {
            stores,
            ledger,
            alerts,
            purchasing,
            sales,
            catalog,
            users,
            dashboard,
        }
    }

    pub fn in_memory(config: &AppConfig) -> Self {
        Self::new(Stores::in_memory(), config)
    }
}

/// Permission check shared by every gated operation.
pub(crate) fn require(principal: &Principal, permission: &'static str) -> ServiceResult<()> {
    authorize(principal, &Permission::new(permission))?;
    Ok(())
}
