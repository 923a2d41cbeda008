use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;

use ims_auth::{Principal, Role};
use ims_core::{ProductId, WarehouseId};
use ims_infra::AppConfig;
use ims_infra::store::RecordStore;
use ims_infra::scheduler::RunOutcome;
use ims_inventory::{NewWarehouse, Warehouse};
use ims_products::{NewProduct, Product};
use ims_purchasing::{NewPurchaseOrder, NewPurchaseOrderItem, PurchaseOrderStatus};

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.scheduler.low_stock_sweep_secs = 3600;
    config.scheduler.auto_approve_interval_secs = 3600;
    config.scheduler.auto_approve_after_secs = 0;
    config
}

fn seed(app: &ims_server::App, available: i64) -> (ProductId, WarehouseId) {
    let stores = &app.services.stores;
    let product = stores
        .products
        .insert(
            Product::create(
                ProductId::new(),
                NewProduct {
                    name: "Cable".to_string(),
                    sku: "CBL-1".to_string(),
                    unit_price: 900,
                    minimum_stock_threshold: Some(10),
                    ..Default::default()
                },
                Utc::now(),
            )
            .unwrap(),
        )
        .unwrap();
    let warehouse = stores
        .warehouses
        .insert(
            Warehouse::create(
                WarehouseId::new(),
                NewWarehouse {
                    name: "Hub".to_string(),
                    location: "Rotterdam".to_string(),
                    contact_details: None,
                },
            )
            .unwrap(),
        )
        .unwrap();
    app.services
        .ledger
        .create(product.id_typed(), warehouse.id, available)
        .unwrap();
    (product.id_typed(), warehouse.id)
}

fn wait_for(cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn triggered_sweep_raises_missing_alert() {
    let app = ims_server::bootstrap(test_config()).unwrap();
    seed(&app, 4);
    app.services.stores.alerts.delete_where(&|_| true).unwrap();

    let jobs = app.jobs().unwrap();
    wait_for(|| jobs.low_stock.stats().runs >= 1);
    jobs.low_stock.trigger();
    wait_for(|| app.services.alerts.count_active().unwrap() == 1);

    app.shutdown();
}

#[test]
fn auto_approval_job_receives_stale_orders() {
    let app = ims_server::bootstrap(test_config()).unwrap();
    let (product_id, warehouse_id) = seed(&app, 20);
    let admin = Principal::new(None, "admin", Role::Admin);
    let order = app
        .services
        .purchasing
        .create(
            &admin,
            NewPurchaseOrder {
                warehouse_id,
                supplier_name: "Cables Ltd".to_string(),
                contact_info: None,
                notes: None,
                items: vec![NewPurchaseOrderItem {
                    product_id,
                    quantity_ordered: 6,
                    unit_price: 700,
                    notes: None,
                }],
            },
        )
        .unwrap();

    // Age threshold is zero, so any strictly older order qualifies.
    thread::sleep(Duration::from_millis(5));
    let jobs = app.jobs().unwrap();
    match jobs.auto_approve.run_now() {
        RunOutcome::Completed | RunOutcome::Skipped => {}
        RunOutcome::Failed => panic!("auto-approval run failed"),
    }
    jobs.auto_approve.trigger();
    wait_for(|| {
        app.services.purchasing.get(order.id_typed()).unwrap().status()
            == PurchaseOrderStatus::Received
    });
    assert_eq!(
        app.services
            .ledger
            .require_pair(product_id, warehouse_id)
            .unwrap()
            .available(),
        26
    );

    app.shutdown();
}

#[test]
fn disabled_scheduler_starts_no_jobs() {
    let mut config = test_config();
    config.scheduler.enabled = false;
    let app = ims_server::bootstrap(config).unwrap();
    assert!(app.jobs().is_none());
    app.shutdown();
}
