use std::io;
use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use super::{PeriodicTask, Scheduler, SchedulerHandle};
use crate::config::SchedulerConfig;
use crate::services::{AlertReconciler, PurchaseOrderService, ServiceResult, Services};

/// Hourly pass raising and resolving low-stock alerts.
pub struct LowStockSweep {
    alerts: Arc<AlertReconciler>,
}

impl LowStockSweep {
    pub fn new(alerts: Arc<AlertReconciler>) -> Self {
        Self { alerts }
    }
}

impl PeriodicTask for LowStockSweep {
    fn name(&self) -> &'static str {
        "low-stock-sweep"
    }

    fn run(&self) -> ServiceResult<()> {
        self.alerts.sweep().map(|_| ())
    }
}

/// Pushes stale PENDING purchase orders through to RECEIVED.
pub struct AutoApproveSweep {
    purchasing: Arc<PurchaseOrderService>,
}

impl AutoApproveSweep {
    pub fn new(purchasing: Arc<PurchaseOrderService>) -> Self {
        Self { purchasing }
    }
}

impl PeriodicTask for AutoApproveSweep {
    fn name(&self) -> &'static str {
        "auto-approve-sweep"
    }

    fn run(&self) -> ServiceResult<()> {
        self.purchasing.auto_approve_pending(Utc::now()).map(|_| ())
    }
}

/// Both housekeeping loops, started together.
pub struct BackgroundJobs {
    pub low_stock: SchedulerHandle,
    pub auto_approve: SchedulerHandle,
}

impl BackgroundJobs {
    pub fn spawn(services: &Services, config: &SchedulerConfig) -> io::Result<Self> {
        let low_stock = Arc::new(Scheduler::new(Arc::new(LowStockSweep::new(
            services.alerts.clone(),
        ))))
        .spawn(config.low_stock_sweep_interval())?;
        let auto_approve = match Arc::new(Scheduler::new(Arc::new(AutoApproveSweep::new(
            services.purchasing.clone(),
        ))))
        .spawn(config.auto_approve_interval())
        {
            Ok(handle) => handle,
            Err(e) => {
                low_stock.shutdown();
                return Err(e);
            }
        };

        info!(
            low_stock_secs = config.low_stock_sweep_secs,
            auto_approve_secs = config.auto_approve_interval_secs,
            "background jobs started"
        );
        Ok(Self {
            low_stock,
            auto_approve,
        })
    }

    pub fn shutdown(self) {
        self.low_stock.shutdown();
        self.auto_approve.shutdown();
        info!("background jobs stopped");
    }
}
