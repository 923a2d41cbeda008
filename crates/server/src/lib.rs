//! Process wiring: configuration, the service graph and its background jobs.

use anyhow::Context;
use tracing::{info, warn};

use ims_infra::scheduler::BackgroundJobs;
use ims_infra::{AppConfig, Services};

/// A running inventory service.
pub struct App {
    pub config: AppConfig,
    pub services: Services,
    jobs: Option<BackgroundJobs>,
}

impl App {
    pub fn jobs(&self) -> Option<&BackgroundJobs> {
        self.jobs.as_ref()
    }

    /// Stop the background loops, waiting for in-flight runs.
    pub fn shutdown(self) {
        if let Some(jobs) = self.jobs {
            jobs.shutdown();
        }
        info!("inventory service stopped");
    }
}

/// Load layered configuration, falling back to defaults when it is unusable.
pub fn load_config(config_dir: &str) -> AppConfig {
    match AppConfig::load(config_dir) {
        Ok(config) => config,
        Err(e) => {
            let config = AppConfig::default();
            ims_observability::init(&config.logging);
            warn!(error = %e, config_dir, "failed to load config; using defaults");
            config
        }
    }
}

/// Build the in-memory service graph and start the housekeeping jobs.
pub fn bootstrap(config: AppConfig) -> anyhow::Result<App> {
    let services = Services::in_memory(&config);
    let jobs = if config.scheduler.enabled {
        Some(
            BackgroundJobs::spawn(&services, &config.scheduler)
                .context("failed to start background jobs")?,
        )
    } else {
        warn!("scheduler disabled; low-stock and auto-approval sweeps will not run");
        None
    };

    info!(
        max_write_attempts = config.ledger.max_write_attempts,
        high_value_price_cents = config.alerts.high_value_price_cents,
        "inventory service started"
    );
    Ok(App {
        config,
        services,
        jobs,
    })
}
