//! Configuration loading and representation.
//!
//! Layers, lowest precedence first: built-in defaults, `{dir}/default.toml`,
//! `{dir}/{IMS_ENV}.toml`, then `IMS_`-prefixed environment variables with
//! `__` separating nested keys (e.g. `IMS_SCHEDULER__ENABLED=false`).

use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use ims_alerts::ReorderPolicy;
use ims_observability::LoggingSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(#[from] figment::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_low_stock_sweep_secs")]
    pub low_stock_sweep_secs: u64,
    #[serde(default = "default_auto_approve_interval_secs")]
    pub auto_approve_interval_secs: u64,
    /// Minimum age of a PENDING purchase order before it is auto-approved.
    #[serde(default = "default_auto_approve_after_secs")]
    pub auto_approve_after_secs: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_low_stock_sweep_secs() -> u64 {
    3600
}

fn default_auto_approve_interval_secs() -> u64 {
    30
}

fn default_auto_approve_after_secs() -> u64 {
    60
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            low_stock_sweep_secs: default_low_stock_sweep_secs(),
            auto_approve_interval_secs: default_auto_approve_interval_secs(),
            auto_approve_after_secs: default_auto_approve_after_secs(),
        }
    }
}

impl SchedulerConfig {
    pub fn low_stock_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.low_stock_sweep_secs.max(1))
    }

    pub fn auto_approve_interval(&self) -> Duration {
        Duration::from_secs(self.auto_approve_interval_secs.max(1))
    }

    pub fn auto_approve_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.auto_approve_after_secs.min(i64::MAX as u64) as i64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Read-validate-write attempts before a contended row reports a conflict.
    #[serde(default = "default_max_write_attempts")]
    pub max_write_attempts: u32,
}

fn default_max_write_attempts() -> u32 {
    5
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_write_attempts: default_max_write_attempts(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertsConfig {
    #[serde(default = "default_high_value_price_cents")]
    pub high_value_price_cents: u64,
    /// How many suppressed post-commit failures the ledger keeps for inspection.
    #[serde(default = "default_hook_failure_capacity")]
    pub hook_failure_capacity: usize,
}

fn default_high_value_price_cents() -> u64 {
    ims_alerts::reorder::DEFAULT_HIGH_VALUE_PRICE_CENTS
}

fn default_hook_failure_capacity() -> usize {
    256
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            high_value_price_cents: default_high_value_price_cents(),
            hook_failure_capacity: default_hook_failure_capacity(),
        }
    }
}

impl AlertsConfig {
    pub fn reorder_policy(&self) -> ReorderPolicy {
        ReorderPolicy {
            high_value_price_cents: self.high_value_price_cents,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
}

impl AppConfig {
    /// Load from config files in `config_dir` and the environment.
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("IMS_ENV").unwrap_or_else(|_| "development".to_string());
        Self::figment(config_dir, &env).extract().map_err(ConfigError::from)
    }

    pub fn figment(config_dir: &str, env: &str) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(format!("{config_dir}/default.toml")))
            .merge(Toml::file(format!("{config_dir}/{env}.toml")))
            .merge(Env::prefixed("IMS_").split("__"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_files() {
        figment::Jail::expect_with(|_jail| {
            let config: AppConfig = AppConfig::figment("missing-dir", "test").extract()?;
            assert_eq!(config.scheduler.low_stock_sweep_secs, 3600);
            assert_eq!(config.scheduler.auto_approve_interval_secs, 30);
            assert_eq!(config.scheduler.auto_approve_after_secs, 60);
            assert_eq!(config.ledger.max_write_attempts, 5);
            assert_eq!(config.alerts.high_value_price_cents, 100_000);
            Ok(())
        });
    }

    #[test]
    fn files_and_env_layer_in_order() {
        figment::Jail::expect_with(|jail| {
            jail.create_dir("config")?;
            jail.create_file(
                "config/default.toml",
                r#"
                [scheduler]
                auto_approve_interval_secs = 10
                low_stock_sweep_secs = 600

                [logging]
                json = false
                "#,
            )?;
            jail.create_file(
                "config/staging.toml",
                r#"
                [scheduler]
                low_stock_sweep_secs = 120
                "#,
            )?;
            jail.set_env("IMS_LEDGER__MAX_WRITE_ATTEMPTS", "9");

            let config: AppConfig = AppConfig::figment("config", "staging").extract()?;
            assert_eq!(config.scheduler.auto_approve_interval_secs, 10);
            assert_eq!(config.scheduler.low_stock_sweep_secs, 120);
            assert_eq!(config.ledger.max_write_attempts, 9);
            assert!(!config.logging.json);
            assert_eq!(config.logging.level, "info");
            Ok(())
        });
    }
}
