//! Infrastructure layer: configuration, record stores, application services
//! and background schedulers.

pub mod config;
pub mod scheduler;
pub mod services;
pub mod store;


pub use config::{AppConfig, ConfigError};
pub use services::{ServiceError, ServiceResult, Services, Stores};
