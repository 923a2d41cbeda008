use std::borrow::Cow;

use serde::{Deserialize, Serialize};

pub const CATALOG_READ: &str = "catalog.read";
pub const CATALOG_MANAGE: &str = "catalog.manage";
pub const ALERTS_MANAGE: &str = "alerts.manage";
pub const PURCHASE_ORDERS_MANAGE: &str = "purchasing.orders.manage";
pub const SALES_ORDERS_CREATE: &str = "sales.orders.create";
pub const SALES_ORDERS_READ: &str = "sales.orders.read";
pub const SALES_ORDERS_MANAGE: &str = "sales.orders.manage";
pub const USERS_MANAGE: &str = "users.manage";

/// Permission identifier.
///
/// Permissions are modeled as opaque strings (e.g. "catalog.manage").
/// The wildcard permission `"*"` grants everything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
