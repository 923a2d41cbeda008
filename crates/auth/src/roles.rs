use serde::{Deserialize, Serialize};

use crate::permissions::{self, Permission};

/// Role assigned to a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    Customer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Customer => "CUSTOMER",
        }
    }

    /// Role -> permission mapping.
    ///
    /// Convention: ADMIN grants the wildcard permission.
    pub fn permissions(&self) -> Vec<Permission> {
        match self {
            Role::Admin => vec![Permission::new("*")],
            Role::Customer => vec![
                Permission::new(permissions::CATALOG_READ),
                Permission::new(permissions::SALES_ORDERS_CREATE),
                Permission::new(permissions::SALES_ORDERS_READ),
            ],
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
