use serde::{Deserialize, Serialize};

use ims_core::UserId;

use crate::{Permission, Role};

/// Name used by the background sweeps when they act on their own.
pub const SYSTEM_USERNAME: &str = "system";

/// A fully resolved caller identity for authorization decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: Option<UserId>,
    pub username: String,
    pub role: Role,
    pub permissions: Vec<Permission>,
}

impl Principal {
    pub fn new(user_id: Option<UserId>, username: impl Into<String>, role: Role) -> Self {
        Self {
            user_id,
            username: username.into(),
            role,
            permissions: role.permissions(),
        }
    }

    /// Internal actor used by scheduled sweeps.
    pub fn system() -> Self {
        Self::new(None, SYSTEM_USERNAME, Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
