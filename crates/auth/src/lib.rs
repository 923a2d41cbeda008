//! `ims-auth`: pure authorization boundary plus the user account record.
//!
//! Token issuance and transport concerns live outside this crate; callers
//! hand a resolved [`Principal`] to the application services.

pub mod authorize;
pub mod password;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod user;

pub use authorize::{AuthzError, authorize};
pub use password::{PasswordError, PasswordHash, generate_password};
pub use permissions::Permission;
pub use principal::Principal;
pub use roles::Role;
pub use user::{NewUser, User, UserUpdate, validate_new_password};
