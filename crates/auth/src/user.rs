//! User account record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ims_core::error::ensure_not_blank;
use ims_core::{AggregateRoot, DomainError, DomainResult, UserId};

use crate::password::{MIN_PASSWORD_LEN, PasswordHash};
use crate::{Principal, Role};

/// Input for creating a user. The password arrives in plain text and is
/// hashed before the record is built.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub role: Option<Role>,
}

/// User account.
///
/// # Invariants
/// - `username` and `email` are unique (enforced by the store).
/// - Disabled users cannot authenticate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub password_hash: PasswordHash,
    pub role: Role,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl User {
    pub fn create(
        id: UserId,
        input: &NewUser,
        password_hash: PasswordHash,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        ensure_not_blank("username", &input.username)?;
        validate_email(&input.email)?;
        Ok(Self {
            id,
            username: input.username.trim().to_string(),
            email: input.email.trim().to_string(),
            password_hash,
            role: input.role,
            enabled: true,
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    pub fn apply_update(&mut self, update: UserUpdate, now: DateTime<Utc>) -> DomainResult<()> {
        if let Some(email) = &update.email {
            validate_email(email)?;
            self.email = email.trim().to_string();
        }
        if let Some(role) = update.role {
            self.role = role;
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn set_password_hash(&mut self, hash: PasswordHash, now: DateTime<Utc>) {
        self.password_hash = hash;
        self.updated_at = now;
    }

    pub fn toggle_enabled(&mut self, now: DateTime<Utc>) {
        self.enabled = !self.enabled;
        self.updated_at = now;
    }

    pub fn principal(&self) -> Principal {
        Principal::new(Some(self.id), self.username.clone(), self.role)
    }

    /// Key used for username uniqueness.
    pub fn username_key(&self) -> String {
        self.username.to_lowercase()
    }

    /// Key used for email uniqueness.
    pub fn email_key(&self) -> String {
        self.email.to_lowercase()
    }
}

impl AggregateRoot for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

fn validate_email(email: &str) -> DomainResult<()> {
    ensure_not_blank("email", email)?;
    let trimmed = email.trim();
    match trimmed.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(DomainError::invalid_argument(format!(
            "email '{trimmed}' is not valid"
        ))),
    }
}

/// Rules for a user-chosen replacement password. The caller has already
/// checked the current password.
pub fn validate_new_password(current: &str, new: &str) -> DomainResult<()> {
    if new.trim().is_empty() {
        return Err(DomainError::invalid_argument("new password cannot be empty"));
    }
    if new.chars().count() < MIN_PASSWORD_LEN {
        return Err(DomainError::invalid_argument(format!(
            "new password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if new == current {
        return Err(DomainError::invalid_argument(
            "new password must be different from the current password",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user() -> User {
        let input = NewUser {
            username: "dana".to_string(),
            email: "dana@example.com".to_string(),
            password: "irrelevant".to_string(),
            role: Role::Customer,
        };
        User::create(
            UserId::new(),
            &input,
            PasswordHash::from_hash("$argon2id$stub".to_string()),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn new_users_are_enabled() {
        let user = test_user();
        assert!(user.enabled);
        assert_eq!(user.principal().role, Role::Customer);
    }

    #[test]
    fn invalid_email_is_rejected() {
        let mut user = test_user();
        let update = UserUpdate {
            email: Some("nope".to_string()),
            role: None,
        };
        assert!(matches!(
            user.apply_update(update, Utc::now()),
            Err(DomainError::InvalidArgument(_))
        ));
        assert_eq!(user.email, "dana@example.com");
    }

    #[test]
    fn toggle_flips_enabled() {
        let mut user = test_user();
        user.toggle_enabled(Utc::now());
        assert!(!user.enabled);
        user.toggle_enabled(Utc::now());
        assert!(user.enabled);
    }

    #[test]
    fn new_password_rules() {
        assert!(validate_new_password("oldpass", "").is_err());
        assert!(validate_new_password("oldpass", "abc").is_err());
        assert!(validate_new_password("oldpass", "oldpass").is_err());
        assert!(validate_new_password("oldpass", "newpass1").is_ok());
    }
}
