//! User accounts and credential checks.

use chrono::Utc;
use tracing::{info, warn};

use ims_auth::password::MIN_PASSWORD_LEN;
use ims_auth::permissions::USERS_MANAGE;
use ims_auth::{
    NewUser, PasswordHash, Principal, Role, User, UserUpdate, generate_password,
    validate_new_password,
};
use ims_core::{AggregateRoot, ExpectedVersion, UserId};

use super::error::{ServiceError, ServiceResult};
use super::{Stores, require};
use crate::store::{RecordStore, StoreError};

pub struct UserService {
    stores: Stores,
}

impl UserService {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    pub fn create_user(&self, principal: &Principal, input: NewUser) -> ServiceResult<User> {
        require(principal, USERS_MANAGE)?;
        self.insert(input)
    }

    /// Self-service sign-up; always creates a CUSTOMER.
    pub fn register(&self, input: NewUser) -> ServiceResult<User> {
        self.insert(NewUser {
            role: Role::Customer,
            ..input
        })
    }

    pub fn update_user(
        &self,
        principal: &Principal,
        user_id: UserId,
        update: UserUpdate,
    ) -> ServiceResult<User> {
        require(principal, USERS_MANAGE)?;
        let mut user = self.get(user_id)?;
        let version = user.version();
        user.apply_update(update, Utc::now())?;
        let key = user.email_key();
        self.stores
            .users
            .update_unless(user, ExpectedVersion::Exact(version), &|u| {
                u.id != user_id && u.email_key() == key
            })
            .map_err(|e| match e {
                StoreError::AlreadyExists(_) => {
                    ServiceError::AlreadyExists(format!("email {key} is already registered"))
                }
                other => other.into(),
            })
    }

    pub fn set_password(
        &self,
        principal: &Principal,
        user_id: UserId,
        password: &str,
    ) -> ServiceResult<User> {
        require(principal, USERS_MANAGE)?;
        ensure_password_length(password)?;
        self.store_password(user_id, password)
    }

    /// Users may change their own password; admins may change anyone's.
    pub fn change_password(
        &self,
        principal: &Principal,
        user_id: UserId,
        current: &str,
        new: &str,
    ) -> ServiceResult<User> {
        if principal.user_id != Some(user_id) {
            require(principal, USERS_MANAGE)?;
        }
        let user = self.get(user_id)?;
        if !user.password_hash.verify(current)? {
            return Err(ServiceError::InvalidArgument(
                "current password is incorrect".to_string(),
            ));
        }
        validate_new_password(current, new)?;
        self.store_password(user_id, new)
    }

    /// Replace the password with a random one and return it in plain text.
    pub fn reset_password(&self, principal: &Principal, user_id: UserId) -> ServiceResult<String> {
        require(principal, USERS_MANAGE)?;
        let password = generate_password();
        self.store_password(user_id, &password)?;
        info!(user_id = %user_id, by = %principal.username, "password reset");
        Ok(password)
    }

    pub fn toggle_enabled(&self, principal: &Principal, user_id: UserId) -> ServiceResult<User> {
        require(principal, USERS_MANAGE)?;
        let mut user = self.get(user_id)?;
        let version = user.version();
        user.toggle_enabled(Utc::now());
        let saved = self
            .stores
            .users
            .update(user, ExpectedVersion::Exact(version))?;
        info!(user_id = %user_id, enabled = saved.enabled, "user enabled flag toggled");
        Ok(saved)
    }

    pub fn delete_user(&self, principal: &Principal, user_id: UserId) -> ServiceResult<()> {
        require(principal, USERS_MANAGE)?;
        self.stores
            .users
            .delete(&user_id)?
            .ok_or_else(|| ServiceError::not_found("user", user_id))?;
        info!(user_id = %user_id, by = %principal.username, "user deleted");
        Ok(())
    }

    /// Resolve credentials to a principal. Unknown user and wrong password
    /// fail the same way.
    pub fn authenticate(&self, username: &str, password: &str) -> ServiceResult<Principal> {
        let invalid = || ServiceError::Unauthorized("invalid credentials".to_string());
        let Some(user) = self.by_username(username)? else {
            return Err(invalid());
        };
        if !user.password_hash.verify(password)? {
            warn!(username = %user.username, "failed login attempt");
            return Err(invalid());
        }
        if !user.enabled {
            return Err(ServiceError::Unauthorized("account disabled".to_string()));
        }
        Ok(user.principal())
    }

    pub fn get(&self, user_id: UserId) -> ServiceResult<User> {
        self.stores
            .users
            .get(&user_id)?
            .ok_or_else(|| ServiceError::not_found("user", user_id))
    }

    pub fn list(&self) -> ServiceResult<Vec<User>> {
        Ok(self.stores.users.list()?)
    }

    pub fn by_username(&self, username: &str) -> ServiceResult<Option<User>> {
        let key = username.trim().to_lowercase();
        Ok(self
            .stores
            .users
            .find(&|u| u.username_key() == key)?
            .into_iter()
            .next())
    }

    fn insert(&self, input: NewUser) -> ServiceResult<User> {
        ensure_password_length(&input.password)?;
        let hash = PasswordHash::hash(&input.password)?;
        let user = User::create(UserId::new(), &input, hash, Utc::now())?;
        let (username, email) = (user.username_key(), user.email_key());

        let saved = self
            .stores
            .users
            .insert_unless(user, &|u| u.username_key() == username || u.email_key() == email)
            .map_err(|e| match e {
                StoreError::AlreadyExists(_) => {
                    let taken = self.by_username(&username).ok().flatten().is_some();
                    ServiceError::AlreadyExists(if taken {
                        format!("username {username} is already taken")
                    } else {
                        format!("email {email} is already registered")
                    })
                }
                other => other.into(),
            })?;
        info!(user_id = %saved.id, username = %saved.username, role = saved.role.as_str(), "user created");
        Ok(saved)
    }

    fn store_password(&self, user_id: UserId, password: &str) -> ServiceResult<User> {
        let hash = PasswordHash::hash(password)?;
        let mut user = self.get(user_id)?;
        let version = user.version();
        user.set_password_hash(hash, Utc::now());
        Ok(self
            .stores
            .users
            .update(user, ExpectedVersion::Exact(version))?)
    }
}

fn ensure_password_length(password: &str) -> ServiceResult<()> {
    if password.trim().chars().count() < MIN_PASSWORD_LEN {
        return Err(ServiceError::InvalidArgument(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{admin, customer};

    fn test_service() -> UserService {
        UserService::new(Stores::in_memory())
    }

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password: "s3cret!".to_string(),
            role: Role::Admin,
        }
    }

    #[test]
    fn register_forces_customer_role_and_authenticates() {
        let users = test_service();
        let user = users.register(new_user("erin", "erin@example.com")).unwrap();
        assert_eq!(user.role, Role::Customer);

        let principal = users.authenticate("ERIN", "s3cret!").unwrap();
        assert_eq!(principal.user_id, Some(user.id));
        assert!(!principal.is_admin());
        assert!(matches!(
            users.authenticate("erin", "wrong"),
            Err(ServiceError::Unauthorized(_))
        ));
        assert!(matches!(
            users.authenticate("nobody", "s3cret!"),
            Err(ServiceError::Unauthorized(_))
        ));
    }

    #[test]
    fn uniqueness_reports_the_conflicting_field() {
        let users = test_service();
        users.create_user(&admin(), new_user("frank", "frank@example.com")).unwrap();
        match users.create_user(&admin(), new_user("Frank", "other@example.com")) {
            Err(ServiceError::AlreadyExists(msg)) if msg.contains("username") => {}
            other => panic!("Expected AlreadyExists, got {other:?}"),
        }
        match users.create_user(&admin(), new_user("gina", "FRANK@example.com")) {
            Err(ServiceError::AlreadyExists(msg)) if msg.contains("email") => {}
            other => panic!("Expected AlreadyExists, got {other:?}"),
        }
        assert!(matches!(
            users.create_user(&customer(), new_user("hank", "hank@example.com")),
            Err(ServiceError::Unauthorized(_))
        ));
    }

    #[test]
    fn change_password_rules() {
        let users = test_service();
        let user = users.register(new_user("ivan", "ivan@example.com")).unwrap();
        let me = user.principal();

        assert!(matches!(
            users.change_password(&me, user.id, "wrong!", "newpass1"),
            Err(ServiceError::InvalidArgument(_))
        ));
        assert!(matches!(
            users.change_password(&me, user.id, "s3cret!", "short"),
            Err(ServiceError::InvalidArgument(_))
        ));
        users
            .change_password(&me, user.id, "s3cret!", "newpass1")
            .unwrap();
        users.authenticate("ivan", "newpass1").unwrap();

        let stranger = customer();
        assert!(matches!(
            users.change_password(&stranger, user.id, "newpass1", "another1"),
            Err(ServiceError::Unauthorized(_))
        ));
    }

    #[test]
    fn disabled_accounts_cannot_log_in_and_reset_returns_password() {
        let users = test_service();
        let user = users.register(new_user("judy", "judy@example.com")).unwrap();

        let disabled = users.toggle_enabled(&admin(), user.id).unwrap();
        assert!(!disabled.enabled);
        match users.authenticate("judy", "s3cret!") {
            Err(ServiceError::Unauthorized(msg)) if msg.contains("disabled") => {}
            other => panic!("Expected Unauthorized, got {other:?}"),
        }
        users.toggle_enabled(&admin(), user.id).unwrap();

        let fresh = users.reset_password(&admin(), user.id).unwrap();
        assert_eq!(fresh.len(), 8);
        users.authenticate("judy", &fresh).unwrap();

        users.delete_user(&admin(), user.id).unwrap();
        assert!(matches!(users.get(user.id), Err(ServiceError::NotFound(_))));
    }
}
