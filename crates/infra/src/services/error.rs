//! Application-level error taxonomy.
//!
//! Everything a service can fail with is flattened into one enum so a
//! transport layer can map it to a response without reaching into domain,
//! store or policy error types.

use ims_auth::{AuthzError, PasswordError};
use ims_core::DomainError;

use crate::store::StoreError;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("insufficient stock: {0}")]
    InsufficientStock(String),
    /// Optimistic concurrency retries exhausted (or a stale write).
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn not_found(what: &str, id: impl core::fmt::Display) -> Self {
        Self::NotFound(format!("{what} {id}"))
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => "not_found",
            ServiceError::AlreadyExists(_) => "already_exists",
            ServiceError::InvalidArgument(_) => "invalid_argument",
            ServiceError::InvalidState(_) => "invalid_state",
            ServiceError::InsufficientStock(_) => "insufficient_stock",
            ServiceError::Conflict(_) => "conflict",
            ServiceError::Unauthorized(_) => "unauthorized",
            ServiceError::Internal(_) => "internal",
        }
    }
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::NotFound(msg) => ServiceError::NotFound(msg),
            DomainError::AlreadyExists(msg) => ServiceError::AlreadyExists(msg),
            DomainError::InvalidArgument(msg) => ServiceError::InvalidArgument(msg),
            DomainError::InvalidId(msg) => ServiceError::InvalidArgument(msg),
            DomainError::InvalidState(msg) => ServiceError::InvalidState(msg),
            DomainError::InsufficientStock(msg) => ServiceError::InsufficientStock(msg),
            DomainError::Conflict(msg) => ServiceError::Conflict(msg),
            DomainError::Unauthorized => ServiceError::Unauthorized("unauthorized".to_string()),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(msg) => ServiceError::NotFound(msg),
            StoreError::AlreadyExists(msg) => ServiceError::AlreadyExists(msg),
            StoreError::Conflict(msg) => ServiceError::Conflict(msg),
            StoreError::Storage(msg) => ServiceError::Internal(msg),
        }
    }
}

impl From<AuthzError> for ServiceError {
    fn from(value: AuthzError) -> Self {
        ServiceError::Unauthorized(value.to_string())
    }
}

impl From<PasswordError> for ServiceError {
    fn from(value: PasswordError) -> Self {
        ServiceError::Internal(value.to_string())
    }
}

/// Attach a readable message to a uniqueness failure reported by a store.
pub(crate) fn unique<T>(
    result: Result<T, StoreError>,
    message: impl FnOnce() -> String,
) -> ServiceResult<T> {
    result.map_err(|e| match e {
        StoreError::AlreadyExists(_) => ServiceError::AlreadyExists(message()),
        other => other.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_keep_their_kind() {
        let err: ServiceError = DomainError::insufficient_stock("only 2 available").into();
        assert_eq!(err.code(), "insufficient_stock");
        let err: ServiceError = DomainError::invalid_id("ProductId: bad").into();
        assert_eq!(err.code(), "invalid_argument");
    }

    #[test]
    fn storage_failures_are_internal() {
        let err: ServiceError = StoreError::Storage("lock poisoned".to_string()).into();
        assert_eq!(err.code(), "internal");
    }

    #[test]
    fn unique_rewrites_only_already_exists() {
        let dup: Result<(), StoreError> = Err(StoreError::AlreadyExists("x".to_string()));
        assert_eq!(
            unique(dup, || "SKU ABC already in use".to_string()),
            Err(ServiceError::AlreadyExists("SKU ABC already in use".to_string()))
        );
        let missing: Result<(), StoreError> = Err(StoreError::NotFound("y".to_string()));
        assert!(matches!(
            unique(missing, || unreachable!()),
            Err(ServiceError::NotFound(_))
        ));
    }
}
