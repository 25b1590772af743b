use thiserror::Error;

use crate::models::UserId;

/// Errors shared by the engine and the HTTP surface.
#[derive(Debug, Error)]
pub enum CourierError {
    /// No identity token, or the token names a user that no longer exists.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Token present but invalid or expired, or the caller may not act for
    /// the named user.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Malformed request shape. Nothing was mutated.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The store could not complete the operation. Nothing was pushed.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// Directory has no entry for this user.
    #[error("user {0} not found")]
    LookupMiss(UserId),
}

impl CourierError {
    pub fn persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}
