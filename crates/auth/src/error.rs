use thiserror::Error;

use stockadoodle_core::DomainError;

use crate::{AuthzError, MfaError, TokenValidationError};

/// Failures of the login / token / MFA flows.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Unknown user, wrong password and inactive account all look the same.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error(transparent)]
    Token(#[from] TokenValidationError),

    #[error(transparent)]
    Mfa(#[from] MfaError),

    #[error(transparent)]
    Forbidden(#[from] AuthzError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}
