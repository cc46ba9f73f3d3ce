//! API-side authorization guards.
//!
//! Handlers call these before touching the store, so a forbidden request
//! never has side effects.

use stockadoodle_auth::{AuthzError, Permission, authorize, authorize_self_or};
use stockadoodle_core::UserId;

use crate::context::PrincipalContext;

pub fn require(principal: &PrincipalContext, permission: &Permission) -> Result<(), AuthzError> {
    authorize(principal.principal(), permission)
}

/// Allow the subject itself, or anyone holding `permission`.
pub fn require_self_or(
    principal: &PrincipalContext,
    subject: UserId,
    permission: &Permission,
) -> Result<(), AuthzError> {
    authorize_self_or(principal.principal(), subject, permission)
}
