use serde::Serialize;
use thiserror::Error;

use stockadoodle_core::UserId;

use crate::{Permission, Role};

/// An authenticated caller, resolved from a verified token and the user store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub user_id: UserId,
    pub username: String,
    pub role: Role,
    pub permissions: Vec<Permission>,
}

impl Principal {
    pub fn new(user_id: UserId, username: impl Into<String>, role: Role) -> Self {
        Self {
            user_id,
            username: username.into(),
            role,
            permissions: role.permissions(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Pure policy check: wildcard or an exact permission match.
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    let granted = principal
        .permissions
        .iter()
        .any(|p| p.is_wildcard() || p == required);

    if granted {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

/// Allow access to the caller's own record, otherwise require `required`.
pub fn authorize_self_or(
    principal: &Principal,
    subject: UserId,
    required: &Permission,
) -> Result<(), AuthzError> {
    if principal.user_id == subject {
        return Ok(());
    }
    authorize(principal, required)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_wildcard_allows_anything() {
        let p = Principal::new(UserId::new(), "admin", Role::Admin);
        assert!(authorize(&p, &Permission::USERS_WRITE).is_ok());
        assert!(authorize(&p, &Permission::new("made.up")).is_ok());
    }

    #[test]
    fn retailer_is_denied_user_management() {
        let p = Principal::new(UserId::new(), "rita", Role::Retailer);
        assert_eq!(
            authorize(&p, &Permission::USERS_READ),
            Err(AuthzError::Forbidden("users.read".into()))
        );
        assert!(authorize(&p, &Permission::SALES_RECORD).is_ok());
    }

    #[test]
    fn self_access_bypasses_permission() {
        let p = Principal::new(UserId::new(), "rita", Role::Retailer);
        assert!(authorize_self_or(&p, p.user_id, &Permission::RETAILERS_READ).is_ok());
        assert!(authorize_self_or(&p, UserId::new(), &Permission::RETAILERS_READ).is_err());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig { cases: 1000, .. ProptestConfig::default() })]

            /// Property: the wildcard grants any permission name.
            #[test]
            fn admin_is_never_forbidden(name in "[a-z]{1,12}\\.[a-z]{1,12}") {
                let p = Principal::new(UserId::new(), "admin", Role::Admin);
                prop_assert!(authorize(&p, &Permission::new(name)).is_ok());
            }

            /// Property: roles without the wildcard only pass for what they were granted.
            #[test]
            fn non_admins_get_exactly_their_grants(name in "[a-z]{1,12}\\.[a-z]{1,12}", manager in any::<bool>()) {
                let role = if manager { Role::Manager } else { Role::Retailer };
                let p = Principal::new(UserId::new(), "someone", role);
                let required = Permission::new(name);
                let granted = role.permissions().contains(&required);
                prop_assert_eq!(authorize(&p, &required).is_ok(), granted);
            }
        }
    }
}
