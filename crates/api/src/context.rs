use stockadoodle_auth::{Principal, Role};
use stockadoodle_core::UserId;

/// Principal context for a request (authenticated identity + role).
///
/// Inserted by the auth middleware after the token was validated and the
/// user re-loaded from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
}

impl PrincipalContext {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }

    pub fn user_id(&self) -> UserId {
        self.principal.user_id
    }

    pub fn username(&self) -> &str {
        &self.principal.username
    }

    pub fn role(&self) -> Role {
        self.principal.role
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }
}

/// Caller address as seen by the server, when the listener provides it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClientIp(pub Option<String>);
