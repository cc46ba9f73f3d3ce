//! `stockadoodle-auth`: identity and access boundary.
//!
//! Users and their credentials, role based permissions, JWT issuing and
//! validation, and one-time MFA codes. No HTTP and no storage in here.

pub mod authorize;
pub mod claims;
pub mod error;
pub mod mfa;
pub mod password;
pub mod permissions;
pub mod roles;
pub mod token;
pub mod user;

pub use authorize::{AuthzError, Principal, authorize, authorize_self_or};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use error::AuthError;
pub use mfa::{CodeDelivery, IssuedCode, LogDelivery, MemoryDelivery, MfaError, MfaService, MfaSettings};
pub use password::{hash_password, verify_password};
pub use permissions::Permission;
pub use roles::Role;
pub use token::{Hs256Jwt, IssuedToken, JwtValidator};
pub use user::{NewUser, User, UserPatch, UserView};
