//! User accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockadoodle_core::{DomainResult, Entity, UserId, Violations, nullable};

use crate::Role;

pub const USERNAME_MIN: usize = 3;
pub const USERNAME_MAX: usize = 50;
pub const PASSWORD_MIN: usize = 4;
pub const PASSWORD_MAX: usize = 128;
pub const EMAIL_MAX: usize = 120;

/// A stored account. The password is only ever held as an Argon2 PHC hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub role: Role,
    pub password_hash: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Entity for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Registration payload.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
    pub role: Role,
}

impl NewUser {
    pub fn validate(&self) -> DomainResult<()> {
        let mut v = Violations::new();
        check_username(&mut v, &self.username);
        check_password(&mut v, &self.password);
        if let Some(email) = &self.email {
            check_email(&mut v, email);
        }
        v.finish()
    }
}

/// Partial update. `email: null` clears the address.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default, deserialize_with = "nullable::deserialize")]
    pub email: Option<Option<String>>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub active: Option<bool>,
}

impl UserPatch {
    pub fn validate(&self) -> DomainResult<()> {
        let mut v = Violations::new();
        if let Some(username) = &self.username {
            check_username(&mut v, username);
        }
        if let Some(password) = &self.password {
            check_password(&mut v, password);
        }
        if let Some(Some(email)) = &self.email {
            check_email(&mut v, email);
        }
        v.finish()
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.password.is_none()
            && self.email.is_none()
            && self.role.is_none()
            && self.active.is_none()
    }
}

impl User {
    /// Build a validated account from a registration payload.
    ///
    /// Hashing is the caller's job so this stays free of crypto cost.
    pub fn create(new: NewUser, password_hash: String, now: DateTime<Utc>) -> DomainResult<Self> {
        new.validate()?;
        Ok(Self {
            id: UserId::new(),
            username: new.username.trim().to_string(),
            email: new.email.map(|e| e.trim().to_string()).filter(|e| !e.is_empty()),
            role: new.role,
            password_hash,
            active: true,
            created_at: now,
        })
    }

    /// Apply a validated patch. `password_hash` replaces the stored hash when set.
    pub fn apply_patch(&mut self, patch: &UserPatch, password_hash: Option<String>) -> DomainResult<()> {
        patch.validate()?;
        if let Some(username) = &patch.username {
            self.username = username.trim().to_string();
        }
        if let Some(email) = &patch.email {
            self.email = email
                .as_ref()
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty());
        }
        if let Some(role) = patch.role {
            self.role = role;
        }
        if let Some(active) = patch.active {
            self.active = active;
        }
        if let Some(hash) = password_hash {
            self.password_hash = hash;
        }
        Ok(())
    }

    pub fn view(&self) -> UserView {
        UserView::from(self)
    }
}

/// Public projection of a user (no password hash).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserView {
    pub id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub role: Role,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserView {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            username: u.username.clone(),
            email: u.email.clone(),
            role: u.role,
            active: u.active,
            created_at: u.created_at,
        }
    }
}

fn check_username(v: &mut Violations, username: &str) {
    let name = username.trim();
    let len = name.chars().count();
    v.check(
        !(USERNAME_MIN..=USERNAME_MAX).contains(&len),
        format!("username must be {USERNAME_MIN}-{USERNAME_MAX} characters"),
    );
    v.check(
        !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'),
        "username may only contain letters, digits, '_' and '-'",
    );
}

fn check_password(v: &mut Violations, password: &str) {
    let len = password.chars().count();
    v.check(
        !(PASSWORD_MIN..=PASSWORD_MAX).contains(&len),
        format!("password must be {PASSWORD_MIN}-{PASSWORD_MAX} characters"),
    );
}

fn check_email(v: &mut Violations, email: &str) {
    let email = email.trim();
    if email.is_empty() {
        return;
    }
    v.check(
        !(email.contains('@') && email.contains('.')),
        "email must contain '@' and '.'",
    );
    v.check(
        email.chars().count() > EMAIL_MAX,
        format!("email must be at most {EMAIL_MAX} characters"),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockadoodle_core::DomainError;

    fn new_user(username: &str, password: &str, email: Option<&str>) -> NewUser {
        NewUser {
            username: username.into(),
            password: password.into(),
            email: email.map(str::to_string),
            role: Role::Retailer,
        }
    }

    #[test]
    fn create_trims_and_activates() {
        let u = User::create(
            new_user(" rita ", "pass", Some(" rita@shop.io ")),
            "hash".into(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(u.username, "rita");
        assert_eq!(u.email.as_deref(), Some("rita@shop.io"));
        assert!(u.active);
    }

    #[test]
    fn rejects_bad_username_password_and_email_together() {
        let err = new_user("a!", "abc", Some("nope")).validate().unwrap_err();
        let DomainError::Validation(msg) = err else {
            panic!("expected validation error");
        };
        assert!(msg.contains("username must be 3-50"));
        assert!(msg.contains("letters, digits"));
        assert!(msg.contains("password must be 4-128"));
        assert!(msg.contains("email must contain"));
    }

    #[test]
    fn patch_can_clear_email_and_deactivate() {
        let mut u = User::create(new_user("rita", "pass", Some("r@x.io")), "h".into(), Utc::now()).unwrap();
        let patch: UserPatch = serde_json::from_str(r#"{"email": null, "active": false}"#).unwrap();
        u.apply_patch(&patch, None).unwrap();
        assert_eq!(u.email, None);
        assert!(!u.active);
        assert_eq!(u.password_hash, "h");
    }

    #[test]
    fn view_hides_password_hash() {
        let u = User::create(new_user("rita", "pass", None), "secret-hash".into(), Utc::now()).unwrap();
        let json = serde_json::to_string(&u.view()).unwrap();
        assert!(!json.contains("secret-hash"));
        assert!(json.contains("\"role\":\"Retailer\""));
    }
}
