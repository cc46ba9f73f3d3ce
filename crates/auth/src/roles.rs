use serde::{Deserialize, Serialize};

use stockadoodle_core::DomainError;

use crate::permissions::Permission;

/// The three account roles.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum Role {
    Admin,
    Manager,
    Retailer,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Manager, Role::Retailer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Manager => "Manager",
            Role::Retailer => "Retailer",
        }
    }

    /// Admins and managers confirm logins with a one-time code.
    pub fn requires_mfa(&self) -> bool {
        matches!(self, Role::Admin | Role::Manager)
    }

    /// Permissions granted by this role.
    pub fn permissions(&self) -> Vec<Permission> {
        match self {
            Role::Admin => vec![Permission::ALL],
            Role::Manager => vec![
                Permission::USERS_READ,
                Permission::CATEGORIES_READ,
                Permission::CATEGORIES_WRITE,
                Permission::PRODUCTS_READ,
                Permission::PRODUCTS_WRITE,
                Permission::INVENTORY_ADJUST,
                Permission::INVENTORY_DISPOSE,
                Permission::SALES_RECORD,
                Permission::SALES_READ,
                Permission::SALES_UNDO,
                Permission::REPORTS_READ,
                Permission::LOGS_READ,
                Permission::LOGS_WRITE,
                Permission::RETAILERS_READ,
                Permission::DASHBOARD_MANAGER,
            ],
            Role::Retailer => vec![
                Permission::CATEGORIES_READ,
                Permission::PRODUCTS_READ,
                Permission::SALES_RECORD,
                Permission::LOGS_WRITE,
            ],
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "retailer" => Ok(Role::Retailer),
            other => Err(DomainError::validation(format!(
                "invalid role '{other}' (expected Admin, Manager or Retailer)"
            ))),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
