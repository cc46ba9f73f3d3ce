use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are opaque strings (e.g. "products.write"). The wildcard `"*"`
/// grants everything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const ALL: Permission = Permission::fixed("*");
    pub const USERS_READ: Permission = Permission::fixed("users.read");
    pub const USERS_WRITE: Permission = Permission::fixed("users.write");
    pub const CATEGORIES_READ: Permission = Permission::fixed("categories.read");
    pub const CATEGORIES_WRITE: Permission = Permission::fixed("categories.write");
    pub const PRODUCTS_READ: Permission = Permission::fixed("products.read");
    pub const PRODUCTS_WRITE: Permission = Permission::fixed("products.write");
    pub const INVENTORY_ADJUST: Permission = Permission::fixed("inventory.adjust");
    pub const INVENTORY_DISPOSE: Permission = Permission::fixed("inventory.dispose");
    pub const SALES_RECORD: Permission = Permission::fixed("sales.record");
    pub const SALES_READ: Permission = Permission::fixed("sales.read");
    pub const SALES_UNDO: Permission = Permission::fixed("sales.undo");
    pub const REPORTS_READ: Permission = Permission::fixed("reports.read");
    pub const LOGS_READ: Permission = Permission::fixed("logs.read");
    pub const LOGS_WRITE: Permission = Permission::fixed("logs.write");
    pub const RETAILERS_READ: Permission = Permission::fixed("retailers.read");
    pub const DASHBOARD_ADMIN: Permission = Permission::fixed("dashboard.admin");
    pub const DASHBOARD_MANAGER: Permission = Permission::fixed("dashboard.manager");

    const fn fixed(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
