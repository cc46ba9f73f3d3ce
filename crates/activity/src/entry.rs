use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use stockadoodle_core::{DomainError, LogId, ProductId, UserId};

/// Where an action originated.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivitySource {
    #[serde(rename = "Desktop App")]
    DesktopApp,
    #[serde(rename = "API")]
    Api,
}

impl ActivitySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivitySource::DesktopApp => "Desktop App",
            ActivitySource::Api => "API",
        }
    }
}

impl core::fmt::Display for ActivitySource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for ActivitySource {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "desktop app" | "desktop" => Ok(ActivitySource::DesktopApp),
            "api" => Ok(ActivitySource::Api),
            other => Err(DomainError::validation(format!(
                "unknown activity source '{other}' (expected 'Desktop App' or 'API')"
            ))),
        }
    }
}

/// Stock or catalog action recorded against a single product.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductAction {
    Restock,
    Sale,
    Dispose,
    Adjust,
    Created,
    Updated,
    Deleted,
    SaleReverted,
}

impl ProductAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductAction::Restock => "Restock",
            ProductAction::Sale => "Sale",
            ProductAction::Dispose => "Dispose",
            ProductAction::Adjust => "Adjust",
            ProductAction::Created => "Created",
            ProductAction::Updated => "Updated",
            ProductAction::Deleted => "Deleted",
            ProductAction::SaleReverted => "SaleReverted",
        }
    }
}

impl core::fmt::Display for ProductAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP request metadata for entries produced by the API logging middleware.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestInfo {
    pub method: String,
    pub path: String,
    pub target_entity: Option<String>,
    pub target_id: Option<String>,
    pub ip_address: Option<String>,
    pub status: Option<u16>,
}

impl RequestInfo {
    /// Derive target entity/id from an API path such as
    /// `/api/v1/products/<uuid>/stock`.
    pub fn from_path(method: &str, path: &str) -> Self {
        let segments: Vec<&str> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        let mut target_entity = None;
        let mut target_id = None;
        for (idx, segment) in segments.iter().enumerate() {
            let entity = match *segment {
                "users" => "user",
                "products" => "product",
                "categories" => "category",
                "sales" => "sale",
                _ => continue,
            };
            target_entity = Some(entity.to_string());
            target_id = segments
                .get(idx + 1)
                .filter(|s| uuid_like(s))
                .map(|s| s.to_string());
            break;
        }

        Self {
            method: method.to_ascii_uppercase(),
            path: path.to_string(),
            target_entity,
            target_id,
            ip_address: None,
            status: None,
        }
    }
}

fn uuid_like(s: &str) -> bool {
    s.len() == 36 && s.chars().all(|c| c.is_ascii_hexdigit() || c == '-')
}

/// One append-only activity log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: LogId,
    pub product_id: Option<ProductId>,
    pub user_id: Option<UserId>,
    pub action: String,
    pub source: ActivitySource,
    pub notes: Option<String>,
    #[serde(default)]
    pub details: JsonValue,
    pub request: Option<RequestInfo>,
    pub logged_at: DateTime<Utc>,
}

impl ActivityEntry {
    /// A stock or catalog action on one product.
    ///
    /// Without explicit notes the entry reads "Action performed via <source>".
    pub fn product(
        product_id: ProductId,
        user_id: Option<UserId>,
        action: ProductAction,
        notes: Option<String>,
        source: ActivitySource,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: LogId::new(),
            product_id: Some(product_id),
            user_id,
            action: action.as_str().to_string(),
            source,
            notes: Some(notes.unwrap_or_else(|| format!("Action performed via {source}"))),
            details: JsonValue::Null,
            request: None,
            logged_at: at,
        }
    }

    /// A general user action (login, user management, desktop UI events).
    pub fn user_action(
        user_id: Option<UserId>,
        action: impl Into<String>,
        target: impl Into<String>,
        details: JsonValue,
        source: ActivitySource,
        ip_address: Option<String>,
        at: DateTime<Utc>,
    ) -> Self {
        let mut payload = serde_json::json!({
            "target": target.into(),
            "details": if details.is_null() { serde_json::json!({}) } else { details },
        });
        if let Some(ip) = ip_address {
            payload["ip_address"] = JsonValue::String(ip);
        }

        Self {
            id: LogId::new(),
            product_id: None,
            user_id,
            action: action.into(),
            source,
            notes: None,
            details: payload,
            request: None,
            logged_at: at,
        }
    }

    /// A mutating HTTP request observed by the API middleware.
    ///
    /// The action reads `"<METHOD> <path>"`.
    pub fn api_operation(request: RequestInfo, user_id: Option<UserId>, at: DateTime<Utc>) -> Self {
        Self {
            id: LogId::new(),
            product_id: None,
            user_id,
            action: format!("{} {}", request.method, request.path),
            source: ActivitySource::Api,
            notes: None,
            details: JsonValue::Null,
            request: Some(request),
            logged_at: at,
        }
    }

    pub fn method(&self) -> Option<&str> {
        self.request.as_ref().map(|r| r.method.as_str())
    }

    pub fn target_entity(&self) -> Option<&str> {
        self.request.as_ref().and_then(|r| r.target_entity.as_deref())
    }
}
