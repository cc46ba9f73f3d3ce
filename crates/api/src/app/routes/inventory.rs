use std::sync::Arc;

use axum::{extract::Extension, routing::get, Json, Router};

use stockadoodle_auth::Permission;
use stockadoodle_inventory::{InventoryAlerts, InventoryValuation};

use crate::app::dto::{ApiQuery, DaysQuery};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub const MAX_WINDOW_DAYS: u32 = 365;

pub fn router() -> Router {
    Router::new()
        .route("/alerts", get(alerts))
        .route("/value", get(value))
}

/// GET /inventory/alerts?days - low stock, out of stock, expiring and expired.
pub async fn alerts(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiQuery(q): ApiQuery<DaysQuery>,
) -> Result<Json<InventoryAlerts>, ApiError> {
    authz::require(&principal, &Permission::PRODUCTS_READ)?;
    Ok(Json(scan(&services, q.days).await?))
}

/// GET /inventory/value
pub async fn value(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Json<InventoryValuation>, ApiError> {
    authz::require(&principal, &Permission::REPORTS_READ)?;
    let products = services.store.list_products().await?;
    Ok(Json(InventoryValuation::compute(&products)?))
}

/// Scan every product with an expiry window of `days` (default from config).
pub(crate) async fn scan(services: &AppServices, days: Option<u32>) -> Result<InventoryAlerts, ApiError> {
    let days = days
        .unwrap_or(services.config.expiring_window_days)
        .min(MAX_WINDOW_DAYS);
    let products = services.store.list_products().await?;
    Ok(InventoryAlerts::scan(&products, services.today(), days))
}
