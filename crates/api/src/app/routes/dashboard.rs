use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    routing::get,
    Json, Router,
};
use serde_json::json;

use stockadoodle_auth::{Permission, Role};
use stockadoodle_core::UserId;
use stockadoodle_inventory::InventoryValuation;
use stockadoodle_sales::{DateRange, SalesSummary};

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::app::routes::{inventory, retailers};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/admin", get(admin_dashboard))
        .route("/manager", get(manager_dashboard))
        .route("/retailer/:id", get(retailer_dashboard))
}

/// GET /dashboard/admin
pub async fn admin_dashboard(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Json<serde_json::Value>, ApiError> {
    authz::require(&principal, &Permission::DASHBOARD_ADMIN)?;

    let users = services.store.list_users(None).await?;
    let count_role = |role: Role| users.iter().filter(|u| u.role == role).count();
    let products = services.store.list_products().await?;
    let categories = services.store.list_categories().await?;
    let sales = services.store.list_sales(DateRange::default()).await?;
    let summary = SalesSummary::from_sales(&sales, DateRange::default());
    let activity = services.store.activity_summary(services.now()).await?;

    Ok(Json(json!({
        "users": {
            "total": users.len(),
            "active": users.iter().filter(|u| u.active).count(),
            "admins": count_role(Role::Admin),
            "managers": count_role(Role::Manager),
            "retailers": count_role(Role::Retailer),
        },
        "products": products.len(),
        "categories": categories.len(),
        "sales": summary.transactions,
        "total_revenue": summary.total_revenue,
        "activity": {
            "total": activity.total_logs,
            "recent_24h": activity.recent_24h,
        },
    })))
}

/// GET /dashboard/manager
pub async fn manager_dashboard(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Json<serde_json::Value>, ApiError> {
    authz::require(&principal, &Permission::DASHBOARD_MANAGER)?;

    let alerts = inventory::scan(&services, None).await?;
    let products = services.store.list_products().await?;
    let valuation = InventoryValuation::compute(&products)?;

    let today = services.today();
    let range = DateRange::new(
        Some(dto::parse_bound(&today.to_string(), false)?),
        Some(dto::parse_bound(&today.to_string(), true)?),
    )?;
    let todays_sales = services.store.list_sales(range).await?;
    let summary = SalesSummary::from_sales(&todays_sales, range);

    Ok(Json(json!({
        "low_stock": alerts.low_stock.len(),
        "out_of_stock": alerts.out_of_stock.len(),
        "expiring_soon": alerts.expiring_soon.len(),
        "expired": alerts.expired.len(),
        "inventory_value": valuation.total_value,
        "today": {
            "revenue": summary.total_revenue,
            "transactions": summary.transactions,
            "units_sold": summary.units_sold,
        },
        "daily_target": services.config.daily_sales_target,
        "target_met": summary.total_revenue >= services.config.daily_sales_target,
    })))
}

/// GET /dashboard/retailer/:id
pub async fn retailer_dashboard(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id: UserId = dto::parse_id(&id)?;
    authz::require_self_or(&principal, id, &Permission::RETAILERS_READ)?;

    let mut overview = retailers::retailer_overview(&services, id).await?;
    let rank = stockadoodle_sales::leaderboard(retailers::retailer_rows(&services).await?, services.today(), Some(100))
        .into_iter()
        .find(|e| e.retailer_id == id)
        .map(|e| e.rank);
    overview["rank"] = json!(rank);
    Ok(Json(overview))
}
