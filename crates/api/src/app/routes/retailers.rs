use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    routing::get,
    Json, Router,
};
use serde_json::json;

use stockadoodle_auth::{Permission, Role};
use stockadoodle_core::{DomainError, UserId};
use stockadoodle_sales::{LeaderboardEntry, RetailerMetrics, leaderboard};

use crate::app::dto::{self, ApiQuery, LimitQuery};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/leaderboard", get(get_leaderboard))
        .route("/:id", get(get_retailer))
}

/// GET /retailer/leaderboard?limit - open to every signed-in user.
pub async fn get_leaderboard(
    Extension(services): Extension<Arc<AppServices>>,
    ApiQuery(q): ApiQuery<LimitQuery>,
) -> Result<Json<Vec<LeaderboardEntry>>, ApiError> {
    let rows = retailer_rows(&services).await?;
    Ok(Json(leaderboard(rows, services.today(), q.limit)))
}

/// GET /retailer/:id - metrics, target progress and achievements.
pub async fn get_retailer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id: UserId = dto::parse_id(&id)?;
    authz::require_self_or(&principal, id, &Permission::RETAILERS_READ)?;
    Ok(Json(retailer_overview(&services, id).await?))
}

/// Every retailer's metrics paired with its username.
pub(crate) async fn retailer_rows(services: &AppServices) -> Result<Vec<(RetailerMetrics, String)>, ApiError> {
    let names: HashMap<UserId, String> = services
        .store
        .list_users(Some(Role::Retailer))
        .await?
        .into_iter()
        .map(|u| (u.id, u.username))
        .collect();

    Ok(services
        .store
        .list_metrics()
        .await?
        .into_iter()
        .filter_map(|m| names.get(&m.retailer_id).cloned().map(|name| (m, name)))
        .collect())
}

pub(crate) async fn retailer_overview(services: &AppServices, id: UserId) -> Result<serde_json::Value, ApiError> {
    let user = services
        .store
        .get_user(id)
        .await?
        .filter(|u| u.role == Role::Retailer)
        .ok_or(DomainError::not_found("retailer"))?;
    let metrics = services
        .store
        .get_metrics(id)
        .await?
        .unwrap_or_else(|| RetailerMetrics::new(id));

    let today = services.today();
    Ok(json!({
        "retailer_id": id,
        "username": user.username,
        "current_streak": metrics.streak_on(today),
        "best_streak": metrics.best_streak,
        "last_sale_date": metrics.last_sale_date,
        "sales_today": metrics.sales_on(today),
        "total_sales": metrics.total_sales,
        "transactions": metrics.transactions,
        "progress": metrics.progress(services.config.daily_sales_target, today),
        "achievements": metrics.achievements(today),
    }))
}
