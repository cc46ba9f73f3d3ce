//! Activity-log administration.

use std::sync::Arc;

use axum::{extract::Extension, routing::get, Json, Router};

use stockadoodle_activity::{ActivityFilter, ActivityPage, ActivityQuery, ActivitySource, ActivitySummary};
use stockadoodle_auth::Permission;

use crate::app::dto::{self, ActivityLogQuery, ApiQuery};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/activity_logs", get(activity_logs))
        .route("/activity_logs/summary", get(activity_summary))
}

/// GET /admin/activity_logs?method&target&source&user_id&start_date&end_date&limit&offset
pub async fn activity_logs(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiQuery(q): ApiQuery<ActivityLogQuery>,
) -> Result<Json<ActivityPage>, ApiError> {
    authz::require(&principal, &Permission::LOGS_READ)?;

    let filter = ActivityFilter {
        product_id: q.product_id.as_deref().map(dto::parse_id).transpose()?,
        user_id: q.user_id.as_deref().map(dto::parse_id).transpose()?,
        action: q.action,
        source: q.source.as_deref().map(str::parse::<ActivitySource>).transpose()?,
        method: q.method,
        target_entity: q.target,
        since: q.start_date.as_deref().map(|s| dto::parse_bound(s, false)).transpose()?,
        until: q.end_date.as_deref().map(|s| dto::parse_bound(s, true)).transpose()?,
    };
    let query = ActivityQuery::new(filter, q.limit, q.offset);
    Ok(Json(services.store.query_activity(query).await?))
}

/// GET /admin/activity_logs/summary
pub async fn activity_summary(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Json<ActivitySummary>, ApiError> {
    authz::require(&principal, &Permission::LOGS_READ)?;
    Ok(Json(services.store.activity_summary(services.now()).await?))
}
