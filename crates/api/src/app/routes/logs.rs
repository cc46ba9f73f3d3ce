//! Product and user activity logs, disposals and desktop-client events.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use stockadoodle_activity::{ActivityEntry, ActivityFilter, ActivityPage, ActivityQuery, ActivitySource};
use stockadoodle_auth::Permission;
use stockadoodle_core::{DomainError, ProductId, UserId};
use stockadoodle_infra::{Actor, StockRequest};
use stockadoodle_inventory::{StockChange, StockMovement};

use crate::app::dto::{self, ApiJson, ApiQuery, DesktopLogRequest, DisposeRequest, PagingQuery};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{ClientIp, PrincipalContext};

const ACTION_MAX: usize = 100;

pub fn router() -> Router {
    Router::new()
        .route("/dispose", post(dispose))
        .route("/desktop", post(desktop_event))
        .route("/product/:id", get(product_log))
        .route("/user/:id", get(user_log))
}

/// POST /log/dispose - write off damaged or expired units.
pub async fn dispose(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<DisposeRequest>,
) -> Result<Json<StockChange>, ApiError> {
    authz::require(&principal, &Permission::INVENTORY_DISPOSE)?;
    let quantity = u32::try_from(body.quantity)
        .map_err(|_| DomainError::validation("quantity must be a positive number"))?;

    let change = services
        .store
        .apply_stock(
            StockRequest {
                product_id: body.product_id,
                movement: StockMovement::Dispose(quantity),
                actor: Actor::api(principal.user_id()),
                notes: body.notes,
            },
            services.now(),
        )
        .await?;
    Ok(Json(change))
}

/// POST /log/desktop - record a UI event reported by the desktop client.
pub async fn desktop_event(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(ClientIp(ip)): Extension<ClientIp>,
    ApiJson(body): ApiJson<DesktopLogRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authz::require(&principal, &Permission::LOGS_WRITE)?;
    let action = body.action.trim();
    if action.is_empty() || action.chars().count() > ACTION_MAX {
        return Err(DomainError::validation(format!("action must be 1-{ACTION_MAX} characters")).into());
    }

    let entry = ActivityEntry::user_action(
        Some(principal.user_id()),
        action,
        body.target.unwrap_or_else(|| "desktop".to_string()),
        body.details,
        ActivitySource::DesktopApp,
        ip,
        services.now(),
    );
    let log_id = entry.id;
    services.store.append_activity(entry).await?;
    Ok((StatusCode::CREATED, Json(json!({ "log_id": log_id }))))
}

/// GET /log/product/:id
pub async fn product_log(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiQuery(q): ApiQuery<PagingQuery>,
) -> Result<Json<ActivityPage>, ApiError> {
    let id: ProductId = dto::parse_id(&id)?;
    authz::require(&principal, &Permission::LOGS_READ)?;
    let query = ActivityQuery::new(ActivityFilter::for_product(id), q.limit, q.offset);
    Ok(Json(services.store.query_activity(query).await?))
}

/// GET /log/user/:id - users may always read their own log.
pub async fn user_log(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiQuery(q): ApiQuery<PagingQuery>,
) -> Result<Json<ActivityPage>, ApiError> {
    let id: UserId = dto::parse_id(&id)?;
    authz::require_self_or(&principal, id, &Permission::LOGS_READ)?;
    let query = ActivityQuery::new(ActivityFilter::for_user(id), q.limit, q.offset);
    Ok(Json(services.store.query_activity(query).await?))
}
