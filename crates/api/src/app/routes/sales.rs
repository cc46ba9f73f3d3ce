//! Point-of-sale endpoints.
//!
//! A sale is recorded for the authenticated principal. Stock, metrics,
//! activity entries and the sale itself change together or not at all.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;

use stockadoodle_auth::Permission;
use stockadoodle_core::{DomainError, SaleId};
use stockadoodle_infra::Actor;
use stockadoodle_sales::{NewSale, Sale, SalesSummary};

use crate::app::dto::{self, ApiJson, ApiQuery, RangeQuery};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_sales).post(record_sale))
        .route("/reports", get(sales_report))
        .route("/:id", get(get_sale).delete(undo_sale))
}

/// POST /sales
pub async fn record_sale(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<NewSale>,
) -> Result<impl IntoResponse, ApiError> {
    authz::require(&principal, &Permission::SALES_RECORD)?;
    let sale = services
        .store
        .record_sale(body, principal.user_id(), services.now())
        .await?;
    tracing::info!(
        sale_id = %sale.id,
        retailer = %principal.username(),
        total = sale.total_amount.as_decimal(),
        "sale recorded"
    );
    Ok((StatusCode::CREATED, Json(sale)))
}

/// GET /sales?start&end
pub async fn list_sales(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiQuery(q): ApiQuery<RangeQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    authz::require(&principal, &Permission::SALES_READ)?;
    let sales = services.store.list_sales(q.range()?).await?;
    Ok(Json(json!({ "count": sales.len(), "sales": sales })))
}

/// GET /sales/:id - retailers may read their own sales.
pub async fn get_sale(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Json<Sale>, ApiError> {
    let id: SaleId = dto::parse_id(&id)?;
    let sale = services
        .store
        .get_sale(id)
        .await?
        .ok_or(DomainError::not_found("sale"))?;
    authz::require_self_or(&principal, sale.retailer_id, &Permission::SALES_READ)?;
    Ok(Json(sale))
}

/// DELETE /sales/:id - undo: restore stock and revert the retailer's metrics.
pub async fn undo_sale(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id: SaleId = dto::parse_id(&id)?;
    authz::require(&principal, &Permission::SALES_UNDO)?;
    let sale = services
        .store
        .undo_sale(id, Actor::api(principal.user_id()), services.now())
        .await?;
    tracing::info!(sale_id = %sale.id, "sale reverted");
    Ok(Json(json!({ "reverted": true, "sale": sale })))
}

/// GET /sales/reports?start&end
pub async fn sales_report(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiQuery(q): ApiQuery<RangeQuery>,
) -> Result<Json<SalesSummary>, ApiError> {
    authz::require(&principal, &Permission::REPORTS_READ)?;
    let range = q.range()?;
    let sales = services.store.list_sales(range).await?;
    Ok(Json(SalesSummary::from_sales(&sales, range)))
}
