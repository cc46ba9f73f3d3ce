use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use stockadoodle_auth::Permission;
use stockadoodle_core::{CategoryId, DomainError, PageRequest, ProductId};
use stockadoodle_infra::{Actor, StockRequest};
use stockadoodle_inventory::{NewProduct, Product, ProductPatch, ProductQuery, ProductView, StockChange};

use crate::app::dto::{self, ApiJson, ApiQuery, ImageQuery, ProductListQuery, StockRequestBody};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/:id", get(get_product).put(update_product).delete(delete_product))
        .route("/:id/stock", post(update_stock))
}

/// GET /products?category_id&search&page&per_page&include_image
pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiQuery(q): ApiQuery<ProductListQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    authz::require(&principal, &Permission::PRODUCTS_READ)?;

    let query = ProductQuery {
        category_id: q.category_id.as_deref().map(dto::parse_id::<CategoryId>).transpose()?,
        search: q.search,
        page: PageRequest::new(q.page, q.per_page),
    };
    let page = query
        .apply(services.store.list_products().await?)
        .map(|p| p.view(q.include_image));

    Ok(Json(json!({
        "products": page.items,
        "total": page.total,
        "page": page.page,
        "per_page": page.per_page,
        "pages": page.pages,
    })))
}

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<NewProduct>,
) -> Result<impl IntoResponse, ApiError> {
    authz::require(&principal, &Permission::PRODUCTS_WRITE)?;
    let product = body.into_product(services.now())?;
    let product = services
        .store
        .create_product(product, Actor::api(principal.user_id()))
        .await?;
    Ok((StatusCode::CREATED, Json(product.view(false))))
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiQuery(q): ApiQuery<ImageQuery>,
) -> Result<Json<ProductView>, ApiError> {
    let id: ProductId = dto::parse_id(&id)?;
    authz::require(&principal, &Permission::PRODUCTS_READ)?;
    Ok(Json(load(&services, id).await?.view(q.include_image)))
}

pub async fn update_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(patch): ApiJson<ProductPatch>,
) -> Result<Json<ProductView>, ApiError> {
    let id: ProductId = dto::parse_id(&id)?;
    authz::require(&principal, &Permission::PRODUCTS_WRITE)?;

    let mut product = load(&services, id).await?;
    product.apply_patch(patch, services.now())?;
    let product = services
        .store
        .update_product(product, Actor::api(principal.user_id()))
        .await?;
    Ok(Json(product.view(false)))
}

pub async fn delete_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id: ProductId = dto::parse_id(&id)?;
    authz::require(&principal, &Permission::PRODUCTS_WRITE)?;
    services
        .store
        .delete_product(id, Actor::api(principal.user_id()), services.now())
        .await?;
    Ok(Json(json!({ "deleted": true, "id": id })))
}

/// POST /products/:id/stock {action: restock|adjust|set, ...}
pub async fn update_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<StockRequestBody>,
) -> Result<Json<StockChange>, ApiError> {
    let product_id: ProductId = dto::parse_id(&id)?;
    authz::require(&principal, &Permission::INVENTORY_ADJUST)?;

    let movement = dto::stock_movement(&body)?;
    let change = services
        .store
        .apply_stock(
            StockRequest {
                product_id,
                movement,
                actor: Actor::api(principal.user_id()),
                notes: body.notes,
            },
            services.now(),
        )
        .await?;
    tracing::info!(%product_id, previous = change.previous, current = change.current, "stock updated");
    Ok(Json(change))
}

async fn load(services: &AppServices, id: ProductId) -> Result<Product, ApiError> {
    services
        .store
        .get_product(id)
        .await?
        .ok_or_else(|| DomainError::not_found("product").into())
}
