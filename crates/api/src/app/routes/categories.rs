use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use serde_json::json;

use stockadoodle_auth::Permission;
use stockadoodle_core::{CategoryId, DomainError};
use stockadoodle_inventory::{Category, CategoryInput};

use crate::app::dto::{self, ApiJson};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_categories).post(create_category))
        .route("/:id", put(update_category).delete(delete_category))
}

pub async fn list_categories(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Json<Vec<Category>>, ApiError> {
    authz::require(&principal, &Permission::CATEGORIES_READ)?;
    Ok(Json(services.store.list_categories().await?))
}

pub async fn create_category(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<CategoryInput>,
) -> Result<impl IntoResponse, ApiError> {
    authz::require(&principal, &Permission::CATEGORIES_WRITE)?;
    let category = services.store.create_category(Category::create(body)?).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn update_category(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<CategoryInput>,
) -> Result<Json<Category>, ApiError> {
    let id: CategoryId = dto::parse_id(&id)?;
    authz::require(&principal, &Permission::CATEGORIES_WRITE)?;

    let mut category = services
        .store
        .get_category(id)
        .await?
        .ok_or(DomainError::not_found("category"))?;
    category.update(body)?;
    Ok(Json(services.store.update_category(category).await?))
}

/// DELETE /categories/:id - products in the category become uncategorized.
pub async fn delete_category(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id: CategoryId = dto::parse_id(&id)?;
    authz::require(&principal, &Permission::CATEGORIES_WRITE)?;
    services.store.delete_category(id).await?;
    Ok(Json(json!({ "deleted": true, "id": id })))
}
