use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;

use stockadoodle_auth::{NewUser, Permission, Role, User, UserPatch, UserView, hash_password};
use stockadoodle_core::{DomainError, UserId};

use crate::app::dto::{self, ApiJson, ApiQuery, UserListQuery};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/:id", get(get_user).put(update_user).delete(delete_user))
}

/// GET /users?role=
pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiQuery(q): ApiQuery<UserListQuery>,
) -> Result<Json<Vec<UserView>>, ApiError> {
    authz::require(&principal, &Permission::USERS_READ)?;
    let role = q.role.as_deref().map(str::parse::<Role>).transpose()?;
    let users = services.store.list_users(role).await?;
    Ok(Json(users.iter().map(User::view).collect()))
}

/// POST /users
pub async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<NewUser>,
) -> Result<impl IntoResponse, ApiError> {
    authz::require(&principal, &Permission::USERS_WRITE)?;
    body.validate()?;

    let hash = hash_password(&body.password)?;
    let user = User::create(body, hash, services.now())?;
    let user = services.store.create_user(user).await?;
    tracing::info!(username = %user.username, role = %user.role, "user created");
    Ok((StatusCode::CREATED, Json(user.view())))
}

/// GET /users/:id - anyone may read their own account.
pub async fn get_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Json<UserView>, ApiError> {
    let id: UserId = dto::parse_id(&id)?;
    authz::require_self_or(&principal, id, &Permission::USERS_READ)?;
    let user = load(&services, id).await?;
    Ok(Json(user.view()))
}

/// PUT /users/:id
pub async fn update_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(patch): ApiJson<UserPatch>,
) -> Result<Json<UserView>, ApiError> {
    let id: UserId = dto::parse_id(&id)?;
    authz::require(&principal, &Permission::USERS_WRITE)?;
    if patch.is_empty() {
        return Err(DomainError::validation("no fields to update").into());
    }
    if id == principal.user_id() && patch.active == Some(false) {
        return Err(DomainError::validation("you cannot deactivate your own account").into());
    }
    patch.validate()?;

    let mut user = load(&services, id).await?;
    let hash = patch.password.as_deref().map(hash_password).transpose()?;
    user.apply_patch(&patch, hash)?;
    let user = services.store.update_user(user).await?;
    Ok(Json(user.view()))
}

/// DELETE /users/:id - sales and activity entries of the user are kept.
pub async fn delete_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: UserId = dto::parse_id(&id)?;
    authz::require(&principal, &Permission::USERS_WRITE)?;
    if id == principal.user_id() {
        return Err(DomainError::validation("you cannot delete your own account").into());
    }

    services.store.delete_user(id).await?;
    Ok(Json(json!({ "deleted": true, "id": id })))
}

async fn load(services: &AppServices, id: UserId) -> Result<User, ApiError> {
    services
        .store
        .get_user(id)
        .await?
        .ok_or_else(|| DomainError::not_found("user").into())
}
