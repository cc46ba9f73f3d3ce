//! Login, second factor and identity endpoints.
//!
//! Roles that require MFA never receive a token from `/auth/login`; they get
//! a 202 and must finish through `/auth/mfa/verify`.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde_json::json;

use stockadoodle_activity::{ActivityEntry, ActivitySource};
use stockadoodle_auth::{AuthError, User, verify_password};

use crate::app::dto::{ApiJson, LoginRequest, MfaSendRequest, MfaVerifyRequest, SessionResponse};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::{ClientIp, PrincipalContext};

/// POST /auth/login
pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ClientIp(ip)): Extension<ClientIp>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> Result<Response, ApiError> {
    let now = services.now();
    let user = authenticate(&services, &body.username, &body.password).await?;

    if services.mfa.is_required(user.role) {
        send_code(&services, &user, now).await?;
        services
            .record(ActivityEntry::user_action(
                Some(user.id),
                "mfa_code_sent",
                "auth",
                json!({}),
                ActivitySource::Api,
                ip,
                now,
            ))
            .await;
        let body = json!({
            "mfa_required": true,
            "expires_in_minutes": services.mfa.settings().expiry.num_minutes(),
        });
        return Ok((StatusCode::ACCEPTED, Json(body)).into_response());
    }

    let session = issue_session(&services, &user, now, ip).await?;
    Ok(Json(session).into_response())
}

/// POST /auth/mfa/send - issue a fresh code, replacing any pending one.
pub async fn mfa_send(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<MfaSendRequest>,
) -> Result<Response, ApiError> {
    let user = active_user(&services, &body.username).await?;
    if !services.mfa.is_required(user.role) {
        return Err(ApiError::forbidden("MFA is not required for this account"));
    }

    send_code(&services, &user, services.now()).await?;
    Ok(Json(json!({
        "sent": true,
        "expires_in_minutes": services.mfa.settings().expiry.num_minutes(),
    }))
    .into_response())
}

/// POST /auth/mfa/verify
pub async fn mfa_verify(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ClientIp(ip)): Extension<ClientIp>,
    ApiJson(body): ApiJson<MfaVerifyRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let now = services.now();
    let user = active_user(&services, &body.username).await?;
    services
        .mfa
        .verify(&user.username, &body.code, now)
        .map_err(AuthError::from)?;

    Ok(Json(issue_session(&services, &user, now, ip).await?))
}

/// GET /auth/whoami
pub async fn whoami(Extension(principal): Extension<PrincipalContext>) -> impl IntoResponse {
    let p = principal.principal();
    Json(json!({
        "user_id": p.user_id,
        "username": p.username,
        "role": p.role,
        "permissions": p.permissions,
    }))
}

async fn active_user(services: &AppServices, username: &str) -> Result<User, ApiError> {
    match services.store.find_user_by_username(username.trim()).await? {
        Some(user) if user.active => Ok(user),
        _ => Err(AuthError::InvalidCredentials.into()),
    }
}

/// Unknown user, inactive account and wrong password are one error.
async fn authenticate(services: &AppServices, username: &str, password: &str) -> Result<User, ApiError> {
    let user = active_user(services, username).await?;
    if !verify_password(&user.password_hash, password) {
        return Err(AuthError::InvalidCredentials.into());
    }
    Ok(user)
}

async fn send_code(services: &AppServices, user: &User, now: DateTime<Utc>) -> Result<(), ApiError> {
    let issued = services.mfa.issue(&user.username, now);
    services
        .delivery
        .deliver(&user.username, user.email.as_deref(), &issued)
        .await
        .map_err(AuthError::from)?;
    Ok(())
}

async fn issue_session(
    services: &AppServices,
    user: &User,
    now: DateTime<Utc>,
    ip: Option<String>,
) -> Result<SessionResponse, ApiError> {
    let issued = services.jwt.issue(user, now).map_err(AuthError::from)?;
    services
        .record(ActivityEntry::user_action(
            Some(user.id),
            "login",
            "auth",
            json!({ "role": user.role }),
            ActivitySource::Api,
            ip,
            now,
        ))
        .await;
    tracing::info!(username = %user.username, role = %user.role, "login");
    Ok(SessionResponse::new(issued, user.view()))
}
