use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{ConnectInfo, OriginalUri, Request, State},
    http::{HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::Instrument;

use stockadoodle_activity::{ActivityEntry, RequestInfo};
use stockadoodle_auth::{JwtValidator, Principal};

use crate::app::AppServices;
use crate::app::errors::{ApiError, json_error};
use crate::context::{ClientIp, PrincipalContext};

/// Validate the bearer token, re-load the user and attach a
/// [`PrincipalContext`]. Deleted or deactivated users are rejected even with
/// an unexpired token, and the role always comes from the store.
pub async fn auth_middleware(
    State(services): State<Arc<AppServices>>,
    mut req: Request,
    next: Next,
) -> Response {
    let claims = match extract_bearer(req.headers()) {
        Ok(token) => match services.jwt.validate(token, services.now()) {
            Ok(claims) => claims,
            Err(e) => return json_error(StatusCode::UNAUTHORIZED, "unauthorized", e.to_string()),
        },
        Err(resp) => return resp,
    };

    let user = match services.store.get_user(claims.sub).await {
        Ok(Some(user)) if user.active => user,
        Ok(_) => {
            return json_error(StatusCode::UNAUTHORIZED, "unauthorized", "account is no longer active");
        }
        Err(e) => return ApiError::from(e).into_response(),
    };

    req.extensions_mut().insert(PrincipalContext::new(Principal::new(
        user.id,
        user.username,
        user.role,
    )));

    next.run(req).await
}

/// Record every mutating request as an API operation once the handler has
/// produced its response. Recording never alters the response.
pub async fn activity_middleware(
    State(services): State<Arc<AppServices>>,
    req: Request,
    next: Next,
) -> Response {
    if !is_mutating(req.method()) {
        return next.run(req).await;
    }

    let method = req.method().clone();
    let path = req
        .extensions()
        .get::<OriginalUri>()
        .map(|OriginalUri(uri)| uri.path().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let user_id = req.extensions().get::<PrincipalContext>().map(|p| p.user_id());
    let ip = req.extensions().get::<ClientIp>().and_then(|c| c.0.clone());

    let response = next.run(req).await;

    let mut request = RequestInfo::from_path(method.as_str(), &path);
    request.ip_address = ip;
    request.status = Some(response.status().as_u16());
    services
        .record(ActivityEntry::api_operation(request, user_id, services.now()))
        .await;

    response
}

/// One span per request; also captures the caller address for handlers.
pub async fn trace_middleware(mut req: Request, next: Next) -> Response {
    let ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    req.extensions_mut().insert(ClientIp(ip));

    let span = tracing::info_span!("request", method = %req.method(), path = %req.uri().path());
    let started = Instant::now();
    let response = next.run(req).instrument(span.clone()).await;

    span.in_scope(|| {
        tracing::debug!(
            status = response.status().as_u16(),
            latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "request finished"
        );
    });
    response
}

fn is_mutating(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH | Method::DELETE)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, Response> {
    let unauthorized = |msg: &str| json_error(StatusCode::UNAUTHORIZED, "unauthorized", msg);

    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or_else(|| unauthorized("missing bearer token"))?;

    let header = header.to_str().map_err(|_| unauthorized("malformed authorization header"))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| unauthorized("missing bearer token"))?
        .trim();

    if token.is_empty() {
        return Err(unauthorized("missing bearer token"));
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn bearer_token_is_extracted() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_bearer(&headers).ok(), Some("abc.def"));
    }

    #[test]
    fn other_schemes_are_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        let resp = extract_bearer(&headers).unwrap_err();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(extract_bearer(&HeaderMap::new()).is_err());
    }

    #[test]
    fn only_writes_are_recorded() {
        assert!(is_mutating(&Method::DELETE));
        assert!(!is_mutating(&Method::GET));
    }
}
