//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store, token issuer, MFA state
//! - `routes/`: HTTP routes + handlers (one file per domain area)
//! - `dto.rs`: request/response DTOs, extractors and query parsing
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router};
use tower::ServiceBuilder;

use stockadoodle_auth::CodeDelivery;
use stockadoodle_infra::{AppConfig, DynStore};

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// Build the full HTTP router from configuration (public entrypoint used by `main.rs`).
pub async fn build_app(config: AppConfig) -> anyhow::Result<Router> {
    let services = AppServices::from_config(config).await?;
    Ok(router(Arc::new(services)))
}

/// Build the router over an existing store and MFA delivery (tests use this).
pub fn build_app_with(config: AppConfig, store: DynStore, delivery: Arc<dyn CodeDelivery>) -> Router {
    router(Arc::new(AppServices::new(config, store, delivery)))
}

fn router(services: Arc<AppServices>) -> Router {
    // Protected routes: require a valid token for an active user; mutating
    // requests are recorded after the handler ran.
    let protected = routes::protected()
        .route_layer(axum::middleware::from_fn_with_state(
            services.clone(),
            middleware::activity_middleware,
        ))
        .route_layer(axum::middleware::from_fn_with_state(
            services.clone(),
            middleware::auth_middleware,
        ));

    let v1 = Router::new()
        .merge(routes::public())
        .merge(protected)
        .layer(Extension(services));

    Router::new()
        .nest("/api/v1", v1)
        .fallback(routes::system::not_found)
        .layer(ServiceBuilder::new().layer(axum::middleware::from_fn(middleware::trace_middleware)))
}
