use axum::{
    routing::{get, post},
    Router,
};

pub mod admin;
pub mod auth;
pub mod categories;
pub mod dashboard;
pub mod inventory;
pub mod logs;
pub mod products;
pub mod reports;
pub mod retailers;
pub mod sales;
pub mod system;
pub mod users;

/// Endpoints reachable without a token.
pub fn public() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/auth/login", post(auth::login))
        .route("/auth/mfa/send", post(auth::mfa_send))
        .route("/auth/mfa/verify", post(auth::mfa_verify))
}

/// Router for all authenticated endpoints.
pub fn protected() -> Router {
    Router::new()
        .route("/auth/whoami", get(auth::whoami))
        .nest("/users", users::router())
        .nest("/categories", categories::router())
        .nest("/products", products::router())
        .nest("/inventory", inventory::router())
        .nest("/log", logs::router())
        .nest("/sales", sales::router())
        .nest("/retailer", retailers::router())
        .nest("/dashboard", dashboard::router())
        .nest("/reports", reports::router())
        .nest("/admin", admin::router())
}
