use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::json;

use stockadoodle_auth::{JwtClaims, MemoryDelivery};
use stockadoodle_infra::{AppConfig, InMemoryStore, Store, seed_defaults};

const JWT_SECRET: &str = "test-secret";
const ADMIN_PASSWORD: &str = "admin-pass";

struct TestServer {
    base_url: String,
    store: Arc<InMemoryStore>,
    delivery: Arc<MemoryDelivery>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let store = Arc::new(InMemoryStore::new());
        seed_defaults(store.as_ref(), ADMIN_PASSWORD, Utc::now())
            .await
            .expect("failed to seed store");
        let delivery = Arc::new(MemoryDelivery::new());

        let config = AppConfig {
            jwt_secret: JWT_SECRET.to_string(),
            seed_defaults: false,
            ..AppConfig::default()
        };
        // Same router as prod, bound to an ephemeral port.
        let app = stockadoodle_api::app::build_app_with(config, store.clone(), delivery.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}/api/v1", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
                .await
                .unwrap();
        });

        Self {
            base_url,
            store,
            delivery,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn user_id(&self, username: &str) -> String {
        let user = self
            .store
            .find_user_by_username(username)
            .await
            .unwrap()
            .expect("seeded user");
        user.id.to_string()
    }

    /// A token for one of the seeded accounts, minted without the login flow.
    async fn token_for(&self, username: &str) -> String {
        let user = self
            .store
            .find_user_by_username(username)
            .await
            .unwrap()
            .expect("seeded user");
        let now = Utc::now();
        let claims = JwtClaims::new(user.id, user.username, user.role, now, now + ChronoDuration::minutes(10));
        mint_jwt(JWT_SECRET, claims)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(jwt_secret: &str, claims: JwtClaims) -> String {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

async fn create_product(
    client: &reqwest::Client,
    srv: &TestServer,
    token: &str,
    body: serde_json::Value,
) -> serde_json::Value {
    let res = client
        .post(srv.url("/products"))
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    res.json().await.unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;

    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;

    let client = reqwest::Client::new();
    let res = client.get(srv.url("/auth/whoami")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unauthorized");

    let res = client
        .get(srv.url("/auth/whoami"))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn principal_is_derived_from_token() {
    let srv = TestServer::spawn().await;
    let token = srv.token_for("manager").await;

    let client = reqwest::Client::new();
    let res = client
        .get(srv.url("/auth/whoami"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["username"], "manager");
    assert_eq!(body["role"], "Manager");
    assert!(body["permissions"].as_array().unwrap().iter().any(|p| p == "reports.read"));
}

#[tokio::test]
async fn retailer_logs_in_without_mfa() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/auth/login"))
        .json(&json!({ "username": "retailer", "password": "wrong" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .post(srv.url("/auth/login"))
        .json(&json!({ "username": "retailer", "password": "password" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let session: serde_json::Value = res.json().await.unwrap();
    assert_eq!(session["user"]["username"], "retailer");
    let token = session["token"].as_str().unwrap();

    let res = client
        .get(srv.url("/auth/whoami"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn admin_login_goes_through_mfa() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/auth/login"))
        .json(&json!({ "username": "admin", "password": ADMIN_PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["mfa_required"], true);
    assert!(body.get("token").is_none());

    let res = client
        .post(srv.url("/auth/mfa/verify"))
        .json(&json!({ "username": "admin", "code": "not-the-code" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let code = srv.delivery.last_code_for("admin").expect("code was delivered");
    let res = client
        .post(srv.url("/auth/mfa/verify"))
        .json(&json!({ "username": "admin", "code": code }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let session: serde_json::Value = res.json().await.unwrap();
    assert_eq!(session["user"]["role"], "Admin");
    assert!(session["token"].as_str().is_some());

    // A code is single use.
    let res = client
        .post(srv.url("/auth/mfa/verify"))
        .json(&json!({ "username": "admin", "code": code }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn retailer_cannot_manage_products() {
    let srv = TestServer::spawn().await;
    let token = srv.token_for("retailer").await;

    let client = reqwest::Client::new();
    let res = client
        .post(srv.url("/products"))
        .bearer_auth(&token)
        .json(&json!({ "name": "Sardines", "price": 2.5 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "forbidden");

    let res = client
        .get(srv.url("/admin/activity_logs"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn product_stock_and_sale_lifecycle() {
    let srv = TestServer::spawn().await;
    let manager = srv.token_for("manager").await;
    let retailer = srv.token_for("retailer").await;
    let client = reqwest::Client::new();

    let product = create_product(
        &client,
        &srv,
        &manager,
        json!({ "name": "Canned Tuna", "brand": "Seaside", "price": 2.5, "stock_level": 10 }),
    )
    .await;
    let id = product["id"].as_str().unwrap().to_string();
    assert_eq!(product["stock_level"], 10);

    // Duplicate names clash regardless of case.
    let res = client
        .post(srv.url("/products"))
        .bearer_auth(&manager)
        .json(&json!({ "name": "canned tuna", "price": 1.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = client
        .post(srv.url(&format!("/products/{id}/stock")))
        .bearer_auth(&manager)
        .json(&json!({ "action": "restock", "quantity": 5 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let change: serde_json::Value = res.json().await.unwrap();
    assert_eq!(change["previous"], 10);
    assert_eq!(change["current"], 15);

    // Selling more than is on hand changes nothing.
    let res = client
        .post(srv.url("/sales"))
        .bearer_auth(&retailer)
        .json(&json!({ "items": [{ "product_id": id, "quantity": 16 }] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let res = client
        .post(srv.url("/sales"))
        .bearer_auth(&retailer)
        .json(&json!({ "items": [{ "product_id": id, "quantity": 4 }], "total_amount": 10.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let sale: serde_json::Value = res.json().await.unwrap();
    assert_eq!(sale["total_amount"], 10.0);
    assert_eq!(sale["lines"][0]["product_name"], "Canned Tuna");
    let sale_id = sale["id"].as_str().unwrap().to_string();

    let res = client
        .get(srv.url(&format!("/products/{id}")))
        .bearer_auth(&retailer)
        .send()
        .await
        .unwrap();
    let fetched: serde_json::Value = res.json().await.unwrap();
    assert_eq!(fetched["stock_level"], 11);

    let res = client
        .get(srv.url("/retailer/leaderboard"))
        .bearer_auth(&retailer)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let board: serde_json::Value = res.json().await.unwrap();
    assert_eq!(board[0]["username"], "retailer");

    // Retailers may not undo; managers may.
    let res = client
        .delete(srv.url(&format!("/sales/{sale_id}")))
        .bearer_auth(&retailer)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .delete(srv.url(&format!("/sales/{sale_id}")))
        .bearer_auth(&manager)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .get(srv.url(&format!("/products/{id}")))
        .bearer_auth(&manager)
        .send()
        .await
        .unwrap();
    let fetched: serde_json::Value = res.json().await.unwrap();
    assert_eq!(fetched["stock_level"], 15);

    let res = client
        .get(srv.url(&format!("/log/product/{id}")))
        .bearer_auth(&manager)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let page: serde_json::Value = res.json().await.unwrap();
    let actions: Vec<&str> = page["logs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["action"].as_str().unwrap())
        .collect();
    assert_eq!(actions.len(), 4);
}

#[tokio::test]
async fn mutations_are_recorded_in_activity_log() {
    let srv = TestServer::spawn().await;
    let admin = srv.token_for("admin").await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/categories"))
        .bearer_auth(&admin)
        .json(&json!({ "name": "Frozen" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = client
        .post(srv.url("/log/desktop"))
        .bearer_auth(&admin)
        .json(&json!({ "action": "opened_inventory_screen" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = client
        .get(srv.url("/admin/activity_logs?method=POST&target=category"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let page: serde_json::Value = res.json().await.unwrap();
    assert_eq!(page["total"], 1);
    assert_eq!(page["logs"][0]["request"]["status"], 201);

    let res = client
        .get(srv.url("/admin/activity_logs?source=desktop"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    let page: serde_json::Value = res.json().await.unwrap();
    assert_eq!(page["total"], 1);
    assert_eq!(page["logs"][0]["action"], "opened_inventory_screen");

    let res = client
        .get(srv.url("/admin/activity_logs?source=carrier-pigeon"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .get(srv.url("/admin/activity_logs/summary"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn reports_are_available_to_managers() {
    let srv = TestServer::spawn().await;
    let manager = srv.token_for("manager").await;
    let client = reqwest::Client::new();

    create_product(
        &client,
        &srv,
        &manager,
        json!({ "name": "Dog Biscuits", "price": 4.0, "stock_level": 3, "min_stock_level": 5 }),
    )
    .await;

    for path in [
        "/reports/sales",
        "/reports/sales/by-period?grouping=weekly",
        "/reports/top-products?limit=5",
        "/reports/retailers",
        "/reports/inventory",
        "/reports/categories",
        "/reports/alerts",
        "/dashboard/manager",
    ] {
        let res = client.get(srv.url(path)).bearer_auth(&manager).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK, "GET {path}");
    }

    let res = client
        .get(srv.url("/reports/alerts"))
        .bearer_auth(&manager)
        .send()
        .await
        .unwrap();
    let alerts: serde_json::Value = res.json().await.unwrap();
    assert_eq!(alerts["low_stock"].as_array().unwrap().len(), 1);

    let res = client
        .get(srv.url("/reports/sales/by-period?grouping=hourly"))
        .bearer_auth(&manager)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .get(srv.url("/reports/sales?start=2024-05-02&end=2024-05-01"))
        .bearer_auth(&manager)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn tokens_of_deactivated_or_deleted_users_are_rejected() {
    let srv = TestServer::spawn().await;
    let admin = srv.token_for("admin").await;
    let retailer = srv.token_for("retailer").await;
    let manager = srv.token_for("manager").await;
    let client = reqwest::Client::new();

    for token in [&retailer, &manager] {
        let res = client.get(srv.url("/auth/whoami")).bearer_auth(token).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    let res = client
        .put(srv.url(&format!("/users/{}", srv.user_id("retailer").await)))
        .bearer_auth(&admin)
        .json(&json!({ "active": false }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .delete(srv.url(&format!("/users/{}", srv.user_id("manager").await)))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // Both tokens are still signed and unexpired.
    for token in [&retailer, &manager] {
        let res = client.get(srv.url("/auth/whoami")).bearer_auth(token).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = res.json().await.unwrap();
        assert_eq!(body["error"], "unauthorized");
    }
}

#[tokio::test]
async fn users_cannot_delete_or_deactivate_themselves() {
    let srv = TestServer::spawn().await;
    let admin = srv.token_for("admin").await;
    let admin_id = srv.user_id("admin").await;
    let client = reqwest::Client::new();

    let res = client
        .delete(srv.url(&format!("/users/{admin_id}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");

    let res = client
        .put(srv.url(&format!("/users/{admin_id}")))
        .bearer_auth(&admin)
        .json(&json!({ "active": false }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // Still there and still active.
    let res = client.get(srv.url("/auth/whoami")).bearer_auth(&admin).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_routes_get_json_404() {
    let srv = TestServer::spawn().await;

    let res = reqwest::get(srv.url("/does-not-exist")).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "not_found");
}
