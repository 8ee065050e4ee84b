//! Router-level checks that run without a live database: auth rejection,
//! bootstrap-token gating, security headers, health degradation.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

use annexreg_core::ratelimit::RateLimiter;
use annexreg_server::llm::OfflineCompletionProvider;
use annexreg_server::middleware::auth::JwtConfig;
use annexreg_server::router::build_router;
use annexreg_server::state::AppState;
use annexreg_server::storage::FsObjectStore;

fn test_app() -> axum::Router {
    // Lazy pool: no connection is made until a query runs, and the health
    // probe fails fast instead of succeeding.
    let pool = PgPoolOptions::new()
        .acquire_timeout(Duration::from_millis(50))
        .connect_lazy("postgresql://nobody@127.0.0.1:1/annexreg_absent")
        .expect("lazy pool");

    let store = Arc::new(FsObjectStore::new(
        std::env::temp_dir().join("annexreg-router-smoke"),
        "test-secret".into(),
        "http://localhost:4200".into(),
    ));

    let state = AppState {
        pool,
        storage: store.clone(),
        llm: Arc::new(OfflineCompletionProvider::new()),
        limiter: Arc::new(RateLimiter::new()),
        jwt: JwtConfig::from_secret(b"test-secret"),
        bootstrap_token: "bootstrap-token".into(),
    };
    build_router(state, store)
}

#[tokio::test]
async fn protected_routes_require_bearer_token() {
    let app = test_app();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/systems")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn garbage_bearer_token_is_rejected() {
    let app = test_app();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/systems")
                .header("authorization", "Bearer not-a-jwt")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn bootstrap_requires_the_configured_token() {
    let app = test_app();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/organizations")
                .header("content-type", "application/json")
                .header("x-bootstrap-token", "wrong")
                .body(Body::from(r#"{"name":"Acme","admin_email":"a@b.c"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn ingest_requires_api_key_header() {
    let app = test_app();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/logs")
                .header("content-type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn security_headers_are_set_on_every_response() {
    let app = test_app();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/systems")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let headers = response.headers();
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["referrer-policy"], "no-referrer");
}

#[tokio::test]
async fn health_reports_degraded_without_database() {
    let app = test_app();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = http_body_util::BodyExt::collect(response.into_body())
        .await
        .unwrap()
        .to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["database"], serde_json::json!(false));
    assert_eq!(body["llm_available"], serde_json::json!(false));
}

#[tokio::test]
async fn files_route_rejects_unsigned_requests() {
    let app = test_app();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/files/exports/a/b.zip?exp=1&sig=bad")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
