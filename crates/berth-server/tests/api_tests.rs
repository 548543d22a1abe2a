//! HTTP surface tests against the in-process engine.
//!
//! Covered scenarios:
//! 1. Health is public and reports engine reachability
//! 2. The identity gate rejects missing and unknown tokens
//! 3. Container lifecycle over HTTP with documented status codes
//! 4. Validation failures carry per-field detail
//! 5. Engine outage surfaces as a server error

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use berth_engine::EngineClient;
use berth_engine::backend::memory::MemoryEngine;
use berth_server::auth::TokenGate;
use berth_server::{AppState, create_router};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

const TOKEN: &str = "test-token";
const PREFIX: &str = "/api/v1";

fn app() -> (Arc<MemoryEngine>, Router) {
    let engine = Arc::new(MemoryEngine::new());
    let mut gate = TokenGate::new();
    gate.insert_token("tester", TOKEN);
    let state = AppState {
        engine: EngineClient::new(Arc::clone(&engine) as _),
        gate: Arc::new(gate),
        call_timeout: Duration::from_secs(5),
    };
    (engine, create_router(state, PREFIX))
}

async fn send(
    app: &Router,
    method: Method,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn authed(app: &Router, method: Method, path: &str, body: Option<Value>) -> (StatusCode, Value) {
    send(app, method, path, Some(TOKEN), body).await
}

fn url(path: &str) -> String {
    format!("{PREFIX}{path}")
}

async fn create_web(app: &Router) -> Value {
    let (status, body) = authed(
        app,
        Method::POST,
        &url("/containers"),
        Some(json!({
            "name": "web-1",
            "image": "nginx",
            "tag": "1.25",
            "cpu_allocation": "medium",
            "ports": {"80": 8080}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body
}

// ── Health and identity ──────────────────────────────────────────────

#[tokio::test]
async fn health_needs_no_credentials() {
    let (engine, app) = app();
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["engine"], "memory");
    assert_eq!(body["engine_reachable"], true);

    engine.set_online(false);
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["engine_reachable"], false);
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let (_, app) = app();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(url("/containers"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");

    let (status, body) = send(&app, Method::GET, &url("/containers"), None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["detail"], "Could not validate credentials");
}

#[tokio::test]
async fn unknown_token_is_unauthorized_and_nothing_is_created() {
    let (engine, app) = app();
    let (status, _) = send(
        &app,
        Method::POST,
        &url("/containers"),
        Some("wrong"),
        Some(json!({"name": "web-1", "image": "nginx"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(engine.container_count().await, 0);
}

// ── Lifecycle ────────────────────────────────────────────────────────

#[tokio::test]
async fn create_returns_container_state() {
    let (_, app) = app();
    let body = create_web(&app).await;
    assert_eq!(body["name"], "web-1");
    assert_eq!(body["image"], "nginx:1.25");
    assert_eq!(body["status"], "created");
    assert_eq!(body["cpu_allocation"], "medium");
    assert_eq!(body["restart_policy"], "unless-stopped");
    assert!(body["id"].as_str().is_some_and(|id| !id.is_empty()));
}

#[tokio::test]
async fn invalid_create_lists_field_errors() {
    let (engine, app) = app();
    let (status, body) = authed(
        &app,
        Method::POST,
        &url("/containers"),
        Some(json!({"name": "-bad name", "image": "nginx", "restart_policy": "sometimes"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let fields: Vec<&str> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["field"].as_str())
        .collect();
    assert!(fields.contains(&"name"));
    assert!(fields.contains(&"restart_policy"));
    assert_eq!(engine.container_count().await, 0);
}

#[tokio::test]
async fn malformed_body_is_a_validation_error() {
    let (_, app) = app();
    let (status, body) = authed(
        &app,
        Method::POST,
        &url("/containers"),
        Some(json!({"image": "nginx"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "body");
}

#[tokio::test]
async fn duplicate_name_is_bad_request() {
    let (_, app) = app();
    let _ = create_web(&app).await;
    let (status, body) = authed(
        &app,
        Method::POST,
        &url("/containers"),
        Some(json!({"name": "web-1", "image": "nginx"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("web-1"));
}

#[tokio::test]
async fn get_unknown_container_is_not_found() {
    let (_, app) = app();
    let (status, body) = authed(&app, Method::GET, &url("/containers/nope"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn update_merges_fields() {
    let (_, app) = app();
    let (status, created) = authed(
        &app,
        Method::POST,
        &url("/containers"),
        Some(json!({
            "name": "web-1",
            "image": "nginx",
            "tag": "1.25",
            "cpu_allocation": "medium",
            "ports": {"80": 8080},
            "volumes": {"/srv/www": {"bind": "/usr/share/nginx/html", "mode": "ro"}},
            "environment": {"TZ": "UTC"}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{created}");
    let id = created["id"].as_str().unwrap();

    let (status, body) = authed(
        &app,
        Method::PUT,
        &url(&format!("/containers/{id}")),
        Some(json!({"restart_policy": "always"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["restart_policy"], "always");
    assert_eq!(body["cpu_allocation"], "medium");
    assert_eq!(body["ports"], created["ports"]);
    assert_eq!(body["ports"]["80/tcp"]["HostPort"], "8080");
    assert_eq!(body["volumes"], created["volumes"]);
    assert_eq!(body["volumes"][0]["readonly"], true);
    assert_eq!(body["environment"], json!(["TZ=UTC"]));
}

#[tokio::test]
async fn update_rejects_fields_it_cannot_change() {
    let (_, app) = app();
    let _ = create_web(&app).await;
    let (status, body) = authed(
        &app,
        Method::PUT,
        &url("/containers/web-1"),
        Some(json!({"ports": {"80": 9090}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "body");
}

#[tokio::test]
async fn start_and_stop_report_status() {
    let (_, app) = app();
    let _ = create_web(&app).await;

    let (status, body) = authed(&app, Method::POST, &url("/containers/web-1/start"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "running");

    let (status, body) = authed(&app, Method::POST, &url("/containers/web-1/restart"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "running");

    let (status, body) = authed(&app, Method::POST, &url("/containers/web-1/stop"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "exited");
}

#[tokio::test]
async fn list_hides_stopped_unless_all() {
    let (_, app) = app();
    let _ = create_web(&app).await;

    let (status, body) = authed(&app, Method::GET, &url("/containers"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 0);

    let (_, body) = authed(&app, Method::GET, &url("/containers?all=true"), None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (_, body) = authed(&app, Method::GET, &url("/containers?all_containers=true"), None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn delete_then_get_is_not_found() {
    let (_, app) = app();
    let _ = create_web(&app).await;

    let (status, body) = authed(&app, Method::DELETE, &url("/containers/web-1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Container web-1 successfully deleted");

    let (status, _) = authed(&app, Method::GET, &url("/containers/web-1"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = authed(&app, Method::DELETE, &url("/containers/web-1"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_running_container_with_force() {
    let (engine, app) = app();
    let _ = create_web(&app).await;
    let _ = authed(&app, Method::POST, &url("/containers/web-1/start"), None).await;

    let (status, _) = authed(&app, Method::DELETE, &url("/containers/web-1"), None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(engine.container_count().await, 1);

    let (status, _) = authed(&app, Method::DELETE, &url("/containers/web-1?force=true"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(engine.container_count().await, 0);
}

// ── Engine outage and telemetry ──────────────────────────────────────

#[tokio::test]
async fn offline_engine_is_a_server_error() {
    let (engine, app) = app();
    engine.set_online(false);
    let (status, body) = authed(&app, Method::GET, &url("/containers"), None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn memory_telemetry_is_reported() {
    let (_, app) = app();
    let (status, body) = authed(&app, Method::GET, &url("/system/memory"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["total"].is_number());
    assert!(body["swap"]["percentage"].is_number());
}

#[tokio::test]
async fn telemetry_requires_identity() {
    let (_, app) = app();
    let (status, _) = send(&app, Method::GET, &url("/system/disk"), None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
