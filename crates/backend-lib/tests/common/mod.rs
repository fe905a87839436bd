#![allow(dead_code)]

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use lightnovel_backend::config::Settings;
use lightnovel_backend::storage::MemoryStorage;
use lightnovel_backend::{create_router, AppState};

pub const PASSWORD: &str = "Password123";

/// Settings with a cheap scrypt cost
pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.password.scrypt_log_n = 4;
    settings
}

/// Build the full router over a fresh in-memory store
pub fn build_test_app_with(settings: Settings) -> (Router, MemoryStorage) {
    let storage = MemoryStorage::new();
    let state = AppState::new(storage.clone(), settings).unwrap();
    (create_router(Arc::new(state)), storage)
}

pub fn build_test_app() -> (Router, MemoryStorage) {
    build_test_app_with(test_settings())
}

/// Send a request and decode the JSON body, `Value::Null` when empty
pub async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-real-ip", "203.0.113.10");
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        },
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

pub async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, Method::POST, uri, Some(body)).await
}

/// Register `username` with [`PASSWORD`] and return the session token
pub async fn register(app: &Router, username: &str) -> String {
    let (status, body) = post(
        app,
        "/api/v1/accounts/register",
        serde_json::json!({
            "username": username,
            "password": PASSWORD,
            "deviceName": "laptop",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
    body["session"].as_str().unwrap().to_string()
}

pub async fn login(app: &Router, username: &str, password: &str) -> (StatusCode, Value) {
    post(
        app,
        "/api/v1/accounts/login",
        serde_json::json!({
            "username": username,
            "password": password,
            "deviceName": "phone",
        }),
    )
    .await
}

/// Whether `token` currently authenticates
pub async fn is_valid(app: &Router, token: &str) -> bool {
    let (status, _) = post(
        app,
        "/api/v1/accounts/self",
        serde_json::json!({ "session": token }),
    )
    .await;
    status == StatusCode::OK
}
