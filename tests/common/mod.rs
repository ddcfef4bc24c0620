//! Common test utilities

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::Executor;
use tower::util::ServiceExt;
use uuid::Uuid;

use jpashop::api::{self, AppState};
use jpashop::audit::AuditLogService;
use jpashop::db;
use jpashop::repository::{InMemoryStore, PgStore};

/// Router over a fresh in-memory store
pub fn test_app() -> Router {
    let store = Arc::new(InMemoryStore::new());
    api::build_router(AppState::new(store, AuditLogService::default()))
}

/// Send one request and decode the JSON body (`Value::Null` when the body is not JSON)
pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("X-Request-User", "admin")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Serialises schema creation across tests in one binary
static SCHEMA_LOCK: Mutex<()> = Mutex::new(());

/// Connect to the test database, creating the schema if it is missing.
///
/// Returns `None` when `DATABASE_URL` is not set so the PostgreSQL tests
/// are skipped instead of failing.
pub async fn setup_test_db() -> Option<PgStore> {
    dotenvy::dotenv().ok();
    let database_url = match std::env::var("DATABASE_URL") {
        Ok(url) if !url.trim().is_empty() => url,
        _ => {
            eprintln!("DATABASE_URL not set; skipping PostgreSQL test");
            return None;
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    {
        let _guard = SCHEMA_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        if !db::check_schema(&pool).await.expect("Failed to inspect schema") {
            pool.execute(include_str!("../../migrations/0001_init.sql"))
                .await
                .expect("Failed to apply migrations");
        }
    }

    Some(PgStore::new(pool))
}

/// A name no other test run has used, so tests can share one database
pub fn unique(prefix: &str) -> String {
    format!("{}_{}", prefix, &Uuid::new_v4().simple().to_string()[..12])
}
