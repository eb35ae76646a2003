#![allow(dead_code)]

use std::sync::Arc;

use archdiffer_api::config::ServerConfig;
use archdiffer_api::router::build_app_router;
use archdiffer_api::state::AppState;
use archdiffer_core::comparison::ComparisonType;
use archdiffer_db::memory::{MemoryJobStore, MemoryTaskQueue};
use archdiffer_db::models::comparison_type::ComparisonTypeTable;
use archdiffer_pipeline::dispatcher::TaskDispatcher;
use archdiffer_pipeline::service::ComparisonService;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
    }
}

/// The application over in-memory storage, with handles on the storage so
/// tests can play the worker's part.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryJobStore>,
    pub queue: Arc<MemoryTaskQueue>,
}

pub fn build_test_app() -> TestApp {
    let types = Arc::new(ComparisonTypeTable::new([
        ComparisonType { id: 1, name: "rpmdiff".into() },
        ComparisonType { id: 2, name: "abidiff".into() },
    ]));
    let store = Arc::new(MemoryJobStore::new(types.clone()));
    let queue = Arc::new(MemoryTaskQueue::new());
    let service = ComparisonService::new(store.clone(), TaskDispatcher::new(queue.clone()), types);

    let config = test_config();
    let state = AppState {
        service: Arc::new(service),
        config: Arc::new(config.clone()),
    };

    TestApp {
        router: build_app_router(state, &config),
        store,
        queue,
    }
}

pub async fn get(app: &TestApp, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.router.clone().oneshot(request).await.unwrap()
}

pub async fn post_json(app: &TestApp, uri: &str, body: &Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.router.clone().oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// A valid submission body for `kind`.
pub fn submission(kind: &str) -> Value {
    serde_json::json!({
        "kind": kind,
        "pkg1": {
            "name": "python3",
            "arch": "x86_64",
            "version": "3.6.1",
            "repository": "http://mirror.example/fedora/26/"
        },
        "pkg2": {
            "name": "python3",
            "arch": "x86_64",
            "epoch": 0,
            "version": "3.6.2",
            "repository": "http://mirror.example/fedora/27/"
        }
    })
}
