//! Integration tests for submitting, polling and listing comparisons.
//!
//! The application runs over the in-memory Job Store and task queue; tests
//! move jobs through their lifecycle directly on the store, as a worker would.

mod common;

use archdiffer_core::comparison::{DiffRecord, DiffReport, JobError, JobErrorKind};
use archdiffer_db::store::JobStore;
use axum::http::StatusCode;
use common::{body_json, get, post_json, submission, TestApp};

async fn submit(app: &TestApp, kind: &str) -> i64 {
    let response = post_json(app, "/api/v1/comparisons", &submission(kind)).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["data"]["id"].as_i64().unwrap()
}

fn report() -> DiffReport {
    DiffReport::new(vec![
        DiffRecord {
            category: "tags".into(),
            diff_type: "changed".into(),
            diff_info: "VERSION".into(),
        },
        DiffRecord {
            category: "files".into(),
            diff_type: "removed".into(),
            diff_info: "/usr/lib64/libpython3.6m.so.1.0".into(),
        },
    ])
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_returns_201_with_location_and_new_job() {
    let app = common::build_test_app();
    let response = post_json(&app, "/api/v1/comparisons", &submission("rpmdiff")).await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let location = response.headers()["location"].to_str().unwrap().to_string();

    let json = body_json(response).await;
    let id = json["data"]["id"].as_i64().unwrap();
    assert_eq!(location, format!("/api/v1/comparisons/{id}"));
    assert_eq!(json["data"]["state"], "new");
    assert_eq!(json["data"]["kind"], "rpmdiff");
    assert_eq!(json["data"]["inputs"]["pkg2"]["epoch"], "0");
    assert!(json["data"].get("result").is_none());
    assert!(json["data"].get("error").is_none());

    assert_eq!(app.queue.len(), 1);
}

#[tokio::test]
async fn submit_succeeds_when_queue_is_down() {
    let app = common::build_test_app();
    app.queue.fail_pushes(1);

    let id = submit(&app, "rpmdiff").await;
    assert!(app.queue.is_empty());

    let json = body_json(get(&app, &format!("/api/v1/comparisons/{id}")).await).await;
    assert_eq!(json["data"]["state"], "new");
}

#[tokio::test]
async fn submit_rejects_missing_name() {
    let app = common::build_test_app();
    let mut body = submission("rpmdiff");
    body["pkg1"]["name"] = "".into();

    let response = post_json(&app, "/api/v1/comparisons", &body).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert!(json["error"].as_str().unwrap().starts_with("pkg1:"));
    assert!(app.queue.is_empty());
}

#[tokio::test]
async fn submit_rejects_unknown_kind() {
    let app = common::build_test_app();

    let response = post_json(&app, "/api/v1/comparisons", &submission("debdiff")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert_eq!(json["code"], "UNKNOWN_COMPARISON_TYPE");
    assert_eq!(
        json["error"],
        "Unknown comparison type 'debdiff' (known: rpmdiff, abidiff)"
    );
}

// ---------------------------------------------------------------------------
// Poll
// ---------------------------------------------------------------------------

#[tokio::test]
async fn poll_shows_result_once_done() {
    let app = common::build_test_app();
    let id = submit(&app, "rpmdiff").await;

    app.store.mark_running(id).await.unwrap();
    let running = body_json(get(&app, &format!("/api/v1/comparisons/{id}")).await).await;
    assert_eq!(running["data"]["state"], "running");
    assert!(running["data"]["started_at"].is_string());

    app.store.mark_done(id, &report()).await.unwrap();
    let response = get(&app, &format!("/api/v1/comparisons/{id}")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["data"]["state"], "done");
    assert_eq!(json["data"]["result"]["differences"][0]["diff_info"], "VERSION");
    assert_eq!(json["data"]["result"]["differences"][1]["diff_type"], "removed");
    assert!(json["data"].get("error").is_none());
    assert!(json["data"]["completed_at"].is_string());
}

#[tokio::test]
async fn poll_shows_error_once_failed() {
    let app = common::build_test_app();
    let id = submit(&app, "rpmdiff").await;

    app.store.mark_running(id).await.unwrap();
    app.store
        .mark_failed(
            id,
            &JobError::new(
                JobErrorKind::AmbiguousOrMissingArtifact,
                "pkg1: Expected exactly one artifact named 'python3', found 0",
            ),
        )
        .await
        .unwrap();

    let json = body_json(get(&app, &format!("/api/v1/comparisons/{id}")).await).await;
    assert_eq!(json["data"]["state"], "failed");
    assert_eq!(json["data"]["error"]["kind"], "AmbiguousOrMissingArtifact");
    assert!(json["data"].get("result").is_none());
}

#[tokio::test]
async fn poll_unknown_id_returns_404() {
    let app = common::build_test_app();
    let response = get(&app, "/api/v1/comparisons/999").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["error"], "Comparison with id 999 not found");
}

#[tokio::test]
async fn poll_during_storage_outage_returns_503() {
    let app = common::build_test_app();
    let id = submit(&app, "rpmdiff").await;
    app.store.set_offline(true);

    let response = get(&app, &format!("/api/v1/comparisons/{id}")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["code"], "STORAGE_UNAVAILABLE");
}

// ---------------------------------------------------------------------------
// Listings
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_filters_orders_and_pages() {
    let app = common::build_test_app();
    let first = submit(&app, "rpmdiff").await;
    let second = submit(&app, "abidiff").await;
    let third = submit(&app, "rpmdiff").await;

    app.store.mark_running(second).await.unwrap();
    app.store.mark_done(second, &DiffReport::default()).await.unwrap();

    let all = body_json(get(&app, "/api/v1/comparisons").await).await;
    let ids: Vec<_> = all["data"].as_array().unwrap().iter().map(|c| c["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![first, second, third]);
    assert!(all["data"][0].get("inputs").is_none());

    let done = body_json(get(&app, "/api/v1/comparisons?state=done").await).await;
    assert_eq!(done["data"].as_array().unwrap().len(), 1);
    assert_eq!(done["data"][0]["id"], second);

    let rpm = body_json(get(&app, "/api/v1/comparisons?kind=rpmdiff").await).await;
    assert_eq!(rpm["data"].as_array().unwrap().len(), 2);

    let page = body_json(get(&app, "/api/v1/comparisons?order=desc&limit=1&offset=1").await).await;
    assert_eq!(page["data"].as_array().unwrap().len(), 1);
    assert_eq!(page["data"][0]["id"], second);
}

#[tokio::test]
async fn list_rejects_unknown_state() {
    let app = common::build_test_app();
    let response = get(&app, "/api/v1/comparisons?state=paused").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn differences_are_nested_under_their_comparison() {
    let app = common::build_test_app();
    let done = submit(&app, "rpmdiff").await;
    let pending = submit(&app, "rpmdiff").await;

    app.store.mark_running(done).await.unwrap();
    app.store.mark_done(done, &report()).await.unwrap();

    let json = body_json(get(&app, "/api/v1/differences").await).await;
    let data = json["data"].as_array().unwrap();
    assert_eq!(data.len(), 2);

    assert_eq!(data[0]["id"], done);
    assert_eq!(data[0]["state"], "done");
    let differences = data[0]["differences"].as_array().unwrap();
    assert_eq!(differences.len(), 2);
    assert_eq!(differences[0]["category"], "tags");
    assert_eq!(differences[1]["category"], "files");
    assert_eq!(differences[0]["comparison_id"], done);

    assert_eq!(data[1]["id"], pending);
    assert_eq!(data[1]["differences"], serde_json::json!([]));
}

#[tokio::test]
async fn comparison_types_nest_their_comparisons() {
    let app = common::build_test_app();
    let a = submit(&app, "rpmdiff").await;
    let b = submit(&app, "rpmdiff").await;

    let json = body_json(get(&app, "/api/v1/comparison-types").await).await;
    let data = json["data"].as_array().unwrap();
    assert_eq!(data.len(), 2);

    assert_eq!(data[0]["name"], "rpmdiff");
    let comparisons = data[0]["comparisons"].as_array().unwrap();
    assert_eq!(comparisons.len(), 2);
    assert_eq!(comparisons[0]["id"], a);
    assert_eq!(comparisons[1]["id"], b);

    assert_eq!(data[1]["name"], "abidiff");
    assert_eq!(data[1]["comparisons"], serde_json::json!([]));
}
