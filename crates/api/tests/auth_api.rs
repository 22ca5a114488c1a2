//! Caller authentication and request validation that is decided before any
//! query runs. These use a pool that never connects.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{body_json, get, lazy_pool, post_json, put_json, As};
use serde_json::json;
use tower::ServiceExt;

use curator_api::auth::service_key::{ON_BEHALF_OF_HEADER, SERVICE_KEY_HEADER};

// ---------------------------------------------------------------------------
// Test: missing credentials are rejected
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_jobs_without_credentials_returns_401() {
    let app = common::build_test_app(lazy_pool());

    let response = get(app, "/api/v1/jobs", As::Anonymous).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["code"], "UNAUTHORIZED");
}

// ---------------------------------------------------------------------------
// Test: a malformed bearer token is rejected
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalid_bearer_token_returns_401() {
    let app = common::build_test_app(lazy_pool());
    let request = Request::builder()
        .uri("/api/v1/jobs")
        .header("authorization", "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ---------------------------------------------------------------------------
// Test: a wrong service key is rejected even with a valid user token
// ---------------------------------------------------------------------------

#[tokio::test]
async fn wrong_service_key_returns_401() {
    let app = common::build_test_app(lazy_pool());
    let request = Request::builder()
        .uri("/api/v1/jobs")
        .header(SERVICE_KEY_HEADER, "not-the-key")
        .header("authorization", format!("Bearer {}", common::user_token(7)))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ---------------------------------------------------------------------------
// Test: a non-numeric on-behalf-of header is a bad request
// ---------------------------------------------------------------------------

#[tokio::test]
async fn malformed_on_behalf_of_returns_400() {
    let app = common::build_test_app(lazy_pool());
    let request = Request::builder()
        .uri("/api/v1/jobs")
        .header(SERVICE_KEY_HEADER, common::TEST_SERVICE_KEY)
        .header(ON_BEHALF_OF_HEADER, "alice")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Test: the workflow-error listing is for users only
// ---------------------------------------------------------------------------

#[tokio::test]
async fn service_caller_cannot_list_workflow_errors() {
    let app = common::build_test_app(lazy_pool());

    let response = get(app, "/api/v1/workflow-errors", As::Service).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ---------------------------------------------------------------------------
// Test: create-job validation happens before storage
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_job_without_steps_returns_400() {
    let app = common::build_test_app(lazy_pool());

    let response = post_json(
        app,
        "/api/v1/jobs",
        As::User(7),
        json!({ "workflow_name": "ingest_link", "steps": [] }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn create_job_with_step_missing_order_returns_400() {
    let app = common::build_test_app(lazy_pool());

    let response = post_json(
        app,
        "/api/v1/jobs",
        As::User(7),
        json!({
            "workflow_name": "ingest_link",
            "steps": [{ "step_name": "fetch", "step_type": "http" }]
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "BAD_REQUEST");
    assert!(json["error"].as_str().unwrap().contains("step_order"));
}

#[tokio::test]
async fn workflow_error_with_mistyped_field_returns_400() {
    let app = common::build_test_app(lazy_pool());

    let response = post_json(
        app,
        "/api/v1/workflow-errors",
        As::Service,
        json!({ "workflow_name": 5, "error_message": "boom", "user_id": 7 }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn create_job_with_duplicate_step_names_returns_400() {
    let app = common::build_test_app(lazy_pool());
    let step = json!({ "step_name": "fetch", "step_type": "http", "step_order": 1 });

    let response = post_json(
        app,
        "/api/v1/jobs",
        As::User(7),
        json!({ "workflow_name": "ingest_link", "steps": [step.clone(), step] }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn bare_service_caller_must_name_an_owner() {
    let app = common::build_test_app(lazy_pool());

    let response = post_json(
        app,
        "/api/v1/jobs",
        As::Service,
        json!({
            "workflow_name": "ingest_link",
            "steps": [{ "step_name": "fetch", "step_type": "http", "step_order": 1 }]
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "user_id is required for service callers");
}

#[tokio::test]
async fn user_cannot_create_a_job_for_someone_else() {
    let app = common::build_test_app(lazy_pool());

    let response = post_json(
        app,
        "/api/v1/jobs",
        As::User(7),
        json!({
            "workflow_name": "ingest_link",
            "user_id": 8,
            "steps": [{ "step_name": "fetch", "step_type": "http", "step_order": 1 }]
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Test: step updates require a known status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn update_step_without_status_returns_400() {
    let app = common::build_test_app(lazy_pool());

    let response = put_json(
        app,
        "/api/v1/jobs/1/steps/fetch",
        As::ServiceFor(7),
        json!({ "error_message": "boom" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn update_step_with_unknown_status_returns_400() {
    let app = common::build_test_app(lazy_pool());

    let response = put_json(
        app,
        "/api/v1/jobs/1/steps/fetch",
        As::User(7),
        json!({ "status": "exploded" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "Unknown StepStatus 'exploded'");
}

// ---------------------------------------------------------------------------
// Test: health reports a degraded database
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_reports_degraded_without_database() {
    let app = common::build_test_app(lazy_pool());

    let response = get(app, "/health", As::Anonymous).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["db_healthy"], false);
}
