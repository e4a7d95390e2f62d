//! Integration tests for the job lifecycle endpoints: create, list, get,
//! cancel, idempotency, and plan-limit enforcement.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{fixtures, TestApp};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use content_core::domains::content::store::JobStore;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn generate_request(user_id: uuid::Uuid, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/content/generate")
        .header("content-type", "application/json")
        .header("x-user-id", user_id.to_string())
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn generate_creates_a_pending_job() {
    let app = TestApp::spawn().await;
    let user_id = fixtures::create_user(&app.db, false).await.unwrap();

    let req = generate_request(user_id, json!({ "topic": "rust async runtimes", "content_type": "blog" }));
    let resp = app.router.clone().oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::CREATED);
    let body = body_json(resp).await;
    assert_eq!(body["status"], "pending");
    assert_eq!(body["topic"], "rust async runtimes");
    assert_eq!(body["formats_requested"], json!(["blog"]));
}

#[tokio::test]
async fn generate_rejects_empty_topic() {
    let app = TestApp::spawn().await;
    let user_id = fixtures::create_user(&app.db, false).await.unwrap();

    let req = generate_request(user_id, json!({ "topic": "   ", "content_type": "blog" }));
    let resp = app.router.clone().oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn generate_rejects_unauthenticated_requests() {
    let app = TestApp::spawn().await;

    let req = Request::builder()
        .method("POST")
        .uri("/v1/content/generate")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "topic": "no auth header", "content_type": "blog" }).to_string()))
        .unwrap();
    let resp = app.router.clone().oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn free_plan_forbids_audio_generation() {
    let app = TestApp::spawn().await;
    let user_id = fixtures::create_user(&app.db, false).await.unwrap();

    let req = generate_request(user_id, json!({ "topic": "a podcast script", "content_type": "audio" }));
    let resp = app.router.clone().oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body = body_json(resp).await;
    assert_eq!(body["code"], "PLAN_LIMIT_EXCEEDED");
}

#[tokio::test]
async fn pro_plan_allows_audio_generation() {
    let app = TestApp::spawn().await;
    let user_id = fixtures::create_user(&app.db, false).await.unwrap();
    fixtures::create_org_with_plan(&app.db, user_id, "pro").await.unwrap();

    let req = generate_request(user_id, json!({ "topic": "a podcast script", "content_type": "audio" }));
    let resp = app.router.clone().oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn repeating_an_idempotency_key_returns_the_same_job() {
    let app = TestApp::spawn().await;
    let user_id = fixtures::create_user(&app.db, false).await.unwrap();
    let key = uuid::Uuid::new_v4().to_string();

    let first = generate_request(
        user_id,
        json!({ "topic": "idempotent topic", "content_type": "blog", "idempotency_key": key }),
    );
    let resp = app.router.clone().oneshot(first).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let first_body = body_json(resp).await;

    // The job is still non-terminal (pending), so this is a conflict, not
    // a replay — a running background task owns the idempotency key.
    let second = generate_request(
        user_id,
        json!({ "topic": "idempotent topic", "content_type": "blog", "idempotency_key": key }),
    );
    let resp = app.router.clone().oneshot(second).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    // Completing the job and repeating the same key now replays it.
    sqlx::query("UPDATE jobs SET status = 'completed' WHERE id = $1")
        .bind(first_body["id"].as_str().unwrap().parse::<uuid::Uuid>().unwrap())
        .execute(&app.db)
        .await
        .unwrap();

    let third = generate_request(
        user_id,
        json!({ "topic": "idempotent topic", "content_type": "blog", "idempotency_key": key }),
    );
    let resp = app.router.clone().oneshot(third).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let third_body = body_json(resp).await;
    assert_eq!(third_body["id"], first_body["id"]);
}

#[tokio::test]
async fn get_job_requires_ownership() {
    let app = TestApp::spawn().await;
    let owner = fixtures::create_user(&app.db, false).await.unwrap();
    let stranger = fixtures::create_user(&app.db, false).await.unwrap();
    let org_id = fixtures::create_org_with_plan(&app.db, owner, "free").await.unwrap();
    let job_id = fixtures::create_job(&app.db, org_id, owner, "pending", &["blog".to_string()]).await.unwrap();

    let req = Request::builder()
        .method("GET")
        .uri(format!("/v1/content/jobs/{job_id}"))
        .header("x-user-id", stranger.to_string())
        .body(Body::empty())
        .unwrap();
    let resp = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let req = Request::builder()
        .method("GET")
        .uri(format!("/v1/content/jobs/{job_id}"))
        .header("x-user-id", owner.to_string())
        .body(Body::empty())
        .unwrap();
    let resp = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn list_jobs_filters_by_status() {
    let app = TestApp::spawn().await;
    let user_id = fixtures::create_user(&app.db, false).await.unwrap();
    let org_id = fixtures::create_org_with_plan(&app.db, user_id, "free").await.unwrap();
    fixtures::create_job(&app.db, org_id, user_id, "pending", &["blog".to_string()]).await.unwrap();
    fixtures::create_job(&app.db, org_id, user_id, "completed", &["social".to_string()]).await.unwrap();

    let req = Request::builder()
        .method("GET")
        .uri("/v1/content/jobs?status=completed")
        .header("x-user-id", user_id.to_string())
        .body(Body::empty())
        .unwrap();
    let resp = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body_json(resp).await;
    let jobs = body.as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["status"], "completed");
}

#[tokio::test]
async fn cancel_job_transitions_non_terminal_jobs() {
    let app = TestApp::spawn().await;
    let user_id = fixtures::create_user(&app.db, false).await.unwrap();
    let org_id = fixtures::create_org_with_plan(&app.db, user_id, "free").await.unwrap();
    let job_id = fixtures::create_job(&app.db, org_id, user_id, "pending", &["blog".to_string()]).await.unwrap();

    let req = Request::builder()
        .method("POST")
        .uri(format!("/v1/content/jobs/{job_id}/cancel"))
        .header("x-user-id", user_id.to_string())
        .body(Body::empty())
        .unwrap();
    let resp = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["status"], "cancelled");
}

#[tokio::test]
async fn cancel_job_rejects_already_terminal_jobs() {
    let app = TestApp::spawn().await;
    let user_id = fixtures::create_user(&app.db, false).await.unwrap();
    let org_id = fixtures::create_org_with_plan(&app.db, user_id, "free").await.unwrap();
    let job_id = fixtures::create_job(&app.db, org_id, user_id, "completed", &["blog".to_string()]).await.unwrap();

    let req = Request::builder()
        .method("POST")
        .uri(format!("/v1/content/jobs/{job_id}/cancel"))
        .header("x-user-id", user_id.to_string())
        .body(Body::empty())
        .unwrap();
    let resp = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn usage_reports_remaining_quota_for_each_content_kind() {
    let app = TestApp::spawn().await;
    let user_id = fixtures::create_user(&app.db, false).await.unwrap();

    let req = Request::builder()
        .method("GET")
        .uri("/v1/content/usage")
        .header("x-user-id", user_id.to_string())
        .body(Body::empty())
        .unwrap();
    let resp = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body_json(resp).await;
    assert_eq!(body["blog"]["limit"], 10);
    assert_eq!(body["blog"]["used"], 0);
    assert_eq!(body["audio"]["limit"], 0);
}

#[tokio::test]
async fn upsert_artifact_inserts_a_new_row_per_call_for_repeatable_types() {
    let app = TestApp::spawn().await;
    let user_id = fixtures::create_user(&app.db, false).await.unwrap();
    let org_id = fixtures::create_org_with_plan(&app.db, user_id, "pro").await.unwrap();
    let job_id = fixtures::create_job(&app.db, org_id, user_id, "running", &["video".to_string()]).await.unwrap();

    let jobs = JobStore::new(app.db.clone());
    jobs.upsert_artifact(job_id, "storyboard_image", Some("scene 1"), None, None, None).await.unwrap();
    jobs.upsert_artifact(job_id, "storyboard_image", Some("scene 2"), None, None, None).await.unwrap();
    jobs.upsert_artifact(job_id, "storyboard_image", Some("scene 3"), None, None, None).await.unwrap();

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM artifacts WHERE job_id = $1 AND type = 'storyboard_image'")
        .bind(job_id)
        .fetch_one(&app.db)
        .await
        .unwrap();
    assert_eq!(count, 3, "each scene's storyboard image should be its own row, not overwritten");
}

#[tokio::test]
async fn upsert_artifact_overwrites_in_place_for_non_repeatable_types() {
    let app = TestApp::spawn().await;
    let user_id = fixtures::create_user(&app.db, false).await.unwrap();
    let org_id = fixtures::create_org_with_plan(&app.db, user_id, "pro").await.unwrap();
    let job_id = fixtures::create_job(&app.db, org_id, user_id, "running", &["blog".to_string()]).await.unwrap();

    let jobs = JobStore::new(app.db.clone());
    jobs.upsert_artifact(job_id, "blog", Some("draft one"), None, None, None).await.unwrap();
    jobs.upsert_artifact(job_id, "blog", Some("draft two"), None, None, None).await.unwrap();

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM artifacts WHERE job_id = $1 AND type = 'blog'")
        .bind(job_id)
        .fetch_one(&app.db)
        .await
        .unwrap();
    assert_eq!(count, 1);

    let text: Option<String> = sqlx::query_scalar("SELECT content_text FROM artifacts WHERE job_id = $1 AND type = 'blog'")
        .bind(job_id)
        .fetch_one(&app.db)
        .await
        .unwrap();
    assert_eq!(text.as_deref(), Some("draft two"));
}
