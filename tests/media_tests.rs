//! Integration tests for `/v1/content/voiceover` and
//! `/v1/content/video/render`. Both routes hand their actual synthesis
//! work off to a spawned background runner that talks to an
//! intentionally unreachable provider URL in the test harness, so these
//! tests only assert on the initial response and the persisted job row
//! the route creates before returning.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{fixtures, TestApp};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, user_id: uuid::Uuid, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-user-id", user_id.to_string())
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn voiceover_from_narration_text_creates_a_synthetic_job() {
    let app = TestApp::spawn().await;
    let user_id = fixtures::create_user(&app.db, false).await.unwrap();
    fixtures::create_org_with_plan(&app.db, user_id, "pro").await.unwrap();

    let req = post_json(
        "/v1/content/voiceover",
        user_id,
        json!({ "narration_text": "welcome to the show", "voice_id": "v1", "speed": 1.0, "format": "mp3" }),
    );
    let resp = app.router.clone().oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let body = body_json(resp).await;
    assert_eq!(body["formats_requested"], json!(["voiceover_audio"]));
}

#[tokio::test]
async fn voiceover_rejects_both_job_id_and_narration_text() {
    let app = TestApp::spawn().await;
    let user_id = fixtures::create_user(&app.db, false).await.unwrap();
    fixtures::create_org_with_plan(&app.db, user_id, "pro").await.unwrap();
    let org_id = sqlx::query_scalar::<_, uuid::Uuid>("SELECT org_id FROM memberships WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(&app.db)
        .await
        .unwrap();
    let job_id = fixtures::create_job(&app.db, org_id, user_id, "completed", &["audio".to_string()]).await.unwrap();

    let req = post_json(
        "/v1/content/voiceover",
        user_id,
        json!({ "job_id": job_id, "narration_text": "also this", "voice_id": "v1", "speed": 1.0, "format": "mp3" }),
    );
    let resp = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn voiceover_rejects_neither_job_id_nor_narration_text() {
    let app = TestApp::spawn().await;
    let user_id = fixtures::create_user(&app.db, false).await.unwrap();
    fixtures::create_org_with_plan(&app.db, user_id, "pro").await.unwrap();

    let req = post_json(
        "/v1/content/voiceover",
        user_id,
        json!({ "voice_id": "v1", "speed": 1.0, "format": "mp3" }),
    );
    let resp = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn voiceover_rejects_speed_outside_the_allowed_range() {
    let app = TestApp::spawn().await;
    let user_id = fixtures::create_user(&app.db, false).await.unwrap();
    fixtures::create_org_with_plan(&app.db, user_id, "pro").await.unwrap();

    let req = post_json(
        "/v1/content/voiceover",
        user_id,
        json!({ "narration_text": "too fast", "voice_id": "v1", "speed": 3.0, "format": "mp3" }),
    );
    let resp = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn voiceover_is_blocked_on_the_free_plan() {
    let app = TestApp::spawn().await;
    let user_id = fixtures::create_user(&app.db, false).await.unwrap();

    let req = post_json(
        "/v1/content/voiceover",
        user_id,
        json!({ "narration_text": "free tier narration", "voice_id": "v1", "speed": 1.0, "format": "mp3" }),
    );
    let resp = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn voiceover_from_job_id_requires_an_audio_artifact() {
    let app = TestApp::spawn().await;
    let user_id = fixtures::create_user(&app.db, false).await.unwrap();
    fixtures::create_org_with_plan(&app.db, user_id, "pro").await.unwrap();
    let org_id = sqlx::query_scalar::<_, uuid::Uuid>("SELECT org_id FROM memberships WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(&app.db)
        .await
        .unwrap();
    let job_id = fixtures::create_job(&app.db, org_id, user_id, "completed", &["blog".to_string()]).await.unwrap();

    let req = post_json(
        "/v1/content/voiceover",
        user_id,
        json!({ "job_id": job_id, "voice_id": "v1", "speed": 1.0, "format": "mp3" }),
    );
    let resp = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn voiceover_from_job_id_uses_the_existing_audio_artifact_text() {
    let app = TestApp::spawn().await;
    let user_id = fixtures::create_user(&app.db, false).await.unwrap();
    fixtures::create_org_with_plan(&app.db, user_id, "pro").await.unwrap();
    let org_id = sqlx::query_scalar::<_, uuid::Uuid>("SELECT org_id FROM memberships WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(&app.db)
        .await
        .unwrap();
    let job_id = fixtures::create_job(&app.db, org_id, user_id, "completed", &["audio".to_string()]).await.unwrap();
    fixtures::create_artifact(&app.db, job_id, "audio", Some("narrate this script"), None).await.unwrap();

    let req = post_json(
        "/v1/content/voiceover",
        user_id,
        json!({ "job_id": job_id, "voice_id": "v1", "speed": 1.0, "format": "mp3" }),
    );
    let resp = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let body = body_json(resp).await;
    // job_id path reuses the source job rather than minting a synthetic one.
    assert_eq!(body["id"], job_id.to_string());
}

#[tokio::test]
async fn render_video_rejects_fps_outside_the_allowed_range() {
    let app = TestApp::spawn().await;
    let user_id = fixtures::create_user(&app.db, false).await.unwrap();
    fixtures::create_org_with_plan(&app.db, user_id, "pro").await.unwrap();
    let org_id = sqlx::query_scalar::<_, uuid::Uuid>("SELECT org_id FROM memberships WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(&app.db)
        .await
        .unwrap();
    let job_id = fixtures::create_job(&app.db, org_id, user_id, "completed", &["video".to_string()]).await.unwrap();

    let req = post_json(
        "/v1/content/video/render",
        user_id,
        json!({ "job_id": job_id, "resolution": [1280, 720], "fps": 120 }),
    );
    let resp = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn render_video_is_blocked_on_the_free_plan() {
    let app = TestApp::spawn().await;
    let user_id = fixtures::create_user(&app.db, false).await.unwrap();
    let org_id = fixtures::create_org_with_plan(&app.db, user_id, "free").await.unwrap();
    let job_id = fixtures::create_job(&app.db, org_id, user_id, "completed", &["video".to_string()]).await.unwrap();

    let req = post_json(
        "/v1/content/video/render",
        user_id,
        json!({ "job_id": job_id, "resolution": [1280, 720], "fps": 30 }),
    );
    let resp = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn render_video_requires_a_video_script_artifact() {
    let app = TestApp::spawn().await;
    let user_id = fixtures::create_user(&app.db, false).await.unwrap();
    fixtures::create_org_with_plan(&app.db, user_id, "pro").await.unwrap();
    let org_id = sqlx::query_scalar::<_, uuid::Uuid>("SELECT org_id FROM memberships WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(&app.db)
        .await
        .unwrap();
    let job_id = fixtures::create_job(&app.db, org_id, user_id, "completed", &["blog".to_string()]).await.unwrap();

    let req = post_json(
        "/v1/content/video/render",
        user_id,
        json!({ "job_id": job_id, "resolution": [1280, 720], "fps": 30 }),
    );
    let resp = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn render_video_creates_a_synthetic_job_distinct_from_the_source() {
    let app = TestApp::spawn().await;
    let user_id = fixtures::create_user(&app.db, false).await.unwrap();
    fixtures::create_org_with_plan(&app.db, user_id, "pro").await.unwrap();
    let org_id = sqlx::query_scalar::<_, uuid::Uuid>("SELECT org_id FROM memberships WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(&app.db)
        .await
        .unwrap();
    let job_id = fixtures::create_job(&app.db, org_id, user_id, "completed", &["video".to_string()]).await.unwrap();
    fixtures::create_artifact(&app.db, job_id, "video", None, Some(json!({ "scenes": [] }))).await.unwrap();

    let req = post_json(
        "/v1/content/video/render",
        user_id,
        json!({ "job_id": job_id, "resolution": [1920, 1080], "fps": 30, "background_type": "solid" }),
    );
    let resp = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let body = body_json(resp).await;
    assert_ne!(body["id"], job_id.to_string(), "render should spawn a distinct job from its source script");
    assert_eq!(body["formats_requested"], json!(["final_video"]));
}
