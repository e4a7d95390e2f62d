//! `/v1/content/voiceover` and `/v1/content/video/render` (spec §4.H, §6).

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domains::media::video::{VideoRenderRequest, VideoRunner};
use crate::domains::media::voiceover::{VoiceoverRequest, VoiceoverRunner};
use crate::errors::{ApiError, ApiResult};
use crate::kernel::deps::AppState;
use crate::kernel::traits::VideoRenderOptions;
use crate::server::middleware::auth::AuthUser;
use crate::server::routes::content::JobResponse;

#[derive(Deserialize)]
pub struct VoiceoverBody {
    #[serde(default)]
    pub job_id: Option<Uuid>,
    #[serde(default)]
    pub narration_text: Option<String>,
    pub voice_id: String,
    pub speed: f32,
    pub format: String,
}

/// Either source produces narration text plus the job the runner should
/// act on; `owns_lifecycle` tells the runner whether to drive that job's
/// status machine (spec §4.H step 1).
async fn resolve_narration(
    state: &AppState,
    user: &crate::domains::tenant::User,
    body: &VoiceoverBody,
) -> ApiResult<(Uuid, Uuid, String, bool)> {
    match (&body.job_id, &body.narration_text) {
        (Some(_), Some(_)) | (None, None) => Err(ApiError::Validation(
            "exactly one of job_id or narration_text is required".to_string(),
        )),
        (Some(job_id), None) => {
            let job = state
                .job_store()
                .get_job(*job_id, user.id)
                .await
                .map_err(ApiError::Internal)?
                .ok_or(ApiError::NotFound)?;

            let narration = state
                .job_store()
                .artifacts_for(*job_id)
                .await
                .map_err(ApiError::Internal)?
                .into_iter()
                .find(|artifact| artifact.artifact_type == "audio")
                .and_then(|artifact| artifact.content_text)
                .ok_or_else(|| ApiError::Validation("job has no audio artifact to narrate".to_string()))?;

            Ok((job.id, job.org_id, narration, false))
        }
        (None, Some(text)) => {
            if text.trim().is_empty() {
                return Err(ApiError::Validation("narration_text must not be empty".to_string()));
            }
            let org_id = state.plan_policy().org_id_of(user).await.map_err(ApiError::Internal)?;
            let job = match state
                .job_store()
                .create_job(org_id, user.id, text, &["voiceover_audio".to_string()], Some(Uuid::new_v4().to_string()))
                .await
                .map_err(ApiError::Internal)?
            {
                crate::domains::content::store::CreateJobOutcome::Created(job) => job,
                // A freshly minted UUID idempotency key never collides.
                other => unreachable!("synthetic voiceover job unexpectedly collided: {other:?}"),
            };
            Ok((job.id, job.org_id, text.clone(), true))
        }
    }
}

pub async fn voiceover(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<VoiceoverBody>,
) -> ApiResult<(StatusCode, Json<JobResponse>)> {
    if !(0.5..=2.0).contains(&body.speed) {
        return Err(ApiError::Validation("speed must be between 0.5 and 2.0".to_string()));
    }
    if body.voice_id.trim().is_empty() || body.format.trim().is_empty() {
        return Err(ApiError::Validation("voice_id and format are required".to_string()));
    }

    state.plan_policy().check_monthly_limit(&user, "voiceover_audio").await?;

    let (job_id, org_id, narration_text, owns_lifecycle) = resolve_narration(&state, &user, &body).await?;

    let runner = VoiceoverRunner {
        jobs: state.job_store(),
        event_store: state.event_store.clone(),
        tts: state.tts.clone(),
        blob: state.blob_storage.clone(),
        policy: state.plan_policy(),
        config: state.config.clone(),
    };
    let request = VoiceoverRequest {
        job_id,
        org_id,
        narration_text,
        voice_id: body.voice_id,
        speed: body.speed,
        format: body.format,
        owns_lifecycle,
    };

    if owns_lifecycle {
        spawn_tracked(&state, job_id, move |cancel| async move {
            let _ = cancel;
            runner.run(request).await;
        });
    } else {
        tokio::spawn(async move { runner.run(request).await });
    }

    let job = state
        .job_store()
        .get_job(job_id, user.id)
        .await
        .map_err(ApiError::Internal)?
        .ok_or(ApiError::NotFound)?;
    Ok((StatusCode::ACCEPTED, Json(job.into())))
}

#[derive(Deserialize)]
pub struct VideoRenderBody {
    pub job_id: Uuid,
    pub resolution: (u32, u32),
    pub fps: u32,
    #[serde(default)]
    pub background_type: Option<String>,
    #[serde(default)]
    pub background_color: Option<String>,
    #[serde(default)]
    pub background_image_key: Option<String>,
    #[serde(default = "default_true")]
    pub include_narration: bool,
    #[serde(default)]
    pub renderer: Option<String>,
}

fn default_true() -> bool {
    true
}

pub async fn render_video(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<VideoRenderBody>,
) -> ApiResult<(StatusCode, Json<JobResponse>)> {
    if !(24..=60).contains(&body.fps) {
        return Err(ApiError::Validation("fps must be between 24 and 60".to_string()));
    }

    state.plan_policy().check_monthly_limit(&user, "final_video").await?;

    let source = state
        .job_store()
        .get_job(body.job_id, user.id)
        .await
        .map_err(ApiError::Internal)?
        .ok_or(ApiError::NotFound)?;

    let script_json = state
        .job_store()
        .artifacts_for(source.id)
        .await
        .map_err(ApiError::Internal)?
        .into_iter()
        .find(|artifact| artifact.artifact_type == "video")
        .and_then(|artifact| artifact.content_json)
        .ok_or_else(|| ApiError::Validation("job has no video script to render".to_string()))?;

    // Rendering is its own async operation with its own SSE lifecycle —
    // the source job's script is read-only input, never re-transitioned
    // (spec §4.H step 1 reasoning, mirrored from the voiceover runner).
    let synthetic = match state
        .job_store()
        .create_job(
            source.org_id,
            user.id,
            &source.topic,
            &["final_video".to_string()],
            Some(Uuid::new_v4().to_string()),
        )
        .await
        .map_err(ApiError::Internal)?
    {
        crate::domains::content::store::CreateJobOutcome::Created(job) => job,
        other => unreachable!("synthetic video-render job unexpectedly collided: {other:?}"),
    };

    let options = VideoRenderOptions {
        resolution: body.resolution,
        fps: body.fps,
        background_type: body.background_type.unwrap_or_else(|| "solid".to_string()),
        background_color: body.background_color,
        background_image_key: body.background_image_key,
        include_narration: body.include_narration,
        renderer: body.renderer.unwrap_or_else(|| "baseline".to_string()),
    };

    let runner = VideoRunner {
        jobs: state.job_store(),
        event_store: state.event_store.clone(),
        renderer: state.video_renderer.clone(),
        blob: state.blob_storage.clone(),
        policy: state.plan_policy(),
    };
    let request = VideoRenderRequest {
        job_id: synthetic.id,
        org_id: synthetic.org_id,
        script_json,
        options,
    };

    spawn_tracked(&state, synthetic.id, move |cancel| async move {
        let _ = cancel;
        runner.run(request).await;
    });

    Ok((StatusCode::ACCEPTED, Json(synthetic.into())))
}

/// Registers `job_id` with the Task Registry before the task touches the
/// job's status, breaking the `JoinHandle`/`CancellationToken` cycle the
/// same way `routes::content::spawn_runner` does.
fn spawn_tracked<F, Fut>(state: &AppState, job_id: Uuid, body: F)
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let registry = state.task_registry.clone();
    let registry_for_task = registry.clone();

    let (tx, rx) = tokio::sync::oneshot::channel::<CancellationToken>();
    let handle = tokio::spawn(async move {
        let cancel = match rx.await {
            Ok(cancel) => cancel,
            Err(_) => return,
        };
        body(cancel).await;
        registry_for_task.unregister(job_id).await;
    });

    tokio::spawn(async move {
        let cancel = registry.register(job_id, handle).await;
        let _ = tx.send(cancel);
    });
}

