//! `/v1/content/*` — job lifecycle endpoints (spec §6).

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event as SseEvent, Sse};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domains::content::models::{artifact_type_for_content_kind, Job};
use crate::domains::content::runner::JobRunner;
use crate::domains::content::store::CreateJobOutcome;
use crate::domains::content::streamer;
use crate::errors::{ApiError, ApiResult};
use crate::kernel::deps::AppState;
use crate::server::middleware::auth::AuthUser;

#[derive(Deserialize)]
pub struct GenerateRequest {
    pub topic: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub content_types: Option<Vec<String>>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Serialize)]
pub struct JobResponse {
    pub id: Uuid,
    pub status: String,
    pub topic: String,
    pub formats_requested: Vec<String>,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            status: job.status,
            topic: job.topic,
            formats_requested: job.formats_requested,
            idempotency_key: job.idempotency_key,
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
        }
    }
}

/// Only one format per call; `content_types` beyond the first is
/// truncated (spec §6).
fn resolve_format(request: &GenerateRequest) -> Option<String> {
    request
        .content_type
        .clone()
        .or_else(|| request.content_types.as_ref().and_then(|v| v.first().cloned()))
}

pub async fn generate(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(request): Json<GenerateRequest>,
) -> ApiResult<(axum::http::StatusCode, Json<JobResponse>)> {
    let topic = request.topic.trim();
    if topic.is_empty() {
        return Err(ApiError::Validation("topic must not be empty".to_string()));
    }

    let format = resolve_format(&request).ok_or_else(|| ApiError::Validation("content_type is required".to_string()))?;
    if artifact_type_for_content_kind(&format).is_none() {
        return Err(ApiError::Validation(format!("unsupported content_type: {format}")));
    }

    state.plan_policy().check_monthly_limit(&user, &format).await?;

    let org_id = state.plan_policy().org_id_of(&user).await.map_err(ApiError::Internal)?;
    let formats = vec![format];

    let outcome = state
        .job_store()
        .create_job(org_id, user.id, topic, &formats, request.idempotency_key)
        .await
        .map_err(ApiError::Internal)?;

    match outcome {
        CreateJobOutcome::Created(job) => {
            spawn_runner(&state, job.id, user.clone());
            Ok((axum::http::StatusCode::CREATED, Json(job.into())))
        }
        CreateJobOutcome::Existing(job) => Ok((axum::http::StatusCode::OK, Json(job.into()))),
        CreateJobOutcome::Conflict { job_id, status } => Err(ApiError::Conflict(format!(
            "job {job_id} with idempotency key already in flight (status: {status})"
        ))),
    }
}

/// Spawns the runner as a registered, cancellable background task.
///
/// `TaskRegistry::register` needs the task's own `JoinHandle` to hand
/// back a `CancellationToken`, and the runner needs that same token —
/// a one-shot channel breaks the cycle: the runner task blocks on it
/// before doing any real work, and a tiny supervisor task registers the
/// handle and feeds the token back.
fn spawn_runner(state: &AppState, job_id: Uuid, user: crate::domains::tenant::User) {
    let runner = JobRunner {
        jobs: state.job_store(),
        policy: state.plan_policy(),
        event_store: state.event_store.clone(),
        cache: state.cache.clone(),
        llm: state.llm.clone(),
        config: state.config.clone(),
    };
    let registry = state.task_registry.clone();
    let registry_for_task = registry.clone();

    let (tx, rx) = tokio::sync::oneshot::channel::<CancellationToken>();
    let handle = tokio::spawn(async move {
        let cancel = match rx.await {
            Ok(cancel) => cancel,
            Err(_) => return,
        };
        runner.run(job_id, user, cancel).await;
        registry_for_task.unregister(job_id).await;
    });

    tokio::spawn(async move {
        let cancel = registry.register(job_id, handle).await;
        let _ = tx.send(cancel);
    });
}

#[derive(Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

pub async fn get_job(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<JobResponse>> {
    let job = state
        .job_store()
        .get_job(job_id, user.id)
        .await
        .map_err(ApiError::Internal)?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(job.into()))
}

pub async fn list_jobs(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<ListJobsQuery>,
) -> ApiResult<Json<Vec<JobResponse>>> {
    let limit = query.limit.clamp(1, 100);
    let jobs = state
        .job_store()
        .list_jobs(user.id, query.status.as_deref(), limit, query.offset)
        .await
        .map_err(ApiError::Internal)?;
    Ok(Json(jobs.into_iter().map(JobResponse::from).collect()))
}

pub async fn cancel_job(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<JobResponse>> {
    let job = state
        .job_store()
        .get_job(job_id, user.id)
        .await
        .map_err(ApiError::Internal)?
        .ok_or(ApiError::NotFound)?;

    if job.status().is_terminal() {
        return Err(ApiError::Forbidden("job already finished".to_string()));
    }

    // Signal the running task first; the runner observes this at its
    // next suspension point and performs the state transition itself
    // (spec §4.E cancellation). Only force the transition here when no
    // task is actually running — e.g. the job hasn't been picked up yet.
    let task_was_running = state.task_registry.cancel(job_id).await;
    if !task_was_running {
        state.job_store().cancel_job(job_id, user.id).await.map_err(ApiError::Internal)?;
    }

    let job = state
        .job_store()
        .get_job(job_id, user.id)
        .await
        .map_err(ApiError::Internal)?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(job.into()))
}

#[derive(Deserialize)]
pub struct StreamQuery {
    #[serde(rename = "lastEventId")]
    pub last_event_id: Option<String>,
}

/// Honors `Last-Event-ID` as either a header (standard EventSource
/// reconnect behavior) or a query param (spec §6).
pub async fn stream_job(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(job_id): Path<Uuid>,
    Query(query): Query<StreamQuery>,
    headers: axum::http::HeaderMap,
) -> ApiResult<Sse<impl futures::Stream<Item = Result<SseEvent, std::convert::Infallible>>>> {
    state
        .job_store()
        .get_job(job_id, user.id)
        .await
        .map_err(ApiError::Internal)?
        .ok_or(ApiError::NotFound)?;

    let header_value = headers.get("last-event-id").and_then(|v| v.to_str().ok());
    let last_event_id = streamer::parse_last_event_id(header_value.or(query.last_event_id.as_deref()));

    let body = streamer::build_stream(state.job_store(), Arc::clone(&state.event_store), job_id, user.id, last_event_id);

    Ok(Sse::new(body))
}

pub async fn usage(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult<Json<serde_json::Value>> {
    let stats = state.plan_policy().usage_stats(&user).await.map_err(ApiError::Internal)?;
    Ok(Json(serde_json::to_value(stats).map_err(|e| ApiError::Internal(e.into()))?))
}
