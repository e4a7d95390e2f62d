//! Component F — SSE Streamer. Drains the Event Store and polls the DB
//! on an adaptive cadence, producing the client-facing frame sequence
//! (spec §4.F).

use std::convert::Infallible;
use std::time::{Duration, Instant};

use axum::response::sse::Event as SseEvent;
use futures::stream::{self, Stream};
use serde_json::json;
use uuid::Uuid;

use super::models::JobStatus;
use super::store::JobStore;
use crate::kernel::EventStore;

const KEEPALIVE_AFTER: Duration = Duration::from_secs(5);

struct StreamState {
    jobs: JobStore,
    event_store: std::sync::Arc<EventStore>,
    job_id: Uuid,
    viewer_user_id: Uuid,
    last_sent_id: i64,
    last_status: Option<JobStatus>,
    last_artifact_count: usize,
    last_emit: Instant,
    job_start: Instant,
    done: bool,
    emitted_complete_from_store: bool,
}

/// Interval the poller sleeps for, as a function of job state (spec §4.F).
fn poll_interval(status: JobStatus, elapsed: Duration, has_voiceover: bool, is_blog_only: bool) -> Duration {
    if has_voiceover {
        return Duration::from_millis(200);
    }
    if is_blog_only && elapsed > Duration::from_secs(60) {
        return Duration::from_millis(200);
    }
    match status {
        JobStatus::Running if elapsed < Duration::from_secs(30) => Duration::from_millis(300),
        JobStatus::Running if elapsed < Duration::from_secs(120) => Duration::from_millis(500),
        JobStatus::Running => Duration::from_secs(1),
        s if s.is_terminal() => Duration::from_millis(500),
        JobStatus::Pending => Duration::from_secs(1),
        _ => Duration::from_secs(1),
    }
}

fn frame(id: i64, event_type: &str, data: serde_json::Value) -> SseEvent {
    SseEvent::default().id(id.to_string()).event(event_type).data(data.to_string())
}

/// Builds the SSE body stream for one job. `last_event_id` is the
/// parsed `Last-Event-ID` header/query param (malformed values treated
/// as absent — spec §4.F initialization).
pub fn build_stream(
    jobs: JobStore,
    event_store: std::sync::Arc<EventStore>,
    job_id: Uuid,
    viewer_user_id: Uuid,
    last_event_id: Option<i64>,
) -> impl Stream<Item = Result<SseEvent, Infallible>> {
    let state = StreamState {
        jobs,
        event_store,
        job_id,
        viewer_user_id,
        last_sent_id: last_event_id.unwrap_or(0),
        last_status: None,
        last_artifact_count: 0,
        last_emit: Instant::now(),
        job_start: Instant::now(),
        done: false,
        emitted_complete_from_store: false,
    };

    let synthetic_start = last_event_id.is_none();

    stream::unfold((state, synthetic_start), move |(mut state, mut emit_synthetic)| async move {
        if state.done {
            return None;
        }

        let mut batch: Vec<SseEvent> = Vec::new();

        if emit_synthetic {
            batch.push(frame(0, "job_started", json!({ "job_id": state.job_id })));
            emit_synthetic = false;
        }

        // Drain events already in the store before touching the DB — this
        // catches the race between job creation and client connection.
        drain_store_events(&mut state, &mut batch).await;

        let job = match state.jobs.get_job(state.job_id, state.viewer_user_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                state.done = true;
                batch.push(frame(0, "error", json!({ "message": "job not found", "error_type": "not_found" })));
                return Some((stream::iter(batch.into_iter().map(Ok)), (state, emit_synthetic)));
            }
            Err(err) => {
                tracing::warn!(job_id = %state.job_id, error = %err, "transient fault resolving job for stream");
                batch.push(frame(0, "warning", json!({ "message": "temporary database issue, retrying" })));
                return Some((stream::iter(batch.into_iter().map(Ok)), (state, emit_synthetic)));
            }
        };

        let status = job.status();
        let status_changed = state.last_status != Some(status);
        if status_changed {
            let skip_bare_update = status == JobStatus::Completed && state.emitted_complete_from_store;
            if !skip_bare_update {
                batch.push(frame(0, "status_update", json!({ "status": status.as_str() })));
            }
            state.last_status = Some(status);
        }

        match state.jobs.artifacts_for(state.job_id).await {
            Ok(artifacts) => {
                if artifacts.len() > state.last_artifact_count {
                    for artifact in artifacts.iter().skip(state.last_artifact_count) {
                        batch.push(frame(0, "artifact_ready", json!({ "artifact_id": artifact.id, "type": artifact.artifact_type })));
                        if let Some(text) = &artifact.content_text {
                            batch.push(frame(0, "content", json!({ "format": artifact.artifact_type, "content": text, "progress": 100 })));
                        }
                    }
                    state.last_artifact_count = artifacts.len();
                }
            }
            Err(err) => {
                tracing::warn!(job_id = %state.job_id, error = %err, "transient fault fetching artifacts for stream");
            }
        }

        // Drain again: runner-emitted events (voiceover tts_* in particular)
        // must never be missed between the pre- and post-DB-check drains.
        drain_store_events(&mut state, &mut batch).await;

        if status.is_terminal() {
            // Terminal payload (`complete`/`error`) is constructed and
            // appended by the runner itself (spec §4.F priority order);
            // the drains above are what deliver it here.
            state.done = true;
        }

        if batch.is_empty() {
            if state.last_emit.elapsed() >= KEEPALIVE_AFTER {
                state.last_emit = Instant::now();
                batch.push(SseEvent::default().comment("keep-alive"));
            }
        } else {
            state.last_emit = Instant::now();
        }

        let elapsed = state.job_start.elapsed();
        let is_blog_only = job.formats_requested.len() == 1 && job.formats_requested.first().map(|f| f.as_str()) == Some("blog");
        let has_voiceover = job.formats_requested.iter().any(|f| f == "voiceover_audio");
        let sleep_for = poll_interval(status, elapsed, has_voiceover, is_blog_only);
        tokio::time::sleep(sleep_for).await;

        Some((stream::iter(batch.into_iter().map(Ok)), (state, emit_synthetic)))
    })
    .flatten()
}

async fn drain_store_events(state: &mut StreamState, batch: &mut Vec<SseEvent>) {
    let events = state.event_store.since(state.job_id, Some(state.last_sent_id)).await;
    for event in events {
        if event.event_type == "complete" {
            state.emitted_complete_from_store = true;
        }
        if event.event_type == "complete" || event.event_type == "error" || event.event_type == "cancelled" {
            state.done = true;
        }
        state.last_sent_id = state.last_sent_id.max(event.id);
        batch.push(frame(event.id, &event.event_type, event.data));
    }
}

/// Parses `Last-Event-ID`; malformed values are treated as absent
/// rather than rejecting the connection (spec §4.F).
pub fn parse_last_event_id(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|v| v.parse::<i64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_last_event_id_is_treated_as_absent() {
        assert_eq!(parse_last_event_id(Some("not-a-number")), None);
        assert_eq!(parse_last_event_id(Some("42")), Some(42));
        assert_eq!(parse_last_event_id(None), None);
    }

    #[test]
    fn poll_interval_matches_the_adaptive_table() {
        assert_eq!(poll_interval(JobStatus::Running, Duration::from_secs(5), false, false), Duration::from_millis(300));
        assert_eq!(poll_interval(JobStatus::Running, Duration::from_secs(60), false, false), Duration::from_millis(500));
        assert_eq!(poll_interval(JobStatus::Running, Duration::from_secs(200), false, false), Duration::from_secs(1));
        assert_eq!(poll_interval(JobStatus::Completed, Duration::from_secs(5), false, false), Duration::from_millis(500));
        assert_eq!(poll_interval(JobStatus::Pending, Duration::from_secs(1), false, false), Duration::from_secs(1));
        assert_eq!(poll_interval(JobStatus::Running, Duration::from_secs(200), true, false), Duration::from_millis(200));
    }
}
