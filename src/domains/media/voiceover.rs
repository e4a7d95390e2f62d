//! Component H — voiceover sub-runner (spec §4.H, scenario S6).

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use uuid::Uuid;

use crate::config::Config;
use crate::domains::content::models::JobStatus;
use crate::domains::content::moderation;
use crate::domains::content::store::JobStore;
use crate::domains::plan::PlanPolicy;
use crate::kernel::traits::TtsProvider;
use crate::kernel::{BlobStorage, EventStore};

const PROGRESS_TICKS: [i64; 6] = [25, 40, 55, 70, 80, 90];

#[derive(Clone)]
pub struct VoiceoverRunner {
    pub jobs: JobStore,
    pub event_store: Arc<EventStore>,
    pub tts: Arc<dyn TtsProvider>,
    pub blob: Arc<dyn BlobStorage>,
    pub policy: Arc<PlanPolicy>,
    pub config: Arc<Config>,
}

pub struct VoiceoverRequest {
    pub job_id: Uuid,
    pub org_id: Uuid,
    pub narration_text: String,
    pub voice_id: String,
    pub speed: f32,
    pub format: String,
    /// `true` for a synthetic job created for inline `narration_text`;
    /// `false` when attaching to an existing (already-terminal) job's
    /// audio artifact, in which case the job's own lifecycle is left
    /// untouched and only the new artifact/events are added.
    pub owns_lifecycle: bool,
}

impl VoiceoverRunner {
    async fn emit(&self, job_id: Uuid, event_type: &str, data: serde_json::Value) {
        self.event_store.append(job_id, event_type, data).await;
    }

    pub async fn run(&self, request: VoiceoverRequest) {
        if let Err(err) = self.run_inner(&request).await {
            tracing::error!(job_id = %request.job_id, error = %err, "voiceover runner failed");
            if request.owns_lifecycle {
                let _ = self.jobs.update_status(request.job_id, JobStatus::Failed).await;
            }
            self.emit(request.job_id, "tts_failed", json!({
                "job_id": request.job_id,
                "message": "voiceover generation failed",
                "error_type": "no_result",
            })).await;
        }
    }

    async fn run_inner(&self, request: &VoiceoverRequest) -> anyhow::Result<()> {
        let job_id = request.job_id;

        if request.owns_lifecycle {
            self.jobs.update_status(job_id, JobStatus::Running).await?;
        }

        // Step 2: 5% before any work.
        self.emit(job_id, "tts_progress", json!({ "progress": 5, "message": "preparing narration" })).await;

        // Step 3: moderate input.
        let moderation = moderation::check(&self.config.moderation_version, &request.narration_text);
        if !moderation.passed {
            self.emit(job_id, "tts_failed", json!({
                "job_id": job_id,
                "message": "narration text was blocked by moderation",
                "error_type": "input_blocked",
                "reason_code": moderation.reason.map(|r| r.as_str()),
            })).await;
            if request.owns_lifecycle {
                self.jobs.update_status(job_id, JobStatus::Failed).await?;
            }
            return Ok(());
        }

        self.emit(job_id, "tts_started", json!({ "job_id": job_id })).await;

        // Step 4: call TTS off-thread, ticking coarse progress while we wait.
        let tts = self.tts.clone();
        let text = request.narration_text.clone();
        let voice_id = request.voice_id.clone();
        let speed = request.speed;
        let format = request.format.clone();
        let synth_future = tokio::task::spawn(async move { tts.synthesize(&text, &voice_id, speed, &format).await });
        tokio::pin!(synth_future);

        let mut ticks = PROGRESS_TICKS.iter();
        let mut interval = tokio::time::interval(Duration::from_millis(800));
        let output = loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Some(progress) = ticks.next() {
                        self.emit(job_id, "tts_progress", json!({ "progress": progress, "message": "synthesizing audio" })).await;
                    }
                }
                result = &mut synth_future => {
                    let result = result.map_err(|err| anyhow::anyhow!("tts task panicked: {err}"))?;
                    match result {
                        Ok(output) => break output,
                        Err(err) => {
                            let classified = classify_tts_error(&err);
                            self.emit(job_id, "tts_failed", json!({
                                "job_id": job_id,
                                "message": classified.message,
                                "error_type": classified.error_type,
                            })).await;
                            if request.owns_lifecycle {
                                self.jobs.update_status(job_id, JobStatus::Failed).await?;
                            }
                            return Ok(());
                        }
                    }
                }
            }
        };

        // Step 5: write bytes synchronously before emitting a URL.
        let key = self.blob.generate_key("voiceover", &request.format);
        let content_type = content_type_for(&request.format);
        let url = self.blob.put(&key, output.bytes, content_type).await?;

        // Step 6: artifact_ready + tts_completed recorded in the Event
        // Store before the DB commit, so the Streamer's next poll
        // observes both at once (spec §4.H step 6).
        let artifact = self
            .jobs
            .upsert_artifact(
                job_id,
                "voiceover_audio",
                None,
                Some(json!({ "storage_key": key, "url": url, "metadata": output.metadata })),
                None,
                None,
            )
            .await?;

        self.emit(job_id, "artifact_ready", json!({ "format": "voiceover_audio", "artifact_id": artifact.id, "url": self.blob.url_for(&key) })).await;
        self.emit(job_id, "tts_completed", json!({ "job_id": job_id, "artifact_id": artifact.id })).await;

        if request.owns_lifecycle {
            self.jobs.update_status(job_id, JobStatus::Completed).await?;
        }

        // Step 7: increment usage only after the artifact is durable.
        self.policy.increment(request.org_id, "voiceover_audio").await?;

        self.emit(job_id, "complete", json!({ "job_id": job_id, "formats": { "voiceover_audio": self.blob.url_for(&key) } })).await;

        Ok(())
    }
}

struct ClassifiedTtsError {
    message: &'static str,
    error_type: &'static str,
}

/// Missing-model failures are treated as a (retryable) service
/// unavailability rather than a hard failure (spec §4.H step 4).
fn classify_tts_error(err: &anyhow::Error) -> ClassifiedTtsError {
    let message = err.to_string().to_lowercase();
    if message.contains("model") && (message.contains("missing") || message.contains("not found") || message.contains("unavailable")) {
        ClassifiedTtsError {
            message: "the voice model is temporarily unavailable",
            error_type: "service_unavailable",
        }
    } else {
        ClassifiedTtsError {
            message: "voiceover synthesis failed",
            error_type: "no_result",
        }
    }
}

fn content_type_for(format: &str) -> &'static str {
    match format {
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        _ => "audio/mpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_classified_as_service_unavailable() {
        let err = anyhow::anyhow!("voice model not found for this tier");
        let classified = classify_tts_error(&err);
        assert_eq!(classified.error_type, "service_unavailable");
    }

    #[test]
    fn generic_failure_classified_as_no_result() {
        let err = anyhow::anyhow!("connection reset by peer");
        let classified = classify_tts_error(&err);
        assert_eq!(classified.error_type, "no_result");
    }
}
