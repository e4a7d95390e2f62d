//! Component E — Job Runner. Orchestrates one job end-to-end: cache →
//! LLM → extract → validate → persist (spec §4.E). Runs as a spawned
//! background task; the caller owns registration with the Task
//! Registry and passes in the `CancellationToken` it hands back.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::cache_key::content_cache_key;
use super::extractors::{chunk_size_for, chunk_text, extract_and_validate, PROMPT_VERSION};
use super::moderation;
use super::models::JobStatus;
use super::store::JobStore;
use crate::config::Config;
use crate::domains::plan::PlanPolicy;
use crate::domains::tenant::User;
use crate::kernel::{Cache, EventStore, LlmRuntime};
use crate::kernel::traits::{AgentRequest, AgentResult};

const AGENT_PROGRESS_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Clone)]
pub struct JobRunner {
    pub jobs: JobStore,
    pub policy: Arc<PlanPolicy>,
    pub event_store: Arc<EventStore>,
    pub cache: Arc<dyn Cache>,
    pub llm: Arc<dyn LlmRuntime>,
    pub config: Arc<Config>,
}

struct RunContext {
    job_id: Uuid,
    org_id: Uuid,
    topic: String,
    formats: Vec<String>,
    model: String,
    plan: String,
}

impl JobRunner {
    async fn emit(&self, job_id: Uuid, event_type: &str, data: serde_json::Value) {
        self.event_store.append(job_id, event_type, data).await;
    }

    pub async fn run(&self, job_id: Uuid, user: User, cancel: CancellationToken) {
        if let Err(err) = self.run_inner(job_id, &user, &cancel).await {
            tracing::error!(job_id = %job_id, error = %err, "job runner failed");
            self.fail_job(job_id, &err.to_string()).await;
        }
    }

    async fn run_inner(
        &self,
        job_id: Uuid,
        user: &User,
        cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        // Step 1: short session — resolve plan/model/org, transition running, close.
        let job = self
            .jobs
            .get_job(job_id, user.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("job {job_id} not found for runner"))?;

        let plan = self.policy.plan_of(user).await?;
        let org_id = self.policy.org_id_of(user).await?;
        let model = self.policy.model_for(user, job.formats_requested.first().map(|s| s.as_str())).await?;

        self.jobs.update_status(job_id, JobStatus::Running).await?;

        let ctx = RunContext {
            job_id,
            org_id,
            topic: job.topic.clone(),
            formats: job.formats_requested.clone(),
            model,
            plan: plan.as_str().to_string(),
        };

        // Step 2: progress announcement.
        self.emit(job_id, "job_started", json!({ "job_id": job_id })).await;
        self.emit(
            job_id,
            "status_update",
            json!({ "message": format!("generating {}", ctx.formats.join(", ")) }),
        )
        .await;

        if cancel.is_cancelled() {
            return self.cancel_job(job_id).await;
        }

        // Step 3: cache lookup.
        let (cached, remaining_formats) = self.check_cache(&ctx).await?;
        for (format, text) in &cached {
            self.emit(job_id, "content", json!({ "format": format, "content": text, "progress": 100, "saved": true, "from_cache": true })).await;
            self.jobs
                .upsert_artifact(job_id, format, Some(text.as_str()), None, Some(PROMPT_VERSION), Some(ctx.model.as_str()))
                .await?;
            self.policy.increment(ctx.org_id, format).await?;
        }

        if remaining_formats.is_empty() {
            self.jobs.update_status(job_id, JobStatus::Completed).await?;
            self.emit_complete(job_id).await?;
            return Ok(());
        }

        if cancel.is_cancelled() {
            return self.cancel_job(job_id).await;
        }

        // Step 4: preflight.
        if ctx.model.trim().is_empty() {
            self.emit(
                job_id,
                "error",
                json!({
                    "job_id": job_id,
                    "message": "content generation is not configured",
                    "error_type": "configuration_error",
                    "hint": "no model is configured for this tier"
                }),
            )
            .await;
            self.jobs.update_status(job_id, JobStatus::Failed).await?;
            return Ok(());
        }

        // Step 5: agent execution, offloaded, with a progress ticker and timeout.
        let timeout = Duration::from_secs(self.config.crewai_timeout_secs as u64);
        let agent_result = match self.run_agent_with_progress(&ctx, &remaining_formats, cancel, timeout).await {
            Ok(Some(result)) => result,
            Ok(None) => return self.cancel_job(job_id).await,
            Err(err) => {
                self.handle_agent_error(job_id, &err).await;
                self.jobs.update_status(job_id, JobStatus::Failed).await?;
                return Ok(());
            }
        };

        if cancel.is_cancelled() {
            return self.cancel_job(job_id).await;
        }

        // Step 7: per-format processing. Blog first (seeds everything else),
        // remaining formats extracted in parallel.
        let blog_first: Vec<String> = remaining_formats
            .iter()
            .filter(|f| f.as_str() == "blog")
            .cloned()
            .collect();
        let rest: Vec<String> = remaining_formats
            .iter()
            .filter(|f| f.as_str() != "blog")
            .cloned()
            .collect();

        for format in &blog_first {
            self.process_format(&ctx, format, &agent_result).await?;
        }

        let mut handles = Vec::new();
        for format in rest {
            let ctx_ref = RunContext {
                job_id: ctx.job_id,
                org_id: ctx.org_id,
                topic: ctx.topic.clone(),
                formats: ctx.formats.clone(),
                model: ctx.model.clone(),
                plan: ctx.plan.clone(),
            };
            let this = self.clone();
            let agent_result = agent_result.clone();
            handles.push(tokio::spawn(async move {
                if let Err(err) = this.process_format(&ctx_ref, &format, &agent_result).await {
                    tracing::warn!(job_id = %ctx_ref.job_id, format = %format, error = %err, "format extraction failed");
                    this.emit(
                        ctx_ref.job_id,
                        "error",
                        json!({ "job_id": ctx_ref.job_id, "message": format!("failed to process {format}"), "error_type": "extraction_failed" }),
                    )
                    .await;
                }
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }

        if cancel.is_cancelled() {
            return self.cancel_job(job_id).await;
        }

        // Step 9: completion.
        self.jobs.update_status(job_id, JobStatus::Completed).await?;
        self.emit_complete(job_id).await?;

        Ok(())
    }

    /// Checks the content cache for every requested format; returns the
    /// cached hits and the formats that still need generation (spec §4.E
    /// step 3 — partial hits skip only the covered formats).
    async fn check_cache(&self, ctx: &RunContext) -> anyhow::Result<(Vec<(String, String)>, Vec<String>)> {
        let mut cached = Vec::new();
        let mut remaining = Vec::new();

        for format in &ctx.formats {
            let key = self.format_cache_key(ctx, format);
            match self.cache.get(&key).await {
                Ok(Some(text)) => cached.push((format.clone(), text)),
                _ => remaining.push(format.clone()),
            }
        }

        Ok((cached, remaining))
    }

    fn format_cache_key(&self, ctx: &RunContext, format: &str) -> String {
        let key = content_cache_key(&ctx.topic, &ctx.formats, PROMPT_VERSION, &ctx.model, &self.config.moderation_version);
        format!("content:{key}:{format}")
    }

    async fn run_agent_with_progress(
        &self,
        ctx: &RunContext,
        formats: &[String],
        cancel: &CancellationToken,
        timeout: Duration,
    ) -> anyhow::Result<Option<AgentResult>> {
        let request = AgentRequest {
            topic: ctx.topic.clone(),
            formats: formats.to_vec(),
            tier: ctx.plan.clone(),
            model: ctx.model.clone(),
            timeout_secs: timeout.as_secs(),
        };

        let llm = self.llm.clone();
        let agent_future = tokio::task::spawn(async move { llm.run(request).await });

        let start = tokio::time::Instant::now();
        let mut ticker = tokio::time::interval(AGENT_PROGRESS_INTERVAL);
        tokio::pin!(agent_future);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Ok(None);
                }
                _ = ticker.tick() => {
                    let elapsed = start.elapsed();
                    if elapsed >= timeout {
                        self.emit(ctx.job_id, "error", json!({
                            "job_id": ctx.job_id,
                            "message": "content generation timed out",
                            "error_type": "timeout",
                            "hint": "increase CREWAI_TIMEOUT or request fewer formats"
                        })).await;
                        return Err(anyhow::anyhow!("agent execution timed out"));
                    }
                    let progress = estimate_progress(elapsed, timeout);
                    self.emit(ctx.job_id, "agent_progress", json!({
                        "progress": progress,
                        "eta_seconds": (timeout.as_secs() as i64 - elapsed.as_secs() as i64).max(0),
                    })).await;
                }
                result = &mut agent_future => {
                    let result = result.map_err(|err| anyhow::anyhow!("agent task panicked: {err}"))?;
                    return result.map(Some);
                }
            }
        }
    }

    async fn handle_agent_error(&self, job_id: Uuid, err: &anyhow::Error) {
        let message = err.to_string();
        let lower = message.to_lowercase();

        if lower.contains("rate limit") || lower.contains("429") || lower.contains("tpm") || lower.contains("rpm") {
            self.emit(job_id, "error", json!({
                "job_id": job_id,
                "message": "the content provider is rate-limiting requests",
                "error_type": "rate_limit",
                "hint": "consider upgrading your plan for higher throughput"
            })).await;
        } else if lower.contains("auth") || lower.contains("unauthorized") || lower.contains("api key") {
            self.emit(job_id, "error", json!({
                "job_id": job_id,
                "message": "content generation is not configured",
                "error_type": "configuration_error"
            })).await;
        } else {
            tracing::error!(job_id = %job_id, error = %message, "agent execution failed");
            self.emit(job_id, "error", json!({
                "job_id": job_id,
                "message": "content generation failed",
                "error_type": "no_result"
            })).await;
        }
    }

    async fn process_format(&self, ctx: &RunContext, format: &str, agent_result: &AgentResult) -> anyhow::Result<()> {
        let raw = agent_result
            .raw_by_format
            .get(format)
            .ok_or_else(|| anyhow::anyhow!("agent result missing format {format}"))?;

        let extracted = extract_and_validate(format, raw).map_err(|msg| anyhow::anyhow!(msg))?;

        let preview: String = extracted.text.chars().take(500).collect();
        self.emit(ctx.job_id, "content_preview", json!({ "format": format, "preview": preview })).await;

        let chunk_size = chunk_size_for(extracted.text.len());
        let chunks = chunk_text(&extracted.text, chunk_size);
        let total_chunks = chunks.len().max(1);
        for (i, chunk) in chunks.iter().enumerate() {
            let progress = (((i + 1) as f64 / total_chunks as f64) * 95.0).min(95.0) as i64;
            self.emit(ctx.job_id, "content", json!({
                "format": format,
                "chunk": chunk,
                "progress": progress,
                "chunk_num": i + 1,
                "total_chunks": total_chunks,
                "partial": true,
                "pending_save": true,
            })).await;
        }

        let artifact = self
            .jobs
            .upsert_artifact(ctx.job_id, format, Some(extracted.text.as_str()), extracted.json.clone(), Some(PROMPT_VERSION), Some(ctx.model.as_str()))
            .await?;

        self.policy.increment(ctx.org_id, format).await?;

        self.emit(ctx.job_id, "artifact_ready", json!({ "format": format, "artifact_id": artifact.id })).await;
        self.emit(ctx.job_id, "content", json!({
            "format": format,
            "content": extracted.text,
            "progress": 100,
            "saved": true,
        })).await;

        let cache_key = self.format_cache_key(ctx, format);
        let _ = self.cache.set_ex(&cache_key, extracted.text.clone(), 86_400).await;

        // Step 8: moderation runs in the background, never blocking the stream.
        let jobs = self.jobs.clone();
        let job_id = ctx.job_id;
        let moderation_version = self.config.moderation_version.clone();
        let artifact_id = artifact.id;
        let text = extracted.text.clone();
        let event_store = self.event_store.clone();
        tokio::spawn(async move {
            let result = moderation::check(&moderation_version, &text);
            let status = if result.passed { "passed" } else { "blocked" };
            if let Err(err) = jobs.set_moderation_status(artifact_id, status).await {
                tracing::warn!(%artifact_id, error = %err, "failed to record moderation status");
            }
            if result.passed {
                event_store.append(job_id, "moderation_passed", json!({ "artifact_id": artifact_id })).await;
            } else {
                event_store
                    .append(
                        job_id,
                        "moderation_blocked",
                        json!({ "artifact_id": artifact_id, "reason_code": result.reason.map(|r| r.as_str()) }),
                    )
                    .await;
            }
        });

        Ok(())
    }

    /// Builds the terminal `complete` event from live artifacts,
    /// falling back to the Event Store's accumulated `content` chunks
    /// if the DB read fails (spec §4.E step 9, §4.F priority order).
    async fn emit_complete(&self, job_id: Uuid) -> anyhow::Result<()> {
        let payload = match self.jobs.artifacts_for(job_id).await {
            Ok(artifacts) => {
                let mut by_format = serde_json::Map::new();
                for artifact in artifacts {
                    if let Some(text) = artifact.content_text {
                        by_format.insert(artifact.artifact_type, json!(text));
                    }
                }
                json!({ "job_id": job_id, "formats": by_format })
            }
            Err(err) => {
                tracing::warn!(job_id = %job_id, error = %err, "falling back to event store for complete payload");
                let events = self.event_store.since(job_id, None).await;
                let mut by_format = serde_json::Map::new();
                for event in events.iter().filter(|e| e.event_type == "content") {
                    if let (Some(format), Some(content)) = (
                        event.data.get("format").and_then(|v| v.as_str()),
                        event.data.get("content").and_then(|v| v.as_str()),
                    ) {
                        by_format.insert(format.to_string(), json!(content));
                    }
                }
                json!({ "job_id": job_id, "formats": by_format })
            }
        };

        self.emit(job_id, "complete", payload).await;
        Ok(())
    }

    async fn cancel_job(&self, job_id: Uuid) -> anyhow::Result<()> {
        self.jobs.update_status(job_id, JobStatus::Cancelled).await?;
        self.emit(job_id, "cancelled", json!({ "job_id": job_id, "timestamp": chrono::Utc::now() })).await;
        Ok(())
    }

    async fn fail_job(&self, job_id: Uuid, message: &str) {
        if let Err(err) = self.jobs.update_status(job_id, JobStatus::Failed).await {
            tracing::error!(job_id = %job_id, error = %err, "could not mark job failed");
        }
        self.emit(
            job_id,
            "error",
            json!({ "job_id": job_id, "message": "content generation failed", "error_type": "no_result", "hint": message }),
        )
        .await;
    }
}

/// Coarse progress estimate by execution phase (spec §4.E step 5).
fn estimate_progress(elapsed: Duration, timeout: Duration) -> i64 {
    let fraction = (elapsed.as_secs_f64() / timeout.as_secs_f64()).clamp(0.0, 1.0);
    if fraction < 0.3 {
        (fraction / 0.3 * 30.0) as i64
    } else if fraction < 0.7 {
        30 + ((fraction - 0.3) / 0.4 * 40.0) as i64
    } else if fraction < 0.95 {
        70 + ((fraction - 0.7) / 0.25 * 25.0) as i64
    } else {
        95 + ((fraction - 0.95) / 0.05 * 5.0) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_estimate_is_monotonic_and_bounded() {
        let timeout = Duration::from_secs(300);
        let mut last = -1;
        for secs in [0, 30, 90, 210, 290, 300] {
            let progress = estimate_progress(Duration::from_secs(secs), timeout);
            assert!(progress >= last);
            assert!((0..=100).contains(&progress));
            last = progress;
        }
    }
}
