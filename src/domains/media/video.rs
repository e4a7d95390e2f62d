//! Component H — video sub-runner. Structurally the same shape as
//! `voiceover`, but emits per-scene events and writes a `final_video`
//! artifact plus optional `storyboard_image`/`video_clip` artifacts
//! (spec §4.H).

use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use crate::domains::content::models::JobStatus;
use crate::domains::content::store::JobStore;
use crate::domains::plan::PlanPolicy;
use crate::kernel::traits::VideoRenderOptions;
use crate::kernel::{BlobStorage, EventStore, VideoRenderer};

#[derive(Clone)]
pub struct VideoRunner {
    pub jobs: JobStore,
    pub event_store: Arc<EventStore>,
    pub renderer: Arc<dyn VideoRenderer>,
    pub blob: Arc<dyn BlobStorage>,
    pub policy: Arc<PlanPolicy>,
}

pub struct VideoRenderRequest {
    pub job_id: Uuid,
    pub org_id: Uuid,
    pub script_json: serde_json::Value,
    pub options: VideoRenderOptions,
}

impl VideoRunner {
    async fn emit(&self, job_id: Uuid, event_type: &str, data: serde_json::Value) {
        self.event_store.append(job_id, event_type, data).await;
    }

    pub async fn run(&self, request: VideoRenderRequest) {
        if let Err(err) = self.run_inner(&request).await {
            tracing::error!(job_id = %request.job_id, error = %err, "video runner failed");
            let _ = self.jobs.update_status(request.job_id, JobStatus::Failed).await;
            self.emit(request.job_id, "video_render_failed", json!({
                "job_id": request.job_id,
                "message": "video rendering failed",
                "error_type": "no_result",
            })).await;
        }
    }

    async fn run_inner(&self, request: &VideoRenderRequest) -> anyhow::Result<()> {
        let job_id = request.job_id;

        self.jobs.update_status(job_id, JobStatus::Running).await?;
        self.emit(job_id, "video_render_started", json!({ "job_id": job_id, "resolution": request.options.resolution, "fps": request.options.fps })).await;

        let scene_count = request
            .script_json
            .get("scenes")
            .and_then(|s| s.as_array())
            .map(|s| s.len())
            .unwrap_or(0);

        for index in 0..scene_count {
            self.emit(job_id, "scene_started", json!({ "scene_index": index })).await;
        }

        let output = self.renderer.render(&request.script_json, &request.options).await?;

        for index in 0..scene_count {
            self.emit(job_id, "scene_completed", json!({ "scene_index": index })).await;
        }

        let mut storyboard_and_clip_ids = Vec::new();
        for asset in &output.assets {
            let key = self.blob.generate_key(&asset.asset_type, "bin");
            let url = self.blob.put(&key, asset.bytes.clone(), "application/octet-stream").await?;
            let artifact_type = match asset.asset_type.as_str() {
                "storyboard_image" => "storyboard_image",
                _ => "video_clip",
            };
            let artifact = self
                .jobs
                .upsert_artifact(
                    job_id,
                    artifact_type,
                    None,
                    Some(json!({ "storage_key": key, "url": url, "metadata": asset.metadata })),
                    None,
                    None,
                )
                .await?;
            storyboard_and_clip_ids.push(artifact.id);
        }

        let final_key = self.blob.generate_key("final_video", "mp4");
        let final_url = self.blob.put(&final_key, output.video_bytes, "video/mp4").await?;
        let final_artifact = self
            .jobs
            .upsert_artifact(
                job_id,
                "final_video",
                None,
                Some(json!({ "storage_key": final_key, "url": final_url, "metadata": output.metadata })),
                None,
                None,
            )
            .await?;

        self.emit(job_id, "artifact_ready", json!({ "format": "final_video", "artifact_id": final_artifact.id, "url": self.blob.url_for(&final_key) })).await;
        self.emit(job_id, "video_render_completed", json!({ "job_id": job_id, "artifact_id": final_artifact.id })).await;

        self.jobs.update_status(job_id, JobStatus::Completed).await?;
        self.policy.increment(request.org_id, "final_video").await?;

        self.emit(job_id, "complete", json!({ "job_id": job_id, "formats": { "final_video": self.blob.url_for(&final_key) } })).await;

        Ok(())
    }
}
