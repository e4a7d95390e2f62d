//! `Job` and `Artifact` (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }
}

impl std::str::FromStr for JobStatus {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => anyhow::bail!("unknown job status: {other}"),
        }
    }
}

/// Valid state machine transitions (spec §4.D). Terminal states are
/// sinks; any attempt to transition away is an illegal transition.
pub fn is_legal_transition(from: JobStatus, to: JobStatus) -> bool {
    use JobStatus::*;
    matches!(
        (from, to),
        (Pending, Running)
            | (Running, Completed)
            | (Running, Failed)
            | (Running, Cancelled)
            | (Pending, Cancelled)
    )
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Job {
    pub id: Uuid,
    pub org_id: Uuid,
    pub user_id: Uuid,
    pub topic: String,
    pub formats_requested: Vec<String>,
    pub status: String,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn status(&self) -> JobStatus {
        self.status.parse().unwrap_or(JobStatus::Pending)
    }
}

/// Default idempotency key derivation: `sha256(user_id || normalized_topic || sorted(formats))`.
pub fn derive_idempotency_key(user_id: Uuid, topic: &str, formats: &[String]) -> String {
    use sha2::{Digest, Sha256};

    let normalized_topic = topic.trim().to_lowercase();
    let mut sorted_formats = formats.to_vec();
    sorted_formats.sort();

    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(normalized_topic.as_bytes());
    hasher.update(sorted_formats.join(",").as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    Blog,
    Social,
    Audio,
    Video,
    VoiceoverAudio,
    StoryboardImage,
    VideoClip,
    FinalVideo,
}

impl ArtifactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactType::Blog => "blog",
            ArtifactType::Social => "social",
            ArtifactType::Audio => "audio",
            ArtifactType::Video => "video",
            ArtifactType::VoiceoverAudio => "voiceover_audio",
            ArtifactType::StoryboardImage => "storyboard_image",
            ArtifactType::VideoClip => "video_clip",
            ArtifactType::FinalVideo => "final_video",
        }
    }

    /// Media kinds may have multiple rows per job; primary content
    /// kinds are limited to at most one (job_id, type) pair (spec §3).
    pub fn allows_multiple(&self) -> bool {
        matches!(
            self,
            ArtifactType::StoryboardImage | ArtifactType::VideoClip
        )
    }
}

impl std::str::FromStr for ArtifactType {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blog" => Ok(ArtifactType::Blog),
            "social" => Ok(ArtifactType::Social),
            "audio" => Ok(ArtifactType::Audio),
            "video" => Ok(ArtifactType::Video),
            "voiceover_audio" => Ok(ArtifactType::VoiceoverAudio),
            "storyboard_image" => Ok(ArtifactType::StoryboardImage),
            "video_clip" => Ok(ArtifactType::VideoClip),
            "final_video" => Ok(ArtifactType::FinalVideo),
            other => anyhow::bail!("unknown artifact type: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModerationStatus {
    Pending,
    Passed,
    Blocked,
}

impl ModerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationStatus::Pending => "pending",
            ModerationStatus::Passed => "passed",
            ModerationStatus::Blocked => "blocked",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Artifact {
    pub id: Uuid,
    pub job_id: Uuid,
    #[sqlx(rename = "type")]
    pub artifact_type: String,
    pub content_text: Option<String>,
    pub content_json: Option<serde_json::Value>,
    pub prompt_version: Option<String>,
    pub model_used: Option<String>,
    pub moderation_status: String,
    pub created_at: DateTime<Utc>,
}

/// Maps a requested content kind (as used in `formats_requested` and
/// the HTTP surface) to the artifact type it produces. Blog/social/
/// audio/video content kinds map 1:1 to the primary artifact types.
pub fn artifact_type_for_content_kind(kind: &str) -> Option<ArtifactType> {
    match kind {
        "blog" => Some(ArtifactType::Blog),
        "social" => Some(ArtifactType::Social),
        "audio" => Some(ArtifactType::Audio),
        "video" => Some(ArtifactType::Video),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotency_key_is_order_independent_on_formats() {
        let user = Uuid::nil();
        let a = derive_idempotency_key(user, "Intro to vector DBs", &["social".into(), "blog".into()]);
        let b = derive_idempotency_key(user, "intro to vector dbs", &["blog".into(), "social".into()]);
        assert_eq!(a, b);
    }

    #[test]
    fn terminal_states_are_sinks() {
        assert!(!is_legal_transition(JobStatus::Completed, JobStatus::Running));
        assert!(!is_legal_transition(JobStatus::Failed, JobStatus::Completed));
        assert!(!is_legal_transition(JobStatus::Cancelled, JobStatus::Pending));
        assert!(is_legal_transition(JobStatus::Pending, JobStatus::Running));
        assert!(is_legal_transition(JobStatus::Running, JobStatus::Completed));
    }
}
