//! Trait definitions for the core's external collaborators (spec §6, §9).
//!
//! These are INFRASTRUCTURE traits only — contracts, not implementations.
//! Naming follows the teacher's `Base*` convention.

use async_trait::async_trait;
use serde_json::Value;

/// Key-addressed blob storage (spec §6).
#[async_trait]
pub trait BlobStorage: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> anyhow::Result<String>;
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
    async fn delete(&self, key: &str) -> anyhow::Result<bool>;
    fn url_for(&self, key: &str) -> String;
    fn generate_key(&self, namespace: &str, suffix: &str) -> String;
}

/// Sanitize a caller-supplied key before joining it with a local base path.
/// Strips leading slashes and `..` components so the result cannot escape
/// the storage root.
pub fn safe_key(key: &str) -> String {
    key.trim_start_matches('/').replace("..", "")
}

/// Result of a TTS synthesis call.
#[derive(Debug, Clone)]
pub struct TtsOutput {
    pub bytes: Vec<u8>,
    pub metadata: Value,
}

#[async_trait]
pub trait TtsProvider: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        speed: f32,
        format: &str,
    ) -> anyhow::Result<TtsOutput>;
}

/// Options accepted by a video render call (spec §6, supplemented by
/// `original_source/services/video_provider.py`).
#[derive(Debug, Clone)]
pub struct VideoRenderOptions {
    pub resolution: (u32, u32),
    pub fps: u32,
    pub background_type: String,
    pub background_color: Option<String>,
    pub background_image_key: Option<String>,
    pub include_narration: bool,
    pub renderer: String,
}

impl Default for VideoRenderOptions {
    fn default() -> Self {
        Self {
            resolution: (1920, 1080),
            fps: 30,
            background_type: "solid".to_string(),
            background_color: Some("#000000".to_string()),
            background_image_key: None,
            include_narration: true,
            renderer: "baseline".to_string(),
        }
    }
}

/// An auxiliary rendered asset (storyboard image, video clip, ...).
#[derive(Debug, Clone)]
pub struct RenderAsset {
    pub asset_type: String,
    pub bytes: Vec<u8>,
    pub metadata: Value,
}

#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub video_bytes: Vec<u8>,
    pub metadata: Value,
    pub assets: Vec<RenderAsset>,
}

#[async_trait]
pub trait VideoRenderer: Send + Sync {
    async fn render(
        &self,
        script_json: &Value,
        options: &VideoRenderOptions,
    ) -> anyhow::Result<RenderOutput>;
}

/// Outbound transactional email.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body_html: String,
}

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send(&self, message: EmailMessage) -> anyhow::Result<bool>;
}

/// Billing provider webhook contract (Stripe/Paystack/bank-transfer agnostic).
#[async_trait]
pub trait BillingGateway: Send + Sync {
    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> anyhow::Result<bool>;
    fn parse_event(&self, payload: &[u8]) -> anyhow::Result<BillingWebhookEvent>;
}

#[derive(Debug, Clone)]
pub struct BillingWebhookEvent {
    pub provider: String,
    pub event_type: String,
    pub provider_event_id: String,
    pub payload: Value,
}

/// Opaque result from the LLM/agent runtime, from which per-format
/// extractors produce text (spec §6).
#[derive(Debug, Clone)]
pub struct AgentResult {
    pub raw_by_format: std::collections::HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub topic: String,
    pub formats: Vec<String>,
    pub tier: String,
    pub model: String,
    pub timeout_secs: u64,
}

#[async_trait]
pub trait LlmRuntime: Send + Sync {
    async fn run(&self, request: AgentRequest) -> anyhow::Result<AgentResult>;
}

/// Cache abstraction backing the Event Store and the content cache.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn lpush(&self, key: &str, value: String) -> anyhow::Result<()>;
    async fn ltrim(&self, key: &str, len: usize) -> anyhow::Result<()>;
    async fn expire(&self, key: &str, ttl_secs: u64) -> anyhow::Result<()>;
    async fn lrange(&self, key: &str) -> anyhow::Result<Vec<String>>;
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn set_ex(&self, key: &str, value: String, ttl_secs: u64) -> anyhow::Result<()>;
    async fn del(&self, key: &str) -> anyhow::Result<()>;
}
