//! Concrete adapters for the external collaborators named in spec §6.
//!
//! Their internals — TTS synthesis, video rendering, SMTP delivery,
//! provider-specific webhook parsing — are explicitly out of scope
//! (spec §1 Non-goals); these are thin HTTP clients against whatever
//! actually implements them, matching the narrow interfaces the core
//! consumes.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use super::traits::{
    AgentRequest, AgentResult, BillingGateway, BillingWebhookEvent, BlobStorage, EmailMessage,
    EmailProvider, LlmRuntime, RenderOutput, TtsOutput, TtsProvider, VideoRenderOptions,
    VideoRenderer,
};
use super::traits::safe_key;

/// Local-disk blob storage. Dev/single-replica default; a production
/// deployment swaps this for an S3-compatible `BlobStorage` behind the
/// same trait.
pub struct LocalBlobStorage {
    base_dir: std::path::PathBuf,
    public_base_url: String,
}

impl LocalBlobStorage {
    pub fn new(base_dir: impl Into<std::path::PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            public_base_url: public_base_url.into(),
        }
    }

    fn path_for(&self, key: &str) -> std::path::PathBuf {
        self.base_dir.join(safe_key(key))
    }
}

#[async_trait]
impl BlobStorage for LocalBlobStorage {
    async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> anyhow::Result<String> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(self.url_for(key))
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete(&self, key: &str) -> anyhow::Result<bool> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url.trim_end_matches('/'), safe_key(key))
    }

    fn generate_key(&self, namespace: &str, suffix: &str) -> String {
        format!("{namespace}/{}.{suffix}", Uuid::new_v4())
    }
}

/// Thin HTTP client shared by the provider adapters below — each posts
/// a JSON request and expects a JSON response shaped to its own
/// contract, since the actual synthesis/render service is external.
fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(120))
        .build()
        .expect("reqwest client configuration is valid")
}

pub struct HttpTtsProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTtsProvider {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { client: http_client(), endpoint: endpoint.into() }
    }
}

#[derive(serde::Deserialize)]
struct TtsHttpResponse {
    #[serde(with = "base64_bytes")]
    audio_bytes: Vec<u8>,
    #[serde(default)]
    metadata: serde_json::Value,
}

#[async_trait]
impl TtsProvider for HttpTtsProvider {
    async fn synthesize(&self, text: &str, voice_id: &str, speed: f32, format: &str) -> anyhow::Result<TtsOutput> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "text": text, "voice_id": voice_id, "speed": speed, "format": format }))
            .send()
            .await?
            .error_for_status()?
            .json::<TtsHttpResponse>()
            .await?;

        Ok(TtsOutput { bytes: response.audio_bytes, metadata: response.metadata })
    }
}

pub struct HttpVideoRenderer {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpVideoRenderer {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { client: http_client(), endpoint: endpoint.into() }
    }
}

#[derive(serde::Deserialize)]
struct RenderHttpAsset {
    asset_type: String,
    #[serde(with = "base64_bytes")]
    bytes: Vec<u8>,
    #[serde(default)]
    metadata: serde_json::Value,
}

#[derive(serde::Deserialize)]
struct RenderHttpResponse {
    #[serde(with = "base64_bytes")]
    video_bytes: Vec<u8>,
    #[serde(default)]
    metadata: serde_json::Value,
    #[serde(default)]
    assets: Vec<RenderHttpAsset>,
}

#[async_trait]
impl VideoRenderer for HttpVideoRenderer {
    async fn render(&self, script_json: &serde_json::Value, options: &VideoRenderOptions) -> anyhow::Result<RenderOutput> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({
                "script": script_json,
                "resolution": options.resolution,
                "fps": options.fps,
                "background_type": options.background_type,
                "background_color": options.background_color,
                "background_image_key": options.background_image_key,
                "include_narration": options.include_narration,
                "renderer": options.renderer,
            }))
            .send()
            .await?
            .error_for_status()?
            .json::<RenderHttpResponse>()
            .await?;

        Ok(RenderOutput {
            video_bytes: response.video_bytes,
            metadata: response.metadata,
            assets: response
                .assets
                .into_iter()
                .map(|asset| crate::kernel::traits::RenderAsset {
                    asset_type: asset.asset_type,
                    bytes: asset.bytes,
                    metadata: asset.metadata,
                })
                .collect(),
        })
    }
}

pub struct HttpEmailProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpEmailProvider {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { client: http_client(), endpoint: endpoint.into() }
    }
}

#[async_trait]
impl EmailProvider for HttpEmailProvider {
    async fn send(&self, message: EmailMessage) -> anyhow::Result<bool> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "to": message.to, "subject": message.subject, "body_html": message.body_html }))
            .send()
            .await?;
        Ok(response.status().is_success())
    }
}

pub struct HttpLlmRuntime {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpLlmRuntime {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { client: http_client(), endpoint: endpoint.into() }
    }
}

#[async_trait]
impl LlmRuntime for HttpLlmRuntime {
    async fn run(&self, request: AgentRequest) -> anyhow::Result<AgentResult> {
        let raw_by_format = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({
                "topic": request.topic,
                "formats": request.formats,
                "tier": request.tier,
                "model": request.model,
                "timeout_secs": request.timeout_secs,
            }))
            .timeout(std::time::Duration::from_secs(request.timeout_secs))
            .send()
            .await?
            .error_for_status()?
            .json::<std::collections::HashMap<String, String>>()
            .await?;

        Ok(AgentResult { raw_by_format })
    }
}

/// HMAC-SHA256 shared-secret signature check. Provider-specific
/// verification (Stripe/Paystack) lives outside the core per spec §1;
/// this generic scheme is the fallback for providers the gateway fronts
/// directly (e.g. bank-transfer confirmations).
pub struct HmacBillingGateway {
    secret: String,
    provider: String,
}

impl HmacBillingGateway {
    pub fn new(secret: impl Into<String>, provider: impl Into<String>) -> Self {
        Self { secret: secret.into(), provider: provider.into() }
    }
}

#[derive(serde::Deserialize)]
struct WebhookEnvelope {
    event_type: String,
    provider_event_id: String,
    #[serde(default)]
    payload: serde_json::Value,
}

#[async_trait]
impl BillingGateway for HmacBillingGateway {
    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> anyhow::Result<bool> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.as_bytes())
            .map_err(|err| anyhow::anyhow!("invalid HMAC key length: {err}"))?;
        mac.update(payload);

        let expected = hex::encode(mac.finalize().into_bytes());
        Ok(constant_time_eq(expected.as_bytes(), signature.as_bytes()))
    }

    fn parse_event(&self, payload: &[u8]) -> anyhow::Result<BillingWebhookEvent> {
        let envelope: WebhookEnvelope = serde_json::from_slice(payload)?;
        Ok(BillingWebhookEvent {
            provider: self.provider.clone(),
            event_type: envelope.event_type,
            provider_event_id: envelope.provider_event_id,
            payload: envelope.payload,
        })
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
