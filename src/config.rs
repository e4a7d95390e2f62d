use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub port: u16,

    pub crewai_timeout_secs: u64,
    pub enable_content_moderation: bool,
    pub moderation_version: String,

    pub retention_days_free: i64,
    pub retention_days_basic: i64,
    pub retention_days_pro: i64,
    pub retention_dry_run: bool,
    pub retention_notify_days_before: i64,
    pub retention_notify_enabled: bool,
    pub retention_notify_batch_size: i64,

    pub gdpr_deletion_grace_days: i64,

    /// Concrete adapters for the external collaborators named in spec
    /// §6 are thin HTTP clients; these are the boundaries they call.
    pub blob_storage_dir: String,
    pub blob_public_base_url: String,
    pub tts_service_url: String,
    pub video_render_service_url: String,
    pub email_service_url: String,
    pub llm_service_url: String,
    pub billing_webhook_secret: String,
}

impl Config {
    /// Load configuration from environment variables, falling back to a
    /// `.env` file in development.
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,

            crewai_timeout_secs: env::var("CREWAI_TIMEOUT")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .context("CREWAI_TIMEOUT must be a valid number")?,
            enable_content_moderation: parse_bool_env("ENABLE_CONTENT_MODERATION", true),
            moderation_version: env::var("MODERATION_VERSION").unwrap_or_else(|_| "v1".into()),

            retention_days_free: env_i64("RETENTION_DAYS_FREE", 30)?,
            retention_days_basic: env_i64("RETENTION_DAYS_BASIC", 90)?,
            retention_days_pro: env_i64("RETENTION_DAYS_PRO", 365)?,
            retention_dry_run: parse_bool_env("RETENTION_DRY_RUN", false),
            retention_notify_days_before: env_i64("RETENTION_NOTIFY_DAYS_BEFORE", 7)?,
            retention_notify_enabled: parse_bool_env("RETENTION_NOTIFY_ENABLED", true),
            retention_notify_batch_size: env_i64("RETENTION_NOTIFY_BATCH_SIZE", 500)?,

            gdpr_deletion_grace_days: env_i64("GDPR_DELETION_GRACE_DAYS", 30)?,

            blob_storage_dir: env::var("BLOB_STORAGE_DIR").unwrap_or_else(|_| "./data/blobs".to_string()),
            blob_public_base_url: env::var("BLOB_PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080/media".to_string()),
            tts_service_url: env::var("TTS_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:9001/synthesize".to_string()),
            video_render_service_url: env::var("VIDEO_RENDER_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:9002/render".to_string()),
            email_service_url: env::var("EMAIL_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:9003/send".to_string()),
            llm_service_url: env::var("LLM_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:9004/run".to_string()),
            billing_webhook_secret: env::var("BILLING_WEBHOOK_SECRET").unwrap_or_default(),
        })
    }
}

fn parse_bool_env(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> Result<i64> {
    match env::var(key) {
        Ok(v) => v.parse().with_context(|| format!("{key} must be a valid integer")),
        Err(_) => Ok(default),
    }
}
