//! Shared test infrastructure: Postgres + Redis containers, started once
//! and reused across every integration test in this crate.

pub mod fixtures;

use std::sync::Arc;

use anyhow::{Context, Result};
use content_core::config::Config;
use content_core::kernel::deps::AppState;
use content_core::kernel::providers::{
    HmacBillingGateway, HttpEmailProvider, HttpLlmRuntime, HttpTtsProvider, HttpVideoRenderer,
    LocalBlobStorage,
};
use content_core::kernel::redis_cache::RedisCache;
use content_core::kernel::task_registry::TaskRegistry;
use content_core::kernel::traits::{
    BillingGateway, BlobStorage, Cache, EmailProvider, LlmRuntime, TtsProvider, VideoRenderer,
};
use content_core::server;
use sqlx::PgPool;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;
use testcontainers_modules::redis::Redis;
use tokio::sync::OnceCell;

pub const TEST_BILLING_SECRET: &str = "test-webhook-secret";

struct SharedTestInfra {
    db_url: String,
    redis_url: String,
    _postgres: ContainerAsync<Postgres>,
    _redis: ContainerAsync<Redis>,
}

static SHARED_INFRA: OnceCell<SharedTestInfra> = OnceCell::const_new();

impl SharedTestInfra {
    async fn init() -> Result<Self> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let postgres = Postgres::default()
            .start()
            .await
            .context("failed to start postgres container")?;
        let pg_host = postgres.get_host().await?;
        let pg_port = postgres.get_host_port_ipv4(5432).await?;
        let db_url = format!("postgres://postgres:postgres@{pg_host}:{pg_port}/postgres");

        let redis = Redis::default().start().await.context("failed to start redis container")?;
        let redis_host = redis.get_host().await?;
        let redis_port = redis.get_host_port_ipv4(6379).await?;
        let redis_url = format!("redis://{redis_host}:{redis_port}");

        let pool = PgPool::connect(&db_url).await.context("failed to connect for migrations")?;
        sqlx::migrate!("./migrations").run(&pool).await.context("failed to run migrations")?;
        pool.close().await;

        Ok(Self { db_url, redis_url, _postgres: postgres, _redis: redis })
    }

    async fn get() -> &'static Self {
        SHARED_INFRA.get_or_init(|| async { Self::init().await.expect("shared test infra init") }).await
    }
}

/// A fully assembled application for one test: its own `PgPool`/cache
/// handle, talking to the shared containers.
pub struct TestApp {
    pub router: axum::Router,
    pub db: PgPool,
}

fn test_config(database_url: String, redis_url: String) -> Config {
    Config {
        database_url,
        redis_url,
        port: 0,
        crewai_timeout_secs: 5,
        enable_content_moderation: true,
        moderation_version: "v1".into(),
        retention_days_free: 30,
        retention_days_basic: 90,
        retention_days_pro: 365,
        retention_dry_run: false,
        retention_notify_days_before: 7,
        retention_notify_enabled: true,
        retention_notify_batch_size: 500,
        gdpr_deletion_grace_days: 30,
        blob_storage_dir: std::env::temp_dir().join("content-core-tests").to_string_lossy().to_string(),
        blob_public_base_url: "http://localhost:8080/media".into(),
        // Unreachable on purpose: background runners that hit these in
        // tests fail silently in a spawned task, never on the request path.
        tts_service_url: "http://127.0.0.1:1/synthesize".into(),
        video_render_service_url: "http://127.0.0.1:1/render".into(),
        email_service_url: "http://127.0.0.1:1/send".into(),
        llm_service_url: "http://127.0.0.1:1/run".into(),
        billing_webhook_secret: TEST_BILLING_SECRET.into(),
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        let infra = SharedTestInfra::get().await;

        let db = PgPool::connect(&infra.db_url).await.expect("connect test db pool");
        let config = test_config(infra.db_url.clone(), infra.redis_url.clone());

        let cache: Arc<dyn Cache> = Arc::new(
            RedisCache::connect(&config.redis_url).await.expect("connect test redis"),
        );
        let blob_storage: Arc<dyn BlobStorage> =
            Arc::new(LocalBlobStorage::new(config.blob_storage_dir.clone(), config.blob_public_base_url.clone()));
        let tts: Arc<dyn TtsProvider> = Arc::new(HttpTtsProvider::new(config.tts_service_url.clone()));
        let video_renderer: Arc<dyn VideoRenderer> = Arc::new(HttpVideoRenderer::new(config.video_render_service_url.clone()));
        let email: Arc<dyn EmailProvider> = Arc::new(HttpEmailProvider::new(config.email_service_url.clone()));
        let billing: Arc<dyn BillingGateway> = Arc::new(HmacBillingGateway::new(config.billing_webhook_secret.clone(), "bank_transfer"));
        let llm: Arc<dyn LlmRuntime> = Arc::new(HttpLlmRuntime::new(config.llm_service_url.clone()));

        let state = AppState::new(
            db.clone(),
            config,
            cache,
            TaskRegistry::new(),
            blob_storage,
            tts,
            video_renderer,
            email,
            billing,
            llm,
        );

        Self { router: server::build_router(state), db }
    }
}
