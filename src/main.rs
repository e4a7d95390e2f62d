// Main entry point for the content orchestrator API.

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
use content_core::kernel::traits::{BillingGateway, BlobStorage, Cache, EmailProvider, LlmRuntime, TtsProvider, VideoRenderer};
use content_core::{domains, server};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,content_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting content orchestrator");

    let config = Config::from_env().context("failed to load configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;
    tracing::info!("migrations complete");

    let cache: Arc<dyn Cache> = Arc::new(
        RedisCache::connect(&config.redis_url)
            .await
            .context("failed to connect to redis")?,
    );

    let blob_storage: Arc<dyn BlobStorage> = Arc::new(LocalBlobStorage::new(
        config.blob_storage_dir.clone(),
        config.blob_public_base_url.clone(),
    ));
    let tts: Arc<dyn TtsProvider> = Arc::new(HttpTtsProvider::new(config.tts_service_url.clone()));
    let video_renderer: Arc<dyn VideoRenderer> = Arc::new(HttpVideoRenderer::new(config.video_render_service_url.clone()));
    let email: Arc<dyn EmailProvider> = Arc::new(HttpEmailProvider::new(config.email_service_url.clone()));
    let billing: Arc<dyn BillingGateway> = Arc::new(HmacBillingGateway::new(config.billing_webhook_secret.clone(), "bank_transfer"));
    let llm: Arc<dyn LlmRuntime> = Arc::new(HttpLlmRuntime::new(config.llm_service_url.clone()));

    let task_registry = TaskRegistry::new();
    let port = config.port;

    let state = AppState::new(
        pool.clone(),
        config.clone(),
        cache,
        task_registry,
        blob_storage.clone(),
        tts,
        video_renderer,
        email.clone(),
        billing,
        llm,
    );

    let config = Arc::new(config);
    let _scheduler = domains::scheduler::start_scheduler(pool, config, blob_storage, email)
        .await
        .context("failed to start scheduler")?;

    let app = server::build_router(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(&addr).await.context("failed to bind")?;

    axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>())
        .await
        .context("server error")?;

    Ok(())
}
