//! Composition root: constructs one of each dependency at startup and
//! injects them into handlers (spec §9 — replaces global mutable
//! singletons with explicit dependency injection).

use std::sync::Arc;

use sqlx::PgPool;

use super::event_store::EventStore;
use super::task_registry::TaskRegistry;
use super::traits::{BillingGateway, BlobStorage, Cache, EmailProvider, LlmRuntime, TtsProvider, VideoRenderer};
use crate::config::Config;
use crate::domains::content::JobStore;
use crate::domains::plan::PlanPolicy;

/// Shared application state, cloned cheaply into every axum handler.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub event_store: Arc<EventStore>,
    pub task_registry: TaskRegistry,
    /// Content cache (and Event Store backend); distinct handle so
    /// callers don't need to reach through the Event Store for it.
    pub cache: Arc<dyn Cache>,

    pub blob_storage: Arc<dyn BlobStorage>,
    pub tts: Arc<dyn TtsProvider>,
    pub video_renderer: Arc<dyn VideoRenderer>,
    pub email: Arc<dyn EmailProvider>,
    pub billing: Arc<dyn BillingGateway>,
    pub llm: Arc<dyn LlmRuntime>,
}

#[allow(clippy::too_many_arguments)]
impl AppState {
    pub fn new(
        db: PgPool,
        config: Config,
        cache: Arc<dyn Cache>,
        task_registry: TaskRegistry,
        blob_storage: Arc<dyn BlobStorage>,
        tts: Arc<dyn TtsProvider>,
        video_renderer: Arc<dyn VideoRenderer>,
        email: Arc<dyn EmailProvider>,
        billing: Arc<dyn BillingGateway>,
        llm: Arc<dyn LlmRuntime>,
    ) -> Self {
        Self {
            db,
            config: Arc::new(config),
            event_store: Arc::new(EventStore::new(cache.clone())),
            task_registry,
            cache,
            blob_storage,
            tts,
            video_renderer,
            email,
            billing,
            llm,
        }
    }

    /// Cheap to construct on demand — both wrap only a `PgPool` clone
    /// (spec §9 composition-root pattern).
    pub fn job_store(&self) -> JobStore {
        JobStore::new(self.db.clone())
    }

    pub fn plan_policy(&self) -> Arc<PlanPolicy> {
        Arc::new(PlanPolicy::new(self.db.clone()))
    }
}
