//! Component A — per-job append-only event log with monotonic IDs,
//! a bounded window, and replay-from-cursor semantics (spec §4.A).
//!
//! Primary backend is the `Cache` trait (LPUSH + LTRIM + EXPIRE, as the
//! teacher's Redis-backed services do elsewhere in the stack). A
//! process-local fallback ring buffer is used whenever the cache call
//! fails, mirroring `original_source/services/sse_store.py`'s
//! Redis-with-in-memory-fallback shape. Append failures are logged and
//! swallowed: a dropped progress event must never fail the runner.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::traits::Cache;

const DEFAULT_WINDOW: usize = 100;
const TTL_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: i64,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: serde_json::Value,
    pub timestamp: chrono::DateTime<Utc>,
}

struct FallbackRing {
    events: HashMap<Uuid, Vec<StoredEvent>>,
}

/// Append-only per-job SSE event log.
pub struct EventStore {
    cache: Arc<dyn Cache>,
    window: usize,
    fallback: Mutex<FallbackRing>,
    /// Tie-breaker for same-millisecond appends; monotonic per process.
    local_counter: AtomicI64,
}

impl EventStore {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self::with_window(cache, DEFAULT_WINDOW)
    }

    pub fn with_window(cache: Arc<dyn Cache>, window: usize) -> Self {
        Self {
            cache,
            window,
            fallback: Mutex::new(FallbackRing {
                events: HashMap::new(),
            }),
            local_counter: AtomicI64::new(0),
        }
    }

    fn next_id(&self) -> i64 {
        let millis = Utc::now().timestamp_millis();
        let tick = self.local_counter.fetch_add(1, Ordering::SeqCst) % 1000;
        millis * 1000 + tick
    }

    fn key(job_id: Uuid) -> String {
        format!("sse:events:{job_id}")
    }

    /// Append an event, returning its assigned (strictly increasing) ID.
    /// Never fails the caller: cache and fallback errors are logged only.
    pub async fn append(&self, job_id: Uuid, event_type: &str, data: serde_json::Value) -> i64 {
        let id = self.next_id();
        let event = StoredEvent {
            id,
            event_type: event_type.to_string(),
            data,
            timestamp: Utc::now(),
        };

        if self.append_cache(job_id, &event).await.is_err() {
            self.append_fallback(job_id, event).await;
        }

        id
    }

    async fn append_cache(&self, job_id: Uuid, event: &StoredEvent) -> anyhow::Result<()> {
        let key = Self::key(job_id);
        let json = serde_json::to_string(event)?;
        self.cache.lpush(&key, json).await?;
        self.cache.ltrim(&key, self.window).await?;
        self.cache.expire(&key, TTL_SECS).await?;
        Ok(())
    }

    async fn append_fallback(&self, job_id: Uuid, event: StoredEvent) {
        tracing::warn!(%job_id, event_id = event.id, "event store cache append failed, using in-process fallback");
        let mut guard = self.fallback.lock().await;
        let slice = guard.events.entry(job_id).or_default();
        slice.push(event);
        if slice.len() > self.window {
            let excess = slice.len() - self.window;
            slice.drain(0..excess);
        }
    }

    /// Ordered events with id > `last_id`.
    pub async fn since(&self, job_id: Uuid, last_id: Option<i64>) -> Vec<StoredEvent> {
        let last_id = last_id.unwrap_or(0);

        if let Ok(raw) = self.cache.lrange(&Self::key(job_id)).await {
            if !raw.is_empty() {
                let mut events: Vec<StoredEvent> = raw
                    .into_iter()
                    .filter_map(|s| serde_json::from_str(&s).ok())
                    .collect();
                // Stored LPUSH-first (most recent first); restore chronological order.
                events.reverse();
                events.retain(|e| e.id > last_id);
                return events;
            }
        }

        let guard = self.fallback.lock().await;
        guard
            .events
            .get(&job_id)
            .map(|events| events.iter().filter(|e| e.id > last_id).cloned().collect())
            .unwrap_or_default()
    }

    pub async fn latest_id(&self, job_id: Uuid) -> Option<i64> {
        self.since(job_id, None).await.last().map(|e| e.id)
    }

    pub async fn clear(&self, job_id: Uuid) {
        let _ = self.cache.del(&Self::key(job_id)).await;
        let mut guard = self.fallback.lock().await;
        guard.events.remove(&job_id);
    }
}
