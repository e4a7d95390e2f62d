//! `BillingEvent` — an append-only audit trail of webhook deliveries,
//! unique on `(provider, provider_event_id)` to enforce at-most-once
//! processing (spec §3, §8 property 3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BillingEvent {
    pub id: Uuid,
    pub provider: String,
    pub event_type: String,
    pub provider_event_id: String,
    pub payload_json: serde_json::Value,
    pub org_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
