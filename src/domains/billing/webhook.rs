//! Idempotent billing webhook processing (spec §3, §8 property 3,
//! `original_source/services/billing_service.py`).

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use super::models::BillingEvent;
use crate::domains::audit::AuditLogStore;
use crate::domains::tenant::{SubscriptionPlan, SubscriptionStatus, TenantStore};
use crate::kernel::traits::BillingWebhookEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// First time we've seen this `(provider, provider_event_id)`; the
    /// subscription transition (if any) was applied.
    Processed,
    /// Already recorded — the insert hit the unique constraint and was
    /// ignored; no subscription transition was repeated.
    Duplicate,
}

#[derive(Clone)]
pub struct BillingStore {
    db: PgPool,
    tenants: TenantStore,
    audit: AuditLogStore,
}

impl BillingStore {
    pub fn new(db: PgPool) -> Self {
        Self {
            tenants: TenantStore::new(db.clone()),
            audit: AuditLogStore::new(db.clone()),
            db,
        }
    }

    /// Records the event if new, then applies the subscription
    /// transition it implies. At-most-once: the `ON CONFLICT DO NOTHING`
    /// on `provider_event_id` makes the insert itself the idempotency
    /// gate (spec §8 property 3).
    pub async fn process(&self, event: &BillingWebhookEvent, org_id: Option<Uuid>) -> anyhow::Result<WebhookOutcome> {
        let inserted: Option<(Uuid,)> = sqlx::query_as(
            r#"INSERT INTO billing_events (id, provider, event_type, provider_event_id, payload_json, org_id, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               ON CONFLICT (provider, provider_event_id) DO NOTHING
               RETURNING id"#,
        )
        .bind(Uuid::new_v4())
        .bind(&event.provider)
        .bind(&event.event_type)
        .bind(&event.provider_event_id)
        .bind(&event.payload)
        .bind(org_id)
        .bind(Utc::now())
        .fetch_optional(&self.db)
        .await?;

        if inserted.is_none() {
            tracing::info!(provider = %event.provider, provider_event_id = %event.provider_event_id, "duplicate webhook event ignored");
            return Ok(WebhookOutcome::Duplicate);
        }

        if let Some(org_id) = org_id {
            self.apply_subscription_transition(org_id, event).await?;
        }

        if let Err(err) = self
            .audit
            .record(
                "billing.webhook_processed",
                None,
                None,
                "webhook",
                &event.provider,
                serde_json::json!({
                    "event_type": event.event_type,
                    "provider_event_id": event.provider_event_id,
                    "org_id": org_id,
                }),
            )
            .await
        {
            tracing::error!(provider = %event.provider, provider_event_id = %event.provider_event_id, error = %err, "failed to record audit log for webhook");
        }

        Ok(WebhookOutcome::Processed)
    }

    async fn apply_subscription_transition(&self, org_id: Uuid, event: &BillingWebhookEvent) -> anyhow::Result<()> {
        let plan = event
            .payload
            .get("plan")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<SubscriptionPlan>().ok());

        match event.event_type.as_str() {
            "subscription.created" | "subscription.updated" | "subscription.renewed" => {
                let Some(plan) = plan else {
                    tracing::warn!(event_type = %event.event_type, "webhook missing plan, skipping transition");
                    return Ok(());
                };
                let period_end = event
                    .payload
                    .get("current_period_end")
                    .and_then(|v| v.as_str())
                    .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&Utc));
                self.tenants
                    .set_active_subscription(org_id, plan, &event.provider, Some(&event.provider_event_id), period_end)
                    .await?;
            }
            "subscription.cancelled" => {
                sqlx::query("UPDATE subscriptions SET status = $1 WHERE org_id = $2 AND status = 'active'")
                    .bind(SubscriptionStatus::Cancelled.as_str())
                    .bind(org_id)
                    .execute(&self.db)
                    .await?;
            }
            "subscription.past_due" => {
                sqlx::query("UPDATE subscriptions SET status = $1 WHERE org_id = $2 AND status = 'active'")
                    .bind(SubscriptionStatus::PastDue.as_str())
                    .bind(org_id)
                    .execute(&self.db)
                    .await?;
            }
            other => {
                tracing::info!(event_type = other, "billing event recorded, no subscription transition defined");
            }
        }

        Ok(())
    }

    /// On hard delete of an org the `org_id` is nulled but the row is
    /// retained (spec §3).
    pub async fn null_org_references(&self, org_id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE billing_events SET org_id = NULL WHERE org_id = $1")
            .bind(org_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    #[cfg(test)]
    pub async fn get_by_provider_event_id(&self, provider: &str, provider_event_id: &str) -> anyhow::Result<Option<BillingEvent>> {
        let event = sqlx::query_as::<_, BillingEvent>(
            r#"SELECT * FROM billing_events WHERE provider = $1 AND provider_event_id = $2"#,
        )
        .bind(provider)
        .bind(provider_event_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(event)
    }
}
