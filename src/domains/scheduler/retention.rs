//! Retention cleanup — daily 04:00 (spec §4.G). For each org, deletes
//! artifacts older than `plan.retention_days`; enterprise is skipped
//! unless a GDPR override forces the deletion.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::Config;
use crate::domains::tenant::SubscriptionPlan;
use crate::kernel::BlobStorage;
use std::sync::Arc;

struct OrgPlan {
    org_id: Uuid,
    plan: String,
}

#[derive(sqlx::FromRow)]
struct ExpiredArtifact {
    id: Uuid,
    job_id: Uuid,
    content_json: Option<serde_json::Value>,
}

fn retention_days_for(config: &Config, plan: SubscriptionPlan) -> Option<i64> {
    match plan {
        SubscriptionPlan::Free => Some(config.retention_days_free),
        SubscriptionPlan::Basic => Some(config.retention_days_basic),
        SubscriptionPlan::Pro => Some(config.retention_days_pro),
        SubscriptionPlan::Enterprise => None,
    }
}

/// Runs one cleanup pass across every org with an active subscription.
/// `gdpr_override` forces enterprise orgs through the same cutoff as
/// `pro` (used only by the GDPR hard-delete path, never by the daily
/// schedule).
pub async fn run_retention_cleanup(
    db: &PgPool,
    blob: &Arc<dyn BlobStorage>,
    config: &Config,
    gdpr_override: bool,
) -> anyhow::Result<()> {
    let orgs: Vec<OrgPlan> = sqlx::query_as::<_, (Uuid, String)>(
        r#"SELECT org_id, plan FROM subscriptions WHERE status = 'active'"#,
    )
    .fetch_all(db)
    .await?
    .into_iter()
    .map(|(org_id, plan)| OrgPlan { org_id, plan })
    .collect();

    for org in orgs {
        let plan: SubscriptionPlan = org.plan.parse().unwrap_or(SubscriptionPlan::Free);
        let retention_days = match retention_days_for(config, plan) {
            Some(days) => days,
            None if gdpr_override => config.retention_days_pro,
            None => continue,
        };

        let cutoff = Utc::now() - chrono::Duration::days(retention_days);
        if let Err(err) = cleanup_org(db, blob, config, org.org_id, cutoff).await {
            tracing::error!(org_id = %org.org_id, error = %err, "retention cleanup failed for org");
        }
    }

    Ok(())
}

async fn cleanup_org(
    db: &PgPool,
    blob: &Arc<dyn BlobStorage>,
    config: &Config,
    org_id: Uuid,
    cutoff: DateTime<Utc>,
) -> anyhow::Result<()> {
    let expired: Vec<ExpiredArtifact> = sqlx::query_as::<_, ExpiredArtifact>(
        r#"SELECT a.id, a.job_id, a.content_json FROM artifacts a
           JOIN jobs j ON j.id = a.job_id
           WHERE j.org_id = $1 AND a.created_at < $2"#,
    )
    .bind(org_id)
    .bind(cutoff)
    .fetch_all(db)
    .await?;

    if expired.is_empty() {
        return Ok(());
    }

    if config.retention_dry_run {
        tracing::info!(org_id = %org_id, count = expired.len(), "dry run: would delete artifacts for org");
        return Ok(());
    }

    for artifact in expired {
        if let Some(key) = artifact.content_json.as_ref().and_then(|v| v.get("storage_key")).and_then(|v| v.as_str()) {
            if let Err(err) = blob.delete(key).await {
                tracing::warn!(artifact_id = %artifact.id, error = %err, "failed to delete blob, deleting db row anyway");
            }
        }

        sqlx::query("DELETE FROM artifacts WHERE id = $1")
            .bind(artifact.id)
            .execute(db)
            .await?;
    }

    tracing::info!(org_id = %org_id, "retention cleanup committed for org");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enterprise_has_no_retention_cutoff_without_override() {
        let config = test_config();
        assert_eq!(retention_days_for(&config, SubscriptionPlan::Enterprise), None);
        assert_eq!(retention_days_for(&config, SubscriptionPlan::Free), Some(30));
    }

    fn test_config() -> Config {
        Config {
            database_url: String::new(),
            redis_url: String::new(),
            port: 0,
            crewai_timeout_secs: 300,
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
            blob_storage_dir: "./data/blobs".into(),
            blob_public_base_url: "http://localhost:8080/media".into(),
            tts_service_url: "http://localhost:9001/synthesize".into(),
            video_render_service_url: "http://localhost:9002/render".into(),
            email_service_url: "http://localhost:9003/send".into(),
            llm_service_url: "http://localhost:9004/run".into(),
            billing_webhook_secret: String::new(),
        }
    }
}
