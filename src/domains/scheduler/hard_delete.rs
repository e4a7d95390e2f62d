//! Hard-delete sweep — daily 02:00 (spec §4.G, §9 GDPR). Finds users
//! past their deletion grace period and permanently removes them,
//! transferring org ownership first (spec §3 cyclic-entity-graph note).

use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

use crate::config::Config;
use crate::domains::audit::AuditLogStore;
use crate::domains::billing::BillingStore;
use crate::domains::tenant::TenantStore;

const MAX_ATTEMPTS: u32 = 3;

pub async fn run_hard_delete_sweep(db: &PgPool, config: &Config) -> anyhow::Result<()> {
    let cutoff = chrono::Utc::now() - chrono::Duration::days(config.gdpr_deletion_grace_days);

    let due: Vec<(Uuid,)> = sqlx::query_as(
        r#"SELECT id FROM users WHERE is_active = false AND deleted_at IS NOT NULL AND deleted_at <= $1"#,
    )
    .bind(cutoff)
    .fetch_all(db)
    .await?;

    let tenants = TenantStore::new(db.clone());
    let billing = BillingStore::new(db.clone());
    let audit = AuditLogStore::new(db.clone());

    for (user_id,) in due {
        if config.retention_dry_run {
            tracing::info!(user_id = %user_id, "dry run: would hard-delete user");
            continue;
        }

        if let Err(err) = hard_delete_with_retry(db, &tenants, &billing, &audit, user_id).await {
            tracing::error!(user_id = %user_id, error = %err, "hard delete failed after retries");
        }
    }

    Ok(())
}

async fn hard_delete_with_retry(
    db: &PgPool,
    tenants: &TenantStore,
    billing: &BillingStore,
    audit: &AuditLogStore,
    user_id: Uuid,
) -> anyhow::Result<()> {
    let mut attempt = 0;
    loop {
        match hard_delete_user(db, tenants, billing, audit, user_id).await {
            Ok(()) => {
                tracing::info!(user_id = %user_id, "user hard-deleted");
                return Ok(());
            }
            Err(err) if attempt + 1 < MAX_ATTEMPTS => {
                attempt += 1;
                let delay = Duration::from_millis(500 * 2u64.pow(attempt - 1));
                tracing::warn!(user_id = %user_id, attempt, error = %err, "retrying hard delete");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

async fn hard_delete_user(
    db: &PgPool,
    tenants: &TenantStore,
    billing: &BillingStore,
    audit: &AuditLogStore,
    user_id: Uuid,
) -> anyhow::Result<()> {
    let org_ids: Vec<(Uuid,)> = sqlx::query_as(r#"SELECT org_id FROM memberships WHERE user_id = $1"#)
        .bind(user_id)
        .fetch_all(db)
        .await?;
    let org_count = org_ids.len();

    for (org_id,) in org_ids {
        tenants.transfer_ownership_or_delete_org(org_id, user_id).await?;

        let still_exists: Option<(Uuid,)> = sqlx::query_as(r#"SELECT id FROM organizations WHERE id = $1"#)
            .bind(org_id)
            .fetch_optional(db)
            .await?;
        if still_exists.is_none() {
            billing.null_org_references(org_id).await?;
        }
    }

    if let Err(err) = audit
        .record(
            "user.hard_deleted",
            None,
            Some(user_id),
            "system",
            "scheduler",
            serde_json::json!({ "org_count": org_count }),
        )
        .await
    {
        tracing::error!(user_id = %user_id, error = %err, "failed to record audit log for hard delete");
    }

    sqlx::query("DELETE FROM users WHERE id = $1").bind(user_id).execute(db).await?;

    Ok(())
}
