//! Test fixtures for creating tenant/content rows directly, bypassing
//! the HTTP layer where a test only needs the data to already exist.

use anyhow::Result;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

/// Create a user row; each call uses a fresh random email so parallel
/// tests never collide on the `users.email` unique constraint.
pub async fn create_user(pool: &PgPool, is_admin: bool) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let email = format!("{id}@example.test");
    sqlx::query("INSERT INTO users (id, email, is_admin, is_active, created_at) VALUES ($1, $2, $3, true, $4)")
        .bind(id)
        .bind(&email)
        .bind(is_admin)
        .bind(Utc::now())
        .execute(pool)
        .await?;
    Ok(id)
}

pub async fn deactivate_user(pool: &PgPool, user_id: Uuid) -> Result<()> {
    sqlx::query("UPDATE users SET is_active = false WHERE id = $1").bind(user_id).execute(pool).await?;
    Ok(())
}

pub async fn soft_delete_user(pool: &PgPool, user_id: Uuid, deleted_at: chrono::DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE users SET is_active = false, deleted_at = $1 WHERE id = $2")
        .bind(deleted_at)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Organization + owning membership for `user_id`, with an active
/// subscription on `plan` (mirrors the lazy org creation `TenantStore`
/// performs, but lets a test pick the plan up front).
pub async fn create_org_with_plan(pool: &PgPool, owner_id: Uuid, plan: &str) -> Result<Uuid> {
    let org_id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query("INSERT INTO organizations (id, name, owner_user_id, created_at) VALUES ($1, $2, $3, $4)")
        .bind(org_id)
        .bind(format!("org-{org_id}"))
        .bind(owner_id)
        .bind(now)
        .execute(pool)
        .await?;

    sqlx::query("INSERT INTO memberships (user_id, org_id, role, created_at) VALUES ($1, $2, 'owner', $3)")
        .bind(owner_id)
        .bind(org_id)
        .bind(now)
        .execute(pool)
        .await?;

    sqlx::query(
        "INSERT INTO subscriptions (id, org_id, plan, status, provider, created_at) VALUES ($1, $2, $3, 'active', 'stripe', $4)",
    )
    .bind(Uuid::new_v4())
    .bind(org_id)
    .bind(plan)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(org_id)
}

pub async fn create_job(pool: &PgPool, org_id: Uuid, user_id: Uuid, status: &str, formats: &[String]) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"INSERT INTO jobs (id, org_id, user_id, topic, formats_requested, status, idempotency_key, created_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
    )
    .bind(id)
    .bind(org_id)
    .bind(user_id)
    .bind("fixture topic")
    .bind(formats)
    .bind(status)
    .bind(format!("fixture-{id}"))
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(id)
}

pub async fn create_artifact(
    pool: &PgPool,
    job_id: Uuid,
    artifact_type: &str,
    content_text: Option<&str>,
    content_json: Option<serde_json::Value>,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"INSERT INTO artifacts (id, job_id, type, content_text, content_json, moderation_status, created_at)
           VALUES ($1, $2, $3, $4, $5, 'approved', $6)"#,
    )
    .bind(id)
    .bind(job_id)
    .bind(artifact_type)
    .bind(content_text)
    .bind(content_json)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(id)
}

/// Backdates an artifact's `created_at` so retention/notification
/// sweeps treat it as already expired (or about to expire).
pub async fn backdate_artifact(pool: &PgPool, artifact_id: Uuid, created_at: chrono::DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE artifacts SET created_at = $1 WHERE id = $2")
        .bind(created_at)
        .bind(artifact_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn create_session(pool: &PgPool, user_id: Uuid, created_at: chrono::DateTime<Utc>) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO sessions (id, user_id, created_at) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(user_id)
        .bind(created_at)
        .execute(pool)
        .await?;
    Ok(id)
}
