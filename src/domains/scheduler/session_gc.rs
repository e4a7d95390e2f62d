//! Session GC — daily 03:00 (spec §4.G). Deletes `sessions` rows older
//! than 7 days. Session issuance itself belongs to the external auth
//! layer (spec §1); this core only owns their cleanup.

use sqlx::PgPool;

const SESSION_MAX_AGE_DAYS: i64 = 7;

pub async fn run_session_gc(db: &PgPool) -> anyhow::Result<u64> {
    let cutoff = chrono::Utc::now() - chrono::Duration::days(SESSION_MAX_AGE_DAYS);
    let result = sqlx::query("DELETE FROM sessions WHERE created_at < $1")
        .bind(cutoff)
        .execute(db)
        .await?;

    let deleted = result.rows_affected();
    tracing::info!(deleted, "session gc complete");
    Ok(deleted)
}
