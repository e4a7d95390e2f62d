//! `UsageCounter` persistence — atomic per-tenant per-month counters
//! (spec §3, §4.C).

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct UsageCounter {
    pub org_id: Uuid,
    pub period_month: String,
    pub blog_count: i64,
    pub social_count: i64,
    pub audio_count: i64,
    pub video_count: i64,
    pub voiceover_count: i64,
    pub video_render_count: i64,
}

impl UsageCounter {
    pub fn field(&self, kind: &str) -> i64 {
        match kind {
            "blog" => self.blog_count,
            "social" => self.social_count,
            "audio" => self.audio_count,
            "video" => self.video_count,
            "voiceover_audio" => self.voiceover_count,
            "final_video" => self.video_render_count,
            _ => 0,
        }
    }
}

fn column_for(kind: &str) -> Option<&'static str> {
    match kind {
        "blog" => Some("blog_count"),
        "social" => Some("social_count"),
        "audio" => Some("audio_count"),
        "video" => Some("video_count"),
        "voiceover_audio" => Some("voiceover_count"),
        "final_video" => Some("video_render_count"),
        _ => None,
    }
}

pub fn current_period() -> String {
    Utc::now().format("%Y-%m").to_string()
}

#[derive(Clone)]
pub struct UsageStore {
    db: PgPool,
}

impl UsageStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// A missing row is treated as zero usage (spec §3) — no row is
    /// created on a read-only check.
    pub async fn get(&self, org_id: Uuid, period_month: &str) -> anyhow::Result<UsageCounter> {
        let counter = sqlx::query_as::<_, UsageCounter>(
            r#"SELECT * FROM usage_counters WHERE org_id = $1 AND period_month = $2"#,
        )
        .bind(org_id)
        .bind(period_month)
        .fetch_optional(&self.db)
        .await?;

        Ok(counter.unwrap_or(UsageCounter {
            org_id,
            period_month: period_month.to_string(),
            ..Default::default()
        }))
    }

    /// Atomically upsert-and-increment the counter for `kind` in the
    /// current month. Safe under concurrent callers via
    /// `INSERT ... ON CONFLICT DO UPDATE`, serialized by the database
    /// through the `(org_id, period_month)` unique key (spec §4.C, §5).
    pub async fn increment(&self, org_id: Uuid, kind: &str) -> anyhow::Result<()> {
        let Some(column) = column_for(kind) else {
            tracing::warn!(kind, "unknown usage kind, not incrementing");
            return Ok(());
        };
        let period = current_period();

        let sql = format!(
            r#"INSERT INTO usage_counters (org_id, period_month, {column})
               VALUES ($1, $2, 1)
               ON CONFLICT (org_id, period_month)
               DO UPDATE SET {column} = usage_counters.{column} + 1"#
        );

        sqlx::query(&sql)
            .bind(org_id)
            .bind(&period)
            .execute(&self.db)
            .await?;

        Ok(())
    }
}
