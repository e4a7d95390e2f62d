//! Retention notifications — daily 10:00 (spec §4.G). For each user
//! with artifacts expiring within `RETENTION_NOTIFY_DAYS_BEFORE` days,
//! sends one summary email and records a dedup row.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::Config;
use crate::kernel::traits::{EmailMessage, EmailProvider};

#[derive(sqlx::FromRow)]
struct ExpiringArtifactRow {
    user_id: Uuid,
    email: String,
    artifact_id: Uuid,
    expiration_date: chrono::DateTime<Utc>,
}

/// Sends one consolidated email per user summarizing every artifact of
/// theirs expiring within the configured window (spec.md's "one email
/// summarizing them"), skipping artifacts already recorded for today
/// (spec §8 property 6, `(user_id, artifact_id, notification_date)` unique).
pub async fn run_retention_notifications(
    db: &PgPool,
    email: &Arc<dyn EmailProvider>,
    config: &Config,
) -> anyhow::Result<()> {
    if !config.retention_notify_enabled {
        tracing::info!("retention notifications disabled, skipping run");
        return Ok(());
    }

    let today = Utc::now().date_naive();
    let window_end = Utc::now() + chrono::Duration::days(config.retention_notify_days_before);

    let rows: Vec<ExpiringArtifactRow> = sqlx::query_as::<_, ExpiringArtifactRow>(
        r#"
        SELECT u.id AS user_id, u.email, a.id AS artifact_id,
               (a.created_at + (s.plan_retention_days || ' days')::interval) AS expiration_date
        FROM artifacts a
        JOIN jobs j ON j.id = a.job_id
        JOIN users u ON u.id = j.user_id
        JOIN organizations o ON o.id = j.org_id
        JOIN subscriptions sub ON sub.org_id = o.id AND sub.status = 'active'
        JOIN LATERAL (SELECT
            CASE sub.plan
                WHEN 'free' THEN 30 WHEN 'basic' THEN 90 WHEN 'pro' THEN 365 ELSE NULL
            END AS plan_retention_days
        ) s ON true
        WHERE s.plan_retention_days IS NOT NULL
          AND (a.created_at + (s.plan_retention_days || ' days')::interval) <= $1
          AND NOT EXISTS (
              SELECT 1 FROM retention_notifications rn
              WHERE rn.user_id = u.id AND rn.artifact_id = a.id AND rn.notification_date = $2
          )
        LIMIT $3
        "#,
    )
    .bind(window_end)
    .bind(today)
    .bind(config.retention_notify_batch_size)
    .fetch_all(db)
    .await?;

    let mut by_user: HashMap<Uuid, Vec<ExpiringArtifactRow>> = HashMap::new();
    for row in rows {
        by_user.entry(row.user_id).or_default().push(row);
    }

    for (user_id, artifacts) in by_user {
        if config.retention_dry_run {
            tracing::info!(user_id = %user_id, count = artifacts.len(), "dry run: would send retention notice");
            continue;
        }

        notify_user(db, email, &artifacts, today).await;
    }

    Ok(())
}

/// Sends a single email listing every expiring artifact in `artifacts`
/// (all belonging to the same user), then records one dedup row per
/// artifact so a later run doesn't re-notify on any of them today.
async fn notify_user(db: &PgPool, email: &Arc<dyn EmailProvider>, artifacts: &[ExpiringArtifactRow], today: NaiveDate) {
    let user_id = artifacts[0].user_id;
    let to = artifacts[0].email.clone();

    let items: String = artifacts
        .iter()
        .map(|a| format!("<li>Artifact {} expires on {}</li>", a.artifact_id, a.expiration_date.format("%Y-%m-%d")))
        .collect();
    let message = EmailMessage {
        to,
        subject: "Your content is expiring soon".to_string(),
        body_html: format!("<p>The following artifacts in your account will expire soon:</p><ul>{items}</ul>"),
    };

    let sent = email.send(message).await;
    let (email_sent, failure_reason) = match sent {
        Ok(true) => (true, None),
        Ok(false) => (false, Some("provider declined".to_string())),
        Err(err) => (false, Some(err.to_string())),
    };

    for artifact in artifacts {
        if let Err(err) = sqlx::query(
            r#"INSERT INTO retention_notifications
                 (user_id, artifact_id, notification_date, expiration_date, email_sent, email_sent_at, email_failed, failure_reason)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               ON CONFLICT (user_id, artifact_id, notification_date) DO NOTHING"#,
        )
        .bind(artifact.user_id)
        .bind(artifact.artifact_id)
        .bind(today)
        .bind(artifact.expiration_date)
        .bind(email_sent)
        .bind(email_sent.then(Utc::now))
        .bind(!email_sent)
        .bind(failure_reason.clone())
        .execute(db)
        .await
        {
            tracing::error!(user_id = %user_id, artifact_id = %artifact.artifact_id, error = %err, "failed to record retention notification");
        }
    }
}
