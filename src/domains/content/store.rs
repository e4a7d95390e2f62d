//! Component D — Job Store. Persist jobs and artifacts, idempotency,
//! artifact upsert, state machine enforcement (spec §4.D).

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use super::models::{derive_idempotency_key, is_legal_transition, Artifact, ArtifactType, Job, JobStatus};
use crate::kernel::retry::retry_db;

#[derive(Debug)]
pub enum CreateJobOutcome {
    Created(Job),
    Existing(Job),
    Conflict { job_id: Uuid, status: String },
}

#[derive(Clone)]
pub struct JobStore {
    db: PgPool,
}

impl JobStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// On idempotency collision: returns the prior job if terminal,
    /// else a conflict referencing it (spec §4.D).
    pub async fn create_job(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        topic: &str,
        formats: &[String],
        idempotency_key: Option<String>,
    ) -> anyhow::Result<CreateJobOutcome> {
        let key = idempotency_key.unwrap_or_else(|| derive_idempotency_key(user_id, topic, formats));

        let existing = retry_db(|| async {
            sqlx::query_as::<_, Job>(r#"SELECT * FROM jobs WHERE idempotency_key = $1"#)
                .bind(&key)
                .fetch_optional(&self.db)
                .await
        })
        .await?;

        if let Some(job) = existing {
            return Ok(if job.status().is_terminal() {
                CreateJobOutcome::Existing(job)
            } else {
                CreateJobOutcome::Conflict {
                    job_id: job.id,
                    status: job.status,
                }
            });
        }

        let job = retry_db(|| async {
            sqlx::query_as::<_, Job>(
                r#"
                INSERT INTO jobs (id, org_id, user_id, topic, formats_requested, status, idempotency_key, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(org_id)
            .bind(user_id)
            .bind(topic)
            .bind(formats)
            .bind(JobStatus::Pending.as_str())
            .bind(&key)
            .bind(Utc::now())
            .fetch_one(&self.db)
            .await
        })
        .await?;

        tracing::info!(job_id = %job.id, user_id = %user_id, topic, "created job");
        Ok(CreateJobOutcome::Created(job))
    }

    pub async fn get_job(&self, job_id: Uuid, viewer_user_id: Uuid) -> anyhow::Result<Option<Job>> {
        retry_db(|| async {
            sqlx::query_as::<_, Job>(r#"SELECT * FROM jobs WHERE id = $1 AND user_id = $2"#)
                .bind(job_id)
                .bind(viewer_user_id)
                .fetch_optional(&self.db)
                .await
        })
        .await
        .map_err(Into::into)
    }

    pub async fn list_jobs(
        &self,
        viewer_user_id: Uuid,
        status: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<Job>> {
        let limit = limit.clamp(1, 100);
        let jobs = retry_db(|| async {
            match status {
                Some(status) => {
                    sqlx::query_as::<_, Job>(
                        r#"SELECT * FROM jobs WHERE user_id = $1 AND status = $2
                           ORDER BY created_at DESC LIMIT $3 OFFSET $4"#,
                    )
                    .bind(viewer_user_id)
                    .bind(status)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&self.db)
                    .await
                }
                None => {
                    sqlx::query_as::<_, Job>(
                        r#"SELECT * FROM jobs WHERE user_id = $1
                           ORDER BY created_at DESC LIMIT $2 OFFSET $3"#,
                    )
                    .bind(viewer_user_id)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&self.db)
                    .await
                }
            }
        })
        .await?;
        Ok(jobs)
    }

    pub async fn artifacts_for(&self, job_id: Uuid) -> anyhow::Result<Vec<Artifact>> {
        retry_db(|| async {
            sqlx::query_as::<_, Artifact>(r#"SELECT * FROM artifacts WHERE job_id = $1 ORDER BY created_at ASC"#)
                .bind(job_id)
                .fetch_all(&self.db)
                .await
        })
        .await
        .map_err(Into::into)
    }

    /// Transitions must respect the state machine; illegal transitions
    /// fail loudly rather than silently no-op.
    pub async fn update_status(&self, job_id: Uuid, to: JobStatus) -> anyhow::Result<()> {
        let job = retry_db(|| async {
            sqlx::query_as::<_, Job>(r#"SELECT * FROM jobs WHERE id = $1"#)
                .bind(job_id)
                .fetch_one(&self.db)
                .await
        })
        .await?;

        let from = job.status();
        if !is_legal_transition(from, to) {
            anyhow::bail!("illegal job transition {:?} -> {:?} for job {}", from, to, job_id);
        }

        let now = Utc::now();
        let started_at = if to == JobStatus::Running { Some(now) } else { None };
        let finished_at = if to.is_terminal() { Some(now) } else { None };

        retry_db(|| async {
            sqlx::query(
                r#"UPDATE jobs SET status = $1,
                   started_at = COALESCE($2, started_at),
                   finished_at = COALESCE($3, finished_at)
                   WHERE id = $4"#,
            )
            .bind(to.as_str())
            .bind(started_at)
            .bind(finished_at)
            .bind(job_id)
            .execute(&self.db)
            .await
        })
        .await?;

        Ok(())
    }

    /// Single transaction: update in place if a (job_id, type) row
    /// exists, else insert (spec §4.D). Repeatable kinds
    /// (`ArtifactType::allows_multiple`, e.g. per-scene storyboard
    /// images and video clips) skip the lookup and always insert —
    /// the partial unique index only covers the non-repeatable kinds.
    pub async fn upsert_artifact(
        &self,
        job_id: Uuid,
        artifact_type: &str,
        content_text: Option<&str>,
        content_json: Option<serde_json::Value>,
        prompt_version: Option<&str>,
        model_used: Option<&str>,
    ) -> anyhow::Result<Artifact> {
        let repeatable = artifact_type
            .parse::<ArtifactType>()
            .map(|t| t.allows_multiple())
            .unwrap_or(false);

        retry_db(|| async {
            let mut tx = self.db.begin().await?;

            let existing = if repeatable {
                None
            } else {
                sqlx::query_as::<_, Artifact>(
                    r#"SELECT * FROM artifacts WHERE job_id = $1 AND type = $2"#,
                )
                .bind(job_id)
                .bind(artifact_type)
                .fetch_optional(&mut *tx)
                .await?
            };

            let artifact = if let Some(existing) = existing {
                sqlx::query_as::<_, Artifact>(
                    r#"UPDATE artifacts SET
                         content_text = COALESCE($1, content_text),
                         content_json = COALESCE($2, content_json),
                         prompt_version = COALESCE($3, prompt_version),
                         model_used = COALESCE($4, model_used)
                       WHERE id = $5
                       RETURNING *"#,
                )
                .bind(content_text)
                .bind(&content_json)
                .bind(prompt_version)
                .bind(model_used)
                .bind(existing.id)
                .fetch_one(&mut *tx)
                .await?
            } else {
                sqlx::query_as::<_, Artifact>(
                    r#"INSERT INTO artifacts (id, job_id, type, content_text, content_json, prompt_version, model_used, moderation_status, created_at)
                       VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', $8)
                       RETURNING *"#,
                )
                .bind(Uuid::new_v4())
                .bind(job_id)
                .bind(artifact_type)
                .bind(content_text)
                .bind(&content_json)
                .bind(prompt_version)
                .bind(model_used)
                .bind(Utc::now())
                .fetch_one(&mut *tx)
                .await?
            };

            tx.commit().await?;
            Ok(artifact)
        })
        .await
        .map_err(Into::into)
    }

    pub async fn set_moderation_status(&self, artifact_id: Uuid, status: &str) -> anyhow::Result<()> {
        retry_db(|| async {
            sqlx::query(r#"UPDATE artifacts SET moderation_status = $1 WHERE id = $2"#)
                .bind(status)
                .bind(artifact_id)
                .execute(&self.db)
                .await
        })
        .await?;
        Ok(())
    }

    /// Validates ownership and non-terminal state, transitions to `cancelled`.
    pub async fn cancel_job(&self, job_id: Uuid, viewer_user_id: Uuid) -> anyhow::Result<bool> {
        let job = match self.get_job(job_id, viewer_user_id).await? {
            Some(job) => job,
            None => return Ok(false),
        };

        if job.status().is_terminal() {
            return Ok(false);
        }

        self.update_status(job_id, JobStatus::Cancelled).await?;
        Ok(true)
    }
}
