//! Append-only `AuditLog` with one-way hashed IP/UA
//! (`original_source/services/audit_log_service.py`, spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditLog {
    pub id: Uuid,
    pub action_type: String,
    pub actor_user_id: Option<Uuid>,
    pub target_user_id: Option<Uuid>,
    pub ip_hash: String,
    pub user_agent_hash: String,
    pub details_json: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

fn hash(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Clone)]
pub struct AuditLogStore {
    db: PgPool,
}

impl AuditLogStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn record(
        &self,
        action_type: &str,
        actor_user_id: Option<Uuid>,
        target_user_id: Option<Uuid>,
        ip: &str,
        user_agent: &str,
        details: serde_json::Value,
    ) -> anyhow::Result<AuditLog> {
        let log = sqlx::query_as::<_, AuditLog>(
            r#"INSERT INTO audit_logs (id, action_type, actor_user_id, target_user_id, ip_hash, user_agent_hash, details_json, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(action_type)
        .bind(actor_user_id)
        .bind(target_user_id)
        .bind(hash(ip))
        .bind(hash(user_agent))
        .bind(details)
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await?;

        Ok(log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_is_deterministic_and_one_way() {
        let a = hash("127.0.0.1");
        let b = hash("127.0.0.1");
        assert_eq!(a, b);
        assert_ne!(a, "127.0.0.1");
        assert_eq!(a.len(), 64);
    }
}
