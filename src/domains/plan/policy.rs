//! Component C — tier lookup, monthly counter get/increment, limit
//! enforcement (spec §4.C). Separates check from increment: usage is
//! only ever incremented after a successful artifact persistence
//! (spec §3 invariant), never at submission time.

use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use super::tiers::{TierConfig, TierTable};
use super::usage::{current_period, UsageStore};
use crate::domains::tenant::{SubscriptionPlan, TenantStore, User, UserModelPreference};
use crate::errors::ApiError;

#[derive(Clone)]
pub struct PlanPolicy {
    tiers: TierTable,
    tenants: TenantStore,
    usage: UsageStore,
    db: PgPool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageStat {
    pub used: i64,
    pub limit: i64,
    pub remaining: i64,
    pub unlimited: bool,
}

impl PlanPolicy {
    pub fn new(db: PgPool) -> Self {
        Self {
            tiers: TierTable::default(),
            tenants: TenantStore::new(db.clone()),
            usage: UsageStore::new(db.clone()),
            db,
        }
    }

    /// Admin override takes precedence, then the org's active
    /// subscription, defaulting to `free` (spec §4.C).
    pub async fn plan_of(&self, user: &User) -> anyhow::Result<SubscriptionPlan> {
        if user.is_admin {
            tracing::info!(user_id = %user.id, "admin user assigned pro tier for faster generation");
            return Ok(SubscriptionPlan::Pro);
        }

        let org = self.tenants.org_for_user(user).await?;
        match self.tenants.active_subscription(org.id).await? {
            Some(sub) => Ok(sub.plan.parse().unwrap_or(SubscriptionPlan::Free)),
            None => Ok(SubscriptionPlan::Free),
        }
    }

    pub async fn org_id_of(&self, user: &User) -> anyhow::Result<Uuid> {
        Ok(self.tenants.org_for_user(user).await?.id)
    }

    pub fn tier_config(&self, plan: SubscriptionPlan) -> &TierConfig {
        self.tiers.get(plan)
    }

    /// Per-user per-content-type model preference overrides the tier
    /// default (supplemented feature, see SPEC_FULL §2).
    pub async fn model_for(&self, user: &User, content_type: Option<&str>) -> anyhow::Result<String> {
        if let Some(content_type) = content_type {
            let preference = sqlx::query_as::<_, UserModelPreference>(
                r#"SELECT * FROM user_model_preferences WHERE user_id = $1 AND content_type = $2"#,
            )
            .bind(user.id)
            .bind(content_type)
            .fetch_optional(&self.db)
            .await?;

            if let Some(preference) = preference {
                tracing::info!(
                    user_id = %user.id,
                    content_type,
                    model = %preference.model_name,
                    "using user-specific model preference"
                );
                return Ok(preference.model_name);
            }
        }

        let plan = self.plan_of(user).await?;
        Ok(self.tier_config(plan).model_name.to_string())
    }

    /// Read-only check: does `kind` fit within this month's limit for
    /// `user`'s org? Never mutates state.
    pub async fn check_monthly_limit(&self, user: &User, kind: &str) -> Result<(), ApiError> {
        let plan = self.plan_of(user).await.map_err(ApiError::Internal)?;
        let org_id = self.org_id_of(user).await.map_err(ApiError::Internal)?;
        let limit = *self.tier_config(plan).limits.get(kind).unwrap_or(&0);

        if limit == -1 {
            return Ok(());
        }

        let counter = self
            .usage
            .get(org_id, &current_period())
            .await
            .map_err(ApiError::Internal)?;
        let used = counter.field(kind);

        if limit == 0 {
            return Err(ApiError::PlanLimitExceeded {
                message: format!("your plan does not include {kind} generation"),
                content_type: kind.to_string(),
                used,
                limit,
                plan: plan.as_str().to_string(),
            });
        }

        if used >= limit {
            return Err(ApiError::PlanLimitExceeded {
                message: format!("you have reached your {kind} generation limit ({limit} per month)"),
                content_type: kind.to_string(),
                used,
                limit,
                plan: plan.as_str().to_string(),
            });
        }

        Ok(())
    }

    /// Called after successful artifact persistence, not at submission
    /// time (spec §3, §4.C rationale).
    pub async fn increment(&self, org_id: Uuid, kind: &str) -> anyhow::Result<()> {
        self.usage.increment(org_id, kind).await
    }

    pub async fn usage_stats(&self, user: &User) -> anyhow::Result<std::collections::HashMap<String, UsageStat>> {
        let plan = self.plan_of(user).await?;
        let org_id = self.org_id_of(user).await?;
        let counter = self.usage.get(org_id, &current_period()).await?;
        let config = self.tier_config(plan);

        let mut stats = std::collections::HashMap::new();
        for kind in [
            "blog",
            "social",
            "audio",
            "video",
            "voiceover_audio",
            "final_video",
        ] {
            let limit = *config.limits.get(kind).unwrap_or(&0);
            let used = counter.field(kind);
            let remaining = if limit == -1 { -1 } else { limit - used };
            stats.insert(
                kind.to_string(),
                UsageStat {
                    used,
                    limit,
                    remaining,
                    unlimited: limit == -1,
                },
            );
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_tier_forbids_audio_and_video() {
        let tiers = TierTable::default();
        let free = tiers.get(SubscriptionPlan::Free);
        assert_eq!(free.limits["audio"], 0);
        assert_eq!(free.limits["video"], 0);
        assert_eq!(free.limits["blog"], 10);
    }

    #[test]
    fn enterprise_tier_is_unlimited() {
        let tiers = TierTable::default();
        let ent = tiers.get(SubscriptionPlan::Enterprise);
        for limit in ent.limits.values() {
            assert_eq!(*limit, -1);
        }
    }
}
