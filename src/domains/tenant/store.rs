//! Tenant persistence: lazy org creation, membership, and
//! ownership-transfer-on-delete (spec §3).

use chrono::{Datelike, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::models::{Membership, MembershipRole, Organization, Subscription, SubscriptionPlan, SubscriptionStatus, User};
use crate::kernel::retry::retry_db;

#[derive(Clone)]
pub struct TenantStore {
    db: PgPool,
}

impl TenantStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Return the user's organization, lazily creating one (with a free
    /// subscription) if they don't belong to one yet.
    pub async fn org_for_user(&self, user: &User) -> anyhow::Result<Organization> {
        if let Some(org) = self.find_org_by_membership(user.id).await? {
            return Ok(org);
        }

        let org_id = Uuid::new_v4();
        let now = Utc::now();
        let org_name = format!("{}'s Organization", user.email);

        let mut tx = self.db.begin().await?;

        let org = sqlx::query_as::<_, Organization>(
            r#"INSERT INTO organizations (id, name, owner_user_id, created_at)
               VALUES ($1, $2, $3, $4) RETURNING *"#,
        )
        .bind(org_id)
        .bind(&org_name)
        .bind(user.id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"INSERT INTO memberships (user_id, org_id, role, created_at)
               VALUES ($1, $2, $3, $4)"#,
        )
        .bind(user.id)
        .bind(org_id)
        .bind(MembershipRole::Owner.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let period_end = now.with_day(1).unwrap_or(now) + chrono::Duration::days(32);
        sqlx::query(
            r#"INSERT INTO subscriptions (id, org_id, plan, status, provider, current_period_end, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
        )
        .bind(Uuid::new_v4())
        .bind(org_id)
        .bind(SubscriptionPlan::Free.as_str())
        .bind(SubscriptionStatus::Active.as_str())
        .bind("stripe")
        .bind(period_end)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(org)
    }

    async fn find_org_by_membership(&self, user_id: Uuid) -> anyhow::Result<Option<Organization>> {
        let org = retry_db(|| async {
            sqlx::query_as::<_, Organization>(
                r#"SELECT o.* FROM organizations o
                   JOIN memberships m ON m.org_id = o.id
                   WHERE m.user_id = $1
                   ORDER BY m.created_at ASC
                   LIMIT 1"#,
            )
            .bind(user_id)
            .fetch_optional(&self.db)
            .await
        })
        .await?;
        Ok(org)
    }

    pub async fn active_subscription(&self, org_id: Uuid) -> anyhow::Result<Option<Subscription>> {
        let sub = retry_db(|| async {
            sqlx::query_as::<_, Subscription>(
                r#"SELECT * FROM subscriptions WHERE org_id = $1 AND status = 'active' LIMIT 1"#,
            )
            .bind(org_id)
            .fetch_optional(&self.db)
            .await
        })
        .await?;
        Ok(sub)
    }

    /// Creating a new active subscription first cancels any existing
    /// active one, preserving the "exactly one active per org" invariant.
    pub async fn set_active_subscription(
        &self,
        org_id: Uuid,
        plan: SubscriptionPlan,
        provider: &str,
        provider_subscription_id: Option<&str>,
        current_period_end: Option<chrono::DateTime<Utc>>,
    ) -> anyhow::Result<Subscription> {
        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"UPDATE subscriptions SET status = 'cancelled' WHERE org_id = $1 AND status = 'active'"#,
        )
        .bind(org_id)
        .execute(&mut *tx)
        .await?;

        let sub = sqlx::query_as::<_, Subscription>(
            r#"INSERT INTO subscriptions
                 (id, org_id, plan, status, provider, provider_subscription_id, current_period_end, created_at)
               VALUES ($1, $2, $3, 'active', $4, $5, $6, $7)
               RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(org_id)
        .bind(plan.as_str())
        .bind(provider)
        .bind(provider_subscription_id)
        .bind(current_period_end)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(sub)
    }

    /// Removes `leaving_user_id`'s membership in `org_id`. Ownership is
    /// only ever repointed when the leaving user *is* the org's owner:
    /// reassigned to a remaining admin or, failing that, any remaining
    /// member; if no member remains, the organization itself is deleted
    /// (spec §3, cyclic entity graph note in §9). A non-owner member
    /// leaving never touches `organizations.owner_user_id`.
    pub async fn transfer_ownership_or_delete_org(
        &self,
        org_id: Uuid,
        leaving_user_id: Uuid,
    ) -> anyhow::Result<()> {
        let mut tx = self.db.begin().await?;

        let owner_user_id: Uuid = sqlx::query_scalar("SELECT owner_user_id FROM organizations WHERE id = $1")
            .bind(org_id)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM memberships WHERE org_id = $1 AND user_id = $2")
            .bind(org_id)
            .bind(leaving_user_id)
            .execute(&mut *tx)
            .await?;

        if leaving_user_id != owner_user_id {
            tx.commit().await?;
            return Ok(());
        }

        let successor: Option<Membership> = sqlx::query_as::<_, Membership>(
            r#"SELECT * FROM memberships WHERE org_id = $1
               ORDER BY (role = 'admin') DESC, created_at ASC
               LIMIT 1"#,
        )
        .bind(org_id)
        .fetch_optional(&mut *tx)
        .await?;

        match successor {
            Some(m) => {
                sqlx::query("UPDATE organizations SET owner_user_id = $1 WHERE id = $2")
                    .bind(m.user_id)
                    .bind(org_id)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("UPDATE memberships SET role = 'owner' WHERE org_id = $1 AND user_id = $2")
                    .bind(org_id)
                    .bind(m.user_id)
                    .execute(&mut *tx)
                    .await?;
            }
            None => {
                sqlx::query("DELETE FROM organizations WHERE id = $1")
                    .bind(org_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }
}
