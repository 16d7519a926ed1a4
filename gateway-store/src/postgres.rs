//! PostgreSQL-backed [`MetadataStore`]. Talks to the tables listed in
//! spec.md §6 (`organizations`, `credentials`, `mcp_endpoints`,
//! `subscriptions`, `usage_logs`) through a pooled connection — the pool is
//! the one exception to "no pooling across requests" (§5): it belongs to the
//! gateway's own metadata reads, not to tenant upstream connections.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gateway_core::types::{
    Credential, Endpoint, Plan, ResolvedEndpoint, ServiceKind, Subscription, SubscriptionStatus,
    UsageLogEntry, UsageStatus,
};
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;

use crate::{MetadataStore, StoreError};

pub struct PgMetadataStore {
    pool: PgPool,
}

impl PgMetadataStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to `database_url` with the pool sizing the gateway uses for
    /// its own metadata reads (distinct from upstream tenant connections,
    /// which are never pooled — spec.md §5).
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self::new(pool))
    }
}

fn map_sqlx_err(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        other => StoreError::Unavailable(other.to_string()),
    }
}

fn plan_from_str(raw: &str) -> Plan {
    match raw {
        "starter" => Plan::Starter,
        "pro" => Plan::Pro,
        "team" => Plan::Team,
        "lifetime" => Plan::Lifetime,
        _ => Plan::Free,
    }
}

fn subscription_status_from_str(raw: &str) -> SubscriptionStatus {
    match raw {
        "active" => SubscriptionStatus::Active,
        "canceled" => SubscriptionStatus::Canceled,
        "past_due" => SubscriptionStatus::PastDue,
        "trialing" => SubscriptionStatus::Trialing,
        _ => SubscriptionStatus::Incomplete,
    }
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    async fn resolve_endpoint(&self, endpoint_id: &str) -> Result<ResolvedEndpoint, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                e.id AS endpoint_id,
                e.credential_id,
                e.organization_id,
                e.active,
                e.allowed_tools,
                e.rate_limit_per_minute,
                c.id AS credential_id_full,
                c.service,
                c.display_name,
                c.config,
                c.trial_queries_used
            FROM mcp_endpoints e
            JOIN credentials c ON c.id = e.credential_id
            WHERE e.id = $1
            "#,
        )
        .bind(endpoint_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?
        .ok_or(StoreError::NotFound)?;

        let service_raw: String = row.try_get("service").map_err(map_sqlx_err)?;
        let service = ServiceKind::from_str_opt(&service_raw).ok_or(StoreError::NotFound)?;

        let config_json: serde_json::Value = row.try_get("config").map_err(map_sqlx_err)?;
        let config: BTreeMap<String, String> = serde_json::from_value(config_json)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let allowed_tools_json: Option<serde_json::Value> =
            row.try_get("allowed_tools").map_err(map_sqlx_err)?;
        let allowed_tools = match allowed_tools_json {
            None | Some(serde_json::Value::Null) => None,
            Some(v) => Some(
                serde_json::from_value::<Vec<String>>(v)
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?,
            ),
        };

        let endpoint = Endpoint {
            id: row.try_get("endpoint_id").map_err(map_sqlx_err)?,
            credential_id: row.try_get("credential_id").map_err(map_sqlx_err)?,
            organization_id: row.try_get("organization_id").map_err(map_sqlx_err)?,
            service,
            active: row.try_get("active").map_err(map_sqlx_err)?,
            allowed_tools,
            rate_limit_per_minute: row
                .try_get::<i32, _>("rate_limit_per_minute")
                .map_err(map_sqlx_err)? as u32,
        };

        let credential = Credential {
            id: row.try_get("credential_id_full").map_err(map_sqlx_err)?,
            organization_id: endpoint.organization_id.clone(),
            service,
            display_name: row.try_get("display_name").map_err(map_sqlx_err)?,
            config,
            trial_queries_used: row.try_get("trial_queries_used").map_err(map_sqlx_err)?,
        };

        Ok(ResolvedEndpoint { endpoint, credential })
    }

    async fn lookup_subscription(&self, organization_id: &str) -> Result<Subscription, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT s.plan, s.status, s.external_sub_id
            FROM subscriptions s
            WHERE s.organization_id = $1
            ORDER BY s.created_at DESC
            LIMIT 1
            "#,
        )
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let Some(row) = row else {
            // No subscription row at all: the organization is on the free
            // plan with no billing relationship.
            return Ok(Subscription {
                plan: Plan::Free,
                status: SubscriptionStatus::Incomplete,
                external_sub_id: None,
            });
        };

        let plan_raw: String = row.try_get("plan").map_err(map_sqlx_err)?;
        let status_raw: String = row.try_get("status").map_err(map_sqlx_err)?;

        Ok(Subscription {
            plan: plan_from_str(&plan_raw),
            status: subscription_status_from_str(&status_raw),
            external_sub_id: row.try_get("external_sub_id").map_err(map_sqlx_err)?,
        })
    }

    async fn count_requests_since(
        &self,
        organization_id: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS n
            FROM usage_logs
            WHERE organization_id = $1 AND created_at >= $2
            "#,
        )
        .bind(organization_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let n: i64 = row.try_get("n").map_err(map_sqlx_err)?;
        Ok(n as u64)
    }

    async fn increment_trial_counter(
        &self,
        credential_id: &str,
        expected_current: i32,
    ) -> Result<i32, StoreError> {
        // Compare-and-swap: the predicate lives in the WHERE clause, not in
        // application code, so two concurrent callers cannot both observe
        // `expected_current` and both win (spec.md §5, §9).
        let row = sqlx::query(
            r#"
            UPDATE credentials
            SET trial_queries_used = trial_queries_used + 1
            WHERE id = $1 AND trial_queries_used = $2
            RETURNING trial_queries_used
            "#,
        )
        .bind(credential_id)
        .bind(expected_current)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        match row {
            Some(row) => row.try_get("trial_queries_used").map_err(map_sqlx_err),
            None => Err(StoreError::Conflict),
        }
    }

    async fn append_usage(&self, entry: UsageLogEntry) -> Result<(), StoreError> {
        let status = match entry.status {
            UsageStatus::Success => "success",
            UsageStatus::Error => "error",
        };
        sqlx::query(
            r#"
            INSERT INTO usage_logs
                (organization_id, credential_id, service, tool, request_args,
                 status, error, duration_ms, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&entry.organization_id)
        .bind(&entry.credential_id)
        .bind(entry.service.as_str())
        .bind(&entry.tool)
        .bind(&entry.request_args)
        .bind(status)
        .bind(&entry.error)
        .bind(entry.duration_ms as i64)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn touch_endpoint(&self, endpoint_id: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE mcp_endpoints SET last_accessed_at = $1 WHERE id = $2")
            .bind(now)
            .bind(endpoint_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(())
    }
}
