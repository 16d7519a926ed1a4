//! Data model shared by every layer of the gateway (spec.md §3).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upstream services the gateway knows how to speak to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Postgres,
    Mysql,
    Mssql,
    Supabase,
    Stripe,
    Mixpanel,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Postgres => "postgres",
            ServiceKind::Mysql => "mysql",
            ServiceKind::Mssql => "mssql",
            ServiceKind::Supabase => "supabase",
            ServiceKind::Stripe => "stripe",
            ServiceKind::Mixpanel => "mixpanel",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "postgres" => Some(ServiceKind::Postgres),
            "mysql" => Some(ServiceKind::Mysql),
            "mssql" => Some(ServiceKind::Mssql),
            "supabase" => Some(ServiceKind::Supabase),
            "stripe" => Some(ServiceKind::Stripe),
            "mixpanel" => Some(ServiceKind::Mixpanel),
            _ => None,
        }
    }
}

/// Billing plan an organization is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    Free,
    Starter,
    Pro,
    Team,
    Lifetime,
}

impl Plan {
    /// Per-day request limit, `None` meaning unlimited (spec.md §4.5).
    pub fn daily_request_limit(&self) -> Option<u64> {
        match self {
            Plan::Free => Some(100),
            Plan::Starter => Some(10_000),
            Plan::Lifetime => Some(10_000),
            Plan::Pro => Some(100_000),
            Plan::Team => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Canceled,
    PastDue,
    Trialing,
    Incomplete,
}

impl SubscriptionStatus {
    /// Whether this status counts as "an active billing subscription" for
    /// the purpose of bypassing the trial cap (spec.md §4.5).
    pub fn is_paid_active(&self) -> bool {
        matches!(self, SubscriptionStatus::Active)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub plan: Plan,
    pub status: SubscriptionStatus,
    pub external_sub_id: Option<String>,
}

/// A field type as declared by a service's field schema (spec.md §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Password,
    Url,
    Checkbox,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSchemaEntry {
    pub key: String,
    pub field_type: FieldType,
    pub required: bool,
    pub encrypted: bool,
}

/// Static reference data: one per supported service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportedService {
    pub kind: ServiceKind,
    pub field_schema: Vec<FieldSchemaEntry>,
    pub tool_names: Vec<String>,
}

impl SupportedService {
    pub fn encrypted_fields(&self) -> impl Iterator<Item = &str> {
        self.field_schema
            .iter()
            .filter(|f| f.encrypted)
            .map(|f| f.key.as_str())
    }
}

/// Organization owning credentials, endpoints, subscription, usage logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub plan: Plan,
}

/// A tenant's configuration for one upstream service. `config` values for
/// keys declared `encrypted` in the service's field schema are stored sealed
/// (see gateway-crypto); the store layer does not know which is which, it
/// just carries opaque strings — unsealing happens in the dispatcher (C6)
/// against the field schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub id: String,
    pub organization_id: String,
    pub service: ServiceKind,
    pub display_name: String,
    pub config: BTreeMap<String, String>,
    pub trial_queries_used: i32,
}

/// A public, per-tenant gateway URL bound to exactly one credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: String,
    pub credential_id: String,
    pub organization_id: String,
    pub service: ServiceKind,
    pub active: bool,
    pub allowed_tools: Option<Vec<String>>,
    pub rate_limit_per_minute: u32,
}

impl Endpoint {
    pub fn tool_allowed(&self, tool: &str) -> bool {
        match &self.allowed_tools {
            None => true,
            Some(list) => list.iter().any(|t| t == tool),
        }
    }
}

/// The bundle `ResolveEndpoint` returns: the endpoint plus its bound
/// credential, atomically (spec.md §4.1).
#[derive(Debug, Clone)]
pub struct ResolvedEndpoint {
    pub endpoint: Endpoint,
    pub credential: Credential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageStatus {
    Success,
    Error,
}

/// An append-only usage log entry (spec.md §3). `request_args` is expected
/// to already be redacted by the caller before it reaches the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageLogEntry {
    pub organization_id: String,
    pub credential_id: String,
    pub service: ServiceKind,
    pub tool: String,
    pub request_args: serde_json::Value,
    pub status: UsageStatus,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_daily_limits_match_spec() {
        assert_eq!(Plan::Free.daily_request_limit(), Some(100));
        assert_eq!(Plan::Starter.daily_request_limit(), Some(10_000));
        assert_eq!(Plan::Lifetime.daily_request_limit(), Some(10_000));
        assert_eq!(Plan::Pro.daily_request_limit(), Some(100_000));
        assert_eq!(Plan::Team.daily_request_limit(), None);
    }

    #[test]
    fn service_kind_round_trips_through_str() {
        for kind in [
            ServiceKind::Postgres,
            ServiceKind::Mysql,
            ServiceKind::Mssql,
            ServiceKind::Supabase,
            ServiceKind::Stripe,
            ServiceKind::Mixpanel,
        ] {
            assert_eq!(ServiceKind::from_str_opt(kind.as_str()), Some(kind));
        }
        assert_eq!(ServiceKind::from_str_opt("not-a-service"), None);
    }

    #[test]
    fn endpoint_tool_allowed_respects_allow_list() {
        let mut endpoint = Endpoint {
            id: "ep-1".into(),
            credential_id: "cred-1".into(),
            organization_id: "org-1".into(),
            service: ServiceKind::Postgres,
            active: true,
            allowed_tools: None,
            rate_limit_per_minute: 60,
        };
        assert!(endpoint.tool_allowed("anything"));

        endpoint.allowed_tools = Some(vec!["list_tables".to_string()]);
        assert!(endpoint.tool_allowed("list_tables"));
        assert!(!endpoint.tool_allowed("execute_sql"));
    }

    #[test]
    fn subscription_status_paid_active_is_only_active() {
        assert!(SubscriptionStatus::Active.is_paid_active());
        assert!(!SubscriptionStatus::Trialing.is_paid_active());
        assert!(!SubscriptionStatus::PastDue.is_paid_active());
    }
}
