//! Service adapters (C4, spec.md §4.4). Every adapter implements the same
//! capability set — `call(tool, args, config) -> {ok} | {err}` plus a
//! static tool list — and is selected from the endpoint's service kind via
//! [`AdapterRegistry`], built once at startup and read-only thereafter.

pub mod saas;
pub mod sql;

use async_trait::async_trait;
use gateway_core::types::ServiceKind;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

/// Connect timeout for upstream database connections (spec.md §4.4.1).
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Statement/request timeout for upstream calls (spec.md §4.4.1).
pub const STATEMENT_TIMEOUT: Duration = Duration::from_secs(30);
/// `query_table` row cap (spec.md §4.4.1, §8).
pub const QUERY_TABLE_MAX_LIMIT: i64 = 500;
pub const QUERY_TABLE_DEFAULT_LIMIT: i64 = 50;

#[derive(Debug, Clone, Serialize)]
pub struct ToolDef {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: serde_json::Value,
}

/// The result of invoking a tool. Never panics across the capability
/// boundary — every failure the adapter can anticipate becomes `Err`, which
/// the dispatcher turns into a successful JSON-RPC reply with
/// `isError: true` (spec.md §4.4.4). Only credential decryption failure and
/// "unknown service" are RPC-level errors, and both happen above this trait.
pub type ToolOutcome = Result<serde_json::Value, String>;

#[async_trait]
pub trait ServiceAdapter: Send + Sync {
    fn tool_defs(&self) -> &[ToolDef];

    async fn call(
        &self,
        tool: &str,
        args: serde_json::Value,
        config: &BTreeMap<String, String>,
    ) -> ToolOutcome;
}

/// Static service-kind → adapter map, constructed once at startup
/// (spec.md §5, §9) and shared read-only across every request.
#[derive(Clone)]
pub struct AdapterRegistry {
    adapters: HashMap<ServiceKind, Arc<dyn ServiceAdapter>>,
}

impl AdapterRegistry {
    pub fn build() -> Self {
        let mut adapters: HashMap<ServiceKind, Arc<dyn ServiceAdapter>> = HashMap::new();
        adapters.insert(ServiceKind::Postgres, Arc::new(sql::postgres::PostgresAdapter));
        adapters.insert(ServiceKind::Mysql, Arc::new(sql::mysql::MysqlAdapter));
        adapters.insert(ServiceKind::Mssql, Arc::new(sql::mssql::MssqlAdapter));
        adapters.insert(ServiceKind::Supabase, Arc::new(saas::supabase::SupabaseAdapter));
        adapters.insert(ServiceKind::Stripe, Arc::new(saas::stripe::StripeAdapter));
        adapters.insert(ServiceKind::Mixpanel, Arc::new(saas::mixpanel::MixpanelAdapter));
        Self { adapters }
    }

    pub fn get(&self, service: ServiceKind) -> Option<Arc<dyn ServiceAdapter>> {
        self.adapters.get(&service).cloned()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::build()
    }
}

/// Truthy parsing for credential config flags like `ssl` (spec.md §4.4.1):
/// `true`/`1`/`on`, case-insensitive.
pub fn config_flag_truthy(config: &BTreeMap<String, String>, key: &str) -> bool {
    match config.get(key) {
        None => false,
        Some(v) => matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "on"),
    }
}

pub fn config_str<'a>(config: &'a BTreeMap<String, String>, key: &str) -> Result<&'a str, String> {
    config
        .get(key)
        .map(|s| s.as_str())
        .ok_or_else(|| format!("credential is missing required field '{key}'"))
}

/// Clamp a caller-supplied `limit` to spec.md §4.4.1/§8 semantics: absent or
/// negative defaults to 50; anything over 500 clamps to 500.
pub fn clamp_limit(raw: Option<i64>) -> i64 {
    match raw {
        None => QUERY_TABLE_DEFAULT_LIMIT,
        Some(n) if n < 0 => QUERY_TABLE_DEFAULT_LIMIT,
        Some(n) => n.min(QUERY_TABLE_MAX_LIMIT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_limit_defaults_and_caps() {
        assert_eq!(clamp_limit(None), 50);
        assert_eq!(clamp_limit(Some(-1)), 50);
        assert_eq!(clamp_limit(Some(10)), 10);
        assert_eq!(clamp_limit(Some(10_000)), 500);
    }

    #[test]
    fn registry_has_all_six_services() {
        let registry = AdapterRegistry::build();
        for service in [
            ServiceKind::Postgres,
            ServiceKind::Mysql,
            ServiceKind::Mssql,
            ServiceKind::Supabase,
            ServiceKind::Stripe,
            ServiceKind::Mixpanel,
        ] {
            assert!(registry.get(service).is_some());
        }
    }
}
