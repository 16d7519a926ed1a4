//! Stripe adapter (spec.md §4.4.3). Thin read-only wrapper over the
//! documented REST API — no SDK, just `reqwest` and HTTP Basic auth with
//! the secret key as username (Stripe's own convention).

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::{config_str, ServiceAdapter, ToolDef, ToolOutcome, CONNECT_TIMEOUT, STATEMENT_TIMEOUT};

const STRIPE_MAX_LIMIT: i64 = 100;
const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

pub struct StripeAdapter;

static TOOL_DEFS: std::sync::OnceLock<Vec<ToolDef>> = std::sync::OnceLock::new();

fn tool_defs() -> &'static [ToolDef] {
    TOOL_DEFS.get_or_init(|| {
        vec![
            ToolDef {
                name: "list_charges",
                description: "List charges, optionally paginated with a starting_after cursor",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "limit": {"type": "integer", "maximum": 100},
                        "starting_after": {"type": "string"}
                    }
                }),
            },
            ToolDef {
                name: "list_customers",
                description: "List customers, optionally paginated with a starting_after cursor",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "limit": {"type": "integer", "maximum": 100},
                        "starting_after": {"type": "string"}
                    }
                }),
            },
            ToolDef {
                name: "get_balance",
                description: "Retrieve the current Stripe account balance",
                input_schema: json!({"type": "object", "properties": {}}),
            },
        ]
    })
}

fn client() -> Result<reqwest::Client, String> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(STATEMENT_TIMEOUT)
        .build()
        .map_err(|e| e.to_string())
}

async fn stripe_get(
    secret_key: &str,
    path: &str,
    query: &[(&str, String)],
) -> ToolOutcome {
    let response = client()?
        .get(format!("{STRIPE_API_BASE}{path}"))
        .basic_auth(secret_key, Option::<&str>::None)
        .query(query)
        .send()
        .await
        .map_err(|e| format!("Stripe API error: {e}"))?;

    let status = response.status();
    let body: Value = response
        .json()
        .await
        .map_err(|e| format!("Stripe API error: {e}"))?;

    if !status.is_success() {
        let message = body
            .pointer("/error/message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(format!("Stripe API error: {message}"));
    }
    Ok(body)
}

fn list_query(args: &Value) -> Vec<(&'static str, String)> {
    let mut query = Vec::new();
    let limit = args
        .get("limit")
        .and_then(Value::as_i64)
        .map(|n| n.clamp(1, STRIPE_MAX_LIMIT))
        .unwrap_or(10);
    query.push(("limit", limit.to_string()));
    if let Some(cursor) = args.get("starting_after").and_then(Value::as_str) {
        query.push(("starting_after", cursor.to_string()));
    }
    query
}

#[async_trait]
impl ServiceAdapter for StripeAdapter {
    fn tool_defs(&self) -> &[ToolDef] {
        tool_defs()
    }

    async fn call(
        &self,
        tool: &str,
        args: Value,
        config: &BTreeMap<String, String>,
    ) -> ToolOutcome {
        let secret_key = config_str(config, "secret_key")?;
        match tool {
            "list_charges" => stripe_get(secret_key, "/charges", &list_query(&args)).await,
            "list_customers" => stripe_get(secret_key, "/customers", &list_query(&args)).await,
            "get_balance" => stripe_get(secret_key, "/balance", &[]).await,
            other => Err(format!("unknown tool '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_query_clamps_limit_to_stripe_max() {
        let args = json!({"limit": 5000});
        let query = list_query(&args);
        assert_eq!(query[0], ("limit", "100".to_string()));
    }

    #[test]
    fn list_query_defaults_limit_when_absent() {
        let query = list_query(&json!({}));
        assert_eq!(query[0], ("limit", "10".to_string()));
    }

    #[test]
    fn list_query_forwards_pagination_cursor() {
        let args = json!({"limit": 5, "starting_after": "ch_123"});
        let query = list_query(&args);
        assert_eq!(query[1], ("starting_after", "ch_123".to_string()));
    }
}
