//! Mixpanel adapter (spec.md §4.4.3). Authenticates with HTTP Basic using
//! the project's service account; every query tool requires an explicit
//! date range, matching Mixpanel's own Query API contract.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::{config_str, ServiceAdapter, ToolDef, ToolOutcome, CONNECT_TIMEOUT, STATEMENT_TIMEOUT};

const MIXPANEL_MAX_LIMIT: i64 = 1000;
const MIXPANEL_API_BASE: &str = "https://mixpanel.com/api/query";

pub struct MixpanelAdapter;

static TOOL_DEFS: std::sync::OnceLock<Vec<ToolDef>> = std::sync::OnceLock::new();

fn tool_defs() -> &'static [ToolDef] {
    TOOL_DEFS.get_or_init(|| {
        vec![
            ToolDef {
                name: "query_events",
                description: "Aggregate event counts over an explicit date range",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "event": {"type": "string"},
                        "from_date": {"type": "string", "format": "date"},
                        "to_date": {"type": "string", "format": "date"},
                        "limit": {"type": "integer", "maximum": 1000}
                    },
                    "required": ["event", "from_date", "to_date"]
                }),
            },
            ToolDef {
                name: "query_retention",
                description: "Retention analysis over an explicit date range",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "from_date": {"type": "string", "format": "date"},
                        "to_date": {"type": "string", "format": "date"},
                        "limit": {"type": "integer", "maximum": 1000}
                    },
                    "required": ["from_date", "to_date"]
                }),
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

fn required_date_range(args: &Value) -> Result<(String, String), String> {
    let from_date = args
        .get("from_date")
        .and_then(Value::as_str)
        .ok_or("from_date is required")?
        .to_string();
    let to_date = args
        .get("to_date")
        .and_then(Value::as_str)
        .ok_or("to_date is required")?
        .to_string();
    Ok((from_date, to_date))
}

fn clamp_limit(args: &Value) -> i64 {
    args.get("limit")
        .and_then(Value::as_i64)
        .map(|n| n.clamp(1, MIXPANEL_MAX_LIMIT))
        .unwrap_or(100)
}

async fn mixpanel_get(
    username: &str,
    secret: &str,
    path: &str,
    query: &[(&str, String)],
) -> ToolOutcome {
    let response = client()?
        .get(format!("{MIXPANEL_API_BASE}{path}"))
        .basic_auth(username, Some(secret))
        .query(query)
        .send()
        .await
        .map_err(|e| format!("Mixpanel API error: {e}"))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(format!("Mixpanel API error: {body}"));
    }
    response
        .json::<Value>()
        .await
        .map_err(|e| format!("Mixpanel API error: {e}"))
}

#[async_trait]
impl ServiceAdapter for MixpanelAdapter {
    fn tool_defs(&self) -> &[ToolDef] {
        tool_defs()
    }

    async fn call(
        &self,
        tool: &str,
        args: Value,
        config: &BTreeMap<String, String>,
    ) -> ToolOutcome {
        let project_id = config_str(config, "project_id")?;
        let username = config_str(config, "service_account_username")?;
        let secret = config_str(config, "service_account_secret")?;

        match tool {
            "query_events" => {
                let (from_date, to_date) = required_date_range(&args)?;
                let event = args
                    .get("event")
                    .and_then(Value::as_str)
                    .ok_or("event is required")?;
                let limit = clamp_limit(&args);
                mixpanel_get(
                    username,
                    secret,
                    "/events",
                    &[
                        ("project_id", project_id.to_string()),
                        ("event", event.to_string()),
                        ("from_date", from_date),
                        ("to_date", to_date),
                        ("limit", limit.to_string()),
                    ],
                )
                .await
            }
            "query_retention" => {
                let (from_date, to_date) = required_date_range(&args)?;
                let limit = clamp_limit(&args);
                mixpanel_get(
                    username,
                    secret,
                    "/retention",
                    &[
                        ("project_id", project_id.to_string()),
                        ("from_date", from_date),
                        ("to_date", to_date),
                        ("limit", limit.to_string()),
                    ],
                )
                .await
            }
            other => Err(format!("unknown tool '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_limit_caps_at_mixpanel_max() {
        assert_eq!(clamp_limit(&json!({"limit": 50_000})), 1000);
        assert_eq!(clamp_limit(&json!({})), 100);
    }

    #[test]
    fn required_date_range_rejects_missing_dates() {
        assert!(required_date_range(&json!({"from_date": "2026-01-01"})).is_err());
        assert!(required_date_range(&json!({"from_date": "2026-01-01", "to_date": "2026-01-31"})).is_ok());
    }
}
