//! Supabase REST adapter (spec.md §4.4.2). `list_tables`/`describe_table`
//! read the project's PostgREST-generated OpenAPI document; `query_table`
//! speaks PostgREST's filter/ordering query-string dialect; `execute_sql`
//! depends on a helper RPC the tenant may not have installed, in which case
//! the adapter hints rather than errors (preserved per spec.md §9's open
//! question — never attempt to install the helper from here).

use async_trait::async_trait;
use gateway_sql_guard::check_read_only;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::{config_str, ServiceAdapter, ToolDef, ToolOutcome, CONNECT_TIMEOUT, STATEMENT_TIMEOUT};

pub struct SupabaseAdapter;

static TOOL_DEFS: std::sync::OnceLock<Vec<ToolDef>> = std::sync::OnceLock::new();

fn tool_defs() -> &'static [ToolDef] {
    TOOL_DEFS.get_or_init(|| {
        vec![
            ToolDef {
                name: "list_tables",
                description: "List tables exposed by the project's PostgREST schema",
                input_schema: json!({"type": "object", "properties": {}}),
            },
            ToolDef {
                name: "describe_table",
                description: "Describe a table's columns from the project's OpenAPI spec",
                input_schema: json!({
                    "type": "object",
                    "properties": {"table_name": {"type": "string"}},
                    "required": ["table_name"]
                }),
            },
            ToolDef {
                name: "query_table",
                description: "Query a table via PostgREST filter/ordering syntax",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "table_name": {"type": "string"},
                        "select": {"type": "array", "items": {"type": "string"}},
                        "filters": {"type": "object"},
                        "limit": {"type": "integer"},
                        "offset": {"type": "integer"},
                        "order_by": {"type": "string"},
                        "order_direction": {"type": "string", "enum": ["asc", "desc"]}
                    },
                    "required": ["table_name"]
                }),
            },
            ToolDef {
                name: "execute_sql",
                description: "Run a read-only SQL statement via the project's execute_readonly_query RPC",
                input_schema: json!({
                    "type": "object",
                    "properties": {"sql": {"type": "string"}},
                    "required": ["sql"]
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

fn rest_base(config: &BTreeMap<String, String>) -> Result<String, String> {
    Ok(config_str(config, "project_url")?.trim_end_matches('/').to_string())
}

fn api_key(config: &BTreeMap<String, String>) -> Result<&str, String> {
    config_str(config, "service_role_key")
}

async fn fetch_openapi(config: &BTreeMap<String, String>) -> Result<Value, String> {
    let url = format!("{}/rest/v1/", rest_base(config)?);
    let key = api_key(config)?;
    let response = client()?
        .get(&url)
        .header("apikey", key)
        .header("Authorization", format!("Bearer {key}"))
        .send()
        .await
        .map_err(|e| format!("Supabase API error: {e}"))?;
    if !response.status().is_success() {
        return Err(format!("Supabase API error: HTTP {}", response.status()));
    }
    response
        .json::<Value>()
        .await
        .map_err(|e| format!("Supabase API error: {e}"))
}

/// Paths of shape `{table}` in the OpenAPI document, excluding parameterized
/// and RPC paths (spec.md §4.4.2).
fn table_paths(spec: &Value) -> Vec<String> {
    spec.get("paths")
        .and_then(Value::as_object)
        .map(|paths| {
            paths
                .keys()
                .filter(|p| !p.contains('{') && !p.trim_start_matches('/').starts_with("rpc/"))
                .map(|p| p.trim_start_matches('/').to_string())
                .filter(|p| !p.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl ServiceAdapter for SupabaseAdapter {
    fn tool_defs(&self) -> &[ToolDef] {
        tool_defs()
    }

    async fn call(
        &self,
        tool: &str,
        args: Value,
        config: &BTreeMap<String, String>,
    ) -> ToolOutcome {
        match tool {
            "list_tables" => {
                let spec = fetch_openapi(config).await?;
                Ok(json!({ "tables": table_paths(&spec) }))
            }
            "describe_table" => {
                let table_name = args
                    .get("table_name")
                    .and_then(Value::as_str)
                    .ok_or("table_name is required")?;
                let spec = fetch_openapi(config).await?;
                let definition = spec
                    .pointer(&format!("/definitions/{table_name}/properties"))
                    .or_else(|| spec.pointer(&format!("/components/schemas/{table_name}/properties")));
                match definition {
                    None => Err(format!("table '{table_name}' not found")),
                    Some(properties) => {
                        let columns: Vec<Value> = properties
                            .as_object()
                            .into_iter()
                            .flatten()
                            .map(|(name, schema)| {
                                json!({
                                    "column_name": name,
                                    "data_type": schema.get("format").or_else(|| schema.get("type")).cloned().unwrap_or(Value::Null),
                                    "is_nullable": schema.get("nullable").cloned().unwrap_or(Value::Bool(true)),
                                })
                            })
                            .collect();
                        Ok(json!({ "columns": columns }))
                    }
                }
            }
            "query_table" => {
                let table_name = args
                    .get("table_name")
                    .and_then(Value::as_str)
                    .ok_or("table_name is required")?;
                let limit = crate::clamp_limit(args.get("limit").and_then(Value::as_i64));
                let offset = args.get("offset").and_then(Value::as_i64).unwrap_or(0).max(0);
                let select = args
                    .get("select")
                    .and_then(Value::as_array)
                    .map(|cols| {
                        cols.iter()
                            .filter_map(Value::as_str)
                            .collect::<Vec<_>>()
                            .join(",")
                    })
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| "*".to_string());

                let url = format!("{}/rest/v1/{table_name}", rest_base(config)?);
                let key = api_key(config)?;
                let mut request = client()?
                    .get(&url)
                    .header("apikey", key)
                    .header("Authorization", format!("Bearer {key}"))
                    .header("Range-Unit", "items")
                    .header("Range", format!("{offset}-{}", offset + limit - 1))
                    .query(&[("select", select.as_str())]);

                if let Some(filters) = args.get("filters").and_then(Value::as_object) {
                    for (column, value) in filters {
                        let filter_value = match value {
                            Value::Null => "is.null".to_string(),
                            Value::String(s) => format!("eq.{s}"),
                            other => format!("eq.{other}"),
                        };
                        request = request.query(&[(column.as_str(), filter_value.as_str())]);
                    }
                }
                if let Some(order_by) = args.get("order_by").and_then(Value::as_str) {
                    let direction = args
                        .get("order_direction")
                        .and_then(Value::as_str)
                        .unwrap_or("asc");
                    request = request.query(&[("order", format!("{order_by}.{direction}"))]);
                }

                let response = request
                    .send()
                    .await
                    .map_err(|e| format!("Supabase API error: {e}"))?;
                if !response.status().is_success() {
                    return Err(format!("Supabase API error: HTTP {}", response.status()));
                }
                let rows: Value = response
                    .json()
                    .await
                    .map_err(|e| format!("Supabase API error: {e}"))?;
                Ok(json!({ "rows": rows }))
            }
            "execute_sql" => {
                let sql = args.get("sql").and_then(Value::as_str).ok_or("sql is required")?;
                check_read_only(sql).map_err(|e| e.to_string())?;

                let url = format!("{}/rest/v1/rpc/execute_readonly_query", rest_base(config)?);
                let key = api_key(config)?;
                let response = client()?
                    .post(&url)
                    .header("apikey", key)
                    .header("Authorization", format!("Bearer {key}"))
                    .json(&json!({ "query_text": sql }))
                    .send()
                    .await
                    .map_err(|e| format!("Supabase API error: {e}"))?;

                if response.status() == reqwest::StatusCode::NOT_FOUND {
                    // The helper RPC isn't installed in this project. This is
                    // the documented contract (spec.md §4.4.2, §9): hint, not
                    // error.
                    return Ok(json!({
                        "hint": "execute_sql requires the execute_readonly_query() helper function, \
                                  which is not installed on this Supabase project. Use query_table instead, \
                                  or install the helper per the Supabase integration docs."
                    }));
                }
                if !response.status().is_success() {
                    return Err(format!("Supabase API error: HTTP {}", response.status()));
                }
                let rows: Value = response
                    .json()
                    .await
                    .map_err(|e| format!("Supabase API error: {e}"))?;
                Ok(json!({ "rows": rows }))
            }
            other => Err(format!("unknown tool '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_paths_excludes_parameterized_and_rpc() {
        let spec = json!({
            "paths": {
                "/orders": {},
                "/orders/{id}": {},
                "/rpc/execute_readonly_query": {},
                "/users": {}
            }
        });
        let mut tables = table_paths(&spec);
        tables.sort();
        assert_eq!(tables, vec!["orders".to_string(), "users".to_string()]);
    }
}
