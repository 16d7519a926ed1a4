//! MySQL adapter (spec.md §4.4.1). Same shape as the PostgreSQL adapter,
//! differing in identifier quoting (backticks), placeholder style (`?`),
//! and the default-schema convention ("the connection's default schema").

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use sqlx::mysql::{MySql, MySqlArguments, MySqlConnectOptions, MySqlRow, MySqlSslMode};
use sqlx::query::Query;
use sqlx::{Column, ConnectOptions, Row, TypeInfo};
use std::collections::BTreeMap;

use crate::sql::common::{
    validate_query_table_args, DescribeTableArgs, ExecuteSqlArgs, QueryPlan, QueryTableArgs,
};
use crate::{config_flag_truthy, config_str, ServiceAdapter, ToolDef, ToolOutcome, CONNECT_TIMEOUT};

pub struct MysqlAdapter;

static TOOL_DEFS: std::sync::OnceLock<Vec<ToolDef>> = std::sync::OnceLock::new();

fn tool_defs() -> &'static [ToolDef] {
    TOOL_DEFS.get_or_init(|| {
        vec![
            ToolDef {
                name: "list_tables",
                description: "List base tables in the connection's default schema",
                input_schema: json!({"type": "object", "properties": {}}),
            },
            ToolDef {
                name: "describe_table",
                description: "Describe a table's columns",
                input_schema: json!({
                    "type": "object",
                    "properties": {"table_name": {"type": "string"}},
                    "required": ["table_name"]
                }),
            },
            ToolDef {
                name: "query_table",
                description: "Run a parameterized, read-only SELECT against a table",
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
                description: "Run an arbitrary read-only SQL statement",
                input_schema: json!({
                    "type": "object",
                    "properties": {"sql": {"type": "string"}},
                    "required": ["sql"]
                }),
            },
        ]
    })
}

async fn connect(config: &BTreeMap<String, String>) -> Result<sqlx::MySqlConnection, String> {
    let host = config_str(config, "host")?;
    let port: u16 = config
        .get("port")
        .map(|p| p.parse())
        .transpose()
        .map_err(|_| "invalid port".to_string())?
        .unwrap_or(3306);
    let database = config_str(config, "database")?;
    let user = config_str(config, "user")?;
    let password = config.get("password").map(|s| s.as_str()).unwrap_or("");

    let ssl_mode = if config_flag_truthy(config, "ssl") {
        MySqlSslMode::Required
    } else {
        MySqlSslMode::Preferred
    };

    let options = MySqlConnectOptions::new()
        .host(host)
        .port(port)
        .database(database)
        .username(user)
        .password(password)
        .ssl_mode(ssl_mode);

    tokio::time::timeout(CONNECT_TIMEOUT, options.connect())
        .await
        .map_err(|_| "connect timed out".to_string())?
        .map_err(|e| e.to_string())
}

fn mysql_value_to_json(row: &MySqlRow, idx: usize) -> Value {
    let column = &row.columns()[idx];
    let type_name = column.type_info().name();
    match type_name {
        "TINYINT" | "SMALLINT" | "INT" | "MEDIUMINT" => row
            .try_get::<Option<i32>, _>(idx)
            .ok()
            .flatten()
            .map(Value::from)
            .unwrap_or(Value::Null),
        "BIGINT" => row
            .try_get::<Option<i64>, _>(idx)
            .ok()
            .flatten()
            .map(Value::from)
            .unwrap_or(Value::Null),
        "FLOAT" | "DOUBLE" => row
            .try_get::<Option<f64>, _>(idx)
            .ok()
            .flatten()
            .map(Value::from)
            .unwrap_or(Value::Null),
        // DECIMAL has no lossless f64 decoder in sqlx; decode through
        // rust_decimal and render as a string so money/decimal columns
        // don't silently come back null (or lose precision to f64).
        "DECIMAL" => row
            .try_get::<Option<Decimal>, _>(idx)
            .ok()
            .flatten()
            .map(|d| Value::String(d.to_string()))
            .unwrap_or(Value::Null),
        "BOOLEAN" => row
            .try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(Value::from)
            .unwrap_or(Value::Null),
        "JSON" => row
            .try_get::<Option<Value>, _>(idx)
            .ok()
            .flatten()
            .unwrap_or(Value::Null),
        "DATETIME" | "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(idx)
            .ok()
            .flatten()
            .map(|t| Value::String(t.to_string()))
            .or_else(|| {
                row.try_get::<Option<DateTime<Utc>>, _>(idx)
                    .ok()
                    .flatten()
                    .map(|t| Value::String(t.to_rfc3339()))
            })
            .unwrap_or(Value::Null),
        _ => row
            .try_get::<Option<String>, _>(idx)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

fn mysql_row_to_json(row: &MySqlRow) -> Value {
    let mut obj = serde_json::Map::new();
    for (idx, column) in row.columns().iter().enumerate() {
        obj.insert(column.name().to_string(), mysql_value_to_json(row, idx));
    }
    Value::Object(obj)
}

fn quote(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

fn build_select(plan: &QueryPlan) -> (String, Vec<Value>) {
    let columns = plan
        .columns
        .iter()
        .map(|c| if c == "*" { c.clone() } else { quote(c) })
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = format!("SELECT {columns} FROM {}", quote(&plan.table_name));
    let mut binds = Vec::new();
    if !plan.filters.is_empty() {
        let mut clauses = Vec::new();
        for (column, value) in &plan.filters {
            if value.is_null() {
                clauses.push(format!("{} IS NULL", quote(column)));
            } else {
                binds.push(value.clone());
                clauses.push(format!("{} = ?", quote(column)));
            }
        }
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    if let Some(order_by) = &plan.order_by {
        sql.push_str(&format!(
            " ORDER BY {} {}",
            quote(order_by),
            if plan.ascending { "ASC" } else { "DESC" }
        ));
    }
    sql.push_str(&format!(" LIMIT {} OFFSET {}", plan.limit, plan.offset));
    (sql, binds)
}

/// Binds a filter value by its native JSON type rather than coercing
/// everything to text (spec.md §4.4.1's equality map isn't string-only).
fn bind_filter_value(query: Query<'_, MySql, MySqlArguments>, value: &Value) -> Query<'_, MySql, MySqlArguments> {
    match value {
        Value::String(s) => query.bind(s.clone()),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if let Some(f) = n.as_f64() {
                query.bind(f)
            } else {
                query.bind(n.to_string())
            }
        }
        _ => query.bind(Option::<String>::None),
    }
}

#[async_trait]
impl ServiceAdapter for MysqlAdapter {
    fn tool_defs(&self) -> &[ToolDef] {
        tool_defs()
    }

    async fn call(
        &self,
        tool: &str,
        args: Value,
        config: &BTreeMap<String, String>,
    ) -> ToolOutcome {
        if tool == "execute_sql" {
            let parsed: ExecuteSqlArgs =
                serde_json::from_value(args.clone()).map_err(|e| e.to_string())?;
            gateway_sql_guard::check_read_only(&parsed.sql).map_err(|e| e.to_string())?;
        }

        let mut conn = connect(config).await?;
        let result = tokio::time::timeout(crate::STATEMENT_TIMEOUT, async {
            match tool {
                "list_tables" => {
                    let rows: Vec<(String,)> = sqlx::query_as(
                        "SELECT table_name FROM information_schema.tables \
                         WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE' \
                         ORDER BY table_name",
                    )
                    .fetch_all(&mut conn)
                    .await
                    .map_err(|e| e.to_string())?;
                    Ok(json!({ "tables": rows.into_iter().map(|(n,)| n).collect::<Vec<_>>() }))
                }
                "describe_table" => {
                    let args: DescribeTableArgs =
                        serde_json::from_value(args).map_err(|e| e.to_string())?;
                    let table_name = gateway_sql_guard::sanitize_identifier(&args.table_name)
                        .map_err(|e| e.to_string())?;
                    let rows = sqlx::query(
                        "SELECT column_name, data_type, is_nullable, column_default, \
                                character_maximum_length \
                         FROM information_schema.columns \
                         WHERE table_schema = DATABASE() AND table_name = ? \
                         ORDER BY ordinal_position",
                    )
                    .bind(table_name)
                    .fetch_all(&mut conn)
                    .await
                    .map_err(|e| e.to_string())?;
                    if rows.is_empty() {
                        return Err(format!("table '{table_name}' not found"));
                    }
                    let columns: Vec<Value> = rows
                        .iter()
                        .map(|row| {
                            json!({
                                "column_name": row.try_get::<String, _>("column_name").unwrap_or_default(),
                                "data_type": row.try_get::<String, _>("data_type").unwrap_or_default(),
                                "is_nullable": row.try_get::<String, _>("is_nullable").unwrap_or_default(),
                                "column_default": row.try_get::<Option<String>, _>("column_default").unwrap_or_default(),
                                "character_maximum_length": row.try_get::<Option<i64>, _>("character_maximum_length").unwrap_or_default(),
                            })
                        })
                        .collect();
                    Ok(json!({ "columns": columns }))
                }
                "query_table" => {
                    let args: QueryTableArgs = serde_json::from_value(args).map_err(|e| e.to_string())?;
                    let plan = validate_query_table_args(args)?;
                    let (sql, binds) = build_select(&plan);
                    let mut query = sqlx::query(&sql);
                    for bind in &binds {
                        query = bind_filter_value(query, bind);
                    }
                    let rows = query.fetch_all(&mut conn).await.map_err(|e| e.to_string())?;
                    let values: Vec<Value> = rows.iter().map(mysql_row_to_json).collect();
                    Ok(json!({ "rows": values }))
                }
                "execute_sql" => {
                    let args: ExecuteSqlArgs = serde_json::from_value(args).map_err(|e| e.to_string())?;
                    gateway_sql_guard::check_read_only(&args.sql).map_err(|e| e.to_string())?;
                    let rows = sqlx::query(&args.sql)
                        .fetch_all(&mut conn)
                        .await
                        .map_err(|e| e.to_string())?;
                    let values: Vec<Value> = rows.iter().map(mysql_row_to_json).collect();
                    Ok(json!({ "rows": values }))
                }
                other => Err(format!("unknown tool '{other}'")),
            }
        })
        .await;

        match result {
            Ok(inner) => inner,
            Err(_) => Err("statement timed out".to_string()),
        }
    }
}
