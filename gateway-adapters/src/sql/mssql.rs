//! MSSQL adapter (spec.md §4.4.1). Uses `tiberius` — sqlx has no MSSQL
//! driver — over a plain `tokio::net::TcpStream`. `OFFSET … FETCH NEXT`
//! requires an `ORDER BY`; when the caller doesn't supply one, a no-op
//! ordering keeps pagination well-defined without implying a real order.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tiberius::{AuthMethod, Client, Config, EncryptionLevel};
use tokio::net::TcpStream;
use tokio_util::compat::TokioAsyncWriteCompatExt;

use crate::sql::common::{
    validate_query_table_args, DescribeTableArgs, ExecuteSqlArgs, QueryPlan, QueryTableArgs,
};
use crate::{config_flag_truthy, config_str, ServiceAdapter, ToolDef, ToolOutcome, CONNECT_TIMEOUT};

pub struct MssqlAdapter;

static TOOL_DEFS: std::sync::OnceLock<Vec<ToolDef>> = std::sync::OnceLock::new();

fn tool_defs() -> &'static [ToolDef] {
    TOOL_DEFS.get_or_init(|| {
        vec![
            ToolDef {
                name: "list_tables",
                description: "List base tables across non-system schemas, as schema.table",
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

async fn connect(config: &BTreeMap<String, String>) -> Result<Client<tokio_util::compat::Compat<TcpStream>>, String> {
    let host = config_str(config, "host")?;
    let port: u16 = config
        .get("port")
        .map(|p| p.parse())
        .transpose()
        .map_err(|_| "invalid port".to_string())?
        .unwrap_or(1433);
    let database = config_str(config, "database")?;
    let user = config_str(config, "user")?.to_string();
    let password = config.get("password").cloned().unwrap_or_default();

    let mut tiberius_config = Config::new();
    tiberius_config.host(host);
    tiberius_config.port(port);
    tiberius_config.database(database);
    tiberius_config.authentication(AuthMethod::sql_server(user, password));

    if config_flag_truthy(config, "ssl") {
        tiberius_config.encryption(EncryptionLevel::Required);
        // Self-signed certs are common on managed providers; accept without
        // chain validation (documented trade-off, spec.md §4.4.1, §9).
        tiberius_config.trust_cert();
    } else {
        tiberius_config.encryption(EncryptionLevel::NotSupported);
    }

    let tcp = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((host, port)))
        .await
        .map_err(|_| "connect timed out".to_string())?
        .map_err(|e| e.to_string())?;
    tcp.set_nodelay(true).map_err(|e| e.to_string())?;

    Client::connect(tiberius_config, tcp.compat_write())
        .await
        .map_err(|e| e.to_string())
}

fn column_to_json(row: &tiberius::Row, idx: usize) -> Value {
    use tiberius::ColumnType;
    let column = &row.columns()[idx];
    match column.column_type() {
        ColumnType::Bit | ColumnType::Bitn => row
            .try_get::<bool, _>(idx)
            .ok()
            .flatten()
            .map(Value::from)
            .unwrap_or(Value::Null),
        ColumnType::Int1 | ColumnType::Int2 | ColumnType::Int4 | ColumnType::Intn => row
            .try_get::<i32, _>(idx)
            .ok()
            .flatten()
            .map(Value::from)
            .unwrap_or(Value::Null),
        ColumnType::Int8 => row
            .try_get::<i64, _>(idx)
            .ok()
            .flatten()
            .map(Value::from)
            .unwrap_or(Value::Null),
        ColumnType::Float4 | ColumnType::Float8 | ColumnType::Floatn => row
            .try_get::<f64, _>(idx)
            .ok()
            .flatten()
            .map(Value::from)
            .unwrap_or(Value::Null),
        // DECIMAL/NUMERIC have no f64 decoder; decode through rust_decimal
        // and render as a string rather than silently returning null.
        ColumnType::Decimaln | ColumnType::Numericn => row
            .try_get::<rust_decimal::Decimal, _>(idx)
            .ok()
            .flatten()
            .map(|d| Value::String(d.to_string()))
            .unwrap_or(Value::Null),
        _ => row
            .try_get::<&str, _>(idx)
            .ok()
            .flatten()
            .map(|s| Value::String(s.to_string()))
            .unwrap_or(Value::Null),
    }
}

fn row_to_json(row: &tiberius::Row) -> Value {
    let mut obj = serde_json::Map::new();
    for (idx, column) in row.columns().iter().enumerate() {
        obj.insert(column.name().to_string(), column_to_json(row, idx));
    }
    Value::Object(obj)
}

fn quote(ident: &str) -> String {
    // schema.table stays two bracketed segments; a bare identifier is one.
    ident
        .split('.')
        .map(|part| format!("[{}]", part.replace(']', "]]")))
        .collect::<Vec<_>>()
        .join(".")
}

fn build_select(plan: &QueryPlan) -> String {
    let columns = plan
        .columns
        .iter()
        .map(|c| if c == "*" { c.clone() } else { quote(c) })
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = format!("SELECT {columns} FROM {}", quote(&plan.table_name));
    if !plan.filters.is_empty() {
        let mut clauses = Vec::new();
        let mut param_idx = 1;
        for (column, value) in &plan.filters {
            if value.is_null() {
                clauses.push(format!("{} IS NULL", quote(column)));
            } else {
                clauses.push(format!("{} = @P{param_idx}", quote(column)));
                param_idx += 1;
            }
        }
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    let order_expr = plan
        .order_by
        .clone()
        .map(quote)
        .unwrap_or_else(|| "(SELECT NULL)".to_string());
    sql.push_str(&format!(
        " ORDER BY {order_expr} {} OFFSET {} ROWS FETCH NEXT {} ROWS ONLY",
        if plan.ascending { "ASC" } else { "DESC" },
        plan.offset,
        plan.limit
    ));
    sql
}

/// Owned filter value ready to bind as a `tiberius` parameter, by native
/// type rather than coerced to text (spec.md §4.4.1's equality map isn't
/// string-only).
enum MssqlBindValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl MssqlBindValue {
    fn as_to_sql(&self) -> &dyn tiberius::ToSql {
        match self {
            MssqlBindValue::Str(s) => s,
            MssqlBindValue::Int(i) => i,
            MssqlBindValue::Float(f) => f,
            MssqlBindValue::Bool(b) => b,
        }
    }
}

fn mssql_bind_value(value: &Value) -> Option<MssqlBindValue> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(MssqlBindValue::Str(s.clone())),
        Value::Bool(b) => Some(MssqlBindValue::Bool(*b)),
        Value::Number(n) => Some(
            n.as_i64()
                .map(MssqlBindValue::Int)
                .or_else(|| n.as_f64().map(MssqlBindValue::Float))
                .unwrap_or_else(|| MssqlBindValue::Str(n.to_string())),
        ),
        _ => None,
    }
}

#[async_trait]
impl ServiceAdapter for MssqlAdapter {
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

        let mut client = connect(config).await?;
        let result = tokio::time::timeout(crate::STATEMENT_TIMEOUT, async {
            match tool {
                "list_tables" => {
                    let stream = client
                        .query(
                            "SELECT TABLE_SCHEMA, TABLE_NAME FROM INFORMATION_SCHEMA.TABLES \
                             WHERE TABLE_TYPE = 'BASE TABLE' AND TABLE_SCHEMA NOT IN \
                             ('sys', 'INFORMATION_SCHEME', 'information_schema') \
                             ORDER BY TABLE_SCHEMA, TABLE_NAME",
                            &[],
                        )
                        .await
                        .map_err(|e| e.to_string())?;
                    let rows = stream.into_first_result().await.map_err(|e| e.to_string())?;
                    let tables: Vec<String> = rows
                        .iter()
                        .map(|row| {
                            let schema: &str = row.get(0).unwrap_or_default();
                            let table: &str = row.get(1).unwrap_or_default();
                            format!("{schema}.{table}")
                        })
                        .collect();
                    Ok(json!({ "tables": tables }))
                }
                "describe_table" => {
                    let args: DescribeTableArgs =
                        serde_json::from_value(args).map_err(|e| e.to_string())?;
                    let table_name = gateway_sql_guard::sanitize_identifier(&args.table_name)
                        .map_err(|e| e.to_string())?
                        .to_string();
                    let stream = client
                        .query(
                            "SELECT COLUMN_NAME, DATA_TYPE, IS_NULLABLE, COLUMN_DEFAULT, \
                                    CHARACTER_MAXIMUM_LENGTH \
                             FROM INFORMATION_SCHEMA.COLUMNS WHERE TABLE_NAME = @P1 \
                             ORDER BY ORDINAL_POSITION",
                            &[&table_name],
                        )
                        .await
                        .map_err(|e| e.to_string())?;
                    let rows = stream.into_first_result().await.map_err(|e| e.to_string())?;
                    if rows.is_empty() {
                        return Err(format!("table '{table_name}' not found"));
                    }
                    let columns: Vec<Value> = rows
                        .iter()
                        .map(|row| {
                            json!({
                                "column_name": row.get::<&str, _>(0).unwrap_or_default(),
                                "data_type": row.get::<&str, _>(1).unwrap_or_default(),
                                "is_nullable": row.get::<&str, _>(2).unwrap_or_default(),
                                "column_default": row.get::<&str, _>(3),
                                "character_maximum_length": row.get::<i32, _>(4),
                            })
                        })
                        .collect();
                    Ok(json!({ "columns": columns }))
                }
                "query_table" => {
                    let args: QueryTableArgs = serde_json::from_value(args).map_err(|e| e.to_string())?;
                    let plan = validate_query_table_args(args)?;
                    let sql = build_select(&plan);
                    let binds: Vec<MssqlBindValue> = plan
                        .filters
                        .iter()
                        .filter_map(|(_, v)| mssql_bind_value(v))
                        .collect();
                    let params: Vec<&dyn tiberius::ToSql> =
                        binds.iter().map(MssqlBindValue::as_to_sql).collect();
                    let stream = client.query(&sql, &params).await.map_err(|e| e.to_string())?;
                    let rows = stream.into_first_result().await.map_err(|e| e.to_string())?;
                    let values: Vec<Value> = rows.iter().map(row_to_json).collect();
                    Ok(json!({ "rows": values }))
                }
                "execute_sql" => {
                    let args: ExecuteSqlArgs = serde_json::from_value(args).map_err(|e| e.to_string())?;
                    gateway_sql_guard::check_read_only(&args.sql).map_err(|e| e.to_string())?;
                    let stream = client.query(&args.sql, &[]).await.map_err(|e| e.to_string())?;
                    let rows = stream.into_first_result().await.map_err(|e| e.to_string())?;
                    let values: Vec<Value> = rows.iter().map(row_to_json).collect();
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
