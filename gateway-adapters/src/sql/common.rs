//! Shared, dialect-agnostic pieces of the three SQL adapters: parsing and
//! validating `query_table` arguments, and running `execute_sql` through
//! the SQL guard. Each dialect module turns the validated shape into its
//! own parameterized SQL string and native identifier quoting.

use gateway_sql_guard::sanitize_identifier;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct QueryTableArgs {
    pub table_name: String,
    #[serde(default)]
    pub select: Option<Vec<String>>,
    #[serde(default)]
    pub filters: Option<std::collections::BTreeMap<String, Value>>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
    #[serde(default)]
    pub order_by: Option<String>,
    #[serde(default)]
    pub order_direction: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteSqlArgs {
    pub sql: String,
}

#[derive(Debug, Deserialize)]
pub struct DescribeTableArgs {
    pub table_name: String,
}

/// A validated, dialect-agnostic query plan. Every identifier inside has
/// already passed [`sanitize_identifier`]; every filter value is meant to
/// be bound as a parameter, never interpolated. A filter value of
/// `Value::Null` means "IS NULL"; string/number/bool values are bound by
/// their native type, not coerced to text (spec.md §4.4.1's equality map
/// isn't restricted to strings).
pub struct QueryPlan {
    pub table_name: String,
    pub columns: Vec<String>,
    pub filters: Vec<(String, Value)>,
    pub order_by: Option<String>,
    pub ascending: bool,
    pub limit: i64,
    pub offset: i64,
}

pub fn validate_query_table_args(args: QueryTableArgs) -> Result<QueryPlan, String> {
    let table_name = sanitize_identifier(&args.table_name)
        .map_err(|e| format!("invalid table_name: {e}"))?
        .to_string();

    let columns = match args.select {
        None => vec!["*".to_string()],
        Some(cols) if cols.is_empty() => vec!["*".to_string()],
        Some(cols) => cols
            .iter()
            .map(|c| {
                sanitize_identifier(c)
                    .map(|s| s.to_string())
                    .map_err(|e| format!("invalid select column '{c}': {e}"))
            })
            .collect::<Result<Vec<_>, _>>()?,
    };

    let mut filters = Vec::new();
    if let Some(map) = args.filters {
        for (key, value) in map {
            let sanitized_key = sanitize_identifier(&key)
                .map_err(|e| format!("invalid filter column '{key}': {e}"))?
                .to_string();
            if !matches!(value, Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_)) {
                return Err(format!(
                    "filter value for '{key}' must be a string, number, boolean, or null"
                ));
            }
            filters.push((sanitized_key, value));
        }
    }

    let order_by = match args.order_by {
        None => None,
        Some(col) => Some(
            sanitize_identifier(&col)
                .map_err(|e| format!("invalid order_by column '{col}': {e}"))?
                .to_string(),
        ),
    };

    let ascending = match args.order_direction.as_deref() {
        None | Some("asc") => true,
        Some("desc") => false,
        Some(other) => return Err(format!("invalid order_direction '{other}', expected asc or desc")),
    };

    let limit = crate::clamp_limit(args.limit);
    let offset = args.offset.unwrap_or(0).max(0);

    Ok(QueryPlan {
        table_name,
        columns,
        filters,
        order_by,
        ascending,
        limit,
        offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsanitary_table_name() {
        let args = QueryTableArgs {
            table_name: "users; DROP TABLE x".to_string(),
            select: None,
            filters: None,
            limit: None,
            offset: None,
            order_by: None,
            order_direction: None,
        };
        assert!(validate_query_table_args(args).is_err());
    }

    #[test]
    fn defaults_columns_to_star_and_limit_to_fifty() {
        let args = QueryTableArgs {
            table_name: "users".to_string(),
            select: None,
            filters: None,
            limit: None,
            offset: None,
            order_by: None,
            order_direction: None,
        };
        let plan = validate_query_table_args(args).unwrap();
        assert_eq!(plan.columns, vec!["*".to_string()]);
        assert_eq!(plan.limit, 50);
        assert_eq!(plan.offset, 0);
        assert!(plan.ascending);
    }

    #[test]
    fn rejects_bad_order_direction() {
        let args = QueryTableArgs {
            table_name: "users".to_string(),
            select: None,
            filters: None,
            limit: None,
            offset: None,
            order_by: None,
            order_direction: Some("sideways".to_string()),
        };
        assert!(validate_query_table_args(args).is_err());
    }

    #[test]
    fn accepts_non_string_filter_values() {
        let mut filters = std::collections::BTreeMap::new();
        filters.insert("age".to_string(), Value::from(30));
        filters.insert("active".to_string(), Value::Bool(true));
        filters.insert("deleted_at".to_string(), Value::Null);
        let args = QueryTableArgs {
            table_name: "users".to_string(),
            select: None,
            filters: Some(filters),
            limit: None,
            offset: None,
            order_by: None,
            order_direction: None,
        };
        let plan = validate_query_table_args(args).unwrap();
        assert_eq!(plan.filters.len(), 3);
        assert!(plan.filters.contains(&("age".to_string(), Value::from(30))));
        assert!(plan.filters.contains(&("active".to_string(), Value::Bool(true))));
        assert!(plan.filters.contains(&("deleted_at".to_string(), Value::Null)));
    }

    #[test]
    fn rejects_array_and_object_filter_values() {
        let mut filters = std::collections::BTreeMap::new();
        filters.insert("tags".to_string(), Value::Array(vec![Value::from(1)]));
        let args = QueryTableArgs {
            table_name: "users".to_string(),
            select: None,
            filters: Some(filters),
            limit: None,
            offset: None,
            order_by: None,
            order_direction: None,
        };
        assert!(validate_query_table_args(args).is_err());
    }
}
