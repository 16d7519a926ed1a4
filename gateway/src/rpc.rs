//! JSON-RPC 2.0 envelope types (spec.md §6). IDs are echoed verbatim and
//! may be numeric or string, so [`JsonRpcId`] carries both.

use gateway_core::RpcError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum JsonRpcId {
    Number(i64),
    String(String),
    Null,
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default = "default_id")]
    pub id: JsonRpcId,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

fn default_id() -> JsonRpcId {
    JsonRpcId::Null
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: JsonRpcId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: JsonRpcId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: JsonRpcId, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// Wraps a tool outcome in MCP's `content` shape (spec.md §4.6 step 9).
/// Both branches are JSON-RPC *success* replies; only `isError` differs.
pub fn tool_result_to_mcp_content(outcome: Result<Value, String>) -> Value {
    match outcome {
        Ok(payload) => serde_json::json!({
            "content": [{"type": "text", "text": payload.to_string()}]
        }),
        Err(message) => serde_json::json!({
            "content": [{"type": "text", "text": serde_json::json!({"error": message}).to_string()}],
            "isError": true
        }),
    }
}
