//! Two error surfaces, deliberately kept apart (spec.md §7 / SPEC_FULL.md §7):
//! [`EdgeError`] for HTTP faults that happen before a JSON-RPC envelope
//! exists at all, and [`RpcError`] for everything inside one.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

/// HTTP-level faults from the edge (C7), before dispatch even begins.
#[derive(Debug)]
pub enum EdgeError {
    NotFound(String),
    Forbidden(String),
    MethodNotAllowed,
    PayloadTooLarge,
    Timeout,
}

impl IntoResponse for EdgeError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            EdgeError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            EdgeError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            EdgeError::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                "method not allowed".to_string(),
            ),
            EdgeError::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "request body too large".to_string(),
            ),
            EdgeError::Timeout => (
                StatusCode::REQUEST_TIMEOUT,
                "request exceeded the gateway deadline".to_string(),
            ),
        };
        let body = serde_json::json!({ "error": message });
        (status, Json(body)).into_response()
    }
}

/// JSON-RPC 2.0 error object. Code reservations are exactly spec.md §4.6.
#[derive(Debug, Clone, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn parse_error(detail: impl Into<String>) -> Self {
        Self::new(-32700, format!("Parse error: {}", detail.into()))
    }

    pub fn invalid_request(detail: impl Into<String>) -> Self {
        Self::new(-32600, detail.into())
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(-32601, format!("Method not found: {method}"))
    }

    pub fn tool_not_found(tool: &str) -> Self {
        Self::new(-32601, format!("Tool not found: {tool}"))
    }

    pub fn invalid_params(detail: impl Into<String>) -> Self {
        Self::new(-32602, detail.into())
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(-32001, detail.into())
    }

    pub fn endpoint_inactive() -> Self {
        Self::new(-32002, "Endpoint is inactive")
    }

    pub fn quota_exceeded(reason: impl Into<String>) -> Self {
        Self::new(-32003, reason.into())
    }

    pub fn server_fault(detail: impl Into<String>) -> Self {
        Self::new(-32000, detail.into())
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn error_parts(err: EdgeError) -> (StatusCode, serde_json::Value) {
        let resp = err.into_response();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        (status, json)
    }

    #[tokio::test]
    async fn edge_error_not_found_status() {
        let (status, body) = error_parts(EdgeError::NotFound("endpoint missing".into())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "endpoint missing");
    }

    #[tokio::test]
    async fn edge_error_forbidden_status() {
        let (status, _) = error_parts(EdgeError::Forbidden("endpoint inactive".into())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn edge_error_method_not_allowed_status() {
        let (status, _) = error_parts(EdgeError::MethodNotAllowed).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn edge_error_payload_too_large_status() {
        let (status, _) = error_parts(EdgeError::PayloadTooLarge).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn rpc_error_codes_match_spec_reservations() {
        assert_eq!(RpcError::parse_error("x").code, -32700);
        assert_eq!(RpcError::invalid_request("x").code, -32600);
        assert_eq!(RpcError::method_not_found("ping").code, -32601);
        assert_eq!(RpcError::tool_not_found("t").code, -32601);
        assert_eq!(RpcError::invalid_params("x").code, -32602);
        assert_eq!(RpcError::not_found("x").code, -32001);
        assert_eq!(RpcError::endpoint_inactive().code, -32002);
        assert_eq!(RpcError::quota_exceeded("x").code, -32003);
        assert_eq!(RpcError::server_fault("x").code, -32000);
    }

    #[test]
    fn rpc_error_with_data_attaches_payload() {
        let err = RpcError::invalid_params("bad").with_data(serde_json::json!({"field": "name"}));
        assert_eq!(err.data.unwrap()["field"], "name");
    }
}
