//! Gateway edge (C7, spec.md §4.7): the two routes tenants and MCP clients
//! actually hit. Endpoint resolution and the `-32001`/`-32002` checks live
//! here, one layer above the method dispatcher, because every method on a
//! resolved endpoint needs them, not just `tools/call`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use gateway_core::error::EdgeError;
use gateway_core::RpcError;
use gateway_store::StoreError;
use serde_json::json;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::dispatcher::{self, DispatchOutcome};
use crate::rpc::{JsonRpcId, JsonRpcRequest, JsonRpcResponse};
use crate::state::AppState;

const SERVER_NAME: &str = "managed-mcp-gateway";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/gateway/{endpoint_id}", get(health).post(rpc_entry))
        .layer(TimeoutLayer::new(state.config.request_timeout))
        .layer(RequestBodyLimitLayer::new(state.config.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Path(endpoint_id): Path<String>,
) -> Result<Json<serde_json::Value>, EdgeError> {
    let resolved = state
        .store
        .resolve_endpoint(&endpoint_id)
        .await
        .map_err(|err| match err {
            StoreError::NotFound => EdgeError::NotFound("endpoint not found".to_string()),
            other => EdgeError::NotFound(other.to_string()),
        })?;

    if !resolved.endpoint.active {
        return Err(EdgeError::Forbidden("endpoint is inactive".to_string()));
    }

    Ok(Json(json!({
        "name": SERVER_NAME,
        "version": SERVER_VERSION,
        "status": "active",
        "service": resolved.endpoint.service.as_str(),
        "endpoint": resolved.endpoint.id,
    })))
}

async fn rpc_entry(
    State(state): State<AppState>,
    Path(endpoint_id): Path<String>,
    body: axum::body::Bytes,
) -> Response {
    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(err) => {
            return Json(JsonRpcResponse::error(
                JsonRpcId::Null,
                RpcError::parse_error(err.to_string()),
            ))
            .into_response();
        }
    };

    if request.jsonrpc != "2.0" {
        return Json(JsonRpcResponse::error(
            request.id,
            RpcError::invalid_request("jsonrpc must be \"2.0\""),
        ))
        .into_response();
    }

    let resolved = match state.store.resolve_endpoint(&endpoint_id).await {
        Ok(resolved) => resolved,
        Err(StoreError::NotFound) => {
            return Json(JsonRpcResponse::error(
                request.id,
                RpcError::not_found("Endpoint not found"),
            ))
            .into_response();
        }
        Err(other) => {
            return Json(JsonRpcResponse::error(
                request.id,
                RpcError::server_fault(other.to_string()),
            ))
            .into_response();
        }
    };

    if !resolved.endpoint.active {
        return Json(JsonRpcResponse::error(
            request.id,
            RpcError::endpoint_inactive(),
        ))
        .into_response();
    }

    if !state
        .rate_limiter
        .try_acquire(&resolved.endpoint.id, resolved.endpoint.rate_limit_per_minute)
    {
        return Json(JsonRpcResponse::error(
            request.id,
            RpcError::quota_exceeded("Rate limit exceeded for this endpoint"),
        ))
        .into_response();
    }

    state.background.submit(crate::background::BackgroundJob::TouchEndpoint {
        endpoint_id: resolved.endpoint.id.clone(),
        now: chrono::Utc::now(),
    });

    let outcome = dispatcher::dispatch(
        &request.method,
        request.params,
        &resolved,
        state.store.as_ref(),
        &state.adapters,
        &state.background,
        &state.master_key,
    )
    .await;

    match outcome {
        Ok(DispatchOutcome::NoContent) => StatusCode::NO_CONTENT.into_response(),
        Ok(DispatchOutcome::Reply(result)) => {
            Json(JsonRpcResponse::success(request.id, result)).into_response()
        }
        Err(rpc_error) => Json(JsonRpcResponse::error(request.id, rpc_error)).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_adapters::AdapterRegistry;
    use gateway_core::types::{
        Credential, Endpoint, ResolvedEndpoint, ServiceKind, Subscription, SubscriptionStatus,
    };
    use gateway_core::GatewayConfig;
    use gateway_rate_limit::EndpointRateLimiter;
    use gateway_store::{InMemoryMetadataStore, MetadataStore};
    use http_body_util::BodyExt;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_config() -> GatewayConfig {
        GatewayConfig {
            master_key: [7u8; 32],
            database_url: String::new(),
            bind_addr: "127.0.0.1:0".to_string(),
            request_timeout: Duration::from_secs(5),
            max_body_bytes: 1_048_576,
        }
    }

    fn endpoint(id: &str, service: ServiceKind, active: bool) -> ResolvedEndpoint {
        ResolvedEndpoint {
            endpoint: Endpoint {
                id: id.to_string(),
                credential_id: format!("{id}-cred"),
                organization_id: "org-1".to_string(),
                service,
                active,
                allowed_tools: None,
                rate_limit_per_minute: 1000,
            },
            credential: Credential {
                id: format!("{id}-cred"),
                organization_id: "org-1".to_string(),
                service,
                display_name: "test".to_string(),
                config: BTreeMap::new(),
                trial_queries_used: 0,
            },
        }
    }

    async fn build_state(store: InMemoryMetadataStore) -> AppState {
        let store: std::sync::Arc<dyn MetadataStore> = std::sync::Arc::new(store);
        let (background, _worker) = crate::background::BackgroundQueue::spawn(store.clone());
        AppState {
            config: std::sync::Arc::new(test_config()),
            master_key: std::sync::Arc::new([7u8; 32]),
            store,
            adapters: std::sync::Arc::new(AdapterRegistry::build()),
            rate_limiter: std::sync::Arc::new(EndpointRateLimiter::new()),
            background,
        }
    }

    async fn post_rpc(app: Router, endpoint_id: &str, body: serde_json::Value) -> serde_json::Value {
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri(format!("/gateway/{endpoint_id}"))
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn unknown_endpoint_returns_rpc_not_found() {
        let state = build_state(InMemoryMetadataStore::new()).await;
        let app = router(state);
        let reply = post_rpc(
            app,
            "xyz",
            serde_json::json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}),
        )
        .await;
        assert_eq!(reply["error"]["code"], -32001);
    }

    #[tokio::test]
    async fn initialize_handshake_reports_protocol_version() {
        let store = InMemoryMetadataStore::new()
            .with_endpoint(endpoint("ep-1", ServiceKind::Postgres, true))
            .with_subscription(
                "org-1",
                Subscription {
                    plan: gateway_core::types::Plan::Free,
                    status: SubscriptionStatus::Active,
                    external_sub_id: None,
                },
            );
        let state = build_state(store).await;
        let app = router(state);
        let reply = post_rpc(
            app,
            "ep-1",
            serde_json::json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}),
        )
        .await;
        assert_eq!(reply["result"]["protocolVersion"], "2025-03-26");
        assert!(reply["result"]["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn sql_guard_blocks_multi_statement_execute_sql() {
        let store = InMemoryMetadataStore::new()
            .with_endpoint(endpoint("ep-1", ServiceKind::Postgres, true))
            .with_subscription(
                "org-1",
                Subscription {
                    plan: gateway_core::types::Plan::Free,
                    status: SubscriptionStatus::Active,
                    external_sub_id: None,
                },
            );
        let state = build_state(store).await;
        let app = router(state);
        let reply = post_rpc(
            app,
            "ep-1",
            serde_json::json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "tools/call",
                "params": {
                    "name": "execute_sql",
                    "arguments": {"sql": "SELECT 1; DROP TABLE users"}
                }
            }),
        )
        .await;
        assert_eq!(reply["result"]["isError"], true);
        let text = reply["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("Multiple statements not allowed"));
    }

    #[tokio::test]
    async fn inactive_endpoint_denies_with_endpoint_inactive() {
        let store = InMemoryMetadataStore::new().with_endpoint(endpoint(
            "ep-1",
            ServiceKind::Postgres,
            false,
        ));
        let state = build_state(store).await;
        let app = router(state);
        let reply = post_rpc(
            app,
            "ep-1",
            serde_json::json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}),
        )
        .await;
        assert_eq!(reply["error"]["code"], -32002);
    }

    #[tokio::test]
    async fn quota_exhaustion_denies_without_reaching_upstream() {
        let now = chrono::Utc::now();
        let store = InMemoryMetadataStore::new()
            .with_endpoint(endpoint("ep-1", ServiceKind::Postgres, true))
            .with_subscription(
                "org-1",
                Subscription {
                    plan: gateway_core::types::Plan::Free,
                    status: SubscriptionStatus::Active,
                    external_sub_id: None,
                },
            );
        for _ in 0..100 {
            store
                .append_usage(gateway_core::types::UsageLogEntry {
                    organization_id: "org-1".to_string(),
                    credential_id: "ep-1-cred".to_string(),
                    service: ServiceKind::Postgres,
                    tool: "list_tables".to_string(),
                    request_args: serde_json::json!({}),
                    status: gateway_core::types::UsageStatus::Success,
                    error: None,
                    duration_ms: 1,
                    created_at: now,
                })
                .await
                .unwrap();
        }
        let state = build_state(store).await;
        let app = router(state);
        let reply = post_rpc(
            app,
            "ep-1",
            serde_json::json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "tools/call",
                "params": {"name": "list_tables", "arguments": {}}
            }),
        )
        .await;
        assert_eq!(reply["error"]["code"], -32003);
    }
}
