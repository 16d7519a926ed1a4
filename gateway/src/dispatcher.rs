//! JSON-RPC method dispatch (C6, spec.md §4.6). Endpoint resolution and the
//! `-32001`/`-32002` checks happen one layer up in the edge (C7); everything
//! here assumes a [`ResolvedEndpoint`] already in hand.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::Utc;
use gateway_adapters::AdapterRegistry;
use gateway_core::types::{ResolvedEndpoint, UsageLogEntry, UsageStatus};
use gateway_core::RpcError;
use gateway_store::MetadataStore;
use serde_json::{json, Value};

use crate::admission;
use crate::background::{BackgroundJob, BackgroundQueue};
use crate::rpc::tool_result_to_mcp_content;

const PROTOCOL_VERSION: &str = "2025-03-26";
const SERVER_NAME: &str = "managed-mcp-gateway";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A dispatched method either produces a JSON-RPC result value, or (for
/// `notifications/initialized`) has no reply body at all.
pub enum DispatchOutcome {
    Reply(Value),
    NoContent,
}

pub async fn dispatch(
    method: &str,
    params: Value,
    resolved: &ResolvedEndpoint,
    store: &dyn MetadataStore,
    adapters: &AdapterRegistry,
    background: &BackgroundQueue,
    master_key: &[u8; 32],
) -> Result<DispatchOutcome, RpcError> {
    match method {
        "initialize" => Ok(DispatchOutcome::Reply(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {"tools": {}},
            "serverInfo": {"name": SERVER_NAME, "version": SERVER_VERSION},
        }))),
        "notifications/initialized" => Ok(DispatchOutcome::NoContent),
        "ping" => Ok(DispatchOutcome::Reply(json!({}))),
        "tools/list" => tools_list(resolved, adapters).map(DispatchOutcome::Reply),
        "tools/call" => {
            tools_call(params, resolved, store, adapters, background, master_key)
                .await
                .map(DispatchOutcome::Reply)
        }
        other => Err(RpcError::method_not_found(other)),
    }
}

fn tools_list(resolved: &ResolvedEndpoint, adapters: &AdapterRegistry) -> Result<Value, RpcError> {
    let adapter = adapters
        .get(resolved.endpoint.service)
        .ok_or_else(|| RpcError::server_fault("no adapter registered for this endpoint's service"))?;

    let tools: Vec<_> = adapter
        .tool_defs()
        .iter()
        .filter(|t| resolved.endpoint.tool_allowed(t.name))
        .collect();
    Ok(json!({ "tools": tools }))
}

async fn tools_call(
    params: Value,
    resolved: &ResolvedEndpoint,
    store: &dyn MetadataStore,
    adapters: &AdapterRegistry,
    background: &BackgroundQueue,
    master_key: &[u8; 32],
) -> Result<Value, RpcError> {
    // Step 1: params.name present.
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::invalid_params("params.name is required"))?
        .to_string();
    let arguments = params
        .get("arguments")
        .cloned()
        .unwrap_or_else(|| json!({}));

    // Step 2: adapter for the endpoint's service.
    let adapter = adapters
        .get(resolved.endpoint.service)
        .ok_or_else(|| RpcError::server_fault("no adapter registered for this endpoint's service"))?;

    // Step 3: tool declared by the adapter.
    if !adapter.tool_defs().iter().any(|t| t.name == name) {
        return Err(RpcError::tool_not_found(&name));
    }

    // Step 4: tool allowed by the endpoint's allow-list, when set.
    if !resolved.endpoint.tool_allowed(&name) {
        return Err(RpcError::tool_not_found(&name));
    }

    // Step 5: unseal credential config.
    let config = unseal_config(master_key, &resolved.credential.config).map_err(|_| {
        RpcError::server_fault("failed to decrypt credential; re-add credentials")
    })?;

    // Step 6: daily quota.
    let subscription = store
        .lookup_subscription(&resolved.endpoint.organization_id)
        .await
        .map_err(|e| RpcError::server_fault(format!("failed to load subscription: {e}")))?;
    admission::check_daily_cap(
        store,
        &resolved.endpoint.organization_id,
        subscription.plan,
        Utc::now(),
    )
    .await
    .map_err(|denial| RpcError::quota_exceeded(denial.reason()))?;

    // Step 7: invoke the adapter, timing it.
    let started = Instant::now();
    let outcome = adapter.call(&name, arguments.clone(), &config).await;
    let duration_ms = started.elapsed().as_millis() as u64;

    // Step 8: fire-and-forget usage log.
    let (status, error) = match &outcome {
        Ok(_) => (UsageStatus::Success, None),
        Err(message) => (UsageStatus::Error, Some(message.clone())),
    };
    background.submit(BackgroundJob::AppendUsage(UsageLogEntry {
        organization_id: resolved.endpoint.organization_id.clone(),
        credential_id: resolved.credential.id.clone(),
        service: resolved.endpoint.service,
        tool: name,
        request_args: arguments,
        status,
        error,
        duration_ms,
        created_at: Utc::now(),
    }));

    // Step 9: translate to MCP content shape.
    Ok(tool_result_to_mcp_content(outcome))
}

/// Best-effort decrypt (spec.md §4.2): a value that isn't shaped like a
/// sealed envelope is assumed to already be plaintext (fields the field
/// schema never marked `encrypted`, or historical rows predating it) and
/// passes through unchanged. A well-formed envelope that fails its AEAD tag
/// check is a real failure, not a format mismatch, and propagates.
fn unseal_config(
    master_key: &[u8; 32],
    config: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>, gateway_crypto::CryptoError> {
    let mut out = BTreeMap::new();
    for (key, value) in config {
        let plain = match gateway_crypto::unseal(master_key, value) {
            Ok(plain) => plain,
            Err(gateway_crypto::CryptoError::MalformedEnvelope(_)) => value.clone(),
            Err(err) => return Err(err),
        };
        out.insert(key.clone(), plain);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::types::{Credential, Endpoint, ServiceKind};

    fn key() -> [u8; 32] {
        let mut k = [0u8; 32];
        k.iter_mut().enumerate().for_each(|(i, b)| *b = i as u8);
        k
    }

    #[test]
    fn unseal_config_passes_through_plaintext_and_decrypts_sealed() {
        let k = key();
        let mut config = BTreeMap::new();
        config.insert("host".to_string(), "db.internal".to_string());
        config.insert(
            "password".to_string(),
            gateway_crypto::seal(&k, "hunter2").unwrap(),
        );

        let resolved = unseal_config(&k, &config).unwrap();
        assert_eq!(resolved.get("host").unwrap(), "db.internal");
        assert_eq!(resolved.get("password").unwrap(), "hunter2");
    }

    #[test]
    fn unseal_config_propagates_real_decryption_failures() {
        let k = key();
        let mut other = key();
        other[0] ^= 0xFF;
        let mut config = BTreeMap::new();
        config.insert(
            "password".to_string(),
            gateway_crypto::seal(&other, "hunter2").unwrap(),
        );

        assert!(unseal_config(&k, &config).is_err());
    }

    fn fixture() -> ResolvedEndpoint {
        ResolvedEndpoint {
            endpoint: Endpoint {
                id: "ep-1".into(),
                credential_id: "cred-1".into(),
                organization_id: "org-1".into(),
                service: ServiceKind::Postgres,
                active: true,
                allowed_tools: Some(vec!["list_tables".into()]),
                rate_limit_per_minute: 60,
            },
            credential: Credential {
                id: "cred-1".into(),
                organization_id: "org-1".into(),
                service: ServiceKind::Postgres,
                display_name: "prod".into(),
                config: BTreeMap::new(),
                trial_queries_used: 0,
            },
        }
    }

    #[test]
    fn tools_list_honors_allow_list() {
        let resolved = fixture();
        let adapters = AdapterRegistry::build();
        let result = tools_list(&resolved, &adapters).unwrap();
        let tools = result["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "list_tables");
    }
}
