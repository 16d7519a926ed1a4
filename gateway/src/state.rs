//! Process-wide shared state (spec.md §5): the master key and the
//! service-adapter registry are read-only after startup; the metadata
//! store is a pooled connection checked out per call; the rate limiter and
//! background queue are the only other shared mutable resources, and both
//! are internally synchronized.

use std::sync::Arc;

use gateway_adapters::AdapterRegistry;
use gateway_core::GatewayConfig;
use gateway_rate_limit::EndpointRateLimiter;
use gateway_store::MetadataStore;

use crate::background::BackgroundQueue;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub master_key: Arc<[u8; 32]>,
    pub store: Arc<dyn MetadataStore>,
    pub adapters: Arc<AdapterRegistry>,
    pub rate_limiter: Arc<EndpointRateLimiter>,
    pub background: BackgroundQueue,
}
