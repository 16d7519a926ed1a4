//! Metadata store interface (C3, spec.md §4.1). The gateway never owns this
//! schema — it consumes it through the six operations below, each with an
//! elevated principal that bypasses tenant row filters. [`MetadataStore`]
//! itself is the only authorization boundary that matters to the gateway.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gateway_core::types::{ResolvedEndpoint, Subscription, UsageLogEntry};

pub use memory::InMemoryMetadataStore;
pub use postgres::PgMetadataStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    NotFound,
    /// The trial counter moved between read and write (§4.5, §5 CAS).
    Conflict,
    Unavailable(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound => write!(f, "not found"),
            StoreError::Conflict => write!(f, "concurrent modification"),
            StoreError::Unavailable(msg) => write!(f, "metadata store unavailable: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// The narrow interface the gateway request path consumes (spec.md §4.1).
/// `append_usage` and `touch_endpoint` are fire-and-forget: callers should
/// not let their failure affect the reply to the MCP client.
#[async_trait]
pub trait MetadataStore: Send + Sync + 'static {
    async fn resolve_endpoint(&self, endpoint_id: &str) -> Result<ResolvedEndpoint, StoreError>;

    async fn lookup_subscription(&self, organization_id: &str) -> Result<Subscription, StoreError>;

    async fn count_requests_since(
        &self,
        organization_id: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Compare-and-swap increment. Fails with [`StoreError::Conflict`] if the
    /// stored value no longer equals `expected_current`.
    async fn increment_trial_counter(
        &self,
        credential_id: &str,
        expected_current: i32,
    ) -> Result<i32, StoreError>;

    async fn append_usage(&self, entry: UsageLogEntry) -> Result<(), StoreError>;

    async fn touch_endpoint(&self, endpoint_id: &str, now: DateTime<Utc>) -> Result<(), StoreError>;
}
