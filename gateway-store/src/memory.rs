//! In-memory [`MetadataStore`] for tests. Not used in production — the
//! gateway binary always wires up [`crate::PgMetadataStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gateway_core::types::{ResolvedEndpoint, Subscription, UsageLogEntry};
use std::sync::Mutex;

use crate::{MetadataStore, StoreError};

struct Inner {
    endpoints: Vec<ResolvedEndpoint>,
    subscriptions: std::collections::HashMap<String, Subscription>,
    usage: Vec<UsageLogEntry>,
    touched: Vec<(String, DateTime<Utc>)>,
}

/// A fixture store seeded with whatever endpoints/subscriptions a test
/// needs. Trial-counter CAS and usage counting behave exactly like the
/// PostgreSQL implementation so dispatcher tests exercise real semantics.
pub struct InMemoryMetadataStore {
    inner: Mutex<Inner>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                endpoints: Vec::new(),
                subscriptions: std::collections::HashMap::new(),
                usage: Vec::new(),
                touched: Vec::new(),
            }),
        }
    }

    pub fn with_endpoint(self, resolved: ResolvedEndpoint) -> Self {
        self.inner.lock().unwrap().endpoints.push(resolved);
        self
    }

    pub fn with_subscription(self, organization_id: impl Into<String>, sub: Subscription) -> Self {
        self.inner
            .lock()
            .unwrap()
            .subscriptions
            .insert(organization_id.into(), sub);
        self
    }

    pub fn usage_log(&self) -> Vec<UsageLogEntry> {
        self.inner.lock().unwrap().usage.clone()
    }

    pub fn touch_calls(&self) -> usize {
        self.inner.lock().unwrap().touched.len()
    }
}

impl Default for InMemoryMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn resolve_endpoint(&self, endpoint_id: &str) -> Result<ResolvedEndpoint, StoreError> {
        self.inner
            .lock()
            .unwrap()
            .endpoints
            .iter()
            .find(|r| r.endpoint.id == endpoint_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn lookup_subscription(&self, organization_id: &str) -> Result<Subscription, StoreError> {
        self.inner
            .lock()
            .unwrap()
            .subscriptions
            .get(organization_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn count_requests_since(
        &self,
        organization_id: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .usage
            .iter()
            .filter(|entry| entry.organization_id == organization_id && entry.created_at >= since)
            .count() as u64)
    }

    async fn increment_trial_counter(
        &self,
        credential_id: &str,
        expected_current: i32,
    ) -> Result<i32, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let credential = inner
            .endpoints
            .iter_mut()
            .map(|r| &mut r.credential)
            .find(|c| c.id == credential_id)
            .ok_or(StoreError::NotFound)?;
        if credential.trial_queries_used != expected_current {
            return Err(StoreError::Conflict);
        }
        credential.trial_queries_used += 1;
        Ok(credential.trial_queries_used)
    }

    async fn append_usage(&self, entry: UsageLogEntry) -> Result<(), StoreError> {
        self.inner.lock().unwrap().usage.push(entry);
        Ok(())
    }

    async fn touch_endpoint(&self, endpoint_id: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .touched
            .push((endpoint_id.to_string(), now));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::types::{
        Credential, Endpoint, Plan, ServiceKind, SubscriptionStatus,
    };
    use std::collections::BTreeMap;

    fn fixture(trial_queries_used: i32) -> ResolvedEndpoint {
        ResolvedEndpoint {
            endpoint: Endpoint {
                id: "ep-1".into(),
                credential_id: "cred-1".into(),
                organization_id: "org-1".into(),
                service: ServiceKind::Postgres,
                active: true,
                allowed_tools: None,
                rate_limit_per_minute: 60,
            },
            credential: Credential {
                id: "cred-1".into(),
                organization_id: "org-1".into(),
                service: ServiceKind::Postgres,
                display_name: "prod".into(),
                config: BTreeMap::new(),
                trial_queries_used,
            },
        }
    }

    #[tokio::test]
    async fn resolve_endpoint_returns_not_found_for_unknown_id() {
        let store = InMemoryMetadataStore::new();
        assert_eq!(
            store.resolve_endpoint("missing").await.unwrap_err(),
            StoreError::NotFound
        );
    }

    #[tokio::test]
    async fn increment_trial_counter_is_compare_and_swap() {
        let store = InMemoryMetadataStore::new().with_endpoint(fixture(9));
        assert_eq!(store.increment_trial_counter("cred-1", 9).await.unwrap(), 10);
        // Stale expectation now conflicts.
        assert_eq!(
            store.increment_trial_counter("cred-1", 9).await.unwrap_err(),
            StoreError::Conflict
        );
    }

    #[tokio::test]
    async fn lookup_subscription_missing_is_not_found() {
        let store = InMemoryMetadataStore::new().with_subscription(
            "org-1",
            Subscription {
                plan: Plan::Free,
                status: SubscriptionStatus::Incomplete,
                external_sub_id: None,
            },
        );
        assert!(store.lookup_subscription("org-1").await.is_ok());
        assert_eq!(
            store.lookup_subscription("org-2").await.unwrap_err(),
            StoreError::NotFound
        );
    }
}
