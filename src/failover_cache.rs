//! FailoverDomainCache: bounded TTL map from jvmRoute to the domain it
//! was last seen in, populated on node removal and consulted during
//! failover to recover affinity for orphaned sticky sessions.

use std::time::Duration;

use moka::sync::Cache;

use crate::types::{Domain, JvmRoute};

pub const DEFAULT_CAPACITY: u64 = 100;
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

pub struct FailoverDomainCache {
    inner: Cache<JvmRoute, Domain>,
}

impl FailoverDomainCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Record the domain a removed node belonged to. A no-op for
    /// domain-less nodes (`domain = None`) — the cache only ever holds
    /// jvmRoutes that were actually in a domain.
    pub fn record_removed(&self, jvm_route: &JvmRoute, domain: Option<&Domain>) {
        if let Some(d) = domain {
            self.inner.insert(jvm_route.clone(), d.clone());
        }
    }

    /// Consulted by `findFailoverNode` when neither an explicit domain
    /// nor a live node for the jvmRoute is available. A miss is "no
    /// hint", not an error — reads may race with eviction.
    pub fn lookup(&self, jvm_route: &JvmRoute) -> Option<Domain> {
        self.inner.get(jvm_route)
    }

    /// `addNode` clears the cache entry for a route that has returned.
    pub fn forget(&self, jvm_route: &JvmRoute) {
        self.inner.invalidate(jvm_route);
    }

    pub fn contains(&self, jvm_route: &JvmRoute) -> bool {
        self.inner.contains_key(jvm_route)
    }
}

impl Default for FailoverDomainCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }
}
