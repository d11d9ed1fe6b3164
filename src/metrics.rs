//! Counters exposed by the resolver. The core only increments them; how
//! they are published is left to whoever holds the [`Metrics`] handle.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    pub queries: AtomicU64,
    pub hosts_hits: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_inserts: AtomicU64,
    pub cache_evictions: AtomicU64,
    pub upstream_attempts: AtomicU64,
    pub upstream_failures: AtomicU64,
    pub servfail: AtomicU64,
    pub nxdomain: AtomicU64,
    pub hosts_reload_errors: AtomicU64,
    /// Gauge, the number of single-flight keys currently in flight.
    pub inflight: AtomicU64,
}

impl Metrics {
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            queries: self.queries.load(Ordering::Relaxed),
            hosts_hits: self.hosts_hits.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_inserts: self.cache_inserts.load(Ordering::Relaxed),
            cache_evictions: self.cache_evictions.load(Ordering::Relaxed),
            upstream_attempts: self.upstream_attempts.load(Ordering::Relaxed),
            upstream_failures: self.upstream_failures.load(Ordering::Relaxed),
            servfail: self.servfail.load(Ordering::Relaxed),
            nxdomain: self.nxdomain.load(Ordering::Relaxed),
            hosts_reload_errors: self.hosts_reload_errors.load(Ordering::Relaxed),
            inflight: self.inflight.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub queries: u64,
    pub hosts_hits: u64,
    pub cache_hits: u64,
    pub cache_inserts: u64,
    pub cache_evictions: u64,
    pub upstream_attempts: u64,
    pub upstream_failures: u64,
    pub servfail: u64,
    pub nxdomain: u64,
    pub hosts_reload_errors: u64,
    pub inflight: u64,
}
