use crate::metrics::Metrics;
use crate::name;
use crate::repository::resolver::LookupError;
use moka::future::Cache;
use moka::notification::RemovalCause;
use renvoi_proto::packet::header::ResponseCode;
use renvoi_proto::packet::question::{DnsClass, Question};
use renvoi_proto::packet::{DnsPacket, QueryType};
use std::collections::HashMap;
use std::future::Future;
use std::io::Result;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// How many responses are kept, 0 disables the cache entirely.
    #[serde(default = "Config::default_size")]
    size: u64,
    /// Seconds a response stays valid, regardless of the record TTLs it
    /// carries.
    #[serde(default = "Config::default_ttl")]
    ttl: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            size: Self::default_size(),
            ttl: Self::default_ttl(),
        }
    }
}

impl Config {
    pub fn default_size() -> u64 {
        1000
    }

    pub fn default_ttl() -> u64 {
        60
    }

    pub fn is_enabled(&self) -> bool {
        self.size > 0
    }

    pub fn ttl(&self) -> u64 {
        self.ttl
    }

    pub async fn build(self, metrics: Arc<Metrics>) -> Result<MemoryCacheService> {
        Ok(MemoryCacheService::new(self.size, self.ttl, metrics))
    }
}

/// What a response answers: the canonical name, the type, the class and the
/// DNSSEC-OK flag, so validating and non-validating clients do not share
/// entries. Transaction identifiers and the rest of the EDNS flags stay out.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct Fingerprint {
    pub name: String,
    pub qtype: QueryType,
    pub qclass: DnsClass,
    pub dnssec_ok: bool,
}

impl Fingerprint {
    pub fn new(qname: &str, question: &Question, dnssec_ok: bool) -> Self {
        Self {
            name: name::canonical(qname),
            qtype: question.qtype,
            qclass: question.qclass,
            dnssec_ok,
        }
    }
}

#[async_trait::async_trait]
pub trait CacheService {
    /// Stores `packet` under `fingerprint` unless its response code is one
    /// that must not be remembered.
    async fn persist(&self, fingerprint: &Fingerprint, packet: &DnsPacket);
    /// A copy of the stored response, its transaction identifier zeroed.
    async fn request(&self, fingerprint: &Fingerprint) -> Option<DnsPacket>;
}

pub struct MemoryCacheService {
    inner: Option<Cache<Fingerprint, DnsPacket>>,
    metrics: Arc<Metrics>,
}

impl MemoryCacheService {
    fn new(size: u64, ttl: u64, metrics: Arc<Metrics>) -> Self {
        let inner = (size > 0).then(|| {
            let evicted = Arc::clone(&metrics);
            Cache::builder()
                .max_capacity(size)
                .time_to_live(Duration::from_secs(ttl))
                .eviction_listener_with_queued_delivery_mode(move |_key, _value, cause| {
                    if matches!(cause, RemovalCause::Size | RemovalCause::Expired) {
                        evicted.cache_evictions.fetch_add(1, Ordering::Relaxed);
                    }
                })
                .build()
        });
        Self { inner, metrics }
    }
}

#[async_trait::async_trait]
impl CacheService for MemoryCacheService {
    #[tracing::instrument(skip(self, packet))]
    async fn persist(&self, fingerprint: &Fingerprint, packet: &DnsPacket) {
        let Some(inner) = self.inner.as_ref() else {
            return;
        };
        if matches!(
            packet.header.response_code,
            ResponseCode::ServerFailure | ResponseCode::Refused | ResponseCode::NotImplemented
        ) {
            tracing::debug!(
                "not persisting {:?} response",
                packet.header.response_code
            );
            return;
        }
        let mut stored = packet.clone();
        stored.header.id = 0;
        inner.insert(fingerprint.clone(), stored).await;
        self.metrics.cache_inserts.fetch_add(1, Ordering::Relaxed);
    }

    #[tracing::instrument(skip(self))]
    async fn request(&self, fingerprint: &Fingerprint) -> Option<DnsPacket> {
        let found = self.inner.as_ref()?.get(fingerprint);
        if found.is_some() {
            tracing::debug!("found in cache");
        }
        found
    }
}

/// Coalesces concurrent misses on the same fingerprint: the first caller
/// runs the fetch, everyone else waits on the same outcome and receives a
/// copy, failures included. The map never stays locked across the fetch.
pub struct Singleflight {
    inflight: Mutex<HashMap<Fingerprint, broadcast::Sender<std::result::Result<DnsPacket, LookupError>>>>,
    metrics: Arc<Metrics>,
}

impl Singleflight {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
            metrics,
        }
    }

    pub async fn run<F>(
        &self,
        key: Fingerprint,
        fetch: F,
    ) -> std::result::Result<DnsPacket, LookupError>
    where
        F: Future<Output = std::result::Result<DnsPacket, LookupError>>,
    {
        let mut inflight = self.inflight.lock().await;
        if let Some(leader) = inflight.get(&key) {
            let mut waiter = leader.subscribe();
            drop(inflight);
            return match waiter.recv().await {
                Ok(outcome) => outcome,
                Err(_) => Err(LookupError::Interrupted),
            };
        }
        let (sender, _) = broadcast::channel(1);
        inflight.insert(key.clone(), sender);
        self.metrics
            .inflight
            .store(inflight.len() as u64, Ordering::Relaxed);
        drop(inflight);

        let outcome = fetch.await;

        let mut inflight = self.inflight.lock().await;
        if let Some(sender) = inflight.remove(&key) {
            let _ = sender.send(outcome.clone());
        }
        self.metrics
            .inflight
            .store(inflight.len() as u64, Ordering::Relaxed);
        outcome
    }
}
