use crate::metrics::Metrics;
use crate::name;
use renvoi_proto::packet::record::Record;
use renvoi_proto::packet::QueryType;
use std::collections::HashMap;
use std::io::Result;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    /// Hosts file to serve from, nothing local is served without one.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Seconds between two checks of the file, 0 never re-reads it.
    #[serde(default)]
    pub poll: u64,
    /// Rotate multi-address record sets by one position per request.
    #[serde(default)]
    pub round_robin: bool,
}

impl Config {
    /// Loads the initial snapshot and starts the poll task when asked to.
    /// A file that cannot be read at startup is fatal; later failures keep
    /// the previous snapshot.
    pub async fn build(
        self,
        record_ttl: u32,
        metrics: Arc<Metrics>,
    ) -> Result<Arc<FileHostsService>> {
        let service = Arc::new(FileHostsService::new(self.round_robin, record_ttl, metrics));
        if let Some(path) = self.path {
            service.reload(&path).await?;
            if self.poll > 0 {
                tokio::spawn(watch(
                    Arc::clone(&service),
                    path,
                    Duration::from_secs(self.poll),
                ));
            }
        }
        Ok(service)
    }
}

#[async_trait::async_trait]
pub trait HostsService {
    /// Records for an exactly matching name. `None` means the database does
    /// not know the name at all; an empty vector means the name exists but
    /// carries nothing of the requested type.
    async fn lookup(&self, qname: &str, qtype: QueryType) -> Option<Vec<Record>>;
}

#[derive(Debug)]
struct AddressSet<T> {
    addresses: Vec<T>,
    cursor: AtomicUsize,
}

impl<T> Default for AddressSet<T> {
    fn default() -> Self {
        Self {
            addresses: Vec::new(),
            cursor: AtomicUsize::new(0),
        }
    }
}

impl<T: Copy> AddressSet<T> {
    fn push(&mut self, address: T)
    where
        T: PartialEq,
    {
        if !self.addresses.contains(&address) {
            self.addresses.push(address);
        }
    }

    /// The addresses, shifted by one position per call when rotation is on.
    fn rotated(&self, round_robin: bool) -> Vec<T> {
        if !round_robin || self.addresses.len() < 2 {
            return self.addresses.clone();
        }
        let shift = self.cursor.fetch_add(1, Ordering::Relaxed) % self.addresses.len();
        let mut out = Vec::with_capacity(self.addresses.len());
        out.extend_from_slice(&self.addresses[shift..]);
        out.extend_from_slice(&self.addresses[..shift]);
        out
    }
}

#[derive(Debug, Default)]
struct Snapshot {
    v4: HashMap<String, AddressSet<std::net::Ipv4Addr>>,
    v6: HashMap<String, AddressSet<std::net::Ipv6Addr>>,
    /// Names bound to an address, in the order the file lists them.
    reverse: HashMap<IpAddr, Vec<String>>,
}

impl Snapshot {
    fn parse(input: &str) -> Self {
        let mut snapshot = Self::default();
        for line in input.lines() {
            let line = line.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }
            let mut tokens = line.split_whitespace();
            let address = tokens.next().unwrap_or_default();
            let address = match address.parse::<IpAddr>() {
                Ok(found) => found,
                Err(_) => {
                    tracing::debug!("skipping hosts line with invalid address {address:?}");
                    continue;
                }
            };
            for token in tokens {
                let Some(qname) = name::canonicalize(token) else {
                    tracing::debug!("skipping invalid hosts name {token:?}");
                    continue;
                };
                match address {
                    IpAddr::V4(addr) => snapshot.v4.entry(qname.clone()).or_default().push(addr),
                    IpAddr::V6(addr) => snapshot.v6.entry(qname.clone()).or_default().push(addr),
                }
                let names = snapshot.reverse.entry(address).or_default();
                if !names.contains(&qname) {
                    names.push(qname);
                }
            }
        }
        snapshot
    }

    fn contains(&self, qname: &str) -> bool {
        self.v4.contains_key(qname) || self.v6.contains_key(qname)
    }

    fn len(&self) -> usize {
        self.v4.len() + self.v6.len()
    }
}

pub struct FileHostsService {
    state: RwLock<Arc<Snapshot>>,
    last_modified: RwLock<Option<SystemTime>>,
    round_robin: bool,
    record_ttl: u32,
    metrics: Arc<Metrics>,
}

impl FileHostsService {
    fn new(round_robin: bool, record_ttl: u32, metrics: Arc<Metrics>) -> Self {
        Self {
            state: RwLock::new(Arc::new(Snapshot::default())),
            last_modified: RwLock::new(None),
            round_robin,
            record_ttl,
            metrics,
        }
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        self.state
            .read()
            .map(|guard| Arc::clone(&guard))
            .unwrap_or_default()
    }

    /// Re-reads the file and publishes a fresh snapshot.
    async fn reload(&self, path: &Path) -> Result<()> {
        let content = tokio::fs::read_to_string(path).await?;
        let snapshot = Snapshot::parse(&content);
        tracing::debug!("loaded {} names from {path:?}", snapshot.len());
        if let Ok(mut guard) = self.state.write() {
            *guard = Arc::new(snapshot);
        }
        Ok(())
    }

    /// One watcher round: skip when the modification time did not move,
    /// otherwise reload.
    async fn poll(&self, path: &Path) -> Result<()> {
        let modified = tokio::fs::metadata(path).await?.modified()?;
        let unchanged = self
            .last_modified
            .read()
            .map(|guard| *guard == Some(modified))
            .unwrap_or(false);
        if unchanged {
            return Ok(());
        }
        self.reload(path).await?;
        if let Ok(mut guard) = self.last_modified.write() {
            *guard = Some(modified);
        }
        Ok(())
    }
}

async fn watch(service: Arc<FileHostsService>, path: PathBuf, every: Duration) {
    let mut interval = tokio::time::interval(every);
    // the first tick fires immediately and the initial load already happened
    interval.tick().await;
    loop {
        interval.tick().await;
        if let Err(error) = service.poll(&path).await {
            service
                .metrics
                .hosts_reload_errors
                .fetch_add(1, Ordering::Relaxed);
            tracing::warn!("keeping previous hosts snapshot, reload failed: {error}");
        }
    }
}

#[async_trait::async_trait]
impl HostsService for FileHostsService {
    #[tracing::instrument(skip(self))]
    async fn lookup(&self, qname: &str, qtype: QueryType) -> Option<Vec<Record>> {
        let snapshot = self.snapshot();
        let qname = name::canonical(qname);
        let domain = name::wire(&qname);
        match qtype {
            QueryType::A => snapshot.contains(&qname).then(|| {
                snapshot
                    .v4
                    .get(&qname)
                    .map(|set| set.rotated(self.round_robin))
                    .unwrap_or_default()
                    .into_iter()
                    .map(|addr| Record::A {
                        domain: domain.clone(),
                        addr,
                        ttl: self.record_ttl,
                    })
                    .collect()
            }),
            QueryType::AAAA => snapshot.contains(&qname).then(|| {
                snapshot
                    .v6
                    .get(&qname)
                    .map(|set| set.rotated(self.round_robin))
                    .unwrap_or_default()
                    .into_iter()
                    .map(|addr| Record::AAAA {
                        domain: domain.clone(),
                        addr,
                        ttl: self.record_ttl,
                    })
                    .collect()
            }),
            QueryType::PTR => {
                let address = name::reverse_address(&qname)?;
                let names = snapshot.reverse.get(&address)?;
                Some(
                    names
                        .iter()
                        .map(|found| Record::PTR {
                            domain: domain.clone(),
                            host: name::wire(found),
                            ttl: self.record_ttl,
                        })
                        .collect(),
                )
            }
            // the name is ours, it just has nothing of that type
            _ => snapshot.contains(&qname).then(Vec::new),
        }
    }
}

#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockHostsService {
    inner: HashMap<(String, u16), Vec<Record>>,
}

#[cfg(test)]
impl MockHostsService {
    pub fn with_records(mut self, qname: &str, qtype: QueryType, records: Vec<Record>) -> Self {
        self.inner
            .insert((name::canonical(qname), qtype.into_num()), records);
        self
    }
}

#[cfg(test)]
#[async_trait::async_trait]
impl HostsService for MockHostsService {
    async fn lookup(&self, qname: &str, qtype: QueryType) -> Option<Vec<Record>> {
        self.inner
            .get(&(name::canonical(qname), qtype.into_num()))
            .cloned()
    }
}
