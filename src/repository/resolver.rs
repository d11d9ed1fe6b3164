use crate::config::ConfigError;
use crate::metrics::Metrics;
use crate::routing::parse_endpoint;
use renvoi_proto::buffer::{BytePacketBuffer, ReaderError, WriterError, MAX_MESSAGE_SIZE};
use renvoi_proto::packet::header::{Header, ResponseCode};
use renvoi_proto::packet::question::Question;
use renvoi_proto::packet::record::Record;
use renvoi_proto::packet::DnsPacket;
use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt::Display;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::Mutex;
use tokio::time::{timeout_at, Instant};

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// Default upstream nameservers, tried in order.
    #[serde(default = "Config::default_servers")]
    pub servers: Vec<String>,
    /// Seconds to wait for an upstream before moving to the next one.
    #[serde(default = "Config::default_timeout")]
    pub timeout: u64,
    /// Refuse to forward anything, only the hosts database answers.
    #[serde(default)]
    pub no_rec: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            servers: Self::default_servers(),
            timeout: Self::default_timeout(),
            no_rec: false,
        }
    }
}

impl Config {
    pub fn default_servers() -> Vec<String> {
        vec!["1.1.1.1".to_string(), "1.0.0.1".to_string()]
    }

    pub fn default_timeout() -> u64 {
        2
    }

    /// The validated default upstream list.
    pub fn endpoints(&self) -> Result<Vec<SocketAddr>, ConfigError> {
        self.servers
            .iter()
            .map(|server| parse_endpoint(server))
            .collect()
    }

    pub fn build(&self, metrics: Arc<Metrics>) -> RemoteLookupService {
        RemoteLookupService::new(Duration::from_secs(self.timeout), metrics)
    }
}

/// Terminal outcome of a forwarding walk. Cloneable so a single-flight
/// leader can hand it to every waiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// every candidate endpoint failed
    Exhausted,
    /// the task that performed the fetch went away before answering
    Interrupted,
}

impl Display for LookupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exhausted => write!(f, "every upstream endpoint failed"),
            Self::Interrupted => write!(f, "the upstream fetch was interrupted"),
        }
    }
}

impl std::error::Error for LookupError {}

#[derive(Debug)]
enum AttemptError {
    Timeout,
    Mismatch,
    Io(std::io::Error),
    Reader(ReaderError),
    Writer(WriterError),
}

impl Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "read timeout expired"),
            Self::Mismatch => write!(f, "response does not match the query"),
            Self::Io(error) => write!(f, "{error}"),
            Self::Reader(error) => write!(f, "{error}"),
            Self::Writer(error) => write!(f, "{error}"),
        }
    }
}

impl From<std::io::Error> for AttemptError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<ReaderError> for AttemptError {
    fn from(value: ReaderError) -> Self {
        Self::Reader(value)
    }
}

impl From<WriterError> for AttemptError {
    fn from(value: WriterError) -> Self {
        Self::Writer(value)
    }
}

#[async_trait::async_trait]
pub trait LookupService {
    /// Asks the given endpoints for `question`, in order, and returns the
    /// first acceptable response. `dnssec_ok` carries the client's DO flag
    /// when it used EDNS.
    async fn lookup(
        &self,
        question: &Question,
        recursion: bool,
        dnssec_ok: Option<bool>,
        servers: &[SocketAddr],
    ) -> Result<DnsPacket, LookupError>;
}

pub struct RemoteLookupService {
    timeout: Duration,
    index: AtomicU16,
    /// Endpoints that timed out recently, tried after the healthy ones
    /// until they answer again. Session local, never persisted.
    penalized: Mutex<HashSet<SocketAddr>>,
    metrics: Arc<Metrics>,
}

impl RemoteLookupService {
    pub fn new(timeout: Duration, metrics: Arc<Metrics>) -> Self {
        Self {
            timeout,
            index: AtomicU16::new(1),
            penalized: Mutex::new(HashSet::new()),
            metrics,
        }
    }

    /// The candidate list with recently timed-out endpoints moved to the
    /// tail, relative order otherwise preserved.
    async fn ordered(&self, servers: &[SocketAddr]) -> Vec<SocketAddr> {
        let penalized = self.penalized.lock().await;
        let mut out: Vec<_> = servers
            .iter()
            .filter(|server| !penalized.contains(server))
            .copied()
            .collect();
        out.extend(servers.iter().filter(|server| penalized.contains(server)));
        out
    }

    async fn penalize(&self, server: SocketAddr) {
        self.penalized.lock().await.insert(server);
    }

    async fn restore(&self, server: &SocketAddr) {
        self.penalized.lock().await.remove(server);
    }

    /// One UDP exchange with `server`, retried over TCP when the answer
    /// comes back truncated.
    async fn attempt(
        &self,
        server: &SocketAddr,
        question: &Question,
        recursion: bool,
        dnssec_ok: Option<bool>,
    ) -> Result<DnsPacket, AttemptError> {
        let mut packet = DnsPacket::new(Header::question(
            self.index.fetch_add(1, Ordering::SeqCst),
        ))
        .with_question(question.clone());
        packet.header.recursion_desired = recursion;
        if let Some(dnssec_ok) = dnssec_ok {
            packet = packet.with_resource(Record::edns(MAX_MESSAGE_SIZE as u16, dnssec_ok));
        }
        let sent_id = packet.header.id;
        let query = packet.create_buffer()?;

        let local = match server {
            SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(server).await?;
        socket.send(query.bytes()).await?;

        let deadline = Instant::now() + self.timeout;
        let response = loop {
            let mut incoming = BytePacketBuffer::default();
            let size = timeout_at(deadline, socket.recv(&mut incoming.buf))
                .await
                .map_err(|_| AttemptError::Timeout)??;
            tracing::trace!("received {size} bytes from {server}");
            match DnsPacket::try_from(incoming) {
                Ok(found) if found.header.id == sent_id && echoes(&found, question) => break found,
                // a stray or damaged datagram, keep waiting for ours
                Ok(_) | Err(_) => continue,
            }
        };

        if response.header.truncated_message {
            tracing::debug!("truncated answer from {server}, retrying over tcp");
            return self.attempt_tcp(server, &query, sent_id, question, deadline).await;
        }
        Ok(response)
    }

    async fn attempt_tcp(
        &self,
        server: &SocketAddr,
        query: &BytePacketBuffer,
        sent_id: u16,
        question: &Question,
        deadline: Instant,
    ) -> Result<DnsPacket, AttemptError> {
        let exchange = async {
            let mut stream = TcpStream::connect(server).await?;
            stream.write_u16(query.pos as u16).await?;
            stream.write_all(query.bytes()).await?;
            let length = stream.read_u16().await? as usize;
            let mut bytes = vec![0u8; length];
            stream.read_exact(&mut bytes).await?;
            let buffer = BytePacketBuffer::from_bytes(&bytes)?;
            Ok::<_, AttemptError>(DnsPacket::try_from(buffer)?)
        };
        let response = timeout_at(deadline, exchange)
            .await
            .map_err(|_| AttemptError::Timeout)??;
        if response.header.id != sent_id || !echoes(&response, question) {
            return Err(AttemptError::Mismatch);
        }
        Ok(response)
    }
}

/// Whether the response echoes the question that was sent.
fn echoes(response: &DnsPacket, question: &Question) -> bool {
    response
        .questions
        .first()
        .map(|found| found == question)
        .unwrap_or(false)
}

#[async_trait::async_trait]
impl LookupService for RemoteLookupService {
    #[tracing::instrument(skip(self, servers))]
    async fn lookup(
        &self,
        question: &Question,
        recursion: bool,
        dnssec_ok: Option<bool>,
        servers: &[SocketAddr],
    ) -> Result<DnsPacket, LookupError> {
        for server in self.ordered(servers).await {
            self.metrics.upstream_attempts.fetch_add(1, Ordering::Relaxed);
            match self.attempt(&server, question, recursion, dnssec_ok).await {
                Ok(response) => match response.header.response_code {
                    ResponseCode::NoError | ResponseCode::NameError => {
                        self.restore(&server).await;
                        return Ok(response);
                    }
                    code => {
                        tracing::debug!("upstream {server} answered {code:?}, trying the next one");
                    }
                },
                Err(AttemptError::Timeout) => {
                    tracing::debug!("upstream {server} timed out");
                    self.penalize(server).await;
                }
                Err(error) => {
                    tracing::debug!("upstream {server} failed: {error}");
                }
            }
            self.metrics.upstream_failures.fetch_add(1, Ordering::Relaxed);
        }
        Err(LookupError::Exhausted)
    }
}

#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockLookupService {
    inner: HashMap<(String, u16), DnsPacket>,
    calls: std::sync::Mutex<Vec<(String, Vec<SocketAddr>)>>,
}

#[cfg(test)]
impl MockLookupService {
    pub fn with_query(mut self, qname: &str, qtype: renvoi_proto::packet::QueryType, packet: DnsPacket) -> Self {
        self.inner
            .insert((qname.to_string(), qtype.into_num()), packet);
        self
    }

    pub fn calls(&self) -> Vec<(String, Vec<SocketAddr>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait::async_trait]
impl LookupService for MockLookupService {
    async fn lookup(
        &self,
        question: &Question,
        _recursion: bool,
        _dnssec_ok: Option<bool>,
        servers: &[SocketAddr],
    ) -> Result<DnsPacket, LookupError> {
        self.calls
            .lock()
            .unwrap()
            .push((question.name.clone(), servers.to_vec()));
        self.inner
            .get(&(question.name.clone(), question.qtype.into_num()))
            .cloned()
            .ok_or(LookupError::Exhausted)
    }
}
