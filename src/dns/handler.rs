use super::error::HandleError;
use crate::metrics::Metrics;
use crate::name;
use crate::repository::cache::{CacheService, Fingerprint, Singleflight};
use crate::repository::hosts::HostsService;
use crate::repository::resolver::{LookupError, LookupService};
use crate::routing::RoutingTable;
use crate::search::Expander;
use renvoi_proto::buffer::{BytePacketBuffer, DEFAULT_UDP_PAYLOAD, MAX_MESSAGE_SIZE};
use renvoi_proto::packet::header::{Header, ResponseCode};
use renvoi_proto::packet::question::Question;
use renvoi_proto::packet::record::Record;
use renvoi_proto::packet::DnsPacket;
use renvoi_server::prelude::{Message, Transport};
use std::sync::atomic::Ordering;
use std::sync::Arc;

pub(crate) struct DnsHandler {
    hosts: Arc<dyn HostsService + Send + Sync>,
    cache: Arc<dyn CacheService + Send + Sync>,
    lookup: Arc<dyn LookupService + Send + Sync>,
    singleflight: Singleflight,
    routing: RoutingTable,
    expander: Expander,
    metrics: Arc<Metrics>,
}

impl DnsHandler {
    pub fn new(
        hosts: Arc<dyn HostsService + Send + Sync>,
        cache: Arc<dyn CacheService + Send + Sync>,
        lookup: Arc<dyn LookupService + Send + Sync>,
        routing: RoutingTable,
        expander: Expander,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            hosts,
            cache,
            lookup,
            singleflight: Singleflight::new(Arc::clone(&metrics)),
            routing,
            expander,
            metrics,
        }
    }
}

impl DnsHandler {
    async fn try_handle(&self, request: &DnsPacket) -> DnsPacket {
        if request.header.opcode != 0 || request.questions.len() != 1 {
            return DnsPacket::response_from(request)
                .with_response_code(ResponseCode::NotImplemented);
        }
        let question = request.questions[0].clone();
        let qname = name::canonical(&question.name);

        // the hosts database answers for the exact question name, directly
        // or through one alias hop
        if let Some(response) = self.local_answer(request, &qname).await {
            return response;
        }
        let rewritten = self.routing.rewrite(&qname);
        if let Some(target) = rewritten.as_deref() {
            if let Some(response) = self.local_answer(request, target).await {
                return response;
            }
        }

        // recursion disabled: nothing beyond the hosts database is served
        if self.routing.no_recursion() {
            return DnsPacket::response_from(request).with_response_code(ResponseCode::Refused);
        }

        // too few labels to leave this server, unless an alias or a stub
        // zone claims the name
        if self.expander.below_forward_threshold(&qname)
            && rewritten.is_none()
            && self.routing.stub_match(&qname).is_none()
        {
            return DnsPacket::response_from(request).with_response_code(ResponseCode::NameError);
        }

        self.forward(request, &question).await
    }

    /// Answer from the hosts database. When `lookup_name` differs from the
    /// question name because an alias was followed, the answer records are
    /// renamed onto the name the client asked about.
    async fn local_answer(&self, request: &DnsPacket, lookup_name: &str) -> Option<DnsPacket> {
        let question = request.questions.first()?;
        let records = self.hosts.lookup(lookup_name, question.qtype).await?;
        self.metrics.hosts_hits.fetch_add(1, Ordering::Relaxed);
        let domain = question.name.clone();
        let records = records
            .into_iter()
            .map(|record| match record {
                Record::A { addr, ttl, .. } => Record::A {
                    domain: domain.clone(),
                    addr,
                    ttl,
                },
                Record::AAAA { addr, ttl, .. } => Record::AAAA {
                    domain: domain.clone(),
                    addr,
                    ttl,
                },
                other => other,
            })
            .collect();
        let mut response = DnsPacket::response_from(request);
        response.header.recursion_available = !self.routing.no_recursion();
        Some(response.with_answers(records))
    }

    /// Walks the expansion candidates through cache and upstreams. The
    /// first positive answer wins; a negative answer is remembered and
    /// beats the server failures; an empty answer only counts when the
    /// as-is candidate produced it.
    async fn forward(&self, request: &DnsPacket, question: &Question) -> DnsPacket {
        let recursion = request.header.recursion_desired;
        let dnssec_ok = request.uses_edns().then(|| request.dnssec_ok());
        let candidates = self.expander.candidates(&question.name);
        let last = candidates.len() - 1;
        let mut nxdomain: Option<DnsPacket> = None;
        let mut empty: Option<DnsPacket> = None;
        for (index, candidate) in candidates.into_iter().enumerate() {
            let canonical = name::canonical(&candidate);
            let (target, aliased) = match self.routing.rewrite(&canonical) {
                Some(target) => (target, true),
                None => (canonical, false),
            };
            if aliased {
                if let Some(response) = self.local_answer(request, &target).await {
                    return response;
                }
            }
            match self.resolve(question, recursion, dnssec_ok, &target).await {
                Ok(found) => match found.header.response_code {
                    ResponseCode::NoError if !found.answers.is_empty() => {
                        return self.reply(request, found);
                    }
                    ResponseCode::NoError => {
                        if index == last {
                            empty = Some(found);
                        }
                    }
                    ResponseCode::NameError => nxdomain = Some(found),
                    code => tracing::debug!("dropping {code:?} answer for {target:?}"),
                },
                Err(error) => tracing::debug!("candidate {target:?} failed: {error}"),
            }
        }
        if let Some(found) = nxdomain {
            return self.reply(request, found);
        }
        if let Some(found) = empty {
            return self.reply(request, found);
        }
        DnsPacket::response_from(request).with_response_code(ResponseCode::ServerFailure)
    }

    /// Cache lookup, then a single-flight guarded upstream fetch that
    /// persists what it brought back.
    async fn resolve(
        &self,
        question: &Question,
        recursion: bool,
        dnssec_ok: Option<bool>,
        target: &str,
    ) -> Result<DnsPacket, LookupError> {
        let fingerprint = Fingerprint::new(target, question, dnssec_ok.unwrap_or(false));
        if let Some(found) = self.cache.request(&fingerprint).await {
            self.metrics.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(found);
        }
        let upstream_question = Question {
            name: name::wire(target),
            qtype: question.qtype,
            qclass: question.qclass,
        };
        let endpoints = self.routing.endpoints(target).to_vec();
        let lookup = Arc::clone(&self.lookup);
        let cache = Arc::clone(&self.cache);
        let key = fingerprint.clone();
        self.singleflight
            .run(fingerprint, async move {
                let response = lookup
                    .lookup(&upstream_question, recursion, dnssec_ok, &endpoints)
                    .await?;
                cache.persist(&key, &response).await;
                Ok(response)
            })
            .await
    }

    /// The response as the client must see it: its transaction identifier,
    /// its question section and the recursion bits restored, whatever name
    /// substitutions happened on the way.
    fn reply(&self, request: &DnsPacket, mut packet: DnsPacket) -> DnsPacket {
        packet.header.id = request.header.id;
        packet.header.response = true;
        packet.header.recursion_desired = request.header.recursion_desired;
        packet.header.recursion_available = true;
        packet.questions = request.questions.clone();
        packet
    }

    fn encode(
        &self,
        mut response: DnsPacket,
        message: &Message,
        limit: usize,
    ) -> Result<Message, HandleError> {
        let mut buffer = response.create_buffer()?;
        if buffer.pos > limit {
            tracing::debug!(
                "response of {} bytes exceeds the client limit of {limit}",
                buffer.pos
            );
            buffer = response.truncated().create_buffer()?;
        }
        Ok(Message {
            address: message.address,
            transport: message.transport,
            buffer: buffer.bytes().to_vec(),
        })
    }
}

#[async_trait::async_trait]
impl renvoi_server::Handler for DnsHandler {
    #[tracing::instrument(skip_all, fields(origin = ?message.address, id = tracing::field::Empty))]
    async fn handle(&self, message: Message) -> Option<Message> {
        self.metrics.queries.fetch_add(1, Ordering::Relaxed);
        // An unreadable header leaves nothing to answer with, the message
        // is dropped. A readable header over a broken body earns a FORMERR
        // carrying the client's identifier.
        if message.buffer.len() < 12 {
            tracing::debug!("dropping {} byte message", message.buffer.len());
            return None;
        }
        let mut buffer = match BytePacketBuffer::from_bytes(&message.buffer) {
            Ok(buffer) => buffer,
            Err(error) => {
                tracing::debug!("unable to buffer message: {error}");
                return None;
            }
        };
        let header = match Header::read(&mut buffer) {
            Ok(header) => header,
            Err(error) => {
                tracing::debug!("unable to read header: {error}");
                return None;
            }
        };
        tracing::Span::current().record("id", header.id);

        let (response, limit) = match DnsPacket::read_body(header.clone(), &mut buffer) {
            Ok(request) => {
                let limit = match message.transport {
                    Transport::Udp => request.max_udp_payload(),
                    Transport::Tcp => MAX_MESSAGE_SIZE,
                };
                (self.try_handle(&request).await, limit)
            }
            Err(error) => {
                tracing::debug!("unable to read message: {error}");
                let response = DnsPacket::new(
                    Header::response_from(&header).with_response_code(ResponseCode::FormatError),
                );
                let limit = match message.transport {
                    Transport::Udp => DEFAULT_UDP_PAYLOAD,
                    Transport::Tcp => MAX_MESSAGE_SIZE,
                };
                (response, limit)
            }
        };

        match response.header.response_code {
            ResponseCode::NameError => {
                self.metrics.nxdomain.fetch_add(1, Ordering::Relaxed);
            }
            ResponseCode::ServerFailure => {
                self.metrics.servfail.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }

        match self.encode(response, &message, limit) {
            Ok(found) => Some(found),
            Err(error) => {
                tracing::warn!("unable to encode response: {error}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DnsHandler;
    use crate::metrics::Metrics;
    use crate::repository::hosts::MockHostsService;
    use crate::repository::resolver::MockLookupService;
    use renvoi_proto::buffer::BytePacketBuffer;
    use renvoi_proto::packet::header::{Header, ResponseCode};
    use renvoi_proto::packet::question::Question;
    use renvoi_proto::packet::record::Record;
    use renvoi_proto::packet::{DnsPacket, QueryType};
    use renvoi_server::prelude::{Message, Transport};
    use renvoi_server::Handler;
    use similar_asserts::assert_eq;
    use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
    use std::sync::Arc;

    fn socket_address() -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(127, 1, 0, 1), 42))
    }

    fn default_upstream() -> SocketAddr {
        "198.51.100.1:53".parse().unwrap()
    }

    async fn handler(
        hosts: MockHostsService,
        lookup: Arc<MockLookupService>,
        routing: crate::routing::Config,
        search: crate::search::Config,
        no_rec: bool,
    ) -> (DnsHandler, Arc<Metrics>) {
        let metrics = Arc::new(Metrics::default());
        let cache = crate::repository::cache::Config::default()
            .build(Arc::clone(&metrics))
            .await
            .unwrap();
        let table = routing.build(vec![default_upstream()], no_rec).unwrap();
        let expander = search.build().unwrap();
        let handler = DnsHandler::new(
            Arc::new(hosts),
            Arc::new(cache),
            lookup,
            table,
            expander,
            Arc::clone(&metrics),
        );
        (handler, metrics)
    }

    fn message(packet: &DnsPacket) -> Message {
        let mut packet = packet.clone();
        let buffer = packet.create_buffer().unwrap();
        Message {
            address: socket_address(),
            transport: Transport::Udp,
            buffer: buffer.bytes().to_vec(),
        }
    }

    fn decode(message: &Message) -> DnsPacket {
        let buffer = BytePacketBuffer::from_bytes(&message.buffer).unwrap();
        DnsPacket::try_from(buffer).unwrap()
    }

    fn query(id: u16, qname: &str, qtype: QueryType) -> DnsPacket {
        let mut packet =
            DnsPacket::new(Header::question(id)).with_question(Question::new(qname.into(), qtype));
        packet.header.recursion_desired = true;
        packet
    }

    fn upstream_answer(qname: &str, addr: Ipv4Addr) -> DnsPacket {
        DnsPacket::new(Header::response(10))
            .with_question(Question::new(qname.into(), QueryType::A))
            .with_answer(Record::A {
                domain: qname.into(),
                addr,
                ttl: 100,
            })
    }

    fn upstream_nxdomain(qname: &str) -> DnsPacket {
        DnsPacket::new(Header::response(10).with_response_code(ResponseCode::NameError))
            .with_question(Question::new(qname.into(), QueryType::A))
    }

    #[tokio::test]
    async fn should_answer_from_hosts() {
        crate::init_logs();

        let hosts = MockHostsService::default().with_records(
            "foo.local",
            QueryType::A,
            vec![Record::A {
                domain: "foo.local".into(),
                addr: Ipv4Addr::new(10, 0, 0, 5),
                ttl: 60,
            }],
        );
        let lookup = Arc::new(MockLookupService::default());
        let (handler, metrics) = handler(
            hosts,
            Arc::clone(&lookup),
            Default::default(),
            Default::default(),
            false,
        )
        .await;

        let result = handler
            .handle(message(&query(1, "foo.local", QueryType::A)))
            .await
            .expect("should have a message");
        let result = decode(&result);

        assert_eq!(result.header.id, 1);
        assert!(result.header.response);
        assert!(result.header.recursion_available);
        assert!(!result.header.authoritative_answer);
        assert_eq!(result.header.response_code, ResponseCode::NoError);
        assert_eq!(
            result.answers,
            vec![Record::A {
                domain: "foo.local".into(),
                addr: Ipv4Addr::new(10, 0, 0, 5),
                ttl: 60,
            }]
        );
        assert!(lookup.calls().is_empty());
        assert_eq!(metrics.snapshot().hosts_hits, 1);
        assert_eq!(metrics.snapshot().upstream_attempts, 0);
    }

    #[tokio::test]
    async fn should_answer_empty_for_hosts_name_without_type() {
        crate::init_logs();

        let hosts = MockHostsService::default().with_records("foo.local", QueryType::AAAA, vec![]);
        let lookup = Arc::new(MockLookupService::default());
        let (handler, _) = handler(
            hosts,
            Arc::clone(&lookup),
            Default::default(),
            Default::default(),
            false,
        )
        .await;

        let result = handler
            .handle(message(&query(1, "foo.local", QueryType::AAAA)))
            .await
            .expect("should have a message");
        let result = decode(&result);

        assert_eq!(result.header.response_code, ResponseCode::NoError);
        assert!(result.answers.is_empty());
        assert!(lookup.calls().is_empty());
    }

    #[tokio::test]
    async fn should_resolve_and_cache_forwarded_queries() {
        crate::init_logs();

        let lookup = Arc::new(MockLookupService::default().with_query(
            "example.com",
            QueryType::A,
            upstream_answer("example.com", Ipv4Addr::new(93, 184, 216, 34)),
        ));
        let (handler, metrics) = handler(
            MockHostsService::default(),
            Arc::clone(&lookup),
            Default::default(),
            Default::default(),
            false,
        )
        .await;

        let first = handler
            .handle(message(&query(1, "example.com", QueryType::A)))
            .await
            .expect("should have a message");
        let first = decode(&first);
        let second = handler
            .handle(message(&query(2, "example.com", QueryType::A)))
            .await
            .expect("should have a message");
        let second = decode(&second);

        assert_eq!(first.header.id, 1);
        assert_eq!(second.header.id, 2);
        assert_eq!(first.answers, second.answers);
        assert_eq!(lookup.calls().len(), 1);
        assert_eq!(metrics.snapshot().cache_hits, 1);
    }

    #[tokio::test]
    async fn should_not_implement_multi_question_messages() {
        crate::init_logs();

        let lookup = Arc::new(MockLookupService::default());
        let (handler, _) = handler(
            MockHostsService::default(),
            Arc::clone(&lookup),
            Default::default(),
            Default::default(),
            false,
        )
        .await;

        let packet = query(7, "example.com", QueryType::A)
            .with_question(Question::new("other.com".into(), QueryType::A));
        let result = handler.handle(message(&packet)).await.unwrap();
        let result = decode(&result);
        assert_eq!(result.header.response_code, ResponseCode::NotImplemented);

        let mut packet = query(8, "example.com", QueryType::A);
        packet.header.opcode = 2;
        let result = handler.handle(message(&packet)).await.unwrap();
        let result = decode(&result);
        assert_eq!(result.header.response_code, ResponseCode::NotImplemented);
        assert!(lookup.calls().is_empty());
    }

    #[tokio::test]
    async fn should_refuse_forwarding_when_recursion_is_disabled() {
        crate::init_logs();

        let hosts = MockHostsService::default().with_records(
            "foo.local",
            QueryType::A,
            vec![Record::A {
                domain: "foo.local".into(),
                addr: Ipv4Addr::new(10, 0, 0, 5),
                ttl: 60,
            }],
        );
        let lookup = Arc::new(MockLookupService::default());
        let (handler, _) = handler(
            hosts,
            Arc::clone(&lookup),
            Default::default(),
            Default::default(),
            true,
        )
        .await;

        let result = handler
            .handle(message(&query(1, "example.com", QueryType::A)))
            .await
            .unwrap();
        let result = decode(&result);
        assert_eq!(result.header.response_code, ResponseCode::Refused);
        assert!(lookup.calls().is_empty());

        // the hosts database still answers, without advertising recursion
        let result = handler
            .handle(message(&query(2, "foo.local", QueryType::A)))
            .await
            .unwrap();
        let result = decode(&result);
        assert_eq!(result.header.response_code, ResponseCode::NoError);
        assert!(!result.header.recursion_available);
        assert_eq!(result.answers.len(), 1);
    }

    #[tokio::test]
    async fn should_reply_formerr_on_unreadable_body() {
        crate::init_logs();

        let lookup = Arc::new(MockLookupService::default());
        let (handler, _) = handler(
            MockHostsService::default(),
            Arc::clone(&lookup),
            Default::default(),
            Default::default(),
            false,
        )
        .await;

        // a header advertising one question followed by nothing readable
        let mut header = Header::question(77);
        header.questions = 1;
        let mut buffer = BytePacketBuffer::default();
        header.write(&mut buffer).unwrap();
        let result = handler
            .handle(Message {
                address: socket_address(),
                transport: Transport::Udp,
                buffer: buffer.bytes().to_vec(),
            })
            .await
            .expect("should have a message");
        let result = decode(&result);
        assert_eq!(result.header.id, 77);
        assert_eq!(result.header.response_code, ResponseCode::FormatError);
    }

    #[tokio::test]
    async fn should_drop_messages_without_a_header() {
        crate::init_logs();

        let lookup = Arc::new(MockLookupService::default());
        let (handler, _) = handler(
            MockHostsService::default(),
            Arc::clone(&lookup),
            Default::default(),
            Default::default(),
            false,
        )
        .await;

        let result = handler
            .handle(Message {
                address: socket_address(),
                transport: Transport::Udp,
                buffer: vec![0, 1, 2, 3],
            })
            .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn should_gate_short_names_from_forwarding() {
        crate::init_logs();

        let lookup = Arc::new(MockLookupService::default());
        let search = crate::search::Config {
            fwd_ndots: 2,
            ..Default::default()
        };
        let (handler, metrics) = handler(
            MockHostsService::default(),
            Arc::clone(&lookup),
            Default::default(),
            search,
            false,
        )
        .await;

        let result = handler
            .handle(message(&query(1, "foo", QueryType::A)))
            .await
            .unwrap();
        let result = decode(&result);
        assert_eq!(result.header.response_code, ResponseCode::NameError);
        assert!(lookup.calls().is_empty());
        assert_eq!(metrics.snapshot().nxdomain, 1);
    }

    #[tokio::test]
    async fn should_walk_search_domains_and_restore_the_question() {
        crate::init_logs();

        let lookup = Arc::new(
            MockLookupService::default()
                .with_query("db.svc.local", QueryType::A, upstream_nxdomain("db.svc.local"))
                .with_query(
                    "db.local",
                    QueryType::A,
                    upstream_answer("db.local", Ipv4Addr::new(10, 1, 2, 3)),
                ),
        );
        let search = crate::search::Config {
            domains: vec!["svc.local.".to_string(), "local.".to_string()],
            append: true,
            ndots: 2,
            fwd_ndots: 0,
        };
        let (handler, _) = handler(
            MockHostsService::default(),
            Arc::clone(&lookup),
            Default::default(),
            search,
            false,
        )
        .await;

        let result = handler
            .handle(message(&query(5, "db", QueryType::A)))
            .await
            .expect("should have a message");
        let result = decode(&result);

        assert_eq!(result.header.id, 5);
        assert_eq!(result.header.response_code, ResponseCode::NoError);
        assert_eq!(result.questions[0].name, "db");
        assert_eq!(
            result.answers,
            vec![Record::A {
                domain: "db.local".into(),
                addr: Ipv4Addr::new(10, 1, 2, 3),
                ttl: 100,
            }]
        );
        let walked: Vec<_> = lookup.calls().into_iter().map(|(name, _)| name).collect();
        assert_eq!(walked, vec!["db.svc.local", "db.local"]);
    }

    #[tokio::test]
    async fn should_prefer_nxdomain_over_servfail_after_a_failed_walk() {
        crate::init_logs();

        let lookup = Arc::new(MockLookupService::default().with_query(
            "db.local",
            QueryType::A,
            upstream_nxdomain("db.local"),
        ));
        let search = crate::search::Config {
            domains: vec!["local.".to_string()],
            append: true,
            ndots: 2,
            fwd_ndots: 0,
        };
        let (handler, metrics) = handler(
            MockHostsService::default(),
            Arc::clone(&lookup),
            Default::default(),
            search,
            false,
        )
        .await;

        let result = handler
            .handle(message(&query(6, "db", QueryType::A)))
            .await
            .unwrap();
        let result = decode(&result);
        assert_eq!(result.header.response_code, ResponseCode::NameError);
        assert_eq!(result.questions[0].name, "db");
        assert_eq!(metrics.snapshot().nxdomain, 1);
        // the bare name was still attempted after the search domain
        let walked: Vec<_> = lookup.calls().into_iter().map(|(name, _)| name).collect();
        assert_eq!(walked, vec!["db.local", "db"]);
    }

    #[tokio::test]
    async fn should_servfail_without_caching_when_upstreams_are_down() {
        crate::init_logs();

        let lookup = Arc::new(MockLookupService::default());
        let (handler, metrics) = handler(
            MockHostsService::default(),
            Arc::clone(&lookup),
            Default::default(),
            Default::default(),
            false,
        )
        .await;

        for id in [1, 2] {
            let result = handler
                .handle(message(&query(id, "example.com", QueryType::A)))
                .await
                .unwrap();
            let result = decode(&result);
            assert_eq!(result.header.id, id);
            assert_eq!(result.header.response_code, ResponseCode::ServerFailure);
        }
        // the failure was not cached, the second query retried upstream
        assert_eq!(lookup.calls().len(), 2);
        assert_eq!(metrics.snapshot().servfail, 2);
    }

    #[tokio::test]
    async fn should_follow_alias_before_forwarding() {
        crate::init_logs();

        let lookup = Arc::new(MockLookupService::default().with_query(
            "host.corp.example",
            QueryType::A,
            upstream_answer("host.corp.example", Ipv4Addr::new(10, 9, 9, 9)),
        ));
        let routing = crate::routing::Config {
            aliases: vec!["corp.local/corp.example".to_string()],
            ..Default::default()
        };
        let (handler, _) = handler(
            MockHostsService::default(),
            Arc::clone(&lookup),
            routing,
            Default::default(),
            false,
        )
        .await;

        let result = handler
            .handle(message(&query(3, "host.corp.local", QueryType::A)))
            .await
            .expect("should have a message");
        let result = decode(&result);

        assert_eq!(result.questions[0].name, "host.corp.local");
        assert_eq!(result.header.response_code, ResponseCode::NoError);
        let walked: Vec<_> = lookup.calls().into_iter().map(|(name, _)| name).collect();
        assert_eq!(walked, vec!["host.corp.example"]);
    }

    #[tokio::test]
    async fn should_answer_aliased_hosts_names_locally() {
        crate::init_logs();

        let hosts = MockHostsService::default().with_records(
            "foo.local",
            QueryType::A,
            vec![Record::A {
                domain: "foo.local".into(),
                addr: Ipv4Addr::new(10, 0, 0, 5),
                ttl: 60,
            }],
        );
        let lookup = Arc::new(MockLookupService::default());
        let routing = crate::routing::Config {
            aliases: vec!["foo.alias/foo.local".to_string()],
            ..Default::default()
        };
        let (handler, _) = handler(hosts, Arc::clone(&lookup), routing, Default::default(), false)
            .await;

        let result = handler
            .handle(message(&query(4, "foo.alias", QueryType::A)))
            .await
            .unwrap();
        let result = decode(&result);
        assert_eq!(
            result.answers,
            vec![Record::A {
                domain: "foo.alias".into(),
                addr: Ipv4Addr::new(10, 0, 0, 5),
                ttl: 60,
            }]
        );
        assert!(lookup.calls().is_empty());
    }

    #[tokio::test]
    async fn should_route_stub_zones_to_their_endpoints() {
        crate::init_logs();

        let stub: SocketAddr = "10.0.0.2:53".parse().unwrap();
        let lookup = Arc::new(MockLookupService::default().with_query(
            "host.corp.example",
            QueryType::A,
            upstream_answer("host.corp.example", Ipv4Addr::new(10, 9, 9, 9)),
        ));
        let routing = crate::routing::Config {
            stubzones: vec!["corp.example/10.0.0.2".to_string()],
            ..Default::default()
        };
        let (handler, _) = handler(
            MockHostsService::default(),
            Arc::clone(&lookup),
            routing,
            Default::default(),
            false,
        )
        .await;

        let result = handler
            .handle(message(&query(9, "host.corp.example", QueryType::A)))
            .await
            .unwrap();
        let result = decode(&result);
        assert_eq!(result.header.response_code, ResponseCode::NoError);
        assert_eq!(lookup.calls(), vec![("host.corp.example".to_string(), vec![stub])]);
    }

    #[tokio::test]
    async fn should_truncate_oversized_udp_responses() {
        crate::init_logs();

        let records: Vec<_> = (0..60)
            .map(|index| Record::A {
                domain: "big.local".into(),
                addr: Ipv4Addr::new(10, 0, (index / 250) as u8, (index % 250) as u8),
                ttl: 60,
            })
            .collect();
        let hosts = MockHostsService::default().with_records("big.local", QueryType::A, records);
        let lookup = Arc::new(MockLookupService::default());
        let (handler, _) = handler(
            hosts,
            Arc::clone(&lookup),
            Default::default(),
            Default::default(),
            false,
        )
        .await;

        let result = handler
            .handle(message(&query(1, "big.local", QueryType::A)))
            .await
            .expect("should have a message");
        assert!(result.buffer.len() <= 512);
        let result = decode(&result);
        assert!(result.header.truncated_message);
        assert!(result.answers.is_empty());

        // the same query over tcp comes back whole
        let mut over_tcp = message(&query(2, "big.local", QueryType::A));
        over_tcp.transport = Transport::Tcp;
        let result = handler.handle(over_tcp).await.expect("should have a message");
        let result = decode(&result);
        assert!(!result.header.truncated_message);
        assert_eq!(result.answers.len(), 60);
    }
}
