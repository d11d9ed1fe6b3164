pub mod header;
pub mod question;
pub mod record;

use crate::buffer::{BytePacketBuffer, ReaderError, WriterError, DEFAULT_UDP_PAYLOAD, MAX_MESSAGE_SIZE};

#[derive(PartialEq, Eq, Debug, Clone, Hash, Copy)]
#[allow(clippy::upper_case_acronyms)]
pub enum QueryType {
    Unknown(u16),
    /// a host address
    A, // 1
    /// an authoritative name server
    NS, // 2
    /// the canonical name for an alias
    CNAME, // 5
    /// start of a zone of authority
    SOA, // 6
    /// a domain name pointer
    PTR, // 12
    /// mail exchange
    MX, // 15
    AAAA, // 28
    /// EDNS(0) pseudo record type
    OPT, // 41
}

impl QueryType {
    pub fn into_num(self) -> u16 {
        match self {
            QueryType::Unknown(x) => x,
            QueryType::A => 1,
            QueryType::NS => 2,
            QueryType::CNAME => 5,
            QueryType::SOA => 6,
            QueryType::PTR => 12,
            QueryType::MX => 15,
            QueryType::AAAA => 28,
            QueryType::OPT => 41,
        }
    }

    pub fn from_num(num: u16) -> QueryType {
        match num {
            1 => QueryType::A,
            2 => QueryType::NS,
            5 => QueryType::CNAME,
            6 => QueryType::SOA,
            12 => QueryType::PTR,
            15 => QueryType::MX,
            28 => QueryType::AAAA,
            41 => QueryType::OPT,
            _ => QueryType::Unknown(num),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DnsPacket {
    pub header: header::Header,
    pub questions: Vec<question::Question>,
    pub answers: Vec<record::Record>,
    pub authorities: Vec<record::Record>,
    pub resources: Vec<record::Record>,
}

impl DnsPacket {
    pub fn new(header: header::Header) -> Self {
        Self {
            header,
            ..Default::default()
        }
    }

    /// Skeleton of a reply to `request`: same identifier, opcode, RD bit and
    /// question section, everything else empty.
    pub fn response_from(request: &Self) -> Self {
        Self {
            header: header::Header::response_from(&request.header),
            questions: request.questions.clone(),
            ..Default::default()
        }
    }

    pub fn with_question(mut self, question: question::Question) -> Self {
        self.questions.push(question);
        self
    }

    pub fn with_answer(mut self, record: record::Record) -> Self {
        self.answers.push(record);
        self
    }

    pub fn with_answers(mut self, records: Vec<record::Record>) -> Self {
        self.answers.extend(records);
        self
    }

    pub fn with_authority(mut self, record: record::Record) -> Self {
        self.authorities.push(record);
        self
    }

    pub fn with_resource(mut self, record: record::Record) -> Self {
        self.resources.push(record);
        self
    }

    pub fn with_response_code(mut self, value: header::ResponseCode) -> Self {
        self.header.response_code = value;
        self
    }

    /// Copy reduced to the question section with TC set, for clients whose
    /// payload limit the full answer exceeds.
    pub fn truncated(&self) -> Self {
        let mut header = self.header.clone();
        header.truncated_message = true;
        Self {
            header,
            questions: self.questions.clone(),
            ..Default::default()
        }
    }

    fn edns(&self) -> Option<&record::Record> {
        self.resources
            .iter()
            .find(|record| matches!(record, record::Record::OPT { .. }))
    }

    /// Whether the sender attached an OPT pseudo record.
    pub fn uses_edns(&self) -> bool {
        self.edns().is_some()
    }

    /// DO flag of the sender's OPT record, false without EDNS.
    pub fn dnssec_ok(&self) -> bool {
        self.edns().map(record::Record::dnssec_ok).unwrap_or(false)
    }

    /// Largest UDP datagram the sender is ready to receive, 512 bytes
    /// without EDNS, capped by what this server can build.
    pub fn max_udp_payload(&self) -> usize {
        self.edns()
            .map(|record| match record {
                record::Record::OPT { udp_payload, .. } => {
                    (*udp_payload as usize).clamp(DEFAULT_UDP_PAYLOAD, MAX_MESSAGE_SIZE)
                }
                _ => DEFAULT_UDP_PAYLOAD,
            })
            .unwrap_or(DEFAULT_UDP_PAYLOAD)
    }
}

impl DnsPacket {
    /// Reads the sections that follow an already decoded header.
    pub fn read_body(
        header: header::Header,
        buffer: &mut BytePacketBuffer,
    ) -> Result<Self, ReaderError> {
        let mut questions = Vec::with_capacity(header.questions as usize);
        for _ in 0..header.questions {
            questions.push(question::Question::read(buffer)?);
        }

        let mut answers = Vec::with_capacity(header.answers as usize);
        for _ in 0..header.answers {
            answers.push(record::Record::read(buffer)?);
        }

        let mut authorities = Vec::with_capacity(header.authoritative_entries as usize);
        for _ in 0..header.authoritative_entries {
            authorities.push(record::Record::read(buffer)?);
        }

        let mut resources = Vec::with_capacity(header.resource_entries as usize);
        for _ in 0..header.resource_entries {
            resources.push(record::Record::read(buffer)?);
        }

        Ok(DnsPacket {
            header,
            questions,
            answers,
            authorities,
            resources,
        })
    }

    pub fn create_buffer(&mut self) -> Result<BytePacketBuffer, WriterError> {
        let mut buffer = BytePacketBuffer::default();
        self.header.questions = self.questions.len() as u16;
        self.header.answers = self.answers.len() as u16;
        self.header.authoritative_entries = self.authorities.len() as u16;
        self.header.resource_entries = self.resources.len() as u16;

        self.header.write(&mut buffer)?;

        for question in &self.questions {
            question.write(&mut buffer)?;
        }
        for rec in &self.answers {
            rec.write(&mut buffer)?;
        }
        for rec in &self.authorities {
            rec.write(&mut buffer)?;
        }
        for rec in &self.resources {
            rec.write(&mut buffer)?;
        }

        Ok(buffer)
    }
}

impl TryFrom<BytePacketBuffer> for DnsPacket {
    type Error = ReaderError;

    fn try_from(mut buffer: BytePacketBuffer) -> Result<Self, Self::Error> {
        let header = header::Header::read(&mut buffer)?;
        Self::read_body(header, &mut buffer)
    }
}
