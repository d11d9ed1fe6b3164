use super::QueryType;
use crate::buffer::reader::ReaderError;
use crate::buffer::writer::WriterError;
use crate::buffer::BytePacketBuffer;
use std::net::{Ipv4Addr, Ipv6Addr};

/// DO bit inside the OPT extension field.
const EDNS_DNSSEC_OK: u32 = 0x8000;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[allow(clippy::upper_case_acronyms)]
pub enum Record {
    /// Record type this server does not interpret, rdata kept verbatim.
    Unknown {
        domain: String,
        qtype: u16,
        data: Vec<u8>,
        ttl: u32,
    }, // 0
    A {
        domain: String,
        addr: Ipv4Addr,
        ttl: u32,
    }, // 1
    NS {
        domain: String,
        host: String,
        ttl: u32,
    }, // 2
    CNAME {
        domain: String,
        host: String,
        ttl: u32,
    }, // 5
    SOA {
        domain: String,
        mname: String,
        rname: String,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
        ttl: u32,
    }, // 6
    PTR {
        domain: String,
        host: String,
        ttl: u32,
    }, // 12
    MX {
        domain: String,
        priority: u16,
        host: String,
        ttl: u32,
    }, // 15
    AAAA {
        domain: String,
        addr: Ipv6Addr,
        ttl: u32,
    }, // 28
    /// EDNS(0) pseudo record. The class field carries the sender's UDP
    /// payload size and the ttl field carries the extension flags.
    OPT {
        udp_payload: u16,
        extension: u32,
        data: Vec<u8>,
    }, // 41
}

impl Record {
    pub fn ttl(&self) -> u32 {
        match self {
            Self::Unknown { ttl, .. } => *ttl,
            Self::A { ttl, .. } => *ttl,
            Self::NS { ttl, .. } => *ttl,
            Self::CNAME { ttl, .. } => *ttl,
            Self::SOA { ttl, .. } => *ttl,
            Self::PTR { ttl, .. } => *ttl,
            Self::MX { ttl, .. } => *ttl,
            Self::AAAA { ttl, .. } => *ttl,
            Self::OPT { .. } => 0,
        }
    }

    /// EDNS DO flag of an OPT record, false for every other type.
    pub fn dnssec_ok(&self) -> bool {
        match self {
            Self::OPT { extension, .. } => extension & EDNS_DNSSEC_OK > 0,
            _ => false,
        }
    }

    /// OPT record advertising `udp_payload` bytes, with or without the DO flag.
    pub fn edns(udp_payload: u16, dnssec_ok: bool) -> Self {
        Self::OPT {
            udp_payload,
            extension: if dnssec_ok { EDNS_DNSSEC_OK } else { 0 },
            data: Vec::new(),
        }
    }

    pub fn read(buffer: &mut BytePacketBuffer) -> Result<Record, ReaderError> {
        // NAME a domain name to which this resource record pertains.
        let domain = buffer.read_qname()?;

        // TYPE two octets containing one of the RR type codes.
        let qtype_num = buffer.read_u16()?;
        let qtype = QueryType::from_num(qtype_num);

        // CLASS of the data in the RDATA field. For an OPT pseudo record
        // this field is repurposed as the UDP payload size.
        let class = buffer.read_u16()?;

        // TTL, how long the record may be cached. Repurposed as the
        // extension flags for an OPT pseudo record.
        let ttl = buffer.read_u32()?;

        // RDLENGTH, the length in octets of the RDATA field.
        let data_len = buffer.read_u16()?;

        match qtype {
            QueryType::A => {
                let raw_addr = buffer.read_u32()?;
                let addr = Ipv4Addr::from(raw_addr);

                Ok(Record::A { domain, addr, ttl })
            }
            QueryType::AAAA => {
                let mut segments = [0u16; 8];
                for segment in segments.iter_mut() {
                    *segment = buffer.read_u16()?;
                }
                let addr = Ipv6Addr::from(segments);

                Ok(Record::AAAA { domain, addr, ttl })
            }
            QueryType::NS => {
                let host = buffer.read_qname()?;

                Ok(Record::NS { domain, host, ttl })
            }
            QueryType::CNAME => {
                let host = buffer.read_qname()?;

                Ok(Record::CNAME { domain, host, ttl })
            }
            QueryType::SOA => {
                let mname = buffer.read_qname()?;
                let rname = buffer.read_qname()?;

                Ok(Record::SOA {
                    domain,
                    mname,
                    rname,
                    serial: buffer.read_u32()?,
                    refresh: buffer.read_u32()?,
                    retry: buffer.read_u32()?,
                    expire: buffer.read_u32()?,
                    minimum: buffer.read_u32()?,
                    ttl,
                })
            }
            QueryType::PTR => {
                let host = buffer.read_qname()?;

                Ok(Record::PTR { domain, host, ttl })
            }
            QueryType::MX => {
                let priority = buffer.read_u16()?;
                let host = buffer.read_qname()?;

                Ok(Record::MX {
                    domain,
                    priority,
                    host,
                    ttl,
                })
            }
            QueryType::OPT => {
                let data = buffer.get_range(buffer.pos(), data_len as usize)?.to_vec();
                buffer.step(data_len as usize)?;

                Ok(Record::OPT {
                    udp_payload: class,
                    extension: ttl,
                    data,
                })
            }
            QueryType::Unknown(_) => {
                let data = buffer.get_range(buffer.pos(), data_len as usize)?.to_vec();
                buffer.step(data_len as usize)?;

                Ok(Record::Unknown {
                    domain,
                    qtype: qtype_num,
                    data,
                    ttl,
                })
            }
        }
    }

    pub fn write(&self, buffer: &mut BytePacketBuffer) -> Result<usize, WriterError> {
        let start_pos = buffer.pos();

        match *self {
            Record::A {
                ref domain,
                ref addr,
                ttl,
            } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(QueryType::A.into_num())?;
                buffer.write_u16(1)?;
                buffer.write_u32(ttl)?;
                buffer.write_u16(4)?;
                buffer.write_bytes(&addr.octets())?;
            }
            Record::NS {
                ref domain,
                ref host,
                ttl,
            } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(QueryType::NS.into_num())?;
                buffer.write_u16(1)?;
                buffer.write_u32(ttl)?;

                let pos = buffer.pos();
                buffer.write_u16(0)?;

                buffer.write_qname(host)?;

                let size = buffer.pos() - (pos + 2);
                buffer.set_u16(pos, size as u16)?;
            }
            Record::CNAME {
                ref domain,
                ref host,
                ttl,
            } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(QueryType::CNAME.into_num())?;
                buffer.write_u16(1)?;
                buffer.write_u32(ttl)?;

                let pos = buffer.pos();
                buffer.write_u16(0)?;

                buffer.write_qname(host)?;

                let size = buffer.pos() - (pos + 2);
                buffer.set_u16(pos, size as u16)?;
            }
            Record::SOA {
                ref domain,
                ref mname,
                ref rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
                ttl,
            } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(QueryType::SOA.into_num())?;
                buffer.write_u16(1)?;
                buffer.write_u32(ttl)?;

                let pos = buffer.pos();
                buffer.write_u16(0)?;

                buffer.write_qname(mname)?;
                buffer.write_qname(rname)?;
                buffer.write_u32(serial)?;
                buffer.write_u32(refresh)?;
                buffer.write_u32(retry)?;
                buffer.write_u32(expire)?;
                buffer.write_u32(minimum)?;

                let size = buffer.pos() - (pos + 2);
                buffer.set_u16(pos, size as u16)?;
            }
            Record::PTR {
                ref domain,
                ref host,
                ttl,
            } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(QueryType::PTR.into_num())?;
                buffer.write_u16(1)?;
                buffer.write_u32(ttl)?;

                let pos = buffer.pos();
                buffer.write_u16(0)?;

                buffer.write_qname(host)?;

                let size = buffer.pos() - (pos + 2);
                buffer.set_u16(pos, size as u16)?;
            }
            Record::MX {
                ref domain,
                priority,
                ref host,
                ttl,
            } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(QueryType::MX.into_num())?;
                buffer.write_u16(1)?;
                buffer.write_u32(ttl)?;

                let pos = buffer.pos();
                buffer.write_u16(0)?;

                buffer.write_u16(priority)?;
                buffer.write_qname(host)?;

                let size = buffer.pos() - (pos + 2);
                buffer.set_u16(pos, size as u16)?;
            }
            Record::AAAA {
                ref domain,
                ref addr,
                ttl,
            } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(QueryType::AAAA.into_num())?;
                buffer.write_u16(1)?;
                buffer.write_u32(ttl)?;
                buffer.write_u16(16)?;

                for segment in &addr.segments() {
                    buffer.write_u16(*segment)?;
                }
            }
            Record::OPT {
                udp_payload,
                extension,
                ref data,
            } => {
                buffer.write_u8(0)?;
                buffer.write_u16(QueryType::OPT.into_num())?;
                buffer.write_u16(udp_payload)?;
                buffer.write_u32(extension)?;
                buffer.write_u16(data.len() as u16)?;
                buffer.write_bytes(data)?;
            }
            Record::Unknown {
                ref domain,
                qtype,
                ref data,
                ttl,
            } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(qtype)?;
                buffer.write_u16(1)?;
                buffer.write_u32(ttl)?;
                buffer.write_u16(data.len() as u16)?;
                buffer.write_bytes(data)?;
            }
        }

        Ok(buffer.pos() - start_pos)
    }
}

#[cfg(test)]
mod tests {
    use super::Record;

    #[test]
    fn should_expose_edns_flags() {
        let with_do = Record::edns(4096, true);
        assert!(with_do.dnssec_ok());
        let without_do = Record::edns(4096, false);
        assert!(!without_do.dnssec_ok());
        let plain = Record::A {
            domain: "foo.bar".into(),
            addr: std::net::Ipv4Addr::new(1, 2, 3, 4),
            ttl: 60,
        };
        assert!(!plain.dnssec_ok());
    }
}
