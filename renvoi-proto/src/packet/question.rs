use super::QueryType;
use crate::buffer::reader::ReaderError;
use crate::buffer::writer::WriterError;
use crate::buffer::BytePacketBuffer;

/// CLASS fields appear in resource records.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
#[repr(u8)]
pub enum DnsClass {
    /// IN - the Internet
    Internet = 1,
    /// CS - the CSNET class (Obsolete - used only for examples in some obsolete RFCs)
    Csnet = 2,
    /// CH - the CHAOS class
    Chaos = 3,
    /// HS - Hesiod [Dyer 87]
    Hesiod = 4,
}

impl Default for DnsClass {
    fn default() -> Self {
        Self::Internet
    }
}

impl TryFrom<u16> for DnsClass {
    type Error = ReaderError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Internet),
            2 => Ok(Self::Csnet),
            3 => Ok(Self::Chaos),
            4 => Ok(Self::Hesiod),
            other => Err(ReaderError::InvalidClass(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    /// QNAME, the domain name the query is about, stored lower cased and
    /// without the trailing dot.
    pub name: String,
    /// QTYPE, the type of the query.
    pub qtype: QueryType,
    /// QCLASS, the class of the query, IN for the Internet.
    pub qclass: DnsClass,
}

impl Default for Question {
    fn default() -> Self {
        Self {
            name: String::default(),
            qtype: QueryType::Unknown(0),
            qclass: DnsClass::Internet,
        }
    }
}

impl Question {
    pub fn new(name: String, qtype: QueryType) -> Self {
        Self {
            name,
            qtype,
            qclass: Default::default(),
        }
    }

    pub fn read(buffer: &mut BytePacketBuffer) -> Result<Self, ReaderError> {
        let name = buffer.read_qname()?;
        let qtype = QueryType::from_num(buffer.read_u16()?);
        let qclass = DnsClass::try_from(buffer.read_u16()?)?;

        Ok(Self {
            name,
            qtype,
            qclass,
        })
    }

    pub fn write(&self, buffer: &mut BytePacketBuffer) -> Result<(), WriterError> {
        buffer.write_qname(&self.name)?;

        let typenum = self.qtype.into_num();
        buffer.write_u16(typenum)?;
        buffer.write_u16(self.qclass as u16)?;

        Ok(())
    }
}
