use crate::buffer::reader::ReaderError;
use crate::buffer::writer::WriterError;
use crate::buffer::BytePacketBuffer;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResponseCode {
    /// No error condition
    NoError = 0,
    /// The name server was unable to interpret the query.
    FormatError = 1,
    /// The name server was unable to process this query due to a problem
    /// with the name server.
    ServerFailure = 2,
    /// The domain name referenced in the query does not exist.
    /// Widely known as NXDOMAIN.
    NameError = 3,
    /// The name server does not support the requested kind of query.
    NotImplemented = 4,
    /// The name server refuses to perform the specified operation for
    /// policy reasons.
    Refused = 5,
}

impl TryFrom<u8> for ResponseCode {
    type Error = ReaderError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ResponseCode::NoError),
            1 => Ok(ResponseCode::FormatError),
            2 => Ok(ResponseCode::ServerFailure),
            3 => Ok(ResponseCode::NameError),
            4 => Ok(ResponseCode::NotImplemented),
            5 => Ok(ResponseCode::Refused),
            other => Err(ReaderError::InvalidResponseCode(other)),
        }
    }
}

/// The 12 byte message header: identifier, flag bits and section counts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    /// A 16 bit identifier assigned by the program that generates the query,
    /// copied into the corresponding reply.
    pub id: u16,

    /// RD, copied from a query into the response. If set, it directs the
    /// name server to pursue the query recursively.
    pub recursion_desired: bool,
    /// TC, the message was cut because it exceeded what the transmission
    /// channel permits.
    pub truncated_message: bool,
    /// AA, the responding name server is an authority for the domain name
    /// in the question section.
    pub authoritative_answer: bool,
    /// Kind of query: 0 a standard query, 1 an inverse query, 2 a server
    /// status request.
    pub opcode: u8,
    /// QR, whether this message is a query (0) or a response (1).
    pub response: bool,

    /// Set as part of responses.
    pub response_code: ResponseCode,
    pub checking_disabled: bool,
    pub authed_data: bool,
    /// Z, reserved, must be zero.
    pub z: bool,
    /// RA, whether recursive query support is available in the name server.
    pub recursion_available: bool,

    pub questions: u16,
    pub answers: u16,
    pub authoritative_entries: u16,
    pub resource_entries: u16,
}

impl Header {
    pub fn question(id: u16) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn response(id: u16) -> Self {
        Self {
            id,
            response: true,
            ..Default::default()
        }
    }

    /// Header for the reply to `request`, echoing the identifier, the
    /// opcode and the RD bit.
    pub fn response_from(request: &Self) -> Self {
        Self {
            id: request.id,
            recursion_desired: request.recursion_desired,
            opcode: request.opcode,
            response: true,
            ..Default::default()
        }
    }

    pub fn with_response_code(mut self, value: ResponseCode) -> Self {
        self.response_code = value;
        self
    }
}

impl Default for Header {
    fn default() -> Self {
        Self {
            id: 0,

            recursion_desired: false,
            truncated_message: false,
            authoritative_answer: false,
            opcode: 0,
            response: false,

            response_code: ResponseCode::NoError,
            checking_disabled: false,
            authed_data: false,
            z: false,
            recursion_available: false,

            questions: 0,
            answers: 0,
            authoritative_entries: 0,
            resource_entries: 0,
        }
    }
}

impl Header {
    /// Reads the first 12 bytes
    pub fn read(buffer: &mut BytePacketBuffer) -> Result<Self, ReaderError> {
        let id = buffer.read_u16()?;

        let head = buffer.read()?;
        let tail = buffer.read()?;

        Ok(Self {
            id,
            recursion_desired: (head & (1 << 0)) > 0,
            truncated_message: (head & (1 << 1)) > 0,
            authoritative_answer: (head & (1 << 2)) > 0,
            opcode: (head >> 3) & 0x0F,
            response: (head & (1 << 7)) > 0,
            response_code: ResponseCode::try_from(tail & 0x0F)?,
            checking_disabled: (tail & (1 << 4)) > 0,
            authed_data: (tail & (1 << 5)) > 0,
            z: (tail & (1 << 6)) > 0,
            recursion_available: (tail & (1 << 7)) > 0,
            questions: buffer.read_u16()?,
            answers: buffer.read_u16()?,
            authoritative_entries: buffer.read_u16()?,
            resource_entries: buffer.read_u16()?,
        })
    }

    pub fn write(&self, buffer: &mut BytePacketBuffer) -> Result<(), WriterError> {
        buffer.write_u16(self.id)?;

        buffer.write_u8(
            (self.recursion_desired as u8)
                | ((self.truncated_message as u8) << 1)
                | ((self.authoritative_answer as u8) << 2)
                | (self.opcode << 3)
                | ((self.response as u8) << 7),
        )?;

        buffer.write_u8(
            (self.response_code as u8)
                | ((self.checking_disabled as u8) << 4)
                | ((self.authed_data as u8) << 5)
                | ((self.z as u8) << 6)
                | ((self.recursion_available as u8) << 7),
        )?;

        buffer.write_u16(self.questions)?;
        buffer.write_u16(self.answers)?;
        buffer.write_u16(self.authoritative_entries)?;
        buffer.write_u16(self.resource_entries)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Header, ResponseCode};

    #[test]
    fn should_roundtrip_flags() {
        let header = Header {
            id: 4242,
            recursion_desired: true,
            truncated_message: true,
            authoritative_answer: false,
            opcode: 2,
            response: true,
            response_code: ResponseCode::NameError,
            checking_disabled: false,
            authed_data: true,
            z: false,
            recursion_available: true,
            questions: 1,
            answers: 3,
            authoritative_entries: 0,
            resource_entries: 1,
        };
        let mut buffer = crate::buffer::BytePacketBuffer::default();
        header.write(&mut buffer).unwrap();
        assert_eq!(buffer.pos, 12);
        buffer.pos = 0;
        let read = Header::read(&mut buffer).unwrap();
        assert_eq!(read, header);
    }

    #[test]
    fn should_echo_request_in_response_header() {
        let request = Header {
            id: 99,
            recursion_desired: true,
            ..Default::default()
        };
        let response = Header::response_from(&request);
        assert_eq!(response.id, 99);
        assert!(response.response);
        assert!(response.recursion_desired);
        assert!(!response.recursion_available);
        assert_eq!(response.response_code, ResponseCode::NoError);
    }
}
