pub mod reader;
pub mod writer;

pub use reader::ReaderError;
pub use writer::WriterError;

use std::collections::HashMap;

/// Size of the backing array, large enough for an EDNS(0) datagram and for
/// the responses this server relays over TCP.
pub const MAX_MESSAGE_SIZE: usize = 4096;

/// Payload limit assumed for clients that do not advertise one.
pub const DEFAULT_UDP_PAYLOAD: usize = 512;

#[derive(Clone, Debug)]
pub struct BytePacketBuffer {
    pub buf: [u8; MAX_MESSAGE_SIZE],
    pub pos: usize,
    /// Offsets of the labels already decoded, so that compression pointers
    /// resolve without re-walking the message.
    pub(crate) reading_labels: HashMap<usize, String>,
    /// Offsets of the labels already encoded, reused as compression targets.
    pub(crate) writing_labels: HashMap<String, usize>,
}

impl Default for BytePacketBuffer {
    fn default() -> Self {
        BytePacketBuffer {
            buf: [0; MAX_MESSAGE_SIZE],
            pos: 0,
            reading_labels: HashMap::new(),
            writing_labels: HashMap::new(),
        }
    }
}

impl BytePacketBuffer {
    /// Current position within buffer
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Buffer holding a copy of `input`, positioned at the start.
    pub fn from_bytes(input: &[u8]) -> Result<Self, ReaderError> {
        if input.len() > MAX_MESSAGE_SIZE {
            return Err(ReaderError::MessageTooLarge(input.len()));
        }
        let mut buffer = Self::default();
        buffer.buf[..input.len()].copy_from_slice(input);
        Ok(buffer)
    }

    /// The written or read part of the buffer.
    pub fn bytes(&self) -> &[u8] {
        &self.buf[..self.pos]
    }
}
