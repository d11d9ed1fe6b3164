use renvoi_proto::buffer::reader::ReaderError;
use renvoi_proto::buffer::writer::WriterError;
use std::fmt::Display;

/// Failure while turning an inbound message into an outbound one. Anything
/// that can still be answered with a DNS response code never gets here.
#[derive(Debug)]
pub enum HandleError {
    Reader(ReaderError),
    Writer(WriterError),
}

impl Display for HandleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reader(error) => write!(f, "unable to read message: {error}"),
            Self::Writer(error) => write!(f, "unable to write message: {error}"),
        }
    }
}

impl From<ReaderError> for HandleError {
    fn from(value: ReaderError) -> Self {
        Self::Reader(value)
    }
}

impl From<WriterError> for HandleError {
    fn from(value: WriterError) -> Self {
        Self::Writer(value)
    }
}
