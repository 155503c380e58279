use bytes::Bytes;

use crate::bitmap::Bitmap;
use crate::control::ControlMessage;
use crate::data_type::DataType;

/// A completed incoming application message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedMessage {
    /// Eight channel values, the first of which is channel `start`.
    Channels { start: u16, values: [u8; 8] },
    Command(String),
    Image(Bitmap),
    Binary(Bytes),
}

impl DecodedMessage {
    pub fn data_type(&self) -> DataType {
        match self {
            DecodedMessage::Channels { .. } => DataType::Channel,
            DecodedMessage::Command(_) => DataType::Command,
            DecodedMessage::Image(_) => DataType::Image,
            DecodedMessage::Binary(_) => DataType::Binary,
        }
    }
}

/// Anything that can be turned into an outgoing transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Channels(Vec<u8>),
    Command(String),
    Image(Bitmap),
    Binary(Bytes),
    Control(ControlMessage),
}
