use bytes::Bytes;
use killalot_frame::{indicator, Datagram, FrameError, FrameParser, ParserState};
use serde::Serialize;
use tracing::{debug, trace};

use crate::assembler::{BINARY_PACKET_LIMIT, IMAGE_PACKET_LIMIT};
use crate::bitmap::{Bitmap, PixelEncoding};
use crate::control::{NetworkErrorKind, RequestKind};
use crate::data_type::DataType;
use crate::error::ProtocolError;
use crate::incoming::{packets_for, IncomingTransaction};
use crate::message::DecodedMessage;

/// Receives the results of decoding.
///
/// Exactly one callback fires per completed logical message; partially
/// received transactions never produce a callback.
pub trait DecodeListener {
    fn on_recv_channels(&mut self, start: u16, values: [u8; 8]);

    fn on_recv_command(&mut self, command: String);

    fn on_recv_bitmap(&mut self, bitmap: Bitmap);

    fn on_recv_binary(&mut self, data: Bytes);

    fn on_request(&mut self, kind: RequestKind, code: u8);

    fn on_error(&mut self, error: ProtocolError);

    fn on_heartbeat(&mut self) {}
}

/// One decoding outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeEvent {
    Message(DecodedMessage),
    Heartbeat,
    Request { kind: RequestKind, code: u8 },
    Error(ProtocolError),
}

impl DecodeEvent {
    /// Invoke the matching listener callback.
    pub fn dispatch<L: DecodeListener + ?Sized>(self, listener: &mut L) {
        match self {
            DecodeEvent::Message(DecodedMessage::Channels { start, values }) => {
                listener.on_recv_channels(start, values)
            }
            DecodeEvent::Message(DecodedMessage::Command(command)) => {
                listener.on_recv_command(command)
            }
            DecodeEvent::Message(DecodedMessage::Image(bitmap)) => listener.on_recv_bitmap(bitmap),
            DecodeEvent::Message(DecodedMessage::Binary(data)) => listener.on_recv_binary(data),
            DecodeEvent::Heartbeat => listener.on_heartbeat(),
            DecodeEvent::Request { kind, code } => listener.on_request(kind, code),
            DecodeEvent::Error(error) => listener.on_error(error),
        }
    }
}

/// Collects events in arrival order.
impl DecodeListener for Vec<DecodeEvent> {
    fn on_recv_channels(&mut self, start: u16, values: [u8; 8]) {
        self.push(DecodeEvent::Message(DecodedMessage::Channels { start, values }));
    }

    fn on_recv_command(&mut self, command: String) {
        self.push(DecodeEvent::Message(DecodedMessage::Command(command)));
    }

    fn on_recv_bitmap(&mut self, bitmap: Bitmap) {
        self.push(DecodeEvent::Message(DecodedMessage::Image(bitmap)));
    }

    fn on_recv_binary(&mut self, data: Bytes) {
        self.push(DecodeEvent::Message(DecodedMessage::Binary(data)));
    }

    fn on_request(&mut self, kind: RequestKind, code: u8) {
        self.push(DecodeEvent::Request { kind, code });
    }

    fn on_error(&mut self, error: ProtocolError) {
        self.push(DecodeEvent::Error(error));
    }

    fn on_heartbeat(&mut self) {
        self.push(DecodeEvent::Heartbeat);
    }
}

/// Counters kept by a [`ProtocolDecoder`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecoderStats {
    /// Raw bytes consumed.
    pub bytes: u64,
    /// Well-formed datagrams recognized.
    pub datagrams: u64,
    /// Frames closed before 12 bytes arrived.
    pub short_frames: u64,
    /// Frames dropped for an invalid escape sequence.
    pub bad_escapes: u64,
    /// Completed messages (including control messages).
    pub messages: u64,
    /// Errors reported to the listener.
    pub protocol_errors: u64,
    /// Data frames with no open transaction to join.
    pub orphaned: u64,
}

/// Streaming decoder for one connection.
///
/// Owns the frame parser and at most one open transaction per multi-frame
/// data type. Not shared: the read pump holds it exclusively.
#[derive(Debug, Default)]
pub struct ProtocolDecoder {
    parser: FrameParser,
    command: Option<IncomingTransaction>,
    image: Option<IncomingTransaction>,
    binary: Option<IncomingTransaction>,
    receive_limit: Option<usize>,
    stats: DecoderStats,
}

impl ProtocolDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject image and binary heads announcing more than `bytes`.
    ///
    /// Without a limit only the protocol's packet-count ceilings apply.
    pub fn with_receive_limit(mut self, bytes: usize) -> Self {
        self.receive_limit = Some(bytes);
        self
    }

    pub fn receive_limit(&self) -> Option<usize> {
        self.receive_limit
    }

    /// Consume one byte.
    pub fn push(&mut self, byte: u8) -> Option<DecodeEvent> {
        self.stats.bytes += 1;
        match self.parser.push(byte) {
            Ok(Some(datagram)) => self.push_datagram(&datagram),
            Ok(None) => None,
            Err(err) => {
                match err {
                    FrameError::ShortFrame { .. } => self.stats.short_frames += 1,
                    FrameError::BadEscape { .. } => self.stats.bad_escapes += 1,
                    _ => {}
                }
                debug!(error = %err, "dropping malformed frame");
                None
            }
        }
    }

    /// Consume a chunk of bytes, dispatching each event to `listener`.
    ///
    /// Returns how many events were dispatched.
    pub fn feed<L: DecodeListener + ?Sized>(&mut self, bytes: &[u8], listener: &mut L) -> usize {
        let mut events = 0;
        for &byte in bytes {
            if let Some(event) = self.push(byte) {
                event.dispatch(listener);
                events += 1;
            }
        }
        events
    }

    /// Route an already-deframed datagram.
    pub fn push_datagram(&mut self, datagram: &Datagram) -> Option<DecodeEvent> {
        self.stats.datagrams += 1;
        trace!(
            indicator = indicator::indicator_name(datagram.indicator()),
            header = ?datagram.header,
            "datagram"
        );

        let event = match datagram.indicator() {
            indicator::CHANNEL => Some(DecodeEvent::Message(DecodedMessage::Channels {
                start: u16::from_be_bytes([datagram.header[2], datagram.header[3]]),
                values: datagram.payload,
            })),
            indicator::COMMAND => {
                let tx = self
                    .command
                    .get_or_insert_with(|| IncomingTransaction::command(datagram.header[3].into()));
                let done = tx.capture(datagram);
                close_if_complete(&mut self.command, done)
            }
            indicator::IMAGEHEAD => self.start_image(datagram),
            indicator::IMAGE => self.continue_transaction(DataType::Image, datagram),
            indicator::BINARYHEAD => self.start_binary(datagram),
            indicator::BINARY => self.continue_transaction(DataType::Binary, datagram),
            indicator::HEARTBEAT => Some(DecodeEvent::Heartbeat),
            indicator::CTLREQ => Some(DecodeEvent::Request {
                kind: RequestKind::from_wire(datagram.payload[0]),
                code: datagram.payload[1],
            }),
            indicator::CTLERR => Some(DecodeEvent::Error(ProtocolError::Network {
                kind: NetworkErrorKind::from_wire(datagram.payload[0]),
                code: datagram.payload[1],
            })),
            other => Some(DecodeEvent::Error(ProtocolError::UnknownIndicator(other))),
        };

        match &event {
            Some(DecodeEvent::Error(_)) => self.stats.protocol_errors += 1,
            Some(_) => self.stats.messages += 1,
            None => {}
        }
        event
    }

    /// The open transaction of `data_type`, if any.
    pub fn in_progress(&self, data_type: DataType) -> Option<&IncomingTransaction> {
        match data_type {
            DataType::Channel => None,
            DataType::Command => self.command.as_ref(),
            DataType::Image => self.image.as_ref(),
            DataType::Binary => self.binary.as_ref(),
        }
    }

    /// Drop the open transaction of `data_type`. Returns whether one existed.
    pub fn abort(&mut self, data_type: DataType) -> bool {
        let dropped = self.slot(data_type).and_then(Option::take);
        if let Some(tx) = &dropped {
            debug!(%data_type, remaining = tx.packets_remaining(), "transaction aborted");
        }
        dropped.is_some()
    }

    /// Drop all open transactions and any partial frame. Stats are kept.
    pub fn reset(&mut self) {
        self.parser.reset();
        self.command = None;
        self.image = None;
        self.binary = None;
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// State of the underlying frame parser.
    pub fn parser_state(&self) -> ParserState {
        self.parser.state()
    }

    fn slot(&mut self, data_type: DataType) -> Option<&mut Option<IncomingTransaction>> {
        match data_type {
            DataType::Channel => None,
            DataType::Command => Some(&mut self.command),
            DataType::Image => Some(&mut self.image),
            DataType::Binary => Some(&mut self.binary),
        }
    }

    fn over_limit(&self, size: usize) -> Option<String> {
        let limit = self.receive_limit?;
        (size > limit).then(|| format!("{size} bytes exceeds receive limit {limit}"))
    }

    fn start_image(&mut self, datagram: &Datagram) -> Option<DecodeEvent> {
        if self.image.is_some() {
            return Some(DecodeEvent::Error(
                ProtocolError::TransactionAlreadyInProgress(DataType::Image),
            ));
        }

        let p = &datagram.payload;
        let width = u16::from_be_bytes([p[3], p[4]]);
        let height = u16::from_be_bytes([p[5], p[6]]);
        let invalid = |reason: String| {
            Some(DecodeEvent::Error(ProtocolError::InvalidHead {
                kind: DataType::Image,
                reason,
            }))
        };

        let Some(encoding) = PixelEncoding::from_wire(p[7]) else {
            return invalid(format!("unknown pixel encoding {:#04x}", p[7]));
        };
        if width == 0 || height == 0 {
            return invalid(format!("zero dimension {width}x{height}"));
        }
        let size = Bitmap::size_for(width, height, encoding);
        let packets = packets_for(size);
        if packets > IMAGE_PACKET_LIMIT {
            return invalid(format!("{packets} packets exceeds {IMAGE_PACKET_LIMIT}"));
        }
        if let Some(reason) = self.over_limit(size) {
            return invalid(reason);
        }

        debug!(width, height, ?encoding, packets, "image transaction started");
        self.image = Some(IncomingTransaction::image(width, height, encoding));
        None
    }

    fn start_binary(&mut self, datagram: &Datagram) -> Option<DecodeEvent> {
        if self.binary.is_some() {
            return Some(DecodeEvent::Error(
                ProtocolError::TransactionAlreadyInProgress(DataType::Binary),
            ));
        }

        let p = &datagram.payload;
        let len = u32::from_be_bytes([p[4], p[5], p[6], p[7]]) as usize;
        let packets = packets_for(len);
        if packets > BINARY_PACKET_LIMIT {
            return Some(DecodeEvent::Error(ProtocolError::InvalidHead {
                kind: DataType::Binary,
                reason: format!("{packets} packets exceeds {BINARY_PACKET_LIMIT}"),
            }));
        }
        if let Some(reason) = self.over_limit(len) {
            return Some(DecodeEvent::Error(ProtocolError::InvalidHead {
                kind: DataType::Binary,
                reason,
            }));
        }
        if len == 0 {
            return Some(DecodeEvent::Message(DecodedMessage::Binary(Bytes::new())));
        }

        debug!(len, packets, "binary transaction started");
        self.binary = Some(IncomingTransaction::binary(len));
        None
    }

    fn continue_transaction(
        &mut self,
        data_type: DataType,
        datagram: &Datagram,
    ) -> Option<DecodeEvent> {
        let slot = match data_type {
            DataType::Image => &mut self.image,
            DataType::Binary => &mut self.binary,
            DataType::Channel | DataType::Command => return None,
        };
        let Some(tx) = slot.as_mut() else {
            self.stats.orphaned += 1;
            trace!(%data_type, "no open transaction, frame dropped");
            return None;
        };
        let done = tx.capture(datagram);
        close_if_complete(slot, done)
    }
}

/// Clear `slot` once its transaction has received every packet.
fn close_if_complete(
    slot: &mut Option<IncomingTransaction>,
    done: Option<DecodedMessage>,
) -> Option<DecodeEvent> {
    if slot.as_ref().is_some_and(IncomingTransaction::is_complete) {
        *slot = None;
    }
    done.map(DecodeEvent::Message)
}
