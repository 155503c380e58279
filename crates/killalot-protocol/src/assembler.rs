//! Payload → [`OutgoingTransaction`] conversion.
//!
//! Every function here is pure: it validates the payload against the limits
//! the header fields can express and returns the complete frame sequence.

use killalot_frame::{indicator, Datagram, PAYLOAD_LEN};
use tracing::trace;

use crate::bitmap::Bitmap;
use crate::control::ControlMessage;
use crate::data_type::DataType;
use crate::error::AssemblyError;
use crate::incoming::packets_for;
use crate::message::Payload;
use crate::outgoing::OutgoingTransaction;

/// Most CHANNEL packets one transaction may carry.
pub const CHANNEL_PACKET_LIMIT: usize = 255;

/// Longest command, in bytes (header[3] is one byte).
pub const COMMAND_CHAR_LIMIT: usize = 255;

/// Most IMAGE data packets (24-bit sequence numbers).
pub const IMAGE_PACKET_LIMIT: usize = 1 << 24;

/// Most BINARY data packets (24-bit sequence numbers).
pub const BINARY_PACKET_LIMIT: usize = 1 << 24;

pub const CONTROL_PRIORITY: u32 = 0;
pub const CHANNEL_PRIORITY: u32 = 0;
pub const COMMAND_PRIORITY: u32 = 1;
pub const IMAGE_PRIORITY: u32 = 2;
pub const BINARY_PRIORITY: u32 = 3;

type Result<T> = std::result::Result<T, AssemblyError>;

/// Dispatch on the payload kind.
pub fn assemble(name: impl Into<String>, payload: &Payload) -> Result<OutgoingTransaction> {
    match payload {
        Payload::Channels(values) => assemble_channels(name, values),
        Payload::Command(command) => assemble_command(name, command),
        Payload::Image(bitmap) => assemble_image(name, bitmap),
        Payload::Binary(data) => assemble_binary(name, data),
        Payload::Control(message) => Ok(assemble_control(name, message)),
    }
}

/// Split a channel vector into CHANNEL datagrams of eight values each.
///
/// The index of each chunk's first channel is written big-endian into
/// header[2..4]; the last chunk is zero-padded.
pub fn assemble_channels(name: impl Into<String>, channels: &[u8]) -> Result<OutgoingTransaction> {
    if channels.is_empty() {
        return Err(AssemblyError::Empty {
            kind: DataType::Channel,
        });
    }
    let packets = packets_for(channels.len());
    if packets > CHANNEL_PACKET_LIMIT {
        return Err(AssemblyError::LimitExceeded {
            kind: DataType::Channel,
            required: packets,
            limit: CHANNEL_PACKET_LIMIT,
        });
    }

    let datagrams = channels.chunks(PAYLOAD_LEN).enumerate().map(|(i, chunk)| {
        let [hi, lo] = ((i * PAYLOAD_LEN) as u16).to_be_bytes();
        Datagram::new([indicator::CHANNEL, 0, hi, lo], padded(chunk))
    });
    Ok(finish(name, CHANNEL_PRIORITY, datagrams))
}

/// Split a command string into COMMAND datagrams.
///
/// Header: `[COMMAND, 0, bytes remaining after this chunk, total length]`.
pub fn assemble_command(name: impl Into<String>, command: &str) -> Result<OutgoingTransaction> {
    let bytes = command.as_bytes();
    if bytes.is_empty() {
        return Err(AssemblyError::Empty {
            kind: DataType::Command,
        });
    }
    if bytes.len() > COMMAND_CHAR_LIMIT {
        return Err(AssemblyError::LimitExceeded {
            kind: DataType::Command,
            required: bytes.len(),
            limit: COMMAND_CHAR_LIMIT,
        });
    }

    let total = bytes.len();
    let datagrams = bytes.chunks(PAYLOAD_LEN).enumerate().map(move |(i, chunk)| {
        let remaining = total - (i * PAYLOAD_LEN + chunk.len());
        Datagram::new(
            [indicator::COMMAND, 0, remaining as u8, total as u8],
            padded(chunk),
        )
    });
    Ok(finish(name, COMMAND_PRIORITY, datagrams))
}

/// One IMAGEHEAD followed by the raw pixel bytes in IMAGE datagrams.
///
/// IMAGEHEAD payload: `[0, 0, 0, width(16 BE), height(16 BE), encoding]`.
pub fn assemble_image(name: impl Into<String>, bitmap: &Bitmap) -> Result<OutgoingTransaction> {
    let data = bitmap.data();
    let packets = packets_for(data.len());
    if packets > IMAGE_PACKET_LIMIT {
        return Err(AssemblyError::LimitExceeded {
            kind: DataType::Image,
            required: packets,
            limit: IMAGE_PACKET_LIMIT,
        });
    }

    let [w_hi, w_lo] = bitmap.width().to_be_bytes();
    let [h_hi, h_lo] = bitmap.height().to_be_bytes();
    let head = Datagram::new(
        [indicator::IMAGEHEAD, 0, 0, 0],
        [0, 0, 0, w_hi, w_lo, h_hi, h_lo, bitmap.encoding().wire_code()],
    );

    let body = sequenced(indicator::IMAGE, data);
    Ok(finish(name, IMAGE_PRIORITY, std::iter::once(head).chain(body)))
}

/// One BINARYHEAD (total length, u32 BE in payload[4..8]) followed by BINARY
/// datagrams. An empty buffer yields just the head.
pub fn assemble_binary(name: impl Into<String>, data: &[u8]) -> Result<OutgoingTransaction> {
    let packets = packets_for(data.len());
    if packets > BINARY_PACKET_LIMIT {
        return Err(AssemblyError::LimitExceeded {
            kind: DataType::Binary,
            required: packets,
            limit: BINARY_PACKET_LIMIT,
        });
    }

    let [b3, b2, b1, b0] = (data.len() as u32).to_be_bytes();
    let head = Datagram::new(
        [indicator::BINARYHEAD, 0, 0, 0],
        [0, 0, 0, 0, b3, b2, b1, b0],
    );

    let body = sequenced(indicator::BINARY, data);
    Ok(finish(name, BINARY_PRIORITY, std::iter::once(head).chain(body)))
}

/// A single control datagram.
pub fn assemble_control(name: impl Into<String>, message: &ControlMessage) -> OutgoingTransaction {
    finish(name, CONTROL_PRIORITY, [message.to_datagram()])
}

fn sequenced(ind: u8, data: &[u8]) -> impl Iterator<Item = Datagram> + '_ {
    data.chunks(PAYLOAD_LEN).enumerate().map(move |(seq, chunk)| {
        let [_, hi, mid, lo] = (seq as u32).to_be_bytes();
        Datagram::new([ind, hi, mid, lo], padded(chunk))
    })
}

fn padded(chunk: &[u8]) -> [u8; PAYLOAD_LEN] {
    let mut payload = [0u8; PAYLOAD_LEN];
    payload[..chunk.len()].copy_from_slice(chunk);
    payload
}

fn finish(
    name: impl Into<String>,
    priority: u32,
    datagrams: impl IntoIterator<Item = Datagram>,
) -> OutgoingTransaction {
    let tx = OutgoingTransaction::from_datagrams(name, priority, datagrams);
    trace!(name = tx.name(), frames = tx.total(), priority, "assembled transaction");
    tx
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use killalot_frame::FrameParser;

    use super::*;
    use crate::bitmap::PixelEncoding;

    fn datagrams(tx: &OutgoingTransaction) -> Vec<Datagram> {
        let mut parser = FrameParser::new();
        tx.frames()
            .flat_map(|frame| frame.iter().copied())
            .filter_map(|byte| parser.push(byte).unwrap())
            .collect()
    }

    #[test]
    fn channels_split_and_index() {
        let channels: Vec<u8> = (1..=20).collect();
        let tx = assemble_channels("ch", &channels).unwrap();
        assert_eq!(tx.priority(), CHANNEL_PRIORITY);

        let dgs = datagrams(&tx);
        assert_eq!(dgs.len(), 3);
        assert_eq!(dgs[0].header, [indicator::CHANNEL, 0, 0, 0]);
        assert_eq!(dgs[1].header, [indicator::CHANNEL, 0, 0, 8]);
        assert_eq!(dgs[2].header, [indicator::CHANNEL, 0, 0, 16]);
        assert_eq!(dgs[2].payload, [17, 18, 19, 20, 0, 0, 0, 0]);
    }

    #[test]
    fn channel_limit_boundary() {
        let max = vec![0u8; CHANNEL_PACKET_LIMIT * PAYLOAD_LEN];
        let tx = assemble_channels("max", &max).unwrap();
        assert_eq!(tx.total(), 255);

        let over = vec![0u8; CHANNEL_PACKET_LIMIT * PAYLOAD_LEN + 1];
        assert_eq!(
            assemble_channels("over", &over),
            Err(AssemblyError::LimitExceeded {
                kind: DataType::Channel,
                required: 256,
                limit: 255
            })
        );
    }

    #[test]
    fn channel_index_past_255_uses_high_byte() {
        let channels = vec![0u8; 33 * PAYLOAD_LEN];
        let dgs = datagrams(&assemble_channels("wide", &channels).unwrap());
        assert_eq!(dgs[32].header, [indicator::CHANNEL, 0, 1, 0]);
    }

    #[test]
    fn command_headers_count_down() {
        let tx = assemble_command("cmd", "0123456789abcdefXY").unwrap();
        assert_eq!(tx.priority(), COMMAND_PRIORITY);

        let headers: Vec<[u8; 4]> = datagrams(&tx).iter().map(|d| d.header).collect();
        assert_eq!(
            headers,
            vec![
                [indicator::COMMAND, 0, 10, 18],
                [indicator::COMMAND, 0, 2, 18],
                [indicator::COMMAND, 0, 0, 18],
            ]
        );
    }

    #[test]
    fn command_limits() {
        assert!(assemble_command("ok", &"x".repeat(255)).is_ok());
        assert!(matches!(
            assemble_command("long", &"x".repeat(256)),
            Err(AssemblyError::LimitExceeded { required: 256, .. })
        ));
        assert_eq!(
            assemble_command("empty", ""),
            Err(AssemblyError::Empty {
                kind: DataType::Command
            })
        );
    }

    #[test]
    fn image_head_and_sequence() {
        let bmp = Bitmap::from_pixels(3, 2, PixelEncoding::Rgb565, &[0xC0DB; 6]).unwrap();
        let tx = assemble_image("img", &bmp).unwrap();
        assert_eq!(tx.priority(), IMAGE_PRIORITY);

        let dgs = datagrams(&tx);
        // 12 pixel bytes → head + 2 data frames.
        assert_eq!(dgs.len(), 3);
        assert_eq!(dgs[0].header, [indicator::IMAGEHEAD, 0, 0, 0]);
        assert_eq!(dgs[0].payload, [0, 0, 0, 0, 3, 0, 2, 0x02]);
        assert_eq!(dgs[1].header, [indicator::IMAGE, 0, 0, 0]);
        assert_eq!(dgs[2].header, [indicator::IMAGE, 0, 0, 1]);
        assert_eq!(dgs[2].payload, [0xC0, 0xDB, 0xC0, 0xDB, 0, 0, 0, 0]);
    }

    #[test]
    fn binary_head_carries_length() {
        let data: Vec<u8> = (0..20).collect();
        let tx = assemble_binary("bin", &data).unwrap();
        assert_eq!(tx.priority(), BINARY_PRIORITY);

        let dgs = datagrams(&tx);
        assert_eq!(dgs.len(), 4);
        assert_eq!(dgs[0].payload, [0, 0, 0, 0, 0, 0, 0, 20]);
        assert_eq!(dgs[3].header, [indicator::BINARY, 0, 0, 2]);
    }

    #[test]
    fn empty_binary_is_head_only() {
        let tx = assemble_binary("nothing", &[]).unwrap();
        assert_eq!(tx.total(), 1);
    }

    #[test]
    fn dispatch_by_payload() {
        let tx = assemble("hb", &Payload::Control(ControlMessage::Heartbeat)).unwrap();
        assert_eq!(tx.priority(), CONTROL_PRIORITY);
        assert_eq!(datagrams(&tx)[0].header, [indicator::HEARTBEAT, 0, 0, 0]);

        let tx = assemble("b", &Payload::Binary(Bytes::from_static(b"abc"))).unwrap();
        assert_eq!(tx.total(), 2);
    }
}
