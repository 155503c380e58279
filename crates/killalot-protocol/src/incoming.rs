use bytes::Bytes;
use killalot_frame::{Datagram, PAYLOAD_LEN};
use tracing::{trace, warn};

use crate::bitmap::{Bitmap, PixelEncoding};
use crate::data_type::DataType;
use crate::message::DecodedMessage;

/// A multi-datagram message being reassembled.
///
/// Created by a head frame (or the first COMMAND frame), fed each following
/// frame of its type, and finished once `packets_remaining` reaches zero.
#[derive(Debug, Clone)]
pub struct IncomingTransaction {
    data_type: DataType,
    packets_total: usize,
    packets_remaining: usize,
    acc: Accumulator,
}

#[derive(Debug, Clone)]
enum Accumulator {
    Command {
        buf: Vec<u8>,
        total: usize,
    },
    // Sequenced payloads grow `buf` as packets arrive, up to `len`, so a
    // head alone never commits the announced size.
    Image {
        width: u16,
        height: u16,
        encoding: PixelEncoding,
        len: usize,
        buf: Vec<u8>,
    },
    Binary {
        len: usize,
        buf: Vec<u8>,
    },
}

/// Packets needed to carry `bytes` in 8-byte payloads.
pub fn packets_for(bytes: usize) -> usize {
    bytes.div_ceil(PAYLOAD_LEN)
}

/// 24-bit sequence number from an IMAGE/BINARY header.
pub fn sequence_of(header: &[u8; 4]) -> usize {
    (usize::from(header[1]) << 16) | (usize::from(header[2]) << 8) | usize::from(header[3])
}

impl IncomingTransaction {
    /// A command of `total_chars` bytes. Always spans at least one packet.
    pub fn command(total_chars: usize) -> Self {
        Self {
            data_type: DataType::Command,
            packets_total: packets_for(total_chars).max(1),
            packets_remaining: packets_for(total_chars).max(1),
            acc: Accumulator::Command {
                buf: Vec::with_capacity(total_chars),
                total: total_chars,
            },
        }
    }

    pub fn image(width: u16, height: u16, encoding: PixelEncoding) -> Self {
        let size = Bitmap::size_for(width, height, encoding);
        Self {
            data_type: DataType::Image,
            packets_total: packets_for(size),
            packets_remaining: packets_for(size),
            acc: Accumulator::Image {
                width,
                height,
                encoding,
                len: size,
                buf: Vec::new(),
            },
        }
    }

    pub fn binary(len: usize) -> Self {
        Self {
            data_type: DataType::Binary,
            packets_total: packets_for(len),
            packets_remaining: packets_for(len),
            acc: Accumulator::Binary {
                len,
                buf: Vec::new(),
            },
        }
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn packets_total(&self) -> usize {
        self.packets_total
    }

    pub fn packets_remaining(&self) -> usize {
        self.packets_remaining
    }

    /// Bytes held so far.
    pub fn buffered(&self) -> usize {
        match &self.acc {
            Accumulator::Command { buf, .. }
            | Accumulator::Image { buf, .. }
            | Accumulator::Binary { buf, .. } => buf.len(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.packets_remaining == 0
    }

    /// Percentage of packets received.
    pub fn progress(&self) -> u8 {
        if self.packets_total == 0 {
            return 100;
        }
        ((self.packets_total - self.packets_remaining) * 100 / self.packets_total) as u8
    }

    /// Feed one datagram of this transaction's type.
    ///
    /// Returns the decoded message when this was the last packet.
    pub fn capture(&mut self, datagram: &Datagram) -> Option<DecodedMessage> {
        if self.is_complete() {
            return None;
        }

        match &mut self.acc {
            Accumulator::Command { buf, total } => {
                let take = (*total - buf.len()).min(PAYLOAD_LEN);
                let expected_after = *total - buf.len() - take;
                if usize::from(datagram.header[2]) != expected_after {
                    warn!(
                        announced = datagram.header[2],
                        expected = expected_after,
                        "command chunk remaining-count mismatch"
                    );
                }
                buf.extend_from_slice(&datagram.payload[..take]);
            }
            Accumulator::Image { len, buf, .. } | Accumulator::Binary { len, buf } => {
                let offset = sequence_of(&datagram.header) * PAYLOAD_LEN;
                if offset < *len {
                    let end = (offset + PAYLOAD_LEN).min(*len);
                    if buf.len() < end {
                        buf.resize(end, 0);
                    }
                    buf[offset..end].copy_from_slice(&datagram.payload[..end - offset]);
                } else {
                    trace!(offset, len = *len, "sequence beyond buffer end");
                }
            }
        }

        self.packets_remaining -= 1;
        if self.is_complete() {
            self.finish()
        } else {
            None
        }
    }

    /// Build the message if every packet has arrived.
    pub fn finish(&mut self) -> Option<DecodedMessage> {
        if !self.is_complete() {
            return None;
        }
        let message = match &mut self.acc {
            Accumulator::Command { buf, .. } => {
                DecodedMessage::Command(String::from_utf8_lossy(buf).into_owned())
            }
            Accumulator::Image {
                width,
                height,
                encoding,
                len,
                buf,
            } => {
                buf.resize(*len, 0);
                let data = Bytes::from(std::mem::take(buf));
                match Bitmap::new(*width, *height, *encoding, data) {
                    Ok(bitmap) => DecodedMessage::Image(bitmap),
                    Err(err) => {
                        warn!(error = %err, "completed image is malformed");
                        return None;
                    }
                }
            }
            Accumulator::Binary { len, buf } => {
                buf.resize(*len, 0);
                DecodedMessage::Binary(Bytes::from(std::mem::take(buf)))
            }
        };
        Some(message)
    }
}
