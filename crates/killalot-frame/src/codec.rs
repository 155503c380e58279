use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame delimiter.
pub const END: u8 = 0xC0;

/// Escape introducer.
pub const ESC: u8 = 0xDB;

/// Escaped form of [`END`] (follows [`ESC`]).
pub const ESC_END: u8 = 0xDC;

/// Escaped form of [`ESC`] (follows [`ESC`]).
pub const ESC_ESC: u8 = 0xDD;

/// Datagram header: indicator (1) + three type-specific bytes.
pub const HEADER_LEN: usize = 4;

/// Datagram payload, always eight bytes (zero-padded by the sender).
pub const PAYLOAD_LEN: usize = 8;

/// Unframed datagram size.
pub const DATAGRAM_LEN: usize = HEADER_LEN + PAYLOAD_LEN;

/// Longest possible frame: two delimiters, every content byte escaped.
pub const MAX_WIRE_LEN: usize = 2 + 2 * DATAGRAM_LEN;

/// Shortest possible frame: two delimiters, no escapes.
pub const MIN_WIRE_LEN: usize = 2 + DATAGRAM_LEN;

/// One fixed-size protocol unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Datagram {
    /// `header[0]` is the indicator; the rest depends on it.
    pub header: [u8; HEADER_LEN],
    pub payload: [u8; PAYLOAD_LEN],
}

impl Datagram {
    pub const fn new(header: [u8; HEADER_LEN], payload: [u8; PAYLOAD_LEN]) -> Self {
        Self { header, payload }
    }

    /// Build from borrowed slices. Extra trailing bytes are ignored.
    pub fn from_slices(header: &[u8], payload: &[u8]) -> Result<Self> {
        if header.len() < HEADER_LEN || payload.len() < PAYLOAD_LEN {
            return Err(FrameError::ShortFrame {
                len: header.len().min(HEADER_LEN) + payload.len().min(PAYLOAD_LEN),
            });
        }
        let mut datagram = Self::default();
        datagram.header.copy_from_slice(&header[..HEADER_LEN]);
        datagram.payload.copy_from_slice(&payload[..PAYLOAD_LEN]);
        Ok(datagram)
    }

    /// The indicator byte.
    pub fn indicator(&self) -> u8 {
        self.header[0]
    }

    /// Header followed by payload, unstuffed.
    pub fn to_bytes(&self) -> [u8; DATAGRAM_LEN] {
        let mut out = [0u8; DATAGRAM_LEN];
        out[..HEADER_LEN].copy_from_slice(&self.header);
        out[HEADER_LEN..].copy_from_slice(&self.payload);
        out
    }

    /// Encode into a standalone wire frame.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.wire_size());
        encode_datagram(self, &mut buf);
        buf.freeze()
    }

    /// Length of this datagram on the wire, including delimiters.
    pub fn wire_size(&self) -> usize {
        let escaped = self
            .header
            .iter()
            .chain(self.payload.iter())
            .filter(|&&b| b == END || b == ESC)
            .count();
        MIN_WIRE_LEN + escaped
    }
}

/// Encode a datagram into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────┬──────────────────┬───────────────────┬──────┐
/// │ 0xC0 │ header (4B)      │ payload (8B)      │ 0xC0 │
/// │ END  │ byte-stuffed     │ byte-stuffed      │ END  │
/// └──────┴──────────────────┴───────────────────┴──────┘
/// ```
///
/// Inside the frame `0xC0` becomes `0xDB 0xDC` and `0xDB` becomes
/// `0xDB 0xDD`, so the result is between 14 and 26 bytes long.
pub fn encode_datagram(datagram: &Datagram, dst: &mut BytesMut) {
    dst.reserve(datagram.wire_size());
    dst.put_u8(END);
    for &byte in datagram.header.iter().chain(datagram.payload.iter()) {
        match byte {
            END => dst.put_slice(&[ESC, ESC_END]),
            ESC => dst.put_slice(&[ESC, ESC_ESC]),
            other => dst.put_u8(other),
        }
    }
    dst.put_u8(END);
}

/// Split already de-stuffed frame content into a datagram.
///
/// Only the first [`DATAGRAM_LEN`] bytes are used.
pub fn decode_datagram(raw: &[u8]) -> Result<Datagram> {
    if raw.len() < DATAGRAM_LEN {
        return Err(FrameError::ShortFrame { len: raw.len() });
    }
    Datagram::from_slices(&raw[..HEADER_LEN], &raw[HEADER_LEN..DATAGRAM_LEN])
}
