//! Byte-stuffed datagram framing for the Killalot protocol.
//!
//! Every datagram is a fixed 4-byte header plus 8-byte payload, wrapped as
//! `END | stuffed content | END` with SLIP-style escaping:
//! - `0xC0` (END) inside a frame becomes `0xDB 0xDC`
//! - `0xDB` (ESC) inside a frame becomes `0xDB 0xDD`
//!
//! Receivers resynchronize on the next delimiter after any malformed frame.

pub mod codec;
pub mod error;
pub mod indicator;
pub mod parser;
pub mod reader;

#[cfg(feature = "async")]
pub mod async_codec;

pub use codec::{
    decode_datagram, encode_datagram, Datagram, DATAGRAM_LEN, END, ESC, ESC_END, ESC_ESC,
    HEADER_LEN, MAX_WIRE_LEN, MIN_WIRE_LEN, PAYLOAD_LEN,
};
pub use error::{FrameError, Result};
pub use indicator::{indicator_name, is_control, is_data};
pub use parser::{FrameParser, ParserState};
pub use reader::DatagramReader;

#[cfg(feature = "async")]
pub use async_codec::KillalotCodec;
