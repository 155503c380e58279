//! The Killalot protocol engine.
//!
//! - [`assembler`] turns channel vectors, commands, images and binary blobs
//!   into [`OutgoingTransaction`]s of encoded frames.
//! - [`ProtocolDecoder`] turns a raw byte stream back into
//!   [`DecodedMessage`]s, one byte at a time, and reports them through a
//!   [`DecodeListener`].
//!
//! Nothing here performs I/O; see `killalot-link` for moving frames over a
//! transport.

pub mod assembler;
pub mod bitmap;
pub mod control;
pub mod data_type;
pub mod decoder;
pub mod error;
pub mod incoming;
pub mod message;
pub mod outgoing;

pub use assembler::{
    assemble, assemble_binary, assemble_channels, assemble_command, assemble_control,
    assemble_image,
};
pub use bitmap::{Bitmap, BitmapError, PixelEncoding};
pub use control::{ControlMessage, NetworkErrorKind, RequestKind};
pub use data_type::DataType;
pub use decoder::{DecodeEvent, DecodeListener, DecoderStats, ProtocolDecoder};
pub use error::{AssemblyError, ProtocolError};
pub use incoming::IncomingTransaction;
pub use message::{DecodedMessage, Payload};
pub use outgoing::OutgoingTransaction;
