//! Killalot: a framed telemetry and control protocol for robot remote
//! controls.
//!
//! Fixed 12-byte datagrams are SLIP-framed onto any byte stream and grouped
//! into transactions carrying channel values, text commands, bitmaps and
//! binary blobs.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte stream transports (TCP, Unix sockets, in-memory)
//! - [`frame`]: datagram framing and the byte-wise frame parser
//! - [`protocol`]: transaction assembly and decoding
//! - [`link`]: threaded transport manager (behind the `link` feature)

/// Re-export transport types.
pub mod transport {
    pub use killalot_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use killalot_frame::*;
}

/// Re-export protocol types.
pub mod protocol {
    pub use killalot_protocol::*;
}

/// Re-export link types (requires `link` feature).
#[cfg(feature = "link")]
pub mod link {
    pub use killalot_link::*;
}
