//! Byte-stream transports for the Killalot link.
//!
//! The protocol only needs an ordered byte stream with non-blocking reads:
//! - TCP sockets
//! - Unix domain sockets (Linux/macOS)
//! - An in-process memory pipe, handy for tests and loopback setups
//!
//! Bluetooth RFCOMM and other platform transports plug in by implementing
//! [`Transport`] and [`Connector`].

pub mod error;
pub mod memory;
pub mod stream;
pub mod tcp;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use memory::MemoryTransport;
pub use stream::{StreamTransport, DEFAULT_READ_PROBE};
pub use tcp::{TcpAcceptor, TcpConnector};
pub use traits::{Connector, ReadStatus, Transport};

#[cfg(unix)]
pub use uds::{UnixConnector, UnixDomainSocket};
