use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::StreamTransport;
use crate::traits::{Connector, Transport};

/// Listening TCP endpoint that yields [`StreamTransport`]s.
pub struct TcpAcceptor {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpAcceptor {
    /// Bind and listen on `addr`. Port 0 picks a free port.
    pub fn bind(addr: impl ToSocketAddrs + std::fmt::Debug) -> Result<Self> {
        let label = format!("{addr:?}");
        let listener = TcpListener::bind(&addr).map_err(|e| TransportError::Bind {
            addr: label.clone(),
            source: e,
        })?;
        let local_addr = listener.local_addr().map_err(|e| TransportError::Bind {
            addr: label,
            source: e,
        })?;

        info!(%local_addr, "listening on tcp");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<StreamTransport> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(%peer, "accepted tcp connection");
        StreamTransport::from_tcp(stream)
    }

    /// The address this acceptor is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// Connect to a TCP endpoint (blocking).
pub fn connect(addr: &str, timeout: Option<Duration>) -> Result<StreamTransport> {
    let connect_err = |source: std::io::Error| TransportError::Connect {
        addr: addr.to_string(),
        source,
    };

    let stream = match timeout {
        Some(timeout) => {
            let resolved = addr
                .to_socket_addrs()
                .map_err(connect_err)?
                .next()
                .ok_or_else(|| {
                    connect_err(std::io::Error::new(
                        std::io::ErrorKind::AddrNotAvailable,
                        "address resolved to nothing",
                    ))
                })?;
            TcpStream::connect_timeout(&resolved, timeout).map_err(connect_err)?
        }
        None => TcpStream::connect(addr).map_err(connect_err)?,
    };

    debug!(addr, "connected over tcp");
    StreamTransport::from_tcp(stream)
}

/// [`Connector`] for a fixed TCP address.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
    timeout: Option<Duration>,
}

impl TcpConnector {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            timeout: None,
        }
    }

    /// Bound the connection attempt.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Connector for TcpConnector {
    fn connect(&self) -> Result<Box<dyn Transport>> {
        Ok(Box::new(connect(&self.addr, self.timeout)?))
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.addr)
    }
}
