use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::{ReadStatus, Transport};

/// How long a read may block before reporting [`ReadStatus::WouldBlock`].
pub const DEFAULT_READ_PROBE: Duration = Duration::from_millis(5);

/// A connected socket stream usable as a [`Transport`].
///
/// Wraps a TCP stream or (on Unix) a Unix domain socket stream. Reads use a
/// short socket timeout so the read pump regains control regularly; writes
/// stay blocking.
pub struct StreamTransport {
    inner: StreamInner,
    connected: bool,
}

enum StreamInner {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl StreamTransport {
    /// Wrap a connected TCP stream.
    pub fn from_tcp(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        let transport = Self {
            inner: StreamInner::Tcp(stream),
            connected: true,
        };
        transport.set_read_probe(Some(DEFAULT_READ_PROBE))?;
        Ok(transport)
    }

    /// Wrap a connected Unix domain socket stream.
    #[cfg(unix)]
    pub fn from_unix(stream: std::os::unix::net::UnixStream) -> Result<Self> {
        let transport = Self {
            inner: StreamInner::Unix(stream),
            connected: true,
        };
        transport.set_read_probe(Some(DEFAULT_READ_PROBE))?;
        Ok(transport)
    }

    /// A connected pair of in-process Unix socket transports.
    #[cfg(unix)]
    pub fn pair() -> Result<(Self, Self)> {
        let (left, right) = std::os::unix::net::UnixStream::pair()?;
        Ok((Self::from_unix(left)?, Self::from_unix(right)?))
    }

    /// Change how long a read may block before reporting `WouldBlock`.
    ///
    /// `None` makes reads fully blocking.
    pub fn set_read_probe(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            StreamInner::Tcp(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
        }
    }

    /// Address of the remote end, for diagnostics.
    pub fn peer_label(&self) -> String {
        match &self.inner {
            StreamInner::Tcp(stream) => stream
                .peer_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_else(|_| "tcp:<unknown>".to_string()),
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream
                .peer_addr()
                .ok()
                .and_then(|addr| addr.as_pathname().map(|p| p.display().to_string()))
                .unwrap_or_else(|| "unix:<unnamed>".to_string()),
        }
    }

    fn read_raw(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            StreamInner::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.read(buf),
        }
    }

    fn write_raw(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            StreamInner::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.write(buf),
        }
    }

    fn flush_raw(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            StreamInner::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.flush(),
        }
    }
}

impl Transport for StreamTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<ReadStatus> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        loop {
            return match self.read_raw(buf) {
                Ok(0) if !buf.is_empty() => {
                    debug!("stream closed by peer");
                    self.connected = false;
                    Ok(ReadStatus::Closed)
                }
                Ok(n) => Ok(ReadStatus::Data(n)),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err)
                    if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut =>
                {
                    Ok(ReadStatus::WouldBlock)
                }
                Err(err) => Err(TransportError::Io(err)),
            };
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }

        let mut offset = 0usize;
        while offset < bytes.len() {
            match self.write_raw(&bytes[offset..]) {
                Ok(0) => return Err(TransportError::Io(ErrorKind::WriteZero.into())),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }

        loop {
            match self.flush_raw() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        self.connected = false;
        let result = match &self.inner {
            StreamInner::Tcp(stream) => stream.shutdown(Shutdown::Both),
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.shutdown(Shutdown::Both),
        };
        match result {
            Ok(()) => Ok(()),
            // Already torn down by the other half or the peer.
            Err(err) if err.kind() == ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(TransportError::Io(err)),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn try_clone_box(&self) -> Result<Box<dyn Transport>> {
        let inner = match &self.inner {
            StreamInner::Tcp(stream) => StreamInner::Tcp(stream.try_clone()?),
            #[cfg(unix)]
            StreamInner::Unix(stream) => StreamInner::Unix(stream.try_clone()?),
        };
        Ok(Box::new(Self {
            inner,
            connected: self.connected,
        }))
    }

    fn transport_name(&self) -> &'static str {
        match &self.inner {
            StreamInner::Tcp(_) => "tcp",
            #[cfg(unix)]
            StreamInner::Unix(_) => "unix-domain-socket",
        }
    }
}

impl std::fmt::Debug for StreamTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport")
            .field("type", &self.transport_name())
            .field("connected", &self.connected)
            .finish()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn pair_roundtrip() {
        let (mut left, mut right) = StreamTransport::pair().unwrap();
        left.write_all(b"hello").unwrap();

        let mut buf = [0u8; 16];
        let mut got = Vec::new();
        while got.len() < 5 {
            match right.read(&mut buf).unwrap() {
                ReadStatus::Data(n) => got.extend_from_slice(&buf[..n]),
                ReadStatus::WouldBlock => continue,
                ReadStatus::Closed => panic!("unexpected close"),
            }
        }
        assert_eq!(got, b"hello");
    }

    #[test]
    fn idle_read_reports_would_block() {
        let (_left, mut right) = StreamTransport::pair().unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(right.read(&mut buf).unwrap(), ReadStatus::WouldBlock);
    }

    #[test]
    fn close_is_observed_by_peer() {
        let (mut left, mut right) = StreamTransport::pair().unwrap();
        left.close().unwrap();
        assert!(!left.is_connected());

        let mut buf = [0u8; 4];
        let status = loop {
            match right.read(&mut buf).unwrap() {
                ReadStatus::WouldBlock => continue,
                other => break other,
            }
        };
        assert_eq!(status, ReadStatus::Closed);
        assert!(!right.is_connected());
        assert!(matches!(
            right.read(&mut buf),
            Err(TransportError::NotConnected)
        ));
    }

    #[test]
    fn cloned_half_shares_connection() {
        let (left, mut right) = StreamTransport::pair().unwrap();
        let mut writer = left.try_clone_box().unwrap();
        writer.write_all(b"xy").unwrap();
        drop(left);

        let mut buf = [0u8; 2];
        let mut got = Vec::new();
        while got.len() < 2 {
            if let ReadStatus::Data(n) = right.read(&mut buf).unwrap() {
                got.extend_from_slice(&buf[..n]);
            }
        }
        assert_eq!(got, b"xy");
        assert_eq!(writer.transport_name(), "unix-domain-socket");
    }
}
