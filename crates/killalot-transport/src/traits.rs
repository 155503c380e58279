use std::time::Duration;

use crate::error::Result;

/// Outcome of a single non-blocking read attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// `n` bytes were copied into the caller's buffer.
    Data(usize),
    /// Nothing is available right now; try again later.
    WouldBlock,
    /// The remote end closed the stream.
    Closed,
}

/// A connected, byte-oriented transport.
///
/// The link layer splits a transport into a read half and a write half with
/// [`Transport::try_clone_box`] so the read pump and the write path never
/// contend for the same handle.
pub trait Transport: Send {
    /// Read whatever is available without blocking indefinitely.
    fn read(&mut self, buf: &mut [u8]) -> Result<ReadStatus>;

    /// Write the complete buffer (blocking).
    fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    /// Close the transport. Both halves observe the close.
    fn close(&mut self) -> Result<()>;

    /// Whether the transport is still usable.
    fn is_connected(&self) -> bool;

    /// Create another handle to the same underlying connection.
    fn try_clone_box(&self) -> Result<Box<dyn Transport>>;

    /// Suspend until data may be readable or `timeout` elapses.
    ///
    /// The default is the polling contract: sleep for `timeout` and let the
    /// caller retry. Transports with readiness notification wake early.
    fn wait_readable(&mut self, timeout: Duration) -> Result<()> {
        std::thread::sleep(timeout);
        Ok(())
    }

    /// Short name for diagnostics.
    fn transport_name(&self) -> &'static str;
}

impl Transport for Box<dyn Transport> {
    fn read(&mut self, buf: &mut [u8]) -> Result<ReadStatus> {
        (**self).read(buf)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write_all(bytes)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn try_clone_box(&self) -> Result<Box<dyn Transport>> {
        (**self).try_clone_box()
    }

    fn wait_readable(&mut self, timeout: Duration) -> Result<()> {
        (**self).wait_readable(timeout)
    }

    fn transport_name(&self) -> &'static str {
        (**self).transport_name()
    }
}

/// Establishes transport connections on behalf of the link layer.
pub trait Connector: Send + Sync {
    /// Perform a (blocking) connection attempt.
    fn connect(&self) -> Result<Box<dyn Transport>>;

    /// Human-readable target, used in logs and errors.
    fn describe(&self) -> String;

    /// An OS-mediated prerequisite the application must satisfy before
    /// connecting (e.g. enabling a radio). `None` for plain sockets.
    fn required_intent(&self) -> Option<&str> {
        None
    }
}

impl Connector for Box<dyn Connector> {
    fn connect(&self) -> Result<Box<dyn Transport>> {
        (**self).connect()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }

    fn required_intent(&self) -> Option<&str> {
        (**self).required_intent()
    }
}
