use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::{Buf, BytesMut};

use crate::error::{Result, TransportError};
use crate::traits::{ReadStatus, Transport};

/// In-process transport backed by a pair of byte pipes.
///
/// Unlike socket transports, [`Transport::wait_readable`] is event-driven:
/// a write on the other end wakes the waiting reader immediately.
pub struct MemoryTransport {
    incoming: Arc<Pipe>,
    outgoing: Arc<Pipe>,
}

#[derive(Default)]
struct Pipe {
    state: Mutex<PipeState>,
    readable: Condvar,
}

#[derive(Default)]
struct PipeState {
    data: BytesMut,
    closed: bool,
}

impl Pipe {
    fn lock(&self) -> MutexGuard<'_, PipeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn close(&self) {
        self.lock().closed = true;
        self.readable.notify_all();
    }
}

impl MemoryTransport {
    /// Two connected ends: bytes written to one are read from the other.
    pub fn pair() -> (Self, Self) {
        let a_to_b = Arc::new(Pipe::default());
        let b_to_a = Arc::new(Pipe::default());
        (
            Self {
                incoming: Arc::clone(&b_to_a),
                outgoing: Arc::clone(&a_to_b),
            },
            Self {
                incoming: a_to_b,
                outgoing: b_to_a,
            },
        )
    }

    /// Bytes written by the peer and not yet read.
    pub fn pending(&self) -> usize {
        self.incoming.lock().data.len()
    }
}

impl Transport for MemoryTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<ReadStatus> {
        let mut state = self.incoming.lock();
        if !state.data.is_empty() {
            let n = state.data.len().min(buf.len());
            buf[..n].copy_from_slice(&state.data[..n]);
            state.data.advance(n);
            return Ok(ReadStatus::Data(n));
        }
        if state.closed {
            return Ok(ReadStatus::Closed);
        }
        Ok(ReadStatus::WouldBlock)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let mut state = self.outgoing.lock();
        if state.closed {
            return Err(TransportError::Shutdown);
        }
        state.data.extend_from_slice(bytes);
        drop(state);
        self.outgoing.readable.notify_all();
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.outgoing.close();
        self.incoming.close();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.outgoing.lock().closed
    }

    fn try_clone_box(&self) -> Result<Box<dyn Transport>> {
        Ok(Box::new(Self {
            incoming: Arc::clone(&self.incoming),
            outgoing: Arc::clone(&self.outgoing),
        }))
    }

    fn wait_readable(&mut self, timeout: Duration) -> Result<()> {
        let state = self.incoming.lock();
        if state.data.is_empty() && !state.closed {
            let _ = self
                .incoming
                .readable
                .wait_timeout(state, timeout)
                .unwrap_or_else(PoisonError::into_inner);
        }
        Ok(())
    }

    fn transport_name(&self) -> &'static str {
        "memory"
    }
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("pending", &self.pending())
            .field("connected", &self.is_connected())
            .finish()
    }
}
