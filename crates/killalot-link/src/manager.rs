use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use killalot_protocol::{assemble, OutgoingTransaction, Payload, ProtocolDecoder};
use killalot_transport::{Connector, ReadStatus, Transport};
use tracing::{debug, info, trace, warn};

use crate::config::LinkConfig;
use crate::error::{LinkError, Result};
use crate::listener::LinkListener;
use crate::queue::OutgoingQueue;

/// Where the link is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Moves transactions and decoded messages between the application and one
/// transport.
///
/// Once connected, a read pump thread feeds transport bytes through a
/// [`ProtocolDecoder`] into the listener, and (with
/// [`LinkConfig::auto_drain`]) a write pump thread sends queued frames.
/// Cloning yields another handle to the same link.
pub struct TransportManager<L: LinkListener> {
    shared: Arc<Shared<L>>,
}

impl<L: LinkListener> Clone for TransportManager<L> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

struct Shared<L> {
    config: LinkConfig,
    state: Mutex<ConnectionState>,
    queue: OutgoingQueue,
    listener: Mutex<L>,
    connector: Mutex<Option<Arc<dyn Connector>>>,
    writer: Mutex<Option<Box<dyn Transport>>>,
    // Separate handle so a write blocked inside `writer` can be shut down.
    closer: Mutex<Option<Box<dyn Transport>>>,
    reading: AtomicBool,
    writing: AtomicBool,
    pumps: Mutex<Pumps>,
}

#[derive(Default)]
struct Pumps {
    read: Option<JoinHandle<()>>,
    write: Option<JoinHandle<()>>,
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn spawn_pump<F>(name: &'static str, body: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    #[cfg(test)]
    {
        if tests::REFUSE_SPAWN.with(|refused| refused.get() == Some(name)) {
            return Err(LinkError::Spawn {
                name,
                source: std::io::Error::other("spawn refused"),
            });
        }
    }
    thread::Builder::new()
        .name(format!("killalot-{}", name.replace(' ', "-")))
        .spawn(body)
        .map_err(|source| LinkError::Spawn { name, source })
}

impl<L: LinkListener> TransportManager<L> {
    pub fn new(listener: L, config: LinkConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: OutgoingQueue::new(config.queue_capacity),
                config,
                state: Mutex::new(ConnectionState::Disconnected),
                listener: Mutex::new(listener),
                connector: Mutex::new(None),
                writer: Mutex::new(None),
                closer: Mutex::new(None),
                reading: AtomicBool::new(false),
                writing: AtomicBool::new(false),
                pumps: Mutex::new(Pumps::default()),
            }),
        }
    }

    /// Set the connector used by [`Self::connect`].
    pub fn with_connector(self, connector: impl Connector + 'static) -> Self {
        self.shared.set_connector(Arc::new(connector));
        self
    }

    pub fn config(&self) -> &LinkConfig {
        &self.shared.config
    }

    pub fn state(&self) -> ConnectionState {
        *lock(&self.shared.state)
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Whether the read pump is running.
    pub fn is_reading(&self) -> bool {
        self.shared.reading.load(Ordering::Acquire)
    }

    /// Exclusive access to the listener.
    ///
    /// Holding the guard blocks the pumps' callbacks.
    pub fn listener(&self) -> MutexGuard<'_, L> {
        lock(&self.shared.listener)
    }

    /// Describe the configured connector, if any.
    pub fn connector_description(&self) -> Option<String> {
        lock(&self.shared.connector).as_ref().map(|c| c.describe())
    }

    /// Replace the connector. Rejected while the read pump runs.
    pub fn change_connector(&self, connector: impl Connector + 'static) -> bool {
        if self.is_reading() {
            debug!("connector change rejected while reading");
            return false;
        }
        self.shared.set_connector(Arc::new(connector));
        true
    }

    /// Start connecting on a background thread.
    ///
    /// The outcome is reported through [`LinkListener::on_connect_success`]
    /// or [`LinkListener::on_connect_failure`].
    pub fn connect(&self) -> Result<JoinHandle<()>> {
        let connector = lock(&self.shared.connector)
            .clone()
            .ok_or(LinkError::NoConnector)?;

        {
            let mut state = lock(&self.shared.state);
            if *state != ConnectionState::Disconnected {
                return Err(LinkError::AlreadyConnected);
            }
            *state = ConnectionState::Connecting;
        }

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("killalot-connect".into())
            .spawn(move || Shared::run_connect(&shared, connector.as_ref()));

        spawned.map_err(|source| {
            *lock(&self.shared.state) = ConnectionState::Disconnected;
            LinkError::Spawn {
                name: "connect",
                source,
            }
        })
    }

    /// Adopt an already-connected transport, e.g. one accepted by a listener.
    pub fn attach(&self, transport: Box<dyn Transport>) -> Result<()> {
        {
            let mut state = lock(&self.shared.state);
            if *state != ConnectionState::Disconnected {
                return Err(LinkError::AlreadyConnected);
            }
            *state = ConnectionState::Connecting;
        }
        Shared::establish(&self.shared, transport).inspect_err(|_| {
            *lock(&self.shared.state) = ConnectionState::Disconnected;
        })
    }

    /// Restart the pumps after [`Self::stop`] on a still-connected link.
    pub fn start(&self) -> Result<()> {
        if !self.is_connected() {
            return Err(LinkError::NotConnected);
        }
        if self.is_reading() {
            return Err(LinkError::PumpRunning);
        }
        let reader = lock(&self.shared.writer)
            .as_ref()
            .ok_or(LinkError::NotConnected)?
            .try_clone_box()?;
        Shared::start_pumps(&self.shared, reader)
    }

    /// Stop both pumps and wait for them, leaving the transport open.
    pub fn stop(&self) {
        self.shared.stop_pumps();
    }

    /// Close the transport, stop the pumps and report `error`, if any.
    ///
    /// Queued transactions are kept. Calling this on a link that is already
    /// disconnected does nothing.
    pub fn disconnect(&self, error: Option<LinkError>) {
        self.shared.disconnect(error);
    }

    /// Queue a transaction. False when the queue is full or the name is taken.
    pub fn enqueue(&self, tx: OutgoingTransaction) -> bool {
        self.shared.queue.enqueue(tx)
    }

    /// Queue a transaction, explaining a rejection.
    pub fn try_enqueue(&self, tx: OutgoingTransaction) -> Result<()> {
        self.shared.queue.try_enqueue(tx)
    }

    /// Assemble `payload` and queue it under `name`.
    pub fn send(&self, name: impl Into<String>, payload: &Payload) -> Result<()> {
        let tx = assemble(name, payload)?;
        self.shared.queue.try_enqueue(tx)
    }

    /// Remove a queued transaction that has not started sending.
    pub fn remove(&self, name: &str) -> bool {
        self.shared.queue.remove(name)
    }

    /// Queued transactions in the order they will be sent.
    pub fn snapshot(&self) -> Vec<OutgoingTransaction> {
        self.shared.queue.snapshot()
    }

    /// Take the next frame without sending it.
    pub fn drain_next_frame(&self) -> Option<Bytes> {
        self.shared.queue.drain_next_frame()
    }

    pub fn queue_len(&self) -> usize {
        self.shared.queue.len()
    }

    /// Send every queued frame on the calling thread.
    ///
    /// Returns the number of frames written. A write failure disconnects
    /// the link and is returned.
    pub fn flush(&self) -> Result<usize> {
        let mut written = 0;
        loop {
            match self.shared.write_next() {
                Ok(true) => written += 1,
                Ok(false) => return Ok(written),
                Err(err @ LinkError::NotConnected) => return Err(err),
                Err(err) => {
                    warn!(error = %err, "flush failed");
                    self.shared.disconnect(None);
                    return Err(err);
                }
            }
        }
    }
}

impl<L: LinkListener> Shared<L> {
    fn set_connector(&self, connector: Arc<dyn Connector>) {
        debug!(connector = %connector.describe(), "connector set");
        *lock(&self.connector) = Some(connector);
    }

    fn run_connect(shared: &Arc<Self>, connector: &dyn Connector) {
        let peer = connector.describe();
        if let Some(intent) = connector.required_intent() {
            debug!(%peer, intent, "connector requires intent");
            lock(&shared.listener).on_intent_request(intent);
        }

        debug!(%peer, "connecting");
        match connector.connect() {
            Ok(mut transport) => {
                if *lock(&shared.state) != ConnectionState::Connecting {
                    debug!(%peer, "connection no longer wanted");
                    let _ = transport.close();
                    return;
                }
                info!(%peer, "connected");
                if let Err(err) = Self::establish(shared, transport) {
                    *lock(&shared.state) = ConnectionState::Disconnected;
                    lock(&shared.listener).on_connect_failure(err);
                }
            }
            Err(err) => {
                warn!(%peer, error = %err, "connection failed");
                *lock(&shared.state) = ConnectionState::Disconnected;
                lock(&shared.listener).on_connect_failure(err.into());
            }
        }
    }

    fn establish(shared: &Arc<Self>, transport: Box<dyn Transport>) -> Result<()> {
        let reader = transport.try_clone_box()?;
        let closer = transport.try_clone_box()?;
        debug!(transport = transport.transport_name(), "link established");
        *lock(&shared.closer) = Some(closer);
        *lock(&shared.writer) = Some(transport);
        *lock(&shared.state) = ConnectionState::Connected;
        lock(&shared.listener).on_connect_success();
        Self::start_pumps(shared, reader).inspect_err(|_| shared.release_transport())
    }

    /// Start the read pump and, with auto drain, the write pump. If either
    /// fails to spawn, neither is left running.
    fn start_pumps(shared: &Arc<Self>, reader: Box<dyn Transport>) -> Result<()> {
        let mut pumps = lock(&shared.pumps);

        shared.reading.store(true, Ordering::Release);
        let read_shared = Arc::clone(shared);
        match spawn_pump("read pump", move || read_shared.read_loop(reader)) {
            Ok(handle) => pumps.read = Some(handle),
            Err(err) => {
                shared.reading.store(false, Ordering::Release);
                return Err(err);
            }
        }

        if shared.config.auto_drain && !shared.writing.load(Ordering::Acquire) {
            shared.writing.store(true, Ordering::Release);
            let write_shared = Arc::clone(shared);
            match spawn_pump("write pump", move || write_shared.write_loop()) {
                Ok(handle) => pumps.write = Some(handle),
                Err(err) => {
                    drop(pumps);
                    shared.stop_pumps();
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    fn read_loop(self: Arc<Self>, mut transport: Box<dyn Transport>) {
        let mut decoder = match self.config.receive_limit {
            Some(limit) => ProtocolDecoder::new().with_receive_limit(limit),
            None => ProtocolDecoder::new(),
        };
        let mut buf = vec![0u8; self.config.read_chunk_size.max(1)];
        debug!("read pump started");

        while self.reading.load(Ordering::Acquire) {
            let failure = match transport.read(&mut buf) {
                Ok(ReadStatus::Data(n)) => {
                    trace!(bytes = n, "read");
                    let mut listener = lock(&self.listener);
                    decoder.feed(&buf[..n], &mut *listener);
                    continue;
                }
                Ok(ReadStatus::WouldBlock) => {
                    match transport.wait_readable(self.config.poll_interval) {
                        Ok(()) => continue,
                        Err(err) => LinkError::from(err),
                    }
                }
                Ok(ReadStatus::Closed) => LinkError::Disconnected,
                Err(err) => LinkError::from(err),
            };

            if self.reading.load(Ordering::Acquire) {
                warn!(error = %failure, "read pump failed");
                self.disconnect(Some(failure));
            }
            break;
        }

        debug!(stats = ?decoder.stats(), "read pump stopped");
    }

    fn write_loop(self: Arc<Self>) {
        debug!("write pump started");
        while self.writing.load(Ordering::Acquire) {
            if !self.queue.wait_for_frames(self.config.poll_interval) {
                continue;
            }
            match self.write_next() {
                Ok(_) => {}
                Err(LinkError::NotConnected) => break,
                Err(err) => {
                    if self.writing.load(Ordering::Acquire) {
                        warn!(error = %err, "write pump failed");
                        self.disconnect(Some(err));
                    }
                    break;
                }
            }
        }
        debug!("write pump stopped");
    }

    /// Send one frame. The writer lock is held from pop to write so frames
    /// leave in queue order whichever thread sends them.
    fn write_next(&self) -> Result<bool> {
        let mut writer = lock(&self.writer);
        let transport = writer.as_mut().ok_or(LinkError::NotConnected)?;
        let Some(frame) = self.queue.drain_next_frame() else {
            return Ok(false);
        };
        trace!(bytes = frame.len(), "write");
        transport.write_all(&frame)?;
        Ok(true)
    }

    fn stop_pumps(&self) {
        self.reading.store(false, Ordering::Release);
        self.writing.store(false, Ordering::Release);
        self.queue.wake_all();

        let (read, write) = {
            let mut pumps = lock(&self.pumps);
            (pumps.read.take(), pumps.write.take())
        };
        let current = thread::current().id();
        for handle in [read, write].into_iter().flatten() {
            // A pump tearing down its own link cannot join itself.
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                warn!("pump thread panicked");
            }
        }
    }

    /// Close and forget the transport.
    ///
    /// The closer goes first: an in-flight write holds `writer` and only
    /// returns once the socket is shut down underneath it.
    fn release_transport(&self) {
        let closer = lock(&self.closer).take();
        let writer = lock(&self.writer).take();
        for mut transport in [closer, writer].into_iter().flatten() {
            if let Err(err) = transport.close() {
                debug!(error = %err, "close failed");
            }
        }
    }

    fn disconnect(&self, error: Option<LinkError>) {
        let previous =
            std::mem::replace(&mut *lock(&self.state), ConnectionState::Disconnected);

        self.reading.store(false, Ordering::Release);
        self.writing.store(false, Ordering::Release);
        self.release_transport();
        self.stop_pumps();

        if previous == ConnectionState::Disconnected {
            if let Some(err) = error {
                debug!(error = %err, "already disconnected");
            }
            return;
        }

        info!(queued = self.queue.len(), "disconnected");
        let mut listener = lock(&self.listener);
        if let Some(err) = error {
            listener.on_link_error(err);
        }
        listener.on_disconnect();
    }
}
