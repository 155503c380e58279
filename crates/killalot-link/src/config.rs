use std::time::Duration;

/// Default idle wait between reads.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default bound on queued outgoing transactions.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Default read buffer size.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 256;

/// Configuration for a [`crate::TransportManager`].
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// How long the read pump idles when no bytes are available, and how
    /// long the write pump waits for new frames before rechecking its flag.
    pub poll_interval: Duration,
    /// Most transactions the outgoing queue holds. Default: 64.
    pub queue_capacity: usize,
    /// Bytes requested per transport read. Default: 256.
    pub read_chunk_size: usize,
    /// Run a write pump that sends frames as they are queued. When off,
    /// frames go out only through [`crate::TransportManager::flush`].
    pub auto_drain: bool,
    /// Largest image or binary message accepted from the peer, in bytes.
    /// Larger heads are reported as errors. Default: no limit.
    pub receive_limit: Option<usize>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            auto_drain: true,
            receive_limit: None,
        }
    }
}
