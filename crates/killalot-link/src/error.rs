use killalot_protocol::AssemblyError;
use killalot_transport::TransportError;

/// Errors that can occur while running a link.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The payload could not be turned into a transaction.
    #[error("assembly error: {0}")]
    Assembly(#[from] AssemblyError),

    /// The outgoing queue is at capacity.
    #[error("outgoing queue full ({capacity} transactions)")]
    QueueFull { capacity: usize },

    /// A transaction with this name is already queued.
    #[error("transaction {0:?} is already queued")]
    DuplicateName(String),

    /// A connection is already established or being established.
    #[error("already connected")]
    AlreadyConnected,

    /// No connection is established.
    #[error("not connected")]
    NotConnected,

    /// The operation is not allowed while the read pump runs.
    #[error("read pump is running")]
    PumpRunning,

    /// No connector has been configured.
    #[error("no connector configured")]
    NoConnector,

    /// The peer closed the connection.
    #[error("peer disconnected")]
    Disconnected,

    /// A pump thread could not be started.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, LinkError>;
