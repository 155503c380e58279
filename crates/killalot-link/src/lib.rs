//! Threaded link management for Killalot.
//!
//! A [`TransportManager`] owns one transport at a time. It queues outgoing
//! transactions by priority, drains them onto the wire from a write pump,
//! and decodes everything the peer sends on a read pump, reporting to a
//! [`LinkListener`].

pub mod config;
pub mod error;
pub mod listener;
pub mod manager;
pub mod queue;

pub use config::{
    LinkConfig, DEFAULT_POLL_INTERVAL, DEFAULT_QUEUE_CAPACITY, DEFAULT_READ_CHUNK_SIZE,
};
pub use error::{LinkError, Result};
pub use listener::LinkListener;
pub use manager::{ConnectionState, TransportManager};
pub use queue::OutgoingQueue;
