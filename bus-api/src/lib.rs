#![warn(missing_docs)]
//! Abstraction over the underlying publish/subscribe transport.
//!
//! The middleware above this crate only needs named channels carrying opaque
//! byte payloads with best-effort, multicast delivery. Everything transport
//! specific lives behind the [`Bus`] trait so the same endpoints run over an
//! in-process bus in tests and over a real server in deployments.

mod bus_mem;
mod bus_nats;

pub use bus_mem::MemoryBus;
pub use bus_nats::NatsBus;

use async_trait::async_trait;
use dyn_clonable::clonable;
use snafu::Snafu;

/// Result wrapper for bus operations
pub type BusResult<T> = Result<T, Error>;

/// Common error type for bus operations
#[derive(Debug, Snafu)]
#[snafu(visibility = "pub(crate)")]
#[allow(missing_docs)]
pub enum Error {
    #[snafu(display("Failed to publish on channel '{}'", channel))]
    Publish {
        channel: String,
        source: std::io::Error,
    },
    #[snafu(display("Failed to subscribe to channel '{}'", channel))]
    Subscribe {
        channel: String,
        source: std::io::Error,
    },
    #[snafu(display("Failed to unsubscribe from channel '{}'", channel))]
    Unsubscribe {
        channel: String,
        source: std::io::Error,
    },
}

/// A raw message delivered by the bus.
#[derive(Debug, Clone)]
pub struct BusMessage {
    /// channel the message was published on
    pub channel: String,
    /// opaque payload bytes
    pub payload: Vec<u8>,
}

/// Live subscription to a single channel.
#[async_trait]
pub trait BusSubscription: Send {
    /// Next message, or `None` once the subscription is closed.
    async fn next(&mut self) -> Option<BusMessage>;
    /// Detach from the bus. Idempotent.
    async fn unsubscribe(&mut self) -> BusResult<()>;
}

/// Save on typing
pub type DynSubscription = Box<dyn BusSubscription>;

/// Messaging bus trait with multicast publish/subscribe semantics: every
/// subscriber of a channel receives every message published to it, with no
/// delivery guarantee.
#[async_trait]
#[clonable]
pub trait Bus: Clone + Send + Sync {
    /// Publish a message - not guaranteed to be sent or received (fire and
    /// forget).
    async fn publish(&self, channel: &str, payload: &[u8]) -> BusResult<()>;
    /// Create a subscription on the given channel which can be polled for
    /// messages until it is either explicitly closed or dropped.
    async fn subscribe(&self, channel: &str) -> BusResult<DynSubscription>;
}

/// Save on typing
pub type DynBus = Box<dyn Bus>;
