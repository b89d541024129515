//! Error types for the real-time module.

use thiserror::Error;

/// Errors that can occur in real-time operations.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Subscription string not understood.
    #[error("invalid subscription: {0}")]
    InvalidSubscription(String),

    /// A filtered subscription without a usable filter.
    #[error("malformed filter payload for {0} subscription")]
    MalformedFilterPayload(String),

    /// An event whose payload does not fit its kind.
    #[error("malformed {0} event")]
    MalformedEvent(String),

    /// Subscription limit exceeded.
    #[error("subscription limit exceeded: max {0} addresses")]
    SubscriptionLimit(usize),

    /// The hub loop is no longer running.
    #[error("websocket hub stopped")]
    HubStopped,

    /// The hub did not accept an event within the producer wait.
    #[error("timed out publishing {0} event")]
    PublishTimeout(String),

    /// The chain data source failed.
    #[error("{0}")]
    Source(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Channel closed.
    #[error("channel closed")]
    ChannelClosed,
}
