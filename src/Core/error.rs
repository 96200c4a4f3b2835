//! Error values returned by the queue, pool, channel and node APIs.
//!
//! Every outcome here is an ordinary return value. `QueueFull` and `NotFound`
//! are routine control flow that callers are expected to branch on.

use std::io;

use crate::MQ::node::NodeState;

/// Result type alias for message-queue operations
pub type Result<T> = std::result::Result<T, MqError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MqError {
    /// No free message slot is left (backpressure, not a fault).
    #[error("queue full")]
    QueueFull,

    /// The operation is not valid in the node's current lifecycle state.
    #[error("illegal state: {state:?}")]
    IllegalState { state: NodeState },

    /// A bounded wait expired before anything arrived.
    #[error("timed out")]
    TimedOut,

    /// A wait was interrupted by shutdown.
    #[error("cancelled by shutdown")]
    Cancelled,

    /// A non-blocking receive found nothing.
    #[error("no message available")]
    NotFound,

    /// The handle refers to a message that was already released.
    #[error("message handle expired")]
    Expired,

    /// The channel was closed and accepts no more work.
    #[error("channel closed")]
    Closed,

    #[error("invalid configuration: {parameter} - {message}")]
    InvalidConfig { parameter: String, message: String },
}

impl MqError {
    pub fn illegal_state(state: NodeState) -> Self {
        Self::IllegalState { state }
    }

    pub fn invalid_config(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// True for the "bounded resource is full" outcome.
    pub fn is_backpressure(&self) -> bool {
        matches!(self, Self::QueueFull)
    }

    /// True when the same call may succeed later without any state change by
    /// the caller (the queue drains, a message arrives).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::QueueFull | Self::NotFound | Self::TimedOut)
    }
}

impl From<MqError> for io::Error {
    fn from(err: MqError) -> Self {
        let kind = match &err {
            MqError::QueueFull => io::ErrorKind::WouldBlock,
            MqError::NotFound => io::ErrorKind::WouldBlock,
            MqError::TimedOut => io::ErrorKind::TimedOut,
            MqError::Cancelled | MqError::Closed => io::ErrorKind::BrokenPipe,
            MqError::IllegalState { .. } => io::ErrorKind::NotConnected,
            MqError::Expired => io::ErrorKind::NotFound,
            MqError::InvalidConfig { .. } => io::ErrorKind::InvalidInput,
        };
        io::Error::new(kind, err)
    }
}
