//! Error types surfaced by the middleware.
//!
//! Errors attributable to caller input fail eagerly at the API boundary.
//! Errors from remote peers travel inside response/result payloads and are
//! rebuilt on the caller side; nothing crosses the wire as an exception.

use crate::message::GoalStatus;
use snafu::Snafu;
use std::time::Duration;

/// Result wrapper for middleware operations
pub type RpcResult<T> = Result<T, Error>;

/// Common error type for all endpoint operations
#[derive(Debug, Snafu)]
#[snafu(visibility = "pub(crate)")]
#[allow(missing_docs)]
pub enum Error {
    #[snafu(display("Type '{}' breaks the message contract: {}", type_name, reason))]
    TypeContract { type_name: String, reason: String },

    #[snafu(display("Invalid channel '{}': {}", channel, reason))]
    InvalidChannel { channel: String, reason: String },

    #[snafu(display("Invalid client name '{}': {}", name, reason))]
    InvalidClientName { name: String, reason: String },

    #[snafu(display("Failed to encode a '{}' message", type_name))]
    EncodeMessage {
        type_name: String,
        source: serde_json::Error,
    },

    #[snafu(display("Failed to decode a '{}' message", type_name))]
    DecodeMessage {
        type_name: String,
        source: serde_json::Error,
    },

    #[snafu(display("Payload does not carry the fingerprint of '{}'", type_name))]
    BadFingerprint { type_name: String },

    #[snafu(display("Failed to publish on channel '{}'", channel))]
    BusPublish {
        channel: String,
        source: bus_api::Error,
    },

    #[snafu(display("Failed to subscribe to channel '{}'", channel))]
    BusSubscribe {
        channel: String,
        source: bus_api::Error,
    },

    #[snafu(display("Service call on '{}' timed out after {:?}", channel, timeout))]
    CallTimeout { channel: String, timeout: Duration },

    #[snafu(display("Service call on '{}' failed: {}", channel, message))]
    ServiceFailed { channel: String, message: String },

    #[snafu(display("Result of goal '{}' timed out after {:?}", goal_id, timeout))]
    ResultTimeout { goal_id: String, timeout: Duration },

    #[snafu(display(
        "Goal '{}' ended with status '{}': {}",
        goal_id,
        status.to_string(),
        message
    ))]
    GoalFailed {
        goal_id: String,
        status: GoalStatus,
        message: String,
    },

    #[snafu(display("Result of goal '{}' was already retrieved", goal_id))]
    ResultConsumed { goal_id: String },

    #[snafu(display("Endpoint for '{}' released exchange '{}' before it completed", channel, id))]
    ClientStopped { channel: String, id: String },
}

/// Error returned by service handlers. Its text is relayed to the caller
/// inside the response header, never as an exception over the wire.
#[derive(Debug, Snafu)]
pub enum HandlerError {
    /// Generic handler failure carrying a message for the caller
    #[snafu(display("{}", message))]
    WithMessage {
        /// relayed as `response_header.error_message`
        message: String,
    },
}

impl HandlerError {
    /// Handler failure with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        HandlerError::WithMessage {
            message: message.into(),
        }
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        HandlerError::WithMessage { message }
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        HandlerError::new(message)
    }
}

/// Terminal failure reported by an action handler.
#[derive(Debug, Snafu)]
pub enum GoalError {
    /// The handler observed the cancellation flag and stopped early; the
    /// goal ends with status `Canceled`.
    #[snafu(display("goal canceled: {}", message))]
    Canceled {
        /// relayed in the result status block
        message: String,
    },
    /// The handler failed; the goal ends with status `Aborted`.
    #[snafu(display("{}", message))]
    Failed {
        /// relayed in the result status block
        message: String,
    },
}

impl GoalError {
    /// Cooperative-cancellation outcome with the given message.
    pub fn canceled(message: impl Into<String>) -> Self {
        GoalError::Canceled {
            message: message.into(),
        }
    }

    /// Handler failure with the given message.
    pub fn failed(message: impl Into<String>) -> Self {
        GoalError::Failed {
            message: message.into(),
        }
    }
}

impl From<String> for GoalError {
    fn from(message: String) -> Self {
        GoalError::Failed { message }
    }
}

impl From<&str> for GoalError {
    fn from(message: &str) -> Self {
        GoalError::failed(message)
    }
}
