//! Core wire types and the capability traits every endpoint is generic over.
//!
//! Encoded payloads are the message type's 8-byte big-endian fingerprint
//! followed by the json body. The middleware never inspects payloads on the
//! wire; type safety comes from matching types to channels on both ends, with
//! the fingerprint as a decode-time guard against mismatched channels.

use crate::error::{self, Error};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use snafu::ResultExt;
use std::{
    convert::TryFrom,
    fmt::Debug,
    time::{SystemTime, UNIX_EPOCH},
};
use strum_macros::{EnumString, ToString};

/// FNV-1a fingerprint of a message type name, computed at compile time.
pub const fn type_fingerprint(name: &str) -> u64 {
    let bytes = name.as_bytes();
    let mut hash = 0xcbf2_9ce4_8422_2325_u64;
    let mut index = 0;
    while index < bytes.len() {
        hash ^= bytes[index] as u64;
        hash = hash.wrapping_mul(0x100_0000_01b3);
        index += 1;
    }
    hash
}

/// Microseconds since the unix epoch.
pub(crate) fn now_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_micros() as i64)
        .unwrap_or(0)
}

/// Correlation prefix carried by requests, goals, feedback and cancels.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct Header {
    /// microseconds since the unix epoch, stamped at transmit time
    pub timestamp_us: i64,
    /// correlation key, unique per sending endpoint
    pub id: String,
}

impl Header {
    /// Stamp the header with the given correlation id and the current time.
    pub fn stamp(&mut self, id: impl Into<String>) {
        self.id = id.into();
        self.timestamp_us = now_micros();
    }
}

/// Outcome prefix of every service response; also usable as the terminal
/// block of action results.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct ResponseHeader {
    /// header copied from the triggering request (same id, fresh timestamp)
    pub header: Header,
    /// whether the request was handled successfully
    pub success: bool,
    /// empty iff `success` is true
    pub error_message: String,
}

/// Lifecycle state of an action goal.
///
/// Only `Succeeded`, `Aborted` and `Canceled` ever travel inside a result;
/// `Accepted` and `Executing` are client-side transients.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, EnumString, ToString, Eq, PartialEq,
)]
#[serde(try_from = "i32", into = "i32")]
pub enum GoalStatus {
    /// goal registered, no feedback seen yet
    Accepted = 1,
    /// feedback has been observed for the goal
    Executing = 2,
    /// the handler produced a result
    Succeeded = 3,
    /// the handler failed
    Aborted = 4,
    /// the handler honoured a cancellation request
    Canceled = 5,
}

impl Default for GoalStatus {
    fn default() -> Self {
        GoalStatus::Accepted
    }
}

impl From<GoalStatus> for i32 {
    fn from(status: GoalStatus) -> Self {
        status as i32
    }
}

impl TryFrom<i32> for GoalStatus {
    type Error = String;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(GoalStatus::Accepted),
            2 => Ok(GoalStatus::Executing),
            3 => Ok(GoalStatus::Succeeded),
            4 => Ok(GoalStatus::Aborted),
            5 => Ok(GoalStatus::Canceled),
            _ => Err(format!("unknown goal status code {}", code)),
        }
    }
}

/// Status block embedded in action results.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct ActionStatus {
    /// header carrying the goal's correlation id
    pub header: Header,
    /// terminal status of the goal
    pub status: GoalStatus,
    /// human-readable detail, empty on success
    pub message: String,
}

/// Cooperative cancellation request for a single goal.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct ActionCancel {
    /// header carrying the goal's correlation id
    pub header: Header,
    /// the goal to cancel; must equal `header.id`
    pub goal_id: String,
}

/// Encode/decode capability of every bus payload.
pub trait Message:
    Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static
{
    /// Type name fed into the fingerprint; unique per message type.
    const TYPE_NAME: &'static str;

    /// The 8-byte fingerprint prefixed to every encoded payload.
    fn fingerprint() -> u64 {
        type_fingerprint(Self::TYPE_NAME)
    }

    /// Encode into the wire representation.
    fn encode(&self) -> Result<Vec<u8>, Error> {
        let mut payload = Self::fingerprint().to_be_bytes().to_vec();
        let body = serde_json::to_vec(self).context(error::EncodeMessage {
            type_name: Self::TYPE_NAME,
        })?;
        payload.extend(body);
        Ok(payload)
    }

    /// Decode from the wire representation, checking the fingerprint.
    fn decode(payload: &[u8]) -> Result<Self, Error> {
        if payload.len() < 8 {
            return error::BadFingerprint {
                type_name: Self::TYPE_NAME,
            }
            .fail();
        }
        let (prefix, body) = payload.split_at(8);
        let mut fingerprint = [0u8; 8];
        fingerprint.copy_from_slice(prefix);
        if u64::from_be_bytes(fingerprint) != Self::fingerprint() {
            return error::BadFingerprint {
                type_name: Self::TYPE_NAME,
            }
            .fail();
        }
        serde_json::from_slice(body).context(error::DecodeMessage {
            type_name: Self::TYPE_NAME,
        })
    }
}

/// Messages carrying the correlation [`Header`] prefix.
pub trait Correlated: Message {
    /// read access to the correlation header
    fn header(&self) -> &Header;
    /// write access to the correlation header
    fn header_mut(&mut self) -> &mut Header;
}

/// Request half of a service exchange.
pub trait ServiceRequest: Correlated + Default {}

/// Response half of a service exchange.
pub trait ServiceResponse: Message + Default {
    /// read access to the outcome block
    fn response_header(&self) -> &ResponseHeader;
    /// write access to the outcome block
    fn response_header_mut(&mut self) -> &mut ResponseHeader;
}

/// Goal message starting an action.
pub trait ActionGoal: Correlated + Default {}

/// Feedback streamed while a goal executes.
pub trait ActionFeedback: Correlated + Default {}

/// Terminal result of an action goal.
///
/// A result type carries an [`ActionStatus`] block, a [`ResponseHeader`]
/// block, or both; types providing neither are rejected at endpoint
/// construction.
pub trait ActionResult: Message + Default {
    /// the status block, when the type carries one
    fn status(&self) -> Option<&ActionStatus> {
        None
    }
    /// write access to the status block, when the type carries one
    fn status_mut(&mut self) -> Option<&mut ActionStatus> {
        None
    }
    /// the response header block, when the type carries one
    fn response_header(&self) -> Option<&ResponseHeader> {
        None
    }
    /// write access to the response header block, when the type carries one
    fn response_header_mut(&mut self) -> Option<&mut ResponseHeader> {
        None
    }
}

impl Message for ActionCancel {
    const TYPE_NAME: &'static str = "core.ActionCancel";
}

/// Implement [`Message`] for a type, fingerprinting it by its own name, or by
/// an explicit name when the second form is used.
#[macro_export]
macro_rules! impl_message {
    ($T:ident) => {
        impl $crate::Message for $T {
            const TYPE_NAME: &'static str = stringify!($T);
        }
    };
    ($T:ident, $name:expr) => {
        impl $crate::Message for $T {
            const TYPE_NAME: &'static str = $name;
        }
    };
}

/// Implement [`Correlated`] for a type with a `header: Header` field.
#[macro_export]
macro_rules! impl_correlated {
    ($T:ident) => {
        impl $crate::Correlated for $T {
            fn header(&self) -> &$crate::Header {
                &self.header
            }
            fn header_mut(&mut self) -> &mut $crate::Header {
                &mut self.header
            }
        }
    };
}

/// Implement the service request traits for a type with a `header` field.
#[macro_export]
macro_rules! impl_service_request {
    ($T:ident) => {
        $crate::impl_message!($T);
        $crate::impl_correlated!($T);
        impl $crate::ServiceRequest for $T {}
    };
}

/// Implement the service response traits for a type with a
/// `response_header: ResponseHeader` field.
#[macro_export]
macro_rules! impl_service_response {
    ($T:ident) => {
        $crate::impl_message!($T);
        impl $crate::ServiceResponse for $T {
            fn response_header(&self) -> &$crate::ResponseHeader {
                &self.response_header
            }
            fn response_header_mut(&mut self) -> &mut $crate::ResponseHeader {
                &mut self.response_header
            }
        }
    };
}

/// Implement the action goal traits for a type with a `header` field.
#[macro_export]
macro_rules! impl_action_goal {
    ($T:ident) => {
        $crate::impl_message!($T);
        $crate::impl_correlated!($T);
        impl $crate::ActionGoal for $T {}
    };
}

/// Implement the action feedback traits for a type with a `header` field.
#[macro_export]
macro_rules! impl_action_feedback {
    ($T:ident) => {
        $crate::impl_message!($T);
        $crate::impl_correlated!($T);
        impl $crate::ActionFeedback for $T {}
    };
}

/// Implement the action result traits for a type carrying either a
/// `status: ActionStatus` field or a `response_header: ResponseHeader` field.
#[macro_export]
macro_rules! impl_action_result {
    ($T:ident, status) => {
        $crate::impl_message!($T);
        impl $crate::ActionResult for $T {
            fn status(&self) -> Option<&$crate::ActionStatus> {
                Some(&self.status)
            }
            fn status_mut(&mut self) -> Option<&mut $crate::ActionStatus> {
                Some(&mut self.status)
            }
        }
    };
    ($T:ident, response_header) => {
        $crate::impl_message!($T);
        impl $crate::ActionResult for $T {
            fn response_header(&self) -> Option<&$crate::ResponseHeader> {
                Some(&self.response_header)
            }
            fn response_header_mut(&mut self) -> Option<&mut $crate::ResponseHeader> {
                Some(&mut self.response_header)
            }
        }
    };
}
