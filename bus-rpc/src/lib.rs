#![warn(missing_docs)]
//! Typed RPC patterns layered on top of a best-effort publish/subscribe bus.
//!
//! Three communication patterns share one [`Runtime`] (the bus handle plus a
//! single dispatch worker):
//!
//! * **Topic** - one-way typed publish/subscribe
//!   ([`TopicPublisher`]/[`TopicSubscriber`])
//! * **Service** - request/response with per-call correlation ids and
//!   per-call response channels ([`ServiceClient`]/[`ServiceServer`])
//! * **Action** - long-running goals with streaming feedback, terminal
//!   results and cooperative cancellation
//!   ([`ActionClient`]/[`ActionServer`])
//!
//! Message types are plain serde structs wired up with the `impl_*` macros;
//! the bus itself stays opaque behind the [`bus_api::Bus`] trait.

mod action;
mod contract;
mod error;
mod message;
pub mod names;
mod runtime;
mod service;
mod topic;

pub use bus_api;

pub use action::{ActionClient, ActionHandle, ActionServer, GoalContext};
pub use error::{Error, GoalError, HandlerError, RpcResult};
pub use message::{
    type_fingerprint, ActionCancel, ActionFeedback, ActionGoal, ActionResult, ActionStatus,
    Correlated, GoalStatus, Header, Message, ResponseHeader, ServiceRequest, ServiceResponse,
};
pub use runtime::{runtime, runtime_init, Runtime};
pub use service::{ServiceClient, ServiceServer, DEFAULT_CALL_TIMEOUT};
pub use topic::{TopicPublisher, TopicSubscriber};
