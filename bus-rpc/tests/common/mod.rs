//! Shared fixtures for the integration tests: demo message types and an
//! in-process bus with one runtime per simulated process.
#![allow(dead_code)]

use bus_api::MemoryBus;
use bus_rpc::{
    impl_action_feedback, impl_action_goal, impl_action_result, impl_service_request,
    impl_service_response, ActionStatus, Header, ResponseHeader, Runtime,
};
use serde::{Deserialize, Serialize};

pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// One bus, one runtime for the "server process", one for the "client
/// process".
pub fn bus_and_runtimes() -> (MemoryBus, Runtime, Runtime) {
    let bus = MemoryBus::new();
    let server = Runtime::new(bus.boxed());
    let client = Runtime::new(bus.boxed());
    (bus, server, client)
}

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct AddNumbersRequest {
    pub header: Header,
    pub a: f64,
    pub b: f64,
}
impl_service_request!(AddNumbersRequest);

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct AddNumbersResponse {
    pub response_header: ResponseHeader,
    pub sum: f64,
}
impl_service_response!(AddNumbersResponse);

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct TrajectoryGoal {
    pub header: Header,
    pub num_points: u32,
}
impl_action_goal!(TrajectoryGoal);

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct TrajectoryFeedback {
    pub header: Header,
    pub current_point: u32,
    pub progress: f64,
}
impl_action_feedback!(TrajectoryFeedback);

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct TrajectoryResult {
    pub status: ActionStatus,
    pub final_error: f64,
    pub execution_time: f64,
}
impl_action_result!(TrajectoryResult, status);

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct GripGoal {
    pub header: Header,
    pub width: f64,
    pub force: f64,
}
impl_action_goal!(GripGoal);

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct GripFeedback {
    pub header: Header,
    pub width: f64,
}
impl_action_feedback!(GripFeedback);

/// Result variant correlated through a `ResponseHeader` instead of an
/// `ActionStatus` block.
#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct GripResult {
    pub response_header: ResponseHeader,
    pub final_width: f64,
}
impl_action_result!(GripResult, response_header);
