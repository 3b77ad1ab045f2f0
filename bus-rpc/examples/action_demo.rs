//! Action demo: a trajectory execution goal with streaming feedback.
//!
//! Run `action_demo server` in one terminal, then `action_demo client` or
//! `action_demo cancel-client` in another.

use bus_api::NatsBus;
use bus_rpc::{
    impl_action_feedback, impl_action_goal, impl_action_result, runtime_init, ActionClient,
    ActionServer, ActionStatus, GoalContext, GoalError, Header,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use structopt::StructOpt;
use tracing::{info, warn};

#[derive(Debug, StructOpt)]
struct CliArgs {
    /// The Nats server URL to connect to
    #[structopt(long, short, default_value = "nats://127.0.0.1:4222")]
    url: String,

    /// The action channel to serve/call
    #[structopt(long, short, default_value = "/demo_robot/follow_trajectory")]
    channel: String,

    #[structopt(subcommand)]
    role: Role,
}

#[derive(Debug, StructOpt)]
enum Role {
    /// Execute trajectory goals
    Server,
    /// Send a goal and wait for the result
    Client,
    /// Send a goal and cancel it halfway through
    CancelClient,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
struct TrajectoryGoal {
    header: Header,
    num_joints: u32,
    joint_names: Vec<String>,
    num_points: u32,
}
impl_action_goal!(TrajectoryGoal);

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
struct TrajectoryFeedback {
    header: Header,
    current_point: u32,
    progress: f64,
    error: f64,
}
impl_action_feedback!(TrajectoryFeedback);

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
struct TrajectoryResult {
    status: ActionStatus,
    final_error: f64,
    execution_time: f64,
}
impl_action_result!(TrajectoryResult, status);

async fn follow_trajectory(
    context: GoalContext<TrajectoryFeedback>,
    goal: TrajectoryGoal,
) -> Result<TrajectoryResult, GoalError> {
    info!("Executing trajectory with {} points", goal.num_points);
    for point in 0 .. goal.num_points {
        if context.is_cancelled() {
            return Err(GoalError::canceled(format!("stopped at point {}", point)));
        }
        let mut feedback = TrajectoryFeedback::default();
        feedback.current_point = point;
        feedback.progress = f64::from(point + 1) / f64::from(goal.num_points);
        feedback.error = 0.01 * f64::from(point + 1);
        context
            .send_feedback(&feedback)
            .await
            .map_err(|error| GoalError::failed(error.to_string()))?;
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let mut result = TrajectoryResult::default();
    result.final_error = 0.001;
    result.execution_time = f64::from(goal.num_points) * 0.05;
    Ok(result)
}

fn demo_goal(num_points: u32) -> TrajectoryGoal {
    let mut goal = TrajectoryGoal::default();
    goal.num_joints = 6;
    goal.joint_names = (1 ..= 6).map(|joint| format!("joint{}", joint)).collect();
    goal.num_points = num_points;
    goal
}

fn init_tracing() {
    if let Ok(filter) = tracing_subscriber::EnvFilter::try_from_default_env() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter("info").init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = CliArgs::from_args();
    let bus = NatsBus::connect(&args.url).await;
    let runtime = runtime_init(bus.boxed());

    match args.role {
        Role::Server => {
            let server = ActionServer::new(&runtime, &args.channel, follow_trajectory)?;
            info!("Starting action server...");
            server.spin().await?;
        }
        Role::Client => {
            let client = ActionClient::<TrajectoryGoal, TrajectoryFeedback, TrajectoryResult>::new(
                &runtime,
                &args.channel,
                Some("traj_client"),
            )?;
            let handle = client.send_goal(&demo_goal(50)).await?;
            handle.add_feedback_callback(|feedback: TrajectoryFeedback| {
                info!(
                    "Progress: {:.1}%, Point: {}, Error: {:.3}",
                    feedback.progress * 100.0,
                    feedback.current_point,
                    feedback.error
                );
            });

            info!("Waiting for trajectory completion...");
            let result = handle.get_result_timeout(Duration::from_secs(10)).await?;
            info!(
                "Trajectory completed! Final error: {:.3}, Time: {:.1}s",
                result.final_error, result.execution_time
            );
        }
        Role::CancelClient => {
            let client = ActionClient::<TrajectoryGoal, TrajectoryFeedback, TrajectoryResult>::new(
                &runtime,
                &args.channel,
                Some("cancel_client_16"),
            )?;
            let handle = client.send_goal(&demo_goal(10)).await?;
            let mut feedback = handle.feedback_stream();
            while let Some(update) = feedback.recv().await {
                info!("Progress: {:.1}%", update.progress * 100.0);
                if update.progress > 0.5 {
                    info!("Cancelling goal {}...", handle.goal_id());
                    handle.cancel().await?;
                    break;
                }
            }
            match handle.get_result_timeout(Duration::from_secs(5)).await {
                Ok(result) => warn!(
                    "Goal finished before the cancel took effect (final error {:.3})",
                    result.final_error
                ),
                Err(error) => info!("Goal ended: {}", error),
            }
        }
    }
    Ok(())
}
