//! End-to-end action tests over the in-process bus.

mod common;

use bus_api::Bus;
use bus_rpc::{
    ActionCancel, ActionClient, ActionServer, Error, GoalContext, GoalError, GoalStatus, Message,
};
use common::{
    GripFeedback, GripGoal, GripResult, TrajectoryFeedback, TrajectoryGoal, TrajectoryResult,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type TrajectoryClient = ActionClient<TrajectoryGoal, TrajectoryFeedback, TrajectoryResult>;

/// Trajectory handler pacing itself so feedback drains before the result.
async fn follow_trajectory(
    context: GoalContext<TrajectoryFeedback>,
    goal: TrajectoryGoal,
) -> Result<TrajectoryResult, GoalError> {
    // brief ramp-up so observers attached right after send_goal see every
    // update
    tokio::time::sleep(Duration::from_millis(20)).await;
    for point in 0 .. goal.num_points {
        if context.is_cancelled() {
            return Err(GoalError::canceled(format!("stopped at point {}", point)));
        }
        let mut feedback = TrajectoryFeedback::default();
        feedback.current_point = point;
        feedback.progress = f64::from(point + 1) / f64::from(goal.num_points);
        context
            .send_feedback(&feedback)
            .await
            .map_err(|error| GoalError::failed(error.to_string()))?;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let mut result = TrajectoryResult::default();
    result.final_error = 0.001;
    result.execution_time = f64::from(goal.num_points) * 0.005;
    Ok(result)
}

fn trajectory_goal(num_points: u32) -> TrajectoryGoal {
    let mut goal = TrajectoryGoal::default();
    goal.num_points = num_points;
    goal
}

#[tokio::test]
async fn trajectory_runs_to_completion() {
    common::init_tracing();
    let (_bus, server_runtime, client_runtime) = common::bus_and_runtimes();

    let server = ActionServer::new(&server_runtime, "/robot/follow", follow_trajectory).unwrap();
    server.start().await.unwrap();

    let client = TrajectoryClient::new(&client_runtime, "/robot/follow", Some("traj")).unwrap();
    let handle = client.send_goal(&trajectory_goal(50)).await.unwrap();
    assert_eq!(handle.goal_id(), "traj_1");
    assert_eq!(handle.status(), GoalStatus::Accepted);

    let mut feedback = handle.feedback_stream();
    let mut observed = Vec::new();
    while let Some(update) = feedback.recv().await {
        observed.push(update);
    }

    assert_eq!(observed.len(), 50);
    for (index, update) in observed.iter().enumerate() {
        assert_eq!(update.current_point as usize, index);
        assert!(update.progress > 0.0 && update.progress <= 1.0);
        assert_eq!(update.header.id, handle.goal_id());
    }

    let result = handle
        .get_result_timeout(Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(result.final_error, 0.001);
    assert_eq!(result.status.status, GoalStatus::Succeeded);
    assert_eq!(result.status.header.id, "traj_1");
    assert_eq!(handle.status(), GoalStatus::Succeeded);
}

#[tokio::test]
async fn feedback_callbacks_fire_in_registration_order() {
    common::init_tracing();
    let (_bus, server_runtime, client_runtime) = common::bus_and_runtimes();

    let server = ActionServer::new(&server_runtime, "/robot/follow", follow_trajectory).unwrap();
    server.start().await.unwrap();

    let client = TrajectoryClient::new(&client_runtime, "/robot/follow", None).unwrap();
    let handle = client.send_goal(&trajectory_goal(10)).await.unwrap();

    let log: Arc<Mutex<Vec<(u8, u32)>>> = Default::default();
    let first = log.clone();
    handle.add_feedback_callback(move |update: TrajectoryFeedback| {
        first.lock().unwrap().push((1, update.current_point));
    });
    let second = log.clone();
    handle.add_feedback_callback(move |update: TrajectoryFeedback| {
        second.lock().unwrap().push((2, update.current_point));
    });

    handle
        .get_result_timeout(Duration::from_secs(5))
        .await
        .unwrap();

    let log = log.lock().unwrap();
    assert!(!log.is_empty());
    // for every observed point, callback 1 ran before callback 2
    for pair in log.chunks(2) {
        assert_eq!(pair.len(), 2);
        assert_eq!(pair[0].0, 1);
        assert_eq!(pair[1].0, 2);
        assert_eq!(pair[0].1, pair[1].1);
    }
}

#[tokio::test]
async fn cancel_is_cooperative_and_idempotent() {
    common::init_tracing();
    let (bus, server_runtime, client_runtime) = common::bus_and_runtimes();

    let server = ActionServer::new(&server_runtime, "/robot/follow", follow_trajectory).unwrap();
    server.start().await.unwrap();

    // raw spy on the cancel channel to count published cancel messages
    let mut spy = bus.subscribe("/robot/follow/cancel").await.unwrap();

    let client = TrajectoryClient::new(&client_runtime, "/robot/follow", Some("cancelled")).unwrap();
    let handle = client.send_goal(&trajectory_goal(10)).await.unwrap();

    let mut feedback = handle.feedback_stream();
    while let Some(update) = feedback.recv().await {
        assert_eq!(handle.status(), GoalStatus::Executing);
        if update.progress > 0.5 {
            handle.cancel().await.unwrap();
            handle.cancel().await.unwrap();
            break;
        }
    }
    assert!(handle.is_cancelled());

    let error = handle
        .get_result_timeout(Duration::from_secs(5))
        .await
        .unwrap_err();
    match error {
        Error::GoalFailed { status, .. } => assert_eq!(status, GoalStatus::Canceled),
        other => panic!("expected GoalFailed, got {}", other),
    }
    assert_eq!(handle.status(), GoalStatus::Canceled);

    // terminal goals ignore further cancels
    handle.cancel().await.unwrap();

    let cancel = spy.next().await.unwrap();
    let decoded = ActionCancel::decode(&cancel.payload).unwrap();
    assert_eq!(decoded.goal_id, handle.goal_id());
    assert_eq!(decoded.header.id, handle.goal_id());
    let extra = tokio::time::timeout(Duration::from_millis(100), spy.next()).await;
    assert!(extra.is_err(), "more than one cancel message published");
}

#[tokio::test]
async fn failing_handler_aborts_the_goal() {
    common::init_tracing();
    let (_bus, server_runtime, client_runtime) = common::bus_and_runtimes();

    let server = ActionServer::new(
        &server_runtime,
        "/robot/follow",
        |_context: GoalContext<TrajectoryFeedback>, _goal: TrajectoryGoal| async {
            Err::<TrajectoryResult, _>(GoalError::failed("encoder glitch"))
        },
    )
    .unwrap();
    server.start().await.unwrap();

    let client = TrajectoryClient::new(&client_runtime, "/robot/follow", None).unwrap();
    let handle = client.send_goal(&trajectory_goal(5)).await.unwrap();
    let error = handle
        .get_result_timeout(Duration::from_secs(5))
        .await
        .unwrap_err();
    match error {
        Error::GoalFailed {
            status, message, ..
        } => {
            assert_eq!(status, GoalStatus::Aborted);
            assert!(message.contains("encoder glitch"));
        }
        other => panic!("expected GoalFailed, got {}", other),
    }
}

#[tokio::test]
async fn response_header_results_are_routed_too() {
    common::init_tracing();
    let (_bus, server_runtime, client_runtime) = common::bus_and_runtimes();

    let server = ActionServer::new(
        &server_runtime,
        "/robot/grip",
        |context: GoalContext<GripFeedback>, goal: GripGoal| async move {
            let mut feedback = GripFeedback::default();
            feedback.width = goal.width;
            context
                .send_feedback(&feedback)
                .await
                .map_err(|error| GoalError::failed(error.to_string()))?;
            let mut result = GripResult::default();
            result.final_width = goal.width;
            Ok(result)
        },
    )
    .unwrap();
    server.start().await.unwrap();

    let client = ActionClient::<GripGoal, GripFeedback, GripResult>::new(
        &client_runtime,
        "/robot/grip",
        Some("gripper"),
    )
    .unwrap();
    let mut goal = GripGoal::default();
    goal.width = 0.04;
    let handle = client.send_goal(&goal).await.unwrap();
    let result = handle
        .get_result_timeout(Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(result.final_width, 0.04);
    assert!(result.response_header.success);
    assert_eq!(result.response_header.header.id, "gripper_1");
}

#[tokio::test]
async fn result_survives_a_timeout_but_not_a_second_retrieval() {
    common::init_tracing();
    let (_bus, server_runtime, client_runtime) = common::bus_and_runtimes();

    let server = ActionServer::new(
        &server_runtime,
        "/robot/follow",
        |_context: GoalContext<TrajectoryFeedback>, _goal: TrajectoryGoal| async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(TrajectoryResult::default())
        },
    )
    .unwrap();
    server.start().await.unwrap();

    let client = TrajectoryClient::new(&client_runtime, "/robot/follow", None).unwrap();
    let handle = client.send_goal(&trajectory_goal(1)).await.unwrap();

    let error = handle
        .get_result_timeout(Duration::from_millis(10))
        .await
        .unwrap_err();
    assert!(matches!(error, Error::ResultTimeout { .. }));

    // the waiter slot survives a timeout
    handle
        .get_result_timeout(Duration::from_secs(5))
        .await
        .unwrap();

    // but the result can only be retrieved once
    let error = handle.get_result().await.unwrap_err();
    assert!(matches!(error, Error::ResultConsumed { .. }));
}

#[tokio::test]
async fn stop_releases_goal_subscriptions_and_fails_waiters() {
    common::init_tracing();
    let (bus, _server_runtime, client_runtime) = common::bus_and_runtimes();

    // no server at all; the goal stays in flight until the client stops
    let client = TrajectoryClient::new(&client_runtime, "/robot/follow", None).unwrap();
    let handle = client.send_goal(&trajectory_goal(5)).await.unwrap();
    assert_eq!(bus.subscription_count(), 2);

    client.stop();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(bus.subscription_count(), 0);

    let error = handle.get_result().await.unwrap_err();
    assert!(matches!(error, Error::ClientStopped { .. }));
}

#[tokio::test]
async fn goal_ids_count_per_client() {
    common::init_tracing();
    let (_bus, server_runtime, client_runtime) = common::bus_and_runtimes();

    let server = ActionServer::new(&server_runtime, "/robot/follow", follow_trajectory).unwrap();
    server.start().await.unwrap();

    let client = TrajectoryClient::new(&client_runtime, "/robot/follow", Some("pair")).unwrap();
    let first = client.send_goal(&trajectory_goal(1)).await.unwrap();
    let second = client.send_goal(&trajectory_goal(1)).await.unwrap();
    assert_eq!(first.goal_id(), "pair_1");
    assert_eq!(second.goal_id(), "pair_2");

    first.get_result_timeout(Duration::from_secs(5)).await.unwrap();
    second.get_result_timeout(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn server_stop_waits_for_workers() {
    common::init_tracing();
    let (bus, server_runtime, client_runtime) = common::bus_and_runtimes();

    let server = ActionServer::new(
        &server_runtime,
        "/robot/follow",
        |_context: GoalContext<TrajectoryFeedback>, _goal: TrajectoryGoal| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(TrajectoryResult::default())
        },
    )
    .unwrap();
    server.start().await.unwrap();
    assert!(server.is_running());

    let client = TrajectoryClient::new(&client_runtime, "/robot/follow", None).unwrap();
    let handle = client.send_goal(&trajectory_goal(1)).await.unwrap();
    // give the goal a moment to reach the server
    tokio::time::sleep(Duration::from_millis(20)).await;

    server.stop().await;
    assert!(!server.is_running());

    // the in-flight worker still published its result
    handle
        .get_result_timeout(Duration::from_secs(5))
        .await
        .unwrap();

    drop(server);
    drop(client);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(bus.subscription_count(), 0);
}
