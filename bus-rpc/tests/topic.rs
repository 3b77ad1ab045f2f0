//! End-to-end topic tests over the in-process bus.

mod common;

use bus_api::Bus;
use bus_rpc::{impl_message, Error, TopicPublisher, TopicSubscriber};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
struct RobotStatus {
    x: f64,
    y: f64,
    battery: f64,
}
impl_message!(RobotStatus);

fn collecting_subscriber() -> (Arc<Mutex<Vec<RobotStatus>>>, impl Fn(RobotStatus) + Send + Sync) {
    let seen: Arc<Mutex<Vec<RobotStatus>>> = Default::default();
    let sink = seen.clone();
    (seen, move |status: RobotStatus| {
        sink.lock().unwrap().push(status)
    })
}

#[tokio::test]
async fn every_subscriber_sees_every_message() {
    common::init_tracing();
    let (_bus, publisher_runtime, subscriber_runtime) = common::bus_and_runtimes();

    let (first_seen, first_callback) = collecting_subscriber();
    let _first =
        TopicSubscriber::<RobotStatus>::new(&subscriber_runtime, "/robot/status", first_callback)
            .await
            .unwrap();
    let (second_seen, second_callback) = collecting_subscriber();
    let _second =
        TopicSubscriber::<RobotStatus>::new(&subscriber_runtime, "/robot/status", second_callback)
            .await
            .unwrap();

    let publisher = TopicPublisher::<RobotStatus>::new(&publisher_runtime, "/robot/status").unwrap();
    for step in 0 .. 5 {
        let mut status = RobotStatus::default();
        status.x = f64::from(step);
        publisher.publish(&status).await.unwrap();
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    let first_seen = first_seen.lock().unwrap();
    let second_seen = second_seen.lock().unwrap();
    assert_eq!(first_seen.len(), 5);
    assert_eq!(*first_seen, *second_seen);
    // per-channel delivery keeps publish order
    for (step, status) in first_seen.iter().enumerate() {
        assert_eq!(status.x, step as f64);
    }
}

#[tokio::test]
async fn one_bad_payload_does_not_kill_the_subscription() {
    common::init_tracing();
    let (bus, publisher_runtime, subscriber_runtime) = common::bus_and_runtimes();

    let (seen, callback) = collecting_subscriber();
    let _subscriber =
        TopicSubscriber::<RobotStatus>::new(&subscriber_runtime, "/robot/status", callback)
            .await
            .unwrap();

    // raw garbage straight onto the bus, then a valid message
    bus.publish("/robot/status", b"not a message").await.unwrap();
    let publisher = TopicPublisher::<RobotStatus>::new(&publisher_runtime, "/robot/status").unwrap();
    let mut status = RobotStatus::default();
    status.battery = 0.5;
    publisher.publish(&status).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].battery, 0.5);
}

#[tokio::test]
async fn unsubscribe_detaches_from_the_bus() {
    common::init_tracing();
    let (bus, publisher_runtime, subscriber_runtime) = common::bus_and_runtimes();

    let (seen, callback) = collecting_subscriber();
    let mut subscriber =
        TopicSubscriber::<RobotStatus>::new(&subscriber_runtime, "/robot/status", callback)
            .await
            .unwrap();
    assert!(subscriber.is_subscribed());
    assert_eq!(bus.subscription_count(), 1);

    subscriber.unsubscribe();
    assert!(!subscriber.is_subscribed());
    // repeated unsubscribe only warns
    subscriber.unsubscribe();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(bus.subscription_count(), 0);

    let publisher = TopicPublisher::<RobotStatus>::new(&publisher_runtime, "/robot/status").unwrap();
    publisher.publish(&RobotStatus::default()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn dropping_the_subscriber_unsubscribes() {
    common::init_tracing();
    let (bus, _publisher_runtime, subscriber_runtime) = common::bus_and_runtimes();

    let (_seen, callback) = collecting_subscriber();
    let subscriber =
        TopicSubscriber::<RobotStatus>::new(&subscriber_runtime, "/robot/status", callback)
            .await
            .unwrap();
    assert_eq!(bus.subscription_count(), 1);

    drop(subscriber);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(bus.subscription_count(), 0);
}

#[tokio::test]
async fn empty_channel_is_rejected() {
    common::init_tracing();
    let (_bus, publisher_runtime, _subscriber_runtime) = common::bus_and_runtimes();

    let error = TopicPublisher::<RobotStatus>::new(&publisher_runtime, "").unwrap_err();
    assert!(matches!(error, Error::InvalidChannel { .. }));
}
