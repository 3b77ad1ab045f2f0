//! Topic demo: a robot status feed.
//!
//! Run `topic_demo subscribe` in one terminal and `topic_demo publish` in
//! another.

use bus_api::NatsBus;
use bus_rpc::{impl_message, runtime_init, TopicPublisher, TopicSubscriber};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use structopt::StructOpt;
use tracing::info;

#[derive(Debug, StructOpt)]
struct CliArgs {
    /// The Nats server URL to connect to
    #[structopt(long, short, default_value = "nats://127.0.0.1:4222")]
    url: String,

    /// The channel to publish/subscribe on
    #[structopt(long, short, default_value = "/demo_robot/status")]
    channel: String,

    #[structopt(subcommand)]
    role: Role,
}

#[derive(Debug, StructOpt)]
enum Role {
    /// Publish a burst of status messages
    Publish,
    /// Print every status message received
    Subscribe,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
struct RobotStatus {
    x: f64,
    y: f64,
    heading: f64,
    battery: f64,
}
impl_message!(RobotStatus);

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
        Role::Publish => {
            let publisher = TopicPublisher::<RobotStatus>::new(&runtime, &args.channel)?;
            for step in 0 .. 20 {
                let mut status = RobotStatus::default();
                status.x = f64::from(step) * 0.1;
                status.y = f64::from(step) * 0.05;
                status.heading = f64::from(step) * 0.01;
                status.battery = 1.0 - f64::from(step) * 0.01;
                publisher.publish(&status).await?;
                info!("Published status {}", step);
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        }
        Role::Subscribe => {
            let _subscriber =
                TopicSubscriber::<RobotStatus>::new(&runtime, &args.channel, |status| {
                    info!(
                        "Robot at ({:.2}, {:.2}) heading {:.2}, battery {:.0}%",
                        status.x,
                        status.y,
                        status.heading,
                        status.battery * 100.0
                    );
                })
                .await?;
            info!("Subscribed to '{}', waiting for messages...", args.channel);
            tokio::signal::ctrl_c().await?;
        }
    }
    Ok(())
}
