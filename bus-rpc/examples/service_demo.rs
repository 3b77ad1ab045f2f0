//! Request/response demo: an add-numbers service.
//!
//! Run `service_demo server` in one terminal and `service_demo client` in
//! another, with a nats server reachable on the given url.

use bus_api::NatsBus;
use bus_rpc::{
    impl_service_request, impl_service_response, runtime_init, HandlerError, Header,
    ResponseHeader, ServiceClient, ServiceServer,
};
use serde::{Deserialize, Serialize};
use structopt::StructOpt;
use tracing::info;

#[derive(Debug, StructOpt)]
struct CliArgs {
    /// The Nats server URL to connect to
    #[structopt(long, short, default_value = "nats://127.0.0.1:4222")]
    url: String,

    /// The service channel to serve/call
    #[structopt(long, short, default_value = "/demo_robot/add_numbers")]
    channel: String,

    #[structopt(subcommand)]
    role: Role,
}

#[derive(Debug, StructOpt)]
enum Role {
    /// Serve the add-numbers service
    Server,
    /// Call the service a couple of times
    Client,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
struct AddNumbersRequest {
    header: Header,
    a: f64,
    b: f64,
}
impl_service_request!(AddNumbersRequest);

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
struct AddNumbersResponse {
    response_header: ResponseHeader,
    sum: f64,
}
impl_service_response!(AddNumbersResponse);

async fn add_numbers(request: AddNumbersRequest) -> Result<AddNumbersResponse, HandlerError> {
    info!("Received request to add {} + {}", request.a, request.b);
    let mut response = AddNumbersResponse::default();
    response.sum = request.a + request.b;
    Ok(response)
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
            let server = ServiceServer::new(&runtime, &args.channel, add_numbers)?;
            info!("Starting service server...");
            server.spin().await?;
        }
        Role::Client => {
            let client = ServiceClient::<AddNumbersRequest, AddNumbersResponse>::new(
                &runtime,
                &args.channel,
                Some("math_client"),
            )?;

            let mut request = AddNumbersRequest::default();
            request.a = 5.0;
            request.b = 3.0;
            let response = client.call(&request).await?;
            info!("Result: {}", response.sum);

            request.a = 10.5;
            request.b = -6.28;
            let response = client.call(&request).await?;
            info!("Result: {}", response.sum);
        }
    }
    Ok(())
}
