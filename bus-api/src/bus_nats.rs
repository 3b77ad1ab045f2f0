use super::*;
use futures_lite::stream::StreamExt;
use nats::asynk::Connection;
use snafu::ResultExt;
use tracing::{info, warn};

/// Bus backed by a NATS server.
///
/// Channel names map to subjects verbatim. NATS gives us the multicast
/// semantics the middleware expects: every subscriber of a subject receives
/// every message published to it.
#[derive(Clone)]
pub struct NatsBus {
    connection: Connection,
}

impl NatsBus {
    /// Connect to the given server, retrying until it is reachable.
    /// Reconnects after the initial handshake are left to the nats library.
    pub async fn connect(server: &str) -> Self {
        const RETRY_DELAY: std::time::Duration = std::time::Duration::from_millis(500);
        info!("Dialing nats at '{}'", server);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let connected = nats::Options::new()
                .max_reconnects(None)
                .connect_async(server)
                .await;
            match connected {
                Ok(connection) => {
                    info!("Bus is up on '{}' after {} attempt(s)", server, attempt);
                    return Self { connection };
                }
                // report the first failure, then keep dialing silently
                Err(error) if attempt == 1 => {
                    warn!("Nats at '{}' not reachable yet ({}), will keep trying", server, error)
                }
                Err(_) => {}
            }
            tokio::time::sleep(RETRY_DELAY).await;
        }
    }

    /// This bus as a boxed `Bus` trait object.
    pub fn boxed(&self) -> DynBus {
        Box::new(self.clone())
    }
}

#[async_trait]
impl Bus for NatsBus {
    async fn publish(&self, channel: &str, payload: &[u8]) -> BusResult<()> {
        self.connection
            .publish(channel, payload)
            .await
            .context(Publish { channel })
    }

    async fn subscribe(&self, channel: &str) -> BusResult<DynSubscription> {
        let subscription = self
            .connection
            .subscribe(channel)
            .await
            .context(Subscribe { channel })?;
        Ok(Box::new(NatsSubscription {
            channel: channel.to_string(),
            subscription: Some(subscription),
        }))
    }
}

struct NatsSubscription {
    channel: String,
    subscription: Option<nats::asynk::Subscription>,
}

#[async_trait]
impl BusSubscription for NatsSubscription {
    async fn next(&mut self) -> Option<BusMessage> {
        match &mut self.subscription {
            Some(subscription) => {
                subscription.next().await.map(|message| BusMessage {
                    channel: message.subject,
                    payload: message.data,
                })
            }
            None => None,
        }
    }

    async fn unsubscribe(&mut self) -> BusResult<()> {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe().await.context(Unsubscribe {
                channel: self.channel.clone(),
            })?;
        }
        Ok(())
    }
}
