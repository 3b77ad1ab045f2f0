//! One-way typed publish/subscribe on a single channel.

use crate::contract;
use crate::error::{self, Error};
use crate::message::Message;
use crate::runtime::{DispatchCallback, RegistrationId, Runtime};
use bus_api::{Bus, BusMessage};
use snafu::ResultExt;
use std::{marker::PhantomData, sync::Arc};
use tracing::{error, info, warn};

/// Typed publisher for a single channel.
pub struct TopicPublisher<T> {
    runtime: Runtime,
    channel: String,
    message_type: PhantomData<T>,
}

impl<T> std::fmt::Debug for TopicPublisher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicPublisher")
            .field("channel", &self.channel)
            .finish()
    }
}

impl<T: Message> TopicPublisher<T> {
    /// New publisher; the channel is validated once here.
    pub fn new(runtime: &Runtime, channel: &str) -> Result<Self, Error> {
        contract::verify_topic::<T>(channel)?;
        info!(
            "TopicPublisher created for channel '{}' with type {}",
            channel,
            T::TYPE_NAME
        );
        Ok(Self {
            runtime: runtime.clone(),
            channel: channel.to_string(),
            message_type: PhantomData,
        })
    }

    /// The channel this publisher writes to.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Encode and publish one message.
    pub async fn publish(&self, message: &T) -> Result<(), Error> {
        let payload = message.encode()?;
        self.runtime
            .bus()
            .publish(&self.channel, &payload)
            .await
            .context(error::BusPublish {
                channel: self.channel.clone(),
            })
    }
}

/// Typed subscriber invoking a callback for every decoded message.
///
/// Subscribes at construction; a message which fails to decode is logged and
/// dropped without disturbing the subscription.
pub struct TopicSubscriber<T> {
    runtime: Runtime,
    channel: String,
    registration: Option<RegistrationId>,
    message_type: PhantomData<T>,
}

impl<T: Message> TopicSubscriber<T> {
    /// New subscriber; subscribes immediately and starts the dispatch
    /// worker.
    pub async fn new<C>(runtime: &Runtime, channel: &str, callback: C) -> Result<Self, Error>
    where
        C: Fn(T) + Send + Sync + 'static,
    {
        contract::verify_topic::<T>(channel)?;
        let registration = runtime.register(channel, decode_callback(callback)).await?;
        runtime.start_handler().await;
        info!(
            "TopicSubscriber created for channel '{}' with type {}",
            channel,
            T::TYPE_NAME
        );
        Ok(Self {
            runtime: runtime.clone(),
            channel: channel.to_string(),
            registration: Some(registration),
            message_type: PhantomData,
        })
    }

    /// The channel this subscriber listens on.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Whether the subscription is still live.
    pub fn is_subscribed(&self) -> bool {
        self.registration.is_some()
    }

    /// Detach from the bus; repeated calls only warn.
    pub fn unsubscribe(&mut self) {
        match self.registration.take() {
            Some(id) => {
                self.runtime.unregister(id);
                info!("Unsubscribed from '{}'", self.channel);
            }
            None => warn!("Not subscribed to '{}'", self.channel),
        }
    }
}

impl<T> Drop for TopicSubscriber<T> {
    fn drop(&mut self) {
        if let Some(id) = self.registration.take() {
            self.runtime.unregister(id);
        }
    }
}

fn decode_callback<T, C>(callback: C) -> DispatchCallback
where
    T: Message,
    C: Fn(T) + Send + Sync + 'static,
{
    let callback = Arc::new(callback);
    Arc::new(move |message: BusMessage| {
        let callback = callback.clone();
        Box::pin(async move {
            match T::decode(&message.payload) {
                Ok(decoded) => callback(decoded),
                Err(err) => error!(
                    "Dropping undecodable message on '{}': {}",
                    message.channel, err
                ),
            }
        })
    })
}
