//! Request/response endpoints with per-call correlation.
//!
//! Every call gets its own correlation id and its own response channel
//! (`<channel>/rsp/<id>`); the pending-call table only exists to hand the
//! routed response to the right waiter and to let late responses die
//! quietly.

use crate::contract;
use crate::error::{self, Error, HandlerError};
use crate::message::{Correlated, Message, ServiceRequest, ServiceResponse};
use crate::names::{self, IdAllocator};
use crate::runtime::{DispatchCallback, RegistrationId, Runtime};
use bus_api::{Bus, BusMessage};
use futures::future::BoxFuture;
use snafu::ResultExt;
use std::{
    collections::HashMap,
    future::Future,
    marker::PhantomData,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Default deadline for [`ServiceClient::call`].
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

type PendingMap<Resp> = Arc<Mutex<HashMap<String, oneshot::Sender<Result<Resp, Error>>>>>;

/// Typed client calling a single service channel.
///
/// Concurrent calls from the same client are fine; each is routed by its own
/// correlation id.
pub struct ServiceClient<Req, Resp> {
    runtime: Runtime,
    channel: String,
    ids: IdAllocator,
    pending: PendingMap<Resp>,
    request_type: PhantomData<Req>,
}

impl<Req, Resp> std::fmt::Debug for ServiceClient<Req, Resp> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceClient")
            .field("channel", &self.channel)
            .finish()
    }
}

impl<Req, Resp> ServiceClient<Req, Resp>
where
    Req: ServiceRequest,
    Resp: ServiceResponse,
{
    /// New client; types and arguments are validated once here.
    pub fn new(runtime: &Runtime, channel: &str, client_name: Option<&str>) -> Result<Self, Error> {
        contract::verify_service::<Req, Resp>(channel)?;
        let ids = IdAllocator::new(client_name, "cli")?;
        info!(
            "ServiceClient '{}' created for '{}' with types {} -> {}",
            ids.client_name(),
            channel,
            Req::TYPE_NAME,
            Resp::TYPE_NAME
        );
        Ok(Self {
            runtime: runtime.clone(),
            channel: channel.to_string(),
            ids,
            pending: Default::default(),
            request_type: PhantomData,
        })
    }

    /// The service channel this client calls.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// The client name embedded in every correlation id.
    pub fn client_name(&self) -> &str {
        self.ids.client_name()
    }

    /// Call the service with the default timeout.
    pub async fn call(&self, request: &Req) -> Result<Resp, Error> {
        self.call_ext(request, DEFAULT_CALL_TIMEOUT).await
    }

    /// Call the service, waiting up to `timeout` for the response.
    ///
    /// The caller's request instance is left untouched; the id and timestamp
    /// are stamped on a copy.
    pub async fn call_ext(&self, request: &Req, timeout: Duration) -> Result<Resp, Error> {
        self.runtime.start_handler().await;

        let id = self.ids.next();
        let mut request = request.clone();
        request.header_mut().stamp(id.as_str());

        let (sender, receiver) = oneshot::channel();
        self.pending.lock().unwrap().insert(id.clone(), sender);

        let response_channel = names::service_response(&self.channel, &id);
        let registration = match self
            .runtime
            .register(&response_channel, self.response_callback())
            .await
        {
            Ok(registration) => registration,
            Err(err) => {
                self.pending.lock().unwrap().remove(&id);
                return Err(err);
            }
        };

        let outcome = self.exchange(&request, receiver, timeout).await;

        self.runtime.unregister(registration);
        self.pending.lock().unwrap().remove(&id);
        outcome
    }

    /// Publish the stamped request and wait for its routed response.
    async fn exchange(
        &self,
        request: &Req,
        receiver: oneshot::Receiver<Result<Resp, Error>>,
        timeout: Duration,
    ) -> Result<Resp, Error> {
        let payload = request.encode()?;
        let request_channel = names::service_request(&self.channel);
        self.runtime
            .bus()
            .publish(&request_channel, &payload)
            .await
            .context(error::BusPublish {
                channel: request_channel.clone(),
            })?;

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => error::ClientStopped {
                channel: self.channel.clone(),
                id: request.header().id.clone(),
            }
            .fail(),
            Err(_) => error::CallTimeout {
                channel: self.channel.clone(),
                timeout,
            }
            .fail(),
        }
    }

    /// Dispatch callback routing responses to their waiters by the id the
    /// response itself carries.
    fn response_callback(&self) -> DispatchCallback {
        let pending = self.pending.clone();
        let channel = self.channel.clone();
        Arc::new(move |message: BusMessage| {
            let pending = pending.clone();
            let channel = channel.clone();
            Box::pin(async move {
                let response = match Resp::decode(&message.payload) {
                    Ok(response) => response,
                    Err(err) => {
                        error!(
                            "Dropping undecodable response on '{}': {}",
                            message.channel, err
                        );
                        return;
                    }
                };
                let header = response.response_header().clone();
                let slot = pending.lock().unwrap().remove(&header.header.id);
                match slot {
                    Some(sender) => {
                        let outcome = if header.success {
                            Ok(response)
                        } else {
                            error::ServiceFailed {
                                channel: channel.clone(),
                                message: header.error_message,
                            }
                            .fail()
                        };
                        let _ = sender.send(outcome);
                    }
                    None => debug!(
                        "Late response '{}' on '{}' dropped",
                        header.header.id, channel
                    ),
                }
            })
        })
    }
}

type ServiceHandlerFn<Req, Resp> =
    Arc<dyn Fn(Req) -> BoxFuture<'static, Result<Resp, HandlerError>> + Send + Sync>;

/// Typed server answering requests on a single service channel.
///
/// Handlers run inline on the dispatch worker and therefore serialize with
/// all other message handling; they are expected to be fast. A handler error
/// never crosses the wire as an exception: the caller receives a default
/// response with `success=false` and the error text.
pub struct ServiceServer<Req, Resp> {
    runtime: Runtime,
    channel: String,
    handler: ServiceHandlerFn<Req, Resp>,
    registration: Mutex<Option<RegistrationId>>,
}

impl<Req, Resp> ServiceServer<Req, Resp>
where
    Req: ServiceRequest,
    Resp: ServiceResponse,
{
    /// New server; types and arguments are validated once here.
    pub fn new<H, Fut>(runtime: &Runtime, channel: &str, handler: H) -> Result<Self, Error>
    where
        H: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, HandlerError>> + Send + 'static,
    {
        contract::verify_service::<Req, Resp>(channel)?;
        let handler: ServiceHandlerFn<Req, Resp> =
            Arc::new(move |request| Box::pin(handler(request)));
        info!(
            "ServiceServer created for '{}' with types {} -> {}",
            channel,
            Req::TYPE_NAME,
            Resp::TYPE_NAME
        );
        Ok(Self {
            runtime: runtime.clone(),
            channel: channel.to_string(),
            handler,
            registration: Mutex::new(None),
        })
    }

    /// The service channel this server answers on.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Whether the server currently holds its request subscription.
    pub fn is_running(&self) -> bool {
        self.registration.lock().unwrap().is_some()
    }

    /// Subscribe to the request channel and begin serving.
    pub async fn start(&self) -> Result<(), Error> {
        if self.is_running() {
            warn!("Service server for '{}' is already running", self.channel);
            return Ok(());
        }
        self.runtime.start_handler().await;
        let request_channel = names::service_request(&self.channel);
        let registration = self
            .runtime
            .register(&request_channel, self.request_callback())
            .await?;
        let mut slot = self.registration.lock().unwrap();
        if slot.is_some() {
            // lost a start/start race; keep the first registration
            drop(slot);
            self.runtime.unregister(registration);
            warn!("Service server for '{}' is already running", self.channel);
            return Ok(());
        }
        *slot = Some(registration);
        drop(slot);
        info!("Service server listening on '{}'", request_channel);
        Ok(())
    }

    /// Stop serving; releases the request subscription.
    pub fn stop(&self) {
        match self.registration.lock().unwrap().take() {
            Some(registration) => {
                self.runtime.unregister(registration);
                info!("Service server for '{}' stopped", self.channel);
            }
            None => warn!("Service server for '{}' is not running", self.channel),
        }
    }

    /// Serve until `stop` is called from elsewhere.
    pub async fn spin(&self) -> Result<(), Error> {
        self.start().await?;
        while self.is_running() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        Ok(())
    }

    /// Dispatch callback decoding requests, running the handler inline and
    /// publishing exactly one response per decoded request.
    fn request_callback(&self) -> DispatchCallback {
        let handler = self.handler.clone();
        let bus = self.runtime.bus().clone();
        let channel = self.channel.clone();
        Arc::new(move |message: BusMessage| {
            let handler = handler.clone();
            let bus = bus.clone();
            let channel = channel.clone();
            Box::pin(async move {
                let request = match Req::decode(&message.payload) {
                    Ok(request) => request,
                    Err(err) => {
                        error!(
                            "Dropping undecodable request on '{}': {}",
                            message.channel, err
                        );
                        return;
                    }
                };
                let request_id = request.header().id.clone();

                let mut response = match handler(request).await {
                    Ok(mut response) => {
                        let header = response.response_header_mut();
                        header.success = true;
                        header.error_message.clear();
                        response
                    }
                    Err(err) => {
                        error!("Service handler on '{}' failed: {}", channel, err);
                        let mut response = Resp::default();
                        let header = response.response_header_mut();
                        header.success = false;
                        header.error_message = err.to_string();
                        response
                    }
                };
                response
                    .response_header_mut()
                    .header
                    .stamp(request_id.as_str());

                let response_channel = names::service_response(&channel, &request_id);
                match response.encode() {
                    Ok(payload) => {
                        if let Err(err) = bus.publish(&response_channel, &payload).await {
                            error!(
                                "Failed to publish the response on '{}': {}",
                                response_channel, err
                            );
                        }
                    }
                    Err(err) => error!(
                        "Failed to encode the response for request '{}': {}",
                        request_id, err
                    ),
                }
            })
        })
    }
}

impl<Req, Resp> Drop for ServiceServer<Req, Resp> {
    fn drop(&mut self) {
        if let Some(registration) = self.registration.lock().unwrap().take() {
            self.runtime.unregister(registration);
        }
    }
}
