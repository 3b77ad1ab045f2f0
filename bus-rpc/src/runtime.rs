//! Shared bus handle and the single dispatch worker.
//!
//! Every endpoint registers the channels it needs on a [`Runtime`]; one
//! background worker drains all registered subscriptions and invokes their
//! callbacks strictly one at a time. Outbound traffic bypasses the worker
//! and goes straight through the bus handle.

use bus_api::{Bus, BusMessage, DynBus};
use futures::future::BoxFuture;
use once_cell::sync::OnceCell;
use snafu::ResultExt;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, Weak,
    },
    time::Duration,
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, warn};

use crate::error::{self, Error};

/// How long the dispatch worker waits for traffic before rechecking its stop
/// flag.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(100);

/// Identifies one callback registration on a [`Runtime`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationId(u64);

/// Callback invoked by the dispatch worker for every message of one
/// registration. Awaited to completion before the next message is taken.
pub(crate) type DispatchCallback =
    Arc<dyn Fn(BusMessage) -> BoxFuture<'static, ()> + Send + Sync>;

struct Registration {
    channel: String,
    callback: DispatchCallback,
    forwarder: JoinHandle<()>,
}

type Registry = Arc<Mutex<HashMap<RegistrationId, Registration>>>;
type QueueItem = (RegistrationId, BusMessage);

#[derive(Default)]
struct WorkerState {
    parked: Option<mpsc::UnboundedReceiver<QueueItem>>,
    running: Option<JoinHandle<mpsc::UnboundedReceiver<QueueItem>>>,
}

/// Owner of the shared bus handle and of the dispatch worker.
///
/// Cheap to clone; all clones drive the same worker and registration table.
/// Dropping the last clone aborts the worker and every forwarder.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

struct RuntimeInner {
    bus: DynBus,
    queue: mpsc::UnboundedSender<QueueItem>,
    registry: Registry,
    next_registration: AtomicU64,
    stop: Arc<AtomicBool>,
    worker: tokio::sync::Mutex<WorkerState>,
}

impl Runtime {
    /// New runtime around the given bus handle.
    pub fn new(bus: DynBus) -> Self {
        let (queue, receiver) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(RuntimeInner {
                bus,
                queue,
                registry: Default::default(),
                next_registration: AtomicU64::new(1),
                stop: Arc::new(AtomicBool::new(false)),
                worker: tokio::sync::Mutex::new(WorkerState {
                    parked: Some(receiver),
                    running: None,
                }),
            }),
        }
    }

    /// The shared bus handle.
    pub fn bus(&self) -> &DynBus {
        &self.inner.bus
    }

    pub(crate) fn downgrade(&self) -> WeakRuntime {
        WeakRuntime(Arc::downgrade(&self.inner))
    }

    /// Subscribe on `channel` and route its traffic through the dispatch
    /// worker into `callback`. Registrations on the same channel each get
    /// their own bus subscription.
    pub(crate) async fn register(
        &self,
        channel: &str,
        callback: DispatchCallback,
    ) -> Result<RegistrationId, Error> {
        let id = RegistrationId(self.inner.next_registration.fetch_add(1, Ordering::Relaxed));
        let mut subscription = self
            .inner
            .bus
            .subscribe(channel)
            .await
            .context(error::BusSubscribe { channel })?;
        let queue = self.inner.queue.clone();
        let forwarder_channel = channel.to_string();
        let forwarder = tokio::spawn(async move {
            while let Some(message) = subscription.next().await {
                if queue.send((id, message)).is_err() {
                    break;
                }
            }
            debug!("subscription on '{}' ended", forwarder_channel);
        });
        self.inner.registry.lock().unwrap().insert(
            id,
            Registration {
                channel: channel.to_string(),
                callback,
                forwarder,
            },
        );
        Ok(id)
    }

    /// Drop a registration; the bus subscription is released with it.
    /// Unknown ids are ignored so teardown paths may overlap.
    pub(crate) fn unregister(&self, id: RegistrationId) {
        self.inner.unregister(id);
    }

    /// Idempotently launch the dispatch worker. A no-op while one is
    /// already running.
    pub async fn start_handler(&self) {
        let mut worker = self.inner.worker.lock().await;
        if worker.running.is_some() {
            return;
        }
        match worker.parked.take() {
            Some(receiver) => {
                self.inner.stop.store(false, Ordering::SeqCst);
                let registry = self.inner.registry.clone();
                let stop = self.inner.stop.clone();
                worker.running = Some(tokio::spawn(dispatch_loop(receiver, registry, stop)));
                info!("dispatch worker started");
            }
            // the queue went away with a previous worker crash; §4.1 says
            // a dead bus drain stays dead
            None => error!("dispatch queue is gone, refusing to start a worker"),
        }
    }

    /// Signal the dispatch worker to exit and wait for it. The queue is
    /// parked so a later `start_handler` resumes where it left off.
    pub async fn stop_handler(&self) {
        let mut worker = self.inner.worker.lock().await;
        match worker.running.take() {
            None => warn!("dispatch worker is not running"),
            Some(handle) => {
                self.inner.stop.store(true, Ordering::SeqCst);
                match handle.await {
                    Ok(receiver) => {
                        worker.parked = Some(receiver);
                        info!("dispatch worker stopped");
                    }
                    Err(join_error) => {
                        error!("failed to join the dispatch worker: {}", join_error)
                    }
                }
            }
        }
    }

    /// Whether the dispatch worker is currently running.
    pub async fn handler_running(&self) -> bool {
        self.inner.worker.lock().await.running.is_some()
    }
}

impl RuntimeInner {
    fn unregister(&self, id: RegistrationId) {
        if let Some(registration) = self.registry.lock().unwrap().remove(&id) {
            registration.forwarder.abort();
            debug!("released subscription on '{}'", registration.channel);
        }
    }
}

impl Drop for RuntimeInner {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        for (_, registration) in self.registry.lock().unwrap().drain() {
            registration.forwarder.abort();
        }
        if let Ok(mut worker) = self.worker.try_lock() {
            if let Some(handle) = worker.running.take() {
                handle.abort();
            }
        }
    }
}

/// Weak handle used by dispatch callbacks which must release registrations
/// without keeping the runtime alive.
#[derive(Clone)]
pub(crate) struct WeakRuntime(Weak<RuntimeInner>);

impl WeakRuntime {
    pub fn unregister(&self, id: RegistrationId) {
        if let Some(inner) = self.0.upgrade() {
            inner.unregister(id);
        }
    }
}

async fn dispatch_loop(
    mut receiver: mpsc::UnboundedReceiver<QueueItem>,
    registry: Registry,
    stop: Arc<AtomicBool>,
) -> mpsc::UnboundedReceiver<QueueItem> {
    loop {
        match tokio::time::timeout(DRAIN_TIMEOUT, receiver.recv()).await {
            Ok(Some((id, message))) => {
                let callback = registry
                    .lock()
                    .unwrap()
                    .get(&id)
                    .map(|registration| registration.callback.clone());
                match callback {
                    Some(callback) => callback(message).await,
                    None => debug!(
                        "message for a released registration on '{}' dropped",
                        message.channel
                    ),
                }
            }
            Ok(None) => {
                warn!("dispatch queue closed, worker exiting");
                break;
            }
            Err(_) => {
                if stop.load(Ordering::SeqCst) {
                    break;
                }
            }
        }
    }
    receiver
}

static RUNTIME: OnceCell<Runtime> = OnceCell::new();

/// Initialise the process-wide runtime around the given bus handle.
pub fn runtime_init(bus: DynBus) -> Runtime {
    let runtime = Runtime::new(bus);
    RUNTIME
        .set(runtime.clone())
        .ok()
        .expect("the global runtime was already initialised");
    runtime
}

/// Get the process-wide runtime set up by `runtime_init`.
pub fn runtime() -> Runtime {
    RUNTIME
        .get()
        .expect("runtime_init must run before the global runtime is used")
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bus_api::MemoryBus;

    fn noop_callback(counter: Arc<AtomicU64>) -> DispatchCallback {
        Arc::new(move |_message| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    #[tokio::test]
    async fn start_handler_is_idempotent() {
        let runtime = Runtime::new(MemoryBus::new().boxed());
        runtime.start_handler().await;
        runtime.start_handler().await;
        assert!(runtime.handler_running().await);
        runtime.stop_handler().await;
        assert!(!runtime.handler_running().await);
    }

    #[tokio::test]
    async fn worker_restarts_after_an_orderly_stop() {
        let bus = MemoryBus::new();
        let runtime = Runtime::new(bus.boxed());
        let hits = Arc::new(AtomicU64::new(0));
        runtime
            .register("loop", noop_callback(hits.clone()))
            .await
            .unwrap();

        runtime.start_handler().await;
        runtime.stop_handler().await;
        runtime.start_handler().await;

        bus.publish("loop", b"x").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unregister_releases_the_bus_subscription() {
        let bus = MemoryBus::new();
        let runtime = Runtime::new(bus.boxed());
        let hits = Arc::new(AtomicU64::new(0));
        let id = runtime
            .register("gone", noop_callback(hits.clone()))
            .await
            .unwrap();
        assert_eq!(bus.subscription_count(), 1);

        runtime.unregister(id);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(bus.subscription_count(), 0);
    }

    #[tokio::test]
    async fn messages_for_released_registrations_are_dropped() {
        let bus = MemoryBus::new();
        let runtime = Runtime::new(bus.boxed());
        let hits = Arc::new(AtomicU64::new(0));
        let id = runtime
            .register("quiet", noop_callback(hits.clone()))
            .await
            .unwrap();
        runtime.unregister(id);
        runtime.start_handler().await;

        bus.publish("quiet", b"x").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
